//! Sync conflict model

use serde::{Deserialize, Serialize};

/// Strategy name recorded when a newer remote record replaced an unsynced local edit
pub const REMOTE_WINS: &str = "remote-wins";

/// Recorded sync conflict resolved by strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    /// Entry involved in the conflict
    pub entry_id: String,
    /// Local edit timestamp that was overwritten
    pub local_edit_timestamp: i64,
    /// Incoming record's edit timestamp that was applied
    pub incoming_edit_timestamp: i64,
    /// Resolution timestamp (unix ms)
    pub resolved_at: i64,
    /// Resolution strategy name
    pub strategy: String,
}
