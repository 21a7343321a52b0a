//! Data models for Stamp

mod entry;
mod sync_conflict;

pub use entry::{Coordinate, Entry, EntryDraft, EntryId};
pub use sync_conflict::{SyncConflict, REMOTE_WINS};
