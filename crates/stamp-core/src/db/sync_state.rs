//! Persisted sync bookkeeping: checkpoint, pending set, and conflict log

use std::collections::BTreeSet;

use libsql::{Connection, Value};

use crate::error::{Error, Result};
use crate::models::{EntryId, SyncConflict};
use crate::util::unix_millis_now;

const KEY_LAST_SYNC_AT: &str = "last_sync_at";
const KEY_REMOTE_CURSOR: &str = "remote_cursor";
const KEY_PENDING_IDS: &str = "pending_ids";

/// Process-wide sync state that survives restarts.
///
/// A fresh store yields the Unix epoch and an empty pending set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncCheckpoint {
    /// Instant of the last successful full sync (Unix ms)
    pub last_sync_at: i64,
    /// Newest server-side `updated_at` seen by a completed download (Unix ms,
    /// server clock)
    pub remote_cursor: i64,
    /// Entry ids with local mutations not yet confirmed uploaded
    pub pending: BTreeSet<EntryId>,
}

/// Trait for durable sync bookkeeping (async)
#[allow(async_fn_in_trait)]
pub trait SyncStateStore {
    async fn load_last_sync(&self) -> Result<i64>;

    async fn save_last_sync(&self, at: i64) -> Result<()>;

    async fn load_remote_cursor(&self) -> Result<i64>;

    async fn save_remote_cursor(&self, at: i64) -> Result<()>;

    async fn load_pending(&self) -> Result<BTreeSet<EntryId>>;

    async fn save_pending(&self, ids: &BTreeSet<EntryId>) -> Result<()>;

    /// Log a conflict that was resolved with `strategy`
    async fn record_conflict(
        &self,
        entry_id: &EntryId,
        local_edit_timestamp: i64,
        incoming_edit_timestamp: i64,
        strategy: &str,
    ) -> Result<()>;

    /// Most recently resolved conflicts first
    async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>>;

    /// Load the full checkpoint
    async fn load(&self) -> Result<SyncCheckpoint> {
        Ok(SyncCheckpoint {
            last_sync_at: self.load_last_sync().await?,
            remote_cursor: self.load_remote_cursor().await?,
            pending: self.load_pending().await?,
        })
    }
}

/// libSQL implementation of `SyncStateStore` backed by the `sync_state` key/value table
#[derive(Clone)]
pub struct LibSqlSyncStateStore {
    conn: Connection,
}

impl LibSqlSyncStateStore {
    /// Create a new store over the given connection
    pub const fn new(conn: Connection) -> Self {
        Self { conn }
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM sync_state WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    async fn get_millis(&self, key: &str) -> Result<i64> {
        let Some(value) = self.get_value(key).await? else {
            return Ok(0);
        };
        value
            .trim()
            .parse()
            .map_err(|_| Error::Database(format!("Invalid {key} value: {value}")))
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }
}

impl SyncStateStore for LibSqlSyncStateStore {
    async fn load_last_sync(&self) -> Result<i64> {
        self.get_millis(KEY_LAST_SYNC_AT).await
    }

    async fn save_last_sync(&self, at: i64) -> Result<()> {
        self.set_value(KEY_LAST_SYNC_AT, &at.to_string()).await
    }

    async fn load_remote_cursor(&self) -> Result<i64> {
        self.get_millis(KEY_REMOTE_CURSOR).await
    }

    async fn save_remote_cursor(&self, at: i64) -> Result<()> {
        self.set_value(KEY_REMOTE_CURSOR, &at.to_string()).await
    }

    async fn load_pending(&self) -> Result<BTreeSet<EntryId>> {
        match self.get_value(KEY_PENDING_IDS).await? {
            Some(value) => Ok(serde_json::from_str(&value)?),
            None => Ok(BTreeSet::new()),
        }
    }

    async fn save_pending(&self, ids: &BTreeSet<EntryId>) -> Result<()> {
        let value = serde_json::to_string(ids)?;
        self.set_value(KEY_PENDING_IDS, &value).await
    }

    async fn record_conflict(
        &self,
        entry_id: &EntryId,
        local_edit_timestamp: i64,
        incoming_edit_timestamp: i64,
        strategy: &str,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_conflicts (
                     entry_id, local_edit_timestamp, incoming_edit_timestamp, resolved_at, strategy
                 ) VALUES (?, ?, ?, ?, ?)",
                vec![
                    Value::Text(entry_id.as_str()),
                    Value::Integer(local_edit_timestamp),
                    Value::Integer(incoming_edit_timestamp),
                    Value::Integer(unix_millis_now()),
                    Value::Text(strategy.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = self
            .conn
            .query(
                "SELECT id, entry_id, local_edit_timestamp, incoming_edit_timestamp, resolved_at, strategy
                 FROM sync_conflicts
                 ORDER BY resolved_at DESC, id DESC
                 LIMIT ?",
                [limit],
            )
            .await?;

        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            conflicts.push(SyncConflict {
                id: row.get(0)?,
                entry_id: row.get(1)?,
                local_edit_timestamp: row.get(2)?,
                incoming_edit_timestamp: row.get(3)?,
                resolved_at: row.get(4)?,
                strategy: row.get(5)?,
            });
        }
        Ok(conflicts)
    }
}
