//! Database layer for Stamp

mod connection;
mod entry_store;
mod migrations;
mod sync_state;

pub use connection::Database;
pub use entry_store::{EntryStore, LibSqlEntryStore};
pub use sync_state::{LibSqlSyncStateStore, SyncCheckpoint, SyncStateStore};
