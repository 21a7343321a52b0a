use std::io;

use stamp_core::remote::RemoteError;
use stamp_core::sync::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] stamp_core::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No entry title provided")]
    EmptyTitle,
    #[error("Entry ID cannot be empty")]
    EmptyEntryId,
    #[error("Entry not found for id/prefix: {0}")]
    EntryNotFound(String),
    #[error("Invalid entry id '{0}'; expected a full UUID")]
    InvalidEntryId(String),
    #[error("{0}")]
    AmbiguousEntryId(String),
    #[error("Invalid date '{0}'; expected YYYY-MM-DD or RFC 3339")]
    InvalidDate(String),
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error(
        "Sync is not configured. Set STAMP_SUPABASE_URL and STAMP_SUPABASE_ANON_KEY to enable `stamp sync`."
    )]
    SyncNotConfigured,
}
