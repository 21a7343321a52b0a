//! Remote table client abstraction and the hosted Supabase implementation.

mod supabase;

use thiserror::Error;

use crate::models::EntryId;
use crate::sync::WirePayload;

pub use supabase::{SupabaseConfig, SupabaseTableClient};
pub(crate) use supabase::{authorize, ensure_success, parse_config as parse_supabase_config};

/// Errors raised by remote table and blob storage clients.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The request never produced an HTTP response (DNS, TLS, timeout, offline).
    #[error("Remote request failed: {0}")]
    Transport(String),
    /// The remote answered with a non-success status.
    #[error("Remote API error ({status}): {message}")]
    Api { status: u16, message: String },
    /// The remote answered successfully but the body was unusable.
    #[error("Invalid remote response: {0}")]
    InvalidResponse(String),
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
}

impl RemoteError {
    /// True when the failure is connectivity rather than a rejection.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::InvalidResponse(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

/// Row filter for remote selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteFilter {
    /// Rows whose server-side `updated_at` is at or after the given instant (Unix ms)
    UpdatedSince(i64),
    /// Rows with one of the given ids
    IdIn(Vec<EntryId>),
}

/// Result ordering for remote selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub column: &'static str,
    pub descending: bool,
}

impl OrderBy {
    /// Newest server-side change first
    pub const UPDATED_AT_DESC: Self = Self {
        column: "updated_at",
        descending: true,
    };
}

/// REST-like access to the hosted entries table.
///
/// `select` returns raw JSON rows so a single malformed record can be skipped
/// by the caller instead of failing the whole response.
#[allow(async_fn_in_trait)]
pub trait RemoteTable {
    async fn select(
        &self,
        filter: &RemoteFilter,
        order: OrderBy,
    ) -> Result<Vec<serde_json::Value>, RemoteError>;

    /// Insert or replace rows keyed by `id`
    async fn upsert(&self, payloads: &[WirePayload]) -> Result<(), RemoteError>;

    async fn delete(&self, id: &EntryId) -> Result<(), RemoteError>;
}
