//! Sync error taxonomy surfaced to callers and the status publisher.

use thiserror::Error;

use crate::remote::RemoteError;

/// Errors that abort a sync phase or a single-record operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Transport or connectivity failure on a remote call
    #[error("Network error: {0}")]
    Network(String),
    /// The remote rejected or failed a write
    #[error("Upload failed: {0}")]
    UploadFailed(String),
    /// The remote rejected or failed a delete
    #[error("Delete failed: {0}")]
    DeleteFailed(String),
    /// A local store write or read was rejected
    #[error("Local update failed: {0}")]
    UpdateFailed(String),
    /// A wire payload could not be decoded
    #[error("Decoding error: {0}")]
    Decoding(String),
}

impl SyncError {
    /// Any remote failure while downloading aborts the pass as a network error.
    pub(crate) fn download(error: &RemoteError) -> Self {
        Self::Network(error.to_string())
    }

    pub(crate) fn upload(error: &RemoteError) -> Self {
        if error.is_transport() {
            Self::Network(error.to_string())
        } else {
            Self::UploadFailed(error.to_string())
        }
    }

    pub(crate) fn delete(error: &RemoteError) -> Self {
        if error.is_transport() {
            Self::Network(error.to_string())
        } else {
            Self::DeleteFailed(error.to_string())
        }
    }
}

impl From<crate::Error> for SyncError {
    fn from(error: crate::Error) -> Self {
        Self::UpdateFailed(error.to_string())
    }
}
