//! Delta sync: codec, pending tracking, status, and the engine.

pub mod codec;
mod engine;
mod error;
mod journal;
mod pending;
mod status;

pub use codec::{PhotoRef, WirePayload};
pub use engine::{SyncEngine, SyncOutcome, SyncReport};
pub use error::SyncError;
pub use journal::Journal;
pub use pending::PendingTracker;
pub use status::{SyncStatus, SyncStatusPublisher};
