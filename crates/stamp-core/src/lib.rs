//! stamp-core - Core library for Stamp
//!
//! Travel journal entries stored locally in libSQL and kept in step with a
//! hosted Supabase table by a bidirectional delta sync engine. Photos are
//! optionally offloaded to Supabase Storage or Cloudflare R2.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod util;

#[cfg(test)]
mod test_support;

pub use config::{SyncOptions, SyncSettings};
pub use error::{Error, Result};
pub use models::{Entry, EntryId};
