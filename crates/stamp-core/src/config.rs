//! Runtime configuration for the sync engine.
//!
//! Remote credentials come from environment variables; tunables live in
//! [`SyncOptions`].

use std::env;
use std::time::Duration;

use crate::remote::{parse_supabase_config, RemoteError, SupabaseConfig, SupabaseTableClient};
use crate::storage::{parse_r2_config, PhotoStorage, R2Config, SupabaseStorage};
use crate::{Error, Result};

const DEFAULT_STATUS_DISPLAY_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_UPLOAD_BATCH_SIZE: usize = 50;

/// Engine tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// How long success/error stays visible before the status returns to idle
    pub status_display_delay: Duration,
    /// Payloads per remote upsert request
    pub upload_batch_size: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            status_display_delay: DEFAULT_STATUS_DISPLAY_DELAY,
            upload_batch_size: DEFAULT_UPLOAD_BATCH_SIZE,
        }
    }
}

/// Where entry photos are stored on the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoBackend {
    /// Photos travel Base64-encoded inside the payload
    Inline,
    /// Supabase Storage bucket
    Supabase { bucket: String },
    /// Cloudflare R2 bucket
    R2(R2Config),
}

/// Everything needed to talk to the hosted backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub supabase: SupabaseConfig,
    pub photos: PhotoBackend,
}

impl SyncSettings {
    /// Load settings from the environment.
    ///
    /// Returns `Ok(None)` when no remote is configured, in which case the
    /// journal works purely locally.
    pub fn from_env() -> Result<Option<Self>> {
        parse_settings(|key| env::var(key).ok())
    }

    pub fn remote_table(&self) -> std::result::Result<SupabaseTableClient, RemoteError> {
        SupabaseTableClient::new(&self.supabase)
    }

    /// Build the configured photo backend, `None` for inline photos.
    pub fn photo_storage(&self) -> std::result::Result<Option<PhotoStorage>, RemoteError> {
        match &self.photos {
            PhotoBackend::Inline => Ok(None),
            PhotoBackend::Supabase { bucket } => Ok(Some(PhotoStorage::Supabase(
                SupabaseStorage::new(&self.supabase, bucket.clone())?,
            ))),
            PhotoBackend::R2(config) => Ok(Some(PhotoStorage::R2(
                crate::storage::R2Storage::new(config.clone())?,
            ))),
        }
    }
}

fn parse_settings(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<SyncSettings>> {
    let Some(supabase) = parse_supabase_config(&lookup)? else {
        return Ok(None);
    };
    let r2 = parse_r2_config(&lookup)?;

    let photos = match (supabase.photo_bucket.clone(), r2) {
        (Some(_), Some(_)) => {
            return Err(Error::InvalidInput(
                "Configure either STAMP_PHOTO_BUCKET or R2_*, not both".to_string(),
            ))
        }
        (Some(bucket), None) => PhotoBackend::Supabase { bucket },
        (None, Some(config)) => PhotoBackend::R2(config),
        (None, None) => PhotoBackend::Inline,
    };

    Ok(Some(SyncSettings { supabase, photos }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    const SUPABASE: [(&str, &str); 2] = [
        ("STAMP_SUPABASE_URL", "https://abc.supabase.co"),
        ("STAMP_SUPABASE_ANON_KEY", "anon"),
    ];

    #[test]
    fn default_options() {
        let options = SyncOptions::default();
        assert_eq!(options.status_display_delay, Duration::from_secs(2));
        assert_eq!(options.upload_batch_size, 50);
    }

    #[test]
    fn unconfigured_remote_is_none() {
        assert_eq!(parse_settings(lookup(&[])).unwrap(), None);
    }

    #[test]
    fn photos_default_to_inline() {
        let settings = parse_settings(lookup(&SUPABASE)).unwrap().unwrap();
        assert_eq!(settings.photos, PhotoBackend::Inline);
        assert_eq!(settings.supabase.table, "entries");
    }

    #[test]
    fn supabase_bucket_selects_supabase_storage() {
        let mut vars = SUPABASE.to_vec();
        vars.push(("STAMP_PHOTO_BUCKET", "photos"));
        let settings = parse_settings(lookup(&vars)).unwrap().unwrap();
        assert_eq!(
            settings.photos,
            PhotoBackend::Supabase {
                bucket: "photos".to_string()
            }
        );
    }

    #[test]
    fn both_photo_backends_is_an_error() {
        let mut vars = SUPABASE.to_vec();
        vars.extend([
            ("STAMP_PHOTO_BUCKET", "photos"),
            ("R2_ACCOUNT_ID", "acct"),
            ("R2_BUCKET", "stamp"),
            ("R2_ACCESS_KEY_ID", "key"),
            ("R2_SECRET_ACCESS_KEY", "secret"),
            ("R2_PUBLIC_BASE_URL", "https://photos.example.com"),
        ]);
        assert!(matches!(
            parse_settings(lookup(&vars)),
            Err(Error::InvalidInput(_))
        ));
    }
}
