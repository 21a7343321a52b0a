//! Cloudflare R2 photo storage over the S3-compatible API.

use std::env;

use aws_credential_types::Credentials;
use aws_sdk_s3::{primitives::ByteStream, Client};
use aws_types::region::Region;

use super::{http_get_bytes, normalize_object_path, BlobStorage};
use crate::remote::RemoteError;
use crate::util::is_http_url;
use crate::{Error, Result};

const ENV_ACCOUNT_ID: &str = "R2_ACCOUNT_ID";
const ENV_BUCKET: &str = "R2_BUCKET";
const ENV_ACCESS_KEY_ID: &str = "R2_ACCESS_KEY_ID";
const ENV_SECRET_ACCESS_KEY: &str = "R2_SECRET_ACCESS_KEY";
const ENV_PUBLIC_BASE_URL: &str = "R2_PUBLIC_BASE_URL";

/// Cloudflare R2 configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct R2Config {
    /// Cloudflare account identifier.
    pub account_id: String,
    /// R2 bucket name.
    pub bucket: String,
    /// Access key id for S3-compatible auth.
    pub access_key_id: String,
    /// Secret access key for S3-compatible auth.
    pub secret_access_key: String,
    /// Public URL base photos are served from; payloads reference it.
    pub public_base_url: String,
}

impl std::fmt::Debug for R2Config {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("R2Config")
            .field("account_id", &self.account_id)
            .field("bucket", &self.bucket)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("public_base_url", &self.public_base_url)
            .finish()
    }
}

impl R2Config {
    /// Load R2 configuration from environment variables.
    ///
    /// Returns `Ok(None)` when no R2 variables are set.
    /// Returns an error when only a partial configuration is provided.
    pub fn from_env() -> Result<Option<Self>> {
        parse_config(|key| env::var(key).ok())
    }

    /// Cloudflare R2 S3-compatible endpoint URL.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        format!("https://{}.r2.cloudflarestorage.com", self.account_id)
    }
}

/// R2-backed photo storage.
#[derive(Clone, Debug)]
pub struct R2Storage {
    config: R2Config,
    s3: Client,
    http: reqwest::Client,
}

impl R2Storage {
    pub fn new(config: R2Config) -> std::result::Result<Self, RemoteError> {
        let s3 = build_s3_client(&config);
        let http = reqwest::Client::builder().build()?;
        Ok(Self { config, s3, http })
    }

    #[must_use]
    pub const fn config(&self) -> &R2Config {
        &self.config
    }

    /// Check whether an object exists in the configured bucket.
    pub async fn object_exists(&self, object_key: &str) -> std::result::Result<bool, RemoteError> {
        let object_key = normalize_object_path(object_key)?;

        let response = self
            .s3
            .list_objects_v2()
            .bucket(&self.config.bucket)
            .prefix(&object_key)
            .max_keys(1)
            .send()
            .await
            .map_err(|error| {
                storage_error(
                    "list_objects_v2",
                    &self.config.bucket,
                    Some(&object_key),
                    error,
                )
            })?;

        Ok(response
            .contents()
            .iter()
            .filter_map(|object| object.key())
            .any(|candidate| candidate == object_key))
    }
}

impl BlobStorage for R2Storage {
    async fn upload(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
        overwrite: bool,
    ) -> std::result::Result<(), RemoteError> {
        let object_key = normalize_object_path(path)?;
        if !overwrite && self.object_exists(&object_key).await? {
            return Err(RemoteError::Api {
                status: 409,
                message: format!("object {object_key} already exists"),
            });
        }

        let mut request = self
            .s3
            .put_object()
            .bucket(&self.config.bucket)
            .key(&object_key)
            .body(ByteStream::from(bytes.to_vec()));

        let content_type = content_type.trim();
        if !content_type.is_empty() {
            request = request.content_type(content_type);
        }

        request.send().await.map_err(|error| {
            storage_error("put_object", &self.config.bucket, Some(&object_key), error)
        })?;

        Ok(())
    }

    fn public_url(&self, path: &str) -> std::result::Result<String, RemoteError> {
        let key = normalize_object_path(path)?;
        Ok(format!("{}/{key}", self.config.public_base_url))
    }

    async fn download(&self, url: &str) -> std::result::Result<Vec<u8>, RemoteError> {
        http_get_bytes(&self.http, url).await
    }

    async fn delete(&self, path: &str) -> std::result::Result<(), RemoteError> {
        let object_key = normalize_object_path(path)?;

        self.s3
            .delete_object()
            .bucket(&self.config.bucket)
            .key(&object_key)
            .send()
            .await
            .map_err(|error| {
                storage_error(
                    "delete_object",
                    &self.config.bucket,
                    Some(&object_key),
                    error,
                )
            })?;

        Ok(())
    }
}

pub(crate) fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<R2Config>> {
    let account_id = lookup(ENV_ACCOUNT_ID).map(|value| value.trim().to_string());
    let bucket = lookup(ENV_BUCKET).map(|value| value.trim().to_string());
    let access_key_id = lookup(ENV_ACCESS_KEY_ID).map(|value| value.trim().to_string());
    let secret_access_key = lookup(ENV_SECRET_ACCESS_KEY).map(|value| value.trim().to_string());
    let public_base_url = lookup(ENV_PUBLIC_BASE_URL).map(|value| value.trim().to_string());

    let any_present = account_id.is_some()
        || bucket.is_some()
        || access_key_id.is_some()
        || secret_access_key.is_some()
        || public_base_url.is_some();

    if !any_present {
        return Ok(None);
    }

    let required = [
        (ENV_ACCOUNT_ID, account_id),
        (ENV_BUCKET, bucket),
        (ENV_ACCESS_KEY_ID, access_key_id),
        (ENV_SECRET_ACCESS_KEY, secret_access_key),
        (ENV_PUBLIC_BASE_URL, public_base_url),
    ];

    let missing: Vec<&str> = required
        .iter()
        .filter(|(_, value)| value.as_ref().map_or(true, String::is_empty))
        .map(|(key, _)| *key)
        .collect();

    if !missing.is_empty() {
        return Err(Error::InvalidInput(format!(
            "R2 configuration is incomplete. Missing: {}",
            missing.join(", ")
        )));
    }

    let [account_id, bucket, access_key_id, secret_access_key, public_base_url] =
        required.map(|(_, value)| value.unwrap_or_default());

    if !is_http_url(&public_base_url) {
        return Err(Error::InvalidInput(format!(
            "{ENV_PUBLIC_BASE_URL} must start with http:// or https://"
        )));
    }

    Ok(Some(R2Config {
        account_id,
        bucket,
        access_key_id,
        secret_access_key,
        public_base_url: public_base_url.trim_end_matches('/').to_string(),
    }))
}

fn build_s3_client(config: &R2Config) -> Client {
    let credentials = Credentials::new(
        config.access_key_id.clone(),
        config.secret_access_key.clone(),
        None,
        None,
        "stamp-core-r2-storage",
    );

    let sdk_config = aws_sdk_s3::config::Builder::new()
        .region(Region::new("auto"))
        .credentials_provider(credentials)
        .endpoint_url(config.endpoint_url())
        .force_path_style(true)
        .build();

    Client::from_conf(sdk_config)
}

fn storage_error(
    operation: &str,
    bucket: &str,
    object_key: Option<&str>,
    error: impl std::fmt::Display,
) -> RemoteError {
    let target = object_key.map_or_else(|| bucket.to_string(), |key| format!("{bucket}/{key}"));
    RemoteError::Transport(format!("R2 {operation} failed for {target}: {error}"))
}
