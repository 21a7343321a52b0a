//! Supabase Storage backend for entry photos.

use std::time::Duration;

use super::{http_get_bytes, normalize_object_path, BlobStorage};
use crate::remote::{authorize, ensure_success, RemoteError, SupabaseConfig};
use crate::util::is_http_url;

const HTTP_TIMEOUT_SECS: u64 = 60;

/// Supabase Storage client bound to one bucket.
#[derive(Clone)]
pub struct SupabaseStorage {
    base_url: String,
    bucket: String,
    anon_key: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl SupabaseStorage {
    /// Build a storage client for `bucket` in the configured project.
    pub fn new(config: &SupabaseConfig, bucket: impl Into<String>) -> Result<Self, RemoteError> {
        if !is_http_url(&config.url) {
            return Err(RemoteError::InvalidConfiguration(
                "Supabase URL must include http:// or https://".to_string(),
            ));
        }
        let bucket = bucket.into().trim().trim_matches('/').to_string();
        if bucket.is_empty() {
            return Err(RemoteError::InvalidConfiguration(
                "photo bucket must not be empty".to_string(),
            ));
        }

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            bucket,
            anon_key: config.anon_key.clone(),
            access_token: config.access_token.clone(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
                .build()?,
        })
    }

    /// Storage bucket photos are written to.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            self.bucket,
            encode_path(path)
        )
    }
}

impl BlobStorage for SupabaseStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
        overwrite: bool,
    ) -> Result<(), RemoteError> {
        let path = normalize_object_path(path)?;
        let request = self
            .client
            .post(self.object_url(&path))
            .header("x-upsert", if overwrite { "true" } else { "false" })
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec());

        let response = authorize(request, &self.anon_key, self.access_token.as_deref())
            .send()
            .await?;
        ensure_success(response).await?;
        tracing::debug!("Uploaded {} bytes to {}/{}", bytes.len(), self.bucket, path);
        Ok(())
    }

    fn public_url(&self, path: &str) -> Result<String, RemoteError> {
        let path = normalize_object_path(path)?;
        Ok(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            self.bucket,
            encode_path(&path)
        ))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        http_get_bytes(&self.client, url).await
    }

    async fn delete(&self, path: &str) -> Result<(), RemoteError> {
        let path = normalize_object_path(path)?;
        let request = self.client.delete(self.object_url(&path));
        let response = authorize(request, &self.anon_key, self.access_token.as_deref())
            .send()
            .await?;

        match ensure_success(response).await {
            Ok(_) | Err(RemoteError::Api { status: 404, .. }) => Ok(()),
            Err(error) => Err(error),
        }
    }
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
