//! Blob storage for externalized entry photos.

mod r2;
mod supabase;

use crate::remote::RemoteError;

pub(crate) use r2::parse_config as parse_r2_config;
pub use r2::{R2Config, R2Storage};
pub use supabase::SupabaseStorage;

/// Object storage operations used for photo externalization.
#[allow(async_fn_in_trait)]
pub trait BlobStorage {
    /// Store `bytes` at `path`. With `overwrite` false an existing object is an error.
    async fn upload(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
        overwrite: bool,
    ) -> Result<(), RemoteError>;

    /// Public URL under which `path` is served.
    fn public_url(&self, path: &str) -> Result<String, RemoteError>;

    /// Fetch bytes from a public URL with a plain HTTP GET.
    async fn download(&self, url: &str) -> Result<Vec<u8>, RemoteError>;

    /// Remove the object at `path`. Missing objects are not an error.
    async fn delete(&self, path: &str) -> Result<(), RemoteError>;
}

/// Photo backend selected at runtime from configuration.
pub enum PhotoStorage {
    Supabase(SupabaseStorage),
    R2(R2Storage),
}

impl BlobStorage for PhotoStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
        overwrite: bool,
    ) -> Result<(), RemoteError> {
        match self {
            Self::Supabase(storage) => storage.upload(path, bytes, content_type, overwrite).await,
            Self::R2(storage) => storage.upload(path, bytes, content_type, overwrite).await,
        }
    }

    fn public_url(&self, path: &str) -> Result<String, RemoteError> {
        match self {
            Self::Supabase(storage) => storage.public_url(path),
            Self::R2(storage) => storage.public_url(path),
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        match self {
            Self::Supabase(storage) => storage.download(url).await,
            Self::R2(storage) => storage.download(url).await,
        }
    }

    async fn delete(&self, path: &str) -> Result<(), RemoteError> {
        match self {
            Self::Supabase(storage) => storage.delete(path).await,
            Self::R2(storage) => storage.delete(path).await,
        }
    }
}

/// Plain HTTP GET shared by the storage backends.
pub(crate) async fn http_get_bytes(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<u8>, RemoteError> {
    let response = client.get(url).send().await?;
    let response = crate::remote::ensure_success(response).await?;
    let bytes = response.bytes().await?;
    Ok(bytes.to_vec())
}

/// Trim slashes and whitespace from an object path, rejecting empty paths.
pub(crate) fn normalize_object_path(path: &str) -> Result<String, RemoteError> {
    let path = path.trim().trim_matches('/').to_string();
    if path.is_empty() {
        return Err(RemoteError::InvalidConfiguration(
            "object path cannot be empty".to_string(),
        ));
    }
    Ok(path)
}
