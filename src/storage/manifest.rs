//! Manifest payload cache.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{digest_path, Storage, StoredPayload, MANIFESTS_DIR};
use crate::error::{CacheError, Result};

// == Manifest ==
/// An OCI manifest document together with its media type.
///
/// The document is kept verbatim; parsing belongs to the registry client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub media_type: String,
    pub content: String,
}

impl Manifest {
    pub fn new(media_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            content: content.into(),
        }
    }
}

// == Manifest Cache ==
/// Reads and writes manifest payloads under `manifests/`.
#[derive(Debug, Clone)]
pub struct ManifestCache {
    storage: Storage,
}

impl ManifestCache {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn path_for(&self, digest: &str) -> Result<PathBuf> {
        digest_path(MANIFESTS_DIR, digest)
    }

    pub async fn put_manifest(&self, digest: &str, manifest: &Manifest) -> Result<StoredPayload> {
        let file_path = self.path_for(digest)?;
        let bytes = serde_json::to_vec(manifest)?;
        let size = self.storage.write(&file_path, &bytes).await?;
        Ok(StoredPayload { file_path, size })
    }

    pub async fn get_manifest(&self, digest: &str) -> Result<Manifest> {
        let file_path = self.path_for(digest)?;
        let bytes = match self.storage.read(&file_path).await {
            Ok(bytes) => bytes,
            Err(err) if err.is_not_found() => {
                return Err(CacheError::NotFound(digest.to_string()))
            }
            Err(err) => return Err(err),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Returns whether a payload was present.
    pub async fn delete_manifest(&self, digest: &str) -> Result<bool> {
        self.storage.remove(&self.path_for(digest)?).await
    }
}
