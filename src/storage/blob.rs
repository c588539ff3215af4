//! Blob payload cache.

use std::path::PathBuf;

use tokio::fs::File;
use tokio::io::AsyncRead;

use super::{digest_path, Storage, StoredPayload, BLOBS_DIR};
use crate::error::{CacheError, Result};

// == Blob Cache ==
/// Streams blob payloads to and from `blobs/`.
#[derive(Debug, Clone)]
pub struct BlobCache {
    storage: Storage,
}

impl BlobCache {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn path_for(&self, digest: &str) -> Result<PathBuf> {
        digest_path(BLOBS_DIR, digest)
    }

    /// Copies `reader` to storage. The returned size is the byte count
    /// actually written.
    pub async fn put_blob<R>(&self, digest: &str, reader: &mut R) -> Result<StoredPayload>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let file_path = self.path_for(digest)?;
        let size = self.storage.write_stream(&file_path, reader).await?;
        Ok(StoredPayload { file_path, size })
    }

    /// Opens the blob for reading.
    pub async fn get_blob(&self, digest: &str) -> Result<File> {
        let file_path = self.path_for(digest)?;
        match self.storage.open_file(&file_path).await {
            Ok(file) => Ok(file),
            Err(err) if err.is_not_found() => Err(CacheError::NotFound(digest.to_string())),
            Err(err) => Err(err),
        }
    }

    /// Returns whether a payload was present.
    pub async fn delete_blob(&self, digest: &str) -> Result<bool> {
        self.storage.remove(&self.path_for(digest)?).await
    }
}
