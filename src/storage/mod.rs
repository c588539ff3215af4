//! Storage Module
//!
//! Payload collaborators of the coordinator: a filesystem store rooted at
//! the cache directory, plus the manifest, blob and tag caches built on it.

mod blob;
mod digest;
mod fs;
mod manifest;
mod tag;

use std::path::PathBuf;

pub use blob::BlobCache;
pub use digest::{digest_path, validate_digest};
pub use fs::{write_atomic, Storage};
pub use manifest::{Manifest, ManifestCache};
pub use tag::{TagCache, TagHistoryEntry, TagMapping};

/// Directory holding manifest payloads, relative to the cache root
pub const MANIFESTS_DIR: &str = "manifests";
/// Directory holding blob payloads, relative to the cache root
pub const BLOBS_DIR: &str = "blobs";

// == Stored Payload ==
/// Where a payload landed and how many bytes were written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPayload {
    /// Location relative to the cache root
    pub file_path: PathBuf,
    /// Exact byte count written to storage
    pub size: u64,
}
