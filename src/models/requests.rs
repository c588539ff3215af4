//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies. Blob uploads are
//! raw bodies and have no DTO.

use serde::Deserialize;

use crate::storage::Manifest;

/// Request body for PUT /manifests/:digest
#[derive(Debug, Clone, Deserialize)]
pub struct PutManifestRequest {
    /// Manifest media type, e.g. `application/vnd.oci.image.manifest.v1+json`
    pub media_type: String,
    /// Manifest document, stored verbatim
    pub content: String,
}

impl PutManifestRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.media_type.trim().is_empty() {
            return Some("media_type cannot be empty".to_string());
        }
        if self.content.is_empty() {
            return Some("content cannot be empty".to_string());
        }
        None
    }

    pub fn into_manifest(self) -> Manifest {
        Manifest::new(self.media_type, self.content)
    }
}

/// Request body for PUT /tags/:reference
#[derive(Debug, Clone, Deserialize)]
pub struct PutTagRequest {
    /// Digest the tag should resolve to
    pub digest: String,
}

/// Query string for PUT /blobs/:digest and PUT /manifests/:digest
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PinQuery {
    /// Exempt the stored entry from size-pressure eviction
    #[serde(default)]
    pub pinned: bool,
}
