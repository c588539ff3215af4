//! Cache Entry Module
//!
//! Transient representation of one cached item, used for eviction decisions
//! and freshly-put payloads.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::IndexEntry;

/// Metadata key marking an entry as exempt from eviction.
pub const PINNED_METADATA_KEY: &str = "pinned";

/// Fixed per-entry bookkeeping overhead used by [`Entry::size`].
const ENTRY_OVERHEAD_BYTES: usize = 128;

// == Entry ==
/// One cached item as seen by the eviction strategies.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Cache key ("manifest:<digest>" or a raw blob digest)
    pub key: String,
    /// Payload bytes; empty when the entry only carries bookkeeping
    pub data: Vec<u8>,
    /// Free-form string metadata
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
    /// Zero means the entry never expires
    pub ttl: Duration,
    pub access_count: u64,
    /// Authoritative payload size as recorded in the index
    pub stored_bytes: u64,
}

impl Entry {
    // == Constructor ==
    /// Creates a fresh entry holding `data`.
    pub fn new(key: impl Into<String>, data: Vec<u8>, ttl: Duration) -> Self {
        let now = Utc::now();
        let stored_bytes = data.len() as u64;
        Self {
            key: key.into(),
            data,
            metadata: HashMap::new(),
            created_at: now,
            accessed_at: now,
            ttl,
            access_count: 0,
            stored_bytes,
        }
    }

    /// Builds a bookkeeping-only entry (no payload) from its index record.
    pub fn from_index(index_entry: &IndexEntry) -> Self {
        let mut metadata = HashMap::new();
        if index_entry.pinned {
            metadata.insert(PINNED_METADATA_KEY.to_string(), "true".to_string());
        }
        Self {
            key: index_entry.key.clone(),
            data: Vec::new(),
            metadata,
            created_at: index_entry.created_at,
            accessed_at: index_entry.accessed_at,
            ttl: index_entry.ttl,
            access_count: index_entry.access_count,
            stored_bytes: index_entry.size,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has outlived its TTL.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Checks expiry against an explicit clock reading.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        ttl_elapsed(self.created_at, self.ttl, now)
    }

    /// Returns true when the entry must never be recommended for eviction.
    pub fn is_pinned(&self) -> bool {
        self.metadata
            .get(PINNED_METADATA_KEY)
            .is_some_and(|v| v == "true")
    }

    // == Size ==
    /// Approximate in-memory footprint in bytes.
    ///
    /// Not the authoritative payload size; see `stored_bytes` for that.
    pub fn size(&self) -> usize {
        let metadata: usize = self.metadata.iter().map(|(k, v)| k.len() + v.len()).sum();
        self.key.len() + self.data.len() + metadata + ENTRY_OVERHEAD_BYTES
    }
}

// == Utility Functions ==
/// Expiry rule shared by entries and index records.
///
/// A zero TTL never expires. Otherwise the entry is expired once strictly
/// more than `ttl` has passed since `created_at`. Clock readings earlier than
/// `created_at` count as not expired.
pub fn ttl_elapsed(created_at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    if ttl.is_zero() {
        return false;
    }
    match now.signed_duration_since(created_at).to_std() {
        Ok(age) => age > ttl,
        Err(_) => false,
    }
}
