//! Cache Module
//!
//! Bounded OCI content cache: durable index, TTL expiry, composite eviction,
//! metrics, and the coordinator that ties them together.

mod coordinator;
mod entry;
mod eviction;
mod index;
mod metrics;


// Re-export public types
pub use coordinator::{manifest_key, Coordinator, MaintenanceReport, PutOptions, Stats};
pub(crate) use coordinator::Shared;
pub use entry::{ttl_elapsed, Entry, PINNED_METADATA_KEY};
pub use eviction::{CompositeEviction, EvictionStrategy, LruEviction, SizeEviction};
pub use index::{Index, IndexEntry, IndexStats};
pub use metrics::Metrics;

// == Public Constants ==
/// Index file name under the cache root
pub const INDEX_FILE_NAME: &str = "index.db";

/// Tag table file name under the cache root
pub const TAGS_FILE_NAME: &str = "tags.json";

/// Key prefix separating manifests from raw blob digests in the index
pub const MANIFEST_KEY_PREFIX: &str = "manifest:";
