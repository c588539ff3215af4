//! Eviction Strategies
//!
//! Pluggable policies that recommend which keys to remove when the cache is
//! over its size budget.
//!
//! # Strategies
//! - [`LruEviction`]: least recently used first, threshold-agnostic
//! - [`SizeEviction`]: largest first, only once the budget is exceeded
//! - [`CompositeEviction`]: weighted list of the above, itself a strategy

mod composite;
mod lru;
mod size;

use std::collections::HashMap;
use std::fmt::Debug;

use crate::cache::Entry;

pub use composite::CompositeEviction;
pub use lru::LruEviction;
pub use size::SizeEviction;

// == Eviction Strategy ==
/// Capability shared by every eviction policy.
pub trait EvictionStrategy: Debug + Send + Sync {
    /// Short policy name used in logs.
    fn name(&self) -> &'static str;

    /// A new item was cached.
    fn on_add(&mut self, entry: &Entry);

    /// A cached item was read.
    fn on_access(&mut self, entry: &Entry);

    /// An item left the cache for any reason.
    fn on_remove(&mut self, key: &str);

    /// Returns keys recommended for removal, most evictable first.
    ///
    /// An empty result means the cache cannot shrink further; it is not an error.
    fn select_for_eviction(&self, entries: &HashMap<String, Entry>) -> Vec<String>;
}

/// Entries a strategy is allowed to recommend.
fn candidates(entries: &HashMap<String, Entry>) -> impl Iterator<Item = &Entry> {
    entries.values().filter(|entry| !entry.is_pinned())
}

/// Total authoritative size of the population, pinned entries included.
fn total_bytes(entries: &HashMap<String, Entry>) -> u64 {
    entries.values().map(|entry| entry.stored_bytes).sum()
}
