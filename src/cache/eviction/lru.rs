//! LRU Eviction
//!
//! Orders keys by last access. Never decides on its own that eviction is
//! needed; it supplies ordering for whoever asks.

use std::collections::HashMap;

use super::{candidates, EvictionStrategy};
use crate::cache::Entry;

// == LRU Eviction ==
/// Recency-ordered eviction.
///
/// `accessed_at` is the primary ordering. A logical clock stamped on every
/// add/access breaks ties between entries touched within the same instant.
#[derive(Debug, Default)]
pub struct LruEviction {
    stamps: HashMap<String, u64>,
    clock: u64,
}

impl LruEviction {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    /// Logical recency stamp of a key; higher is more recent.
    pub fn recency(&self, key: &str) -> Option<u64> {
        self.stamps.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    fn stamp(&mut self, key: &str) {
        self.clock += 1;
        self.stamps.insert(key.to_string(), self.clock);
    }
}

impl EvictionStrategy for LruEviction {
    fn name(&self) -> &'static str {
        "lru"
    }

    fn on_add(&mut self, entry: &Entry) {
        self.stamp(&entry.key);
    }

    fn on_access(&mut self, entry: &Entry) {
        self.stamp(&entry.key);
    }

    fn on_remove(&mut self, key: &str) {
        self.stamps.remove(key);
    }

    fn select_for_eviction(&self, entries: &HashMap<String, Entry>) -> Vec<String> {
        let mut ordered: Vec<&Entry> = candidates(entries).collect();
        ordered.sort_by(|a, b| {
            a.accessed_at
                .cmp(&b.accessed_at)
                .then_with(|| self.recency(&a.key).unwrap_or(0).cmp(&self.recency(&b.key).unwrap_or(0)))
                .then_with(|| a.key.cmp(&b.key))
        });
        ordered.into_iter().map(|entry| entry.key.clone()).collect()
    }
}
