//! Size-pressure Eviction
//!
//! Engages only once the population exceeds the byte budget, then reclaims
//! the largest (and, among equals, coldest) entries first.

use std::collections::HashMap;

use super::{candidates, total_bytes, EvictionStrategy};
use crate::cache::Entry;

// == Size Eviction ==
#[derive(Debug, Clone)]
pub struct SizeEviction {
    max_bytes: u64,
}

impl SizeEviction {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }
}

impl EvictionStrategy for SizeEviction {
    fn name(&self) -> &'static str {
        "size"
    }

    fn on_add(&mut self, _entry: &Entry) {}

    fn on_access(&mut self, _entry: &Entry) {}

    fn on_remove(&mut self, _key: &str) {}

    /// Returns the shortest largest-first prefix that brings the population
    /// back under budget, or every candidate if that is not possible.
    fn select_for_eviction(&self, entries: &HashMap<String, Entry>) -> Vec<String> {
        let total = total_bytes(entries);
        if total <= self.max_bytes {
            return Vec::new();
        }

        let mut ordered: Vec<&Entry> = candidates(entries).collect();
        ordered.sort_by(|a, b| {
            b.stored_bytes
                .cmp(&a.stored_bytes)
                .then_with(|| a.accessed_at.cmp(&b.accessed_at))
                .then_with(|| a.key.cmp(&b.key))
        });

        let mut remaining = total;
        let mut selected = Vec::new();
        for entry in ordered {
            if remaining <= self.max_bytes {
                break;
            }
            remaining = remaining.saturating_sub(entry.stored_bytes);
            selected.push(entry.key.clone());
        }
        selected
    }
}
