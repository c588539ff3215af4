//! Composite Eviction
//!
//! Weighted list of strategies. Higher weight is consulted first; lower
//! weights supply extra candidates once the higher ones run out.

use std::collections::{HashMap, HashSet};

use super::{total_bytes, EvictionStrategy, LruEviction, SizeEviction};
use crate::cache::Entry;

/// Weight of the size-pressure strategy in the default composite.
pub const SIZE_WEIGHT: u32 = 2;
/// Weight of the LRU strategy in the default composite.
pub const LRU_WEIGHT: u32 = 1;

// == Composite Eviction ==
#[derive(Debug)]
pub struct CompositeEviction {
    /// Kept sorted by weight, highest first; insertion order among equals
    strategies: Vec<(Box<dyn EvictionStrategy>, u32)>,
    max_bytes: u64,
}

impl CompositeEviction {
    // == Constructor ==
    /// Creates an empty composite that stops selecting once the population
    /// fits in `max_bytes`.
    pub fn new(max_bytes: u64) -> Self {
        Self {
            strategies: Vec::new(),
            max_bytes,
        }
    }

    /// Size pressure (weight 2) ahead of LRU (weight 1).
    pub fn for_budget(max_bytes: u64) -> Self {
        Self::new(max_bytes)
            .with_strategy(Box::new(SizeEviction::new(max_bytes)), SIZE_WEIGHT)
            .with_strategy(Box::new(LruEviction::new()), LRU_WEIGHT)
    }

    /// Adds a strategy with the given priority weight.
    pub fn with_strategy(mut self, strategy: Box<dyn EvictionStrategy>, weight: u32) -> Self {
        let position = self
            .strategies
            .iter()
            .position(|(_, w)| *w < weight)
            .unwrap_or(self.strategies.len());
        self.strategies.insert(position, (strategy, weight));
        self
    }

    /// Strategy names in evaluation order.
    pub fn order(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|(s, _)| s.name()).collect()
    }
}

impl EvictionStrategy for CompositeEviction {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn on_add(&mut self, entry: &Entry) {
        for (strategy, _) in &mut self.strategies {
            strategy.on_add(entry);
        }
    }

    fn on_access(&mut self, entry: &Entry) {
        for (strategy, _) in &mut self.strategies {
            strategy.on_access(entry);
        }
    }

    fn on_remove(&mut self, key: &str) {
        for (strategy, _) in &mut self.strategies {
            strategy.on_remove(key);
        }
    }

    fn select_for_eviction(&self, entries: &HashMap<String, Entry>) -> Vec<String> {
        let total = total_bytes(entries);
        if total <= self.max_bytes {
            return Vec::new();
        }

        let mut remaining = total;
        let mut seen = HashSet::new();
        let mut selected = Vec::new();

        for (strategy, _) in &self.strategies {
            for key in strategy.select_for_eviction(entries) {
                let Some(entry) = entries.get(&key) else {
                    continue;
                };
                if !seen.insert(key.clone()) {
                    continue;
                }
                remaining = remaining.saturating_sub(entry.stored_bytes);
                selected.push(key);
                if remaining <= self.max_bytes {
                    return selected;
                }
            }
        }
        selected
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::time::Duration;

    fn sized(key: &str, bytes: u64, age_secs: i64) -> Entry {
        let mut entry = Entry::new(key, Vec::new(), Duration::ZERO);
        entry.stored_bytes = bytes;
        entry.accessed_at = Utc::now() - ChronoDuration::seconds(age_secs);
        entry
    }

    fn population(entries: Vec<Entry>) -> HashMap<String, Entry> {
        entries.into_iter().map(|e| (e.key.clone(), e)).collect()
    }

    #[test]
    fn test_default_order_puts_size_first() {
        let composite = CompositeEviction::for_budget(100);
        assert_eq!(composite.order(), vec!["size", "lru"]);
    }

    #[test]
    fn test_weight_order_independent_of_insertion() {
        let composite = CompositeEviction::new(100)
            .with_strategy(Box::new(LruEviction::new()), 1)
            .with_strategy(Box::new(SizeEviction::new(100)), 5);
        assert_eq!(composite.order(), vec!["size", "lru"]);
    }

    #[test]
    fn test_under_budget_selects_nothing() {
        let composite = CompositeEviction::for_budget(100);
        let entries = population(vec![sized("a", 50, 10), sized("b", 50, 5)]);

        assert!(composite.select_for_eviction(&entries).is_empty());
    }

    #[test]
    fn test_prefers_reclaiming_large_entries() {
        let composite = CompositeEviction::for_budget(100);
        // "old" is least recently used but small; "big" reclaims enough alone
        let entries = population(vec![
            sized("old", 10, 600),
            sized("big", 70, 10),
            sized("mid", 30, 20),
        ]);

        assert_eq!(composite.select_for_eviction(&entries), vec!["big"]);
    }

    #[test]
    fn test_lower_priority_supplies_more_candidates() {
        // Size strategy budgeted loosely so it stops early; the composite's
        // tighter budget pulls the rest from LRU.
        let composite = CompositeEviction::new(20)
            .with_strategy(Box::new(SizeEviction::new(60)), 2)
            .with_strategy(Box::new(LruEviction::new()), 1);
        let entries = population(vec![
            sized("a", 40, 1),
            sized("b", 30, 300),
            sized("c", 20, 100),
        ]);

        // size: 90 > 60, takes "a" (→50). Composite still over 20, LRU
        // supplies "b" (→20) and stops.
        assert_eq!(composite.select_for_eviction(&entries), vec!["a", "b"]);
    }

    #[test]
    fn test_deduplicates_across_strategies() {
        let composite = CompositeEviction::new(0)
            .with_strategy(Box::new(SizeEviction::new(0)), 2)
            .with_strategy(Box::new(LruEviction::new()), 1);
        let entries = population(vec![sized("a", 10, 5), sized("b", 20, 50)]);

        let selected = composite.select_for_eviction(&entries);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected, vec!["b", "a"]);
    }

    #[test]
    fn test_nothing_evictable_returns_empty() {
        let composite = CompositeEviction::for_budget(10);
        let mut pinned = sized("pinned", 100, 5);
        pinned
            .metadata
            .insert(crate::cache::PINNED_METADATA_KEY.to_string(), "true".to_string());

        assert!(composite.select_for_eviction(&population(vec![pinned])).is_empty());
    }
}
