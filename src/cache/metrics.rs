//! Cache Metrics Module
//!
//! Hit/miss/eviction/error counters plus stored-bytes and stored-entries gauges.
//! Plain counters: synchronization is the owner's responsibility.

use serde::Serialize;

// == Metrics ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metrics {
    /// Successful payload reads
    pub hits: u64,
    /// Failed payload reads
    pub misses: u64,
    /// Entries removed by expiry or size pressure
    pub evictions: u64,
    /// Maintenance and bookkeeping failures
    pub errors: u64,
    /// Bytes currently held by indexed payloads
    pub bytes_stored: u64,
    /// Entries currently indexed
    pub entries_stored: u64,
}

impl Metrics {
    // == Constructor ==
    /// Creates a new Metrics with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    // == Gauges ==
    pub fn add_bytes_stored(&mut self, bytes: u64) {
        self.bytes_stored = self.bytes_stored.saturating_add(bytes);
    }

    /// Decreases the stored-bytes gauge, clamping at zero.
    pub fn remove_bytes_stored(&mut self, bytes: u64) {
        self.bytes_stored = self.bytes_stored.saturating_sub(bytes);
    }

    pub fn set_entries_stored(&mut self, count: usize) {
        self.entries_stored = count as u64;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.hits, 0);
        assert_eq!(metrics.misses, 0);
        assert_eq!(metrics.evictions, 0);
        assert_eq!(metrics.errors, 0);
        assert_eq!(metrics.bytes_stored, 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let metrics = Metrics::new();
        assert_eq!(metrics.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_all_hits() {
        let mut metrics = Metrics::new();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_hit();
        assert_eq!(metrics.hit_rate(), 1.0);
    }

    #[test]
    fn test_hit_rate_all_misses() {
        let mut metrics = Metrics::new();
        metrics.record_miss();
        metrics.record_miss();
        assert_eq!(metrics.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut metrics = Metrics::new();
        metrics.record_hit();
        metrics.record_miss();
        metrics.record_miss();
        metrics.record_miss();
        assert_eq!(metrics.hit_rate(), 0.25);
    }

    #[test]
    fn test_record_eviction_and_error() {
        let mut metrics = Metrics::new();
        metrics.record_eviction();
        metrics.record_eviction();
        metrics.record_error();
        assert_eq!(metrics.evictions, 2);
        assert_eq!(metrics.errors, 1);
    }

    #[test]
    fn test_bytes_stored_clamps_at_zero() {
        let mut metrics = Metrics::new();
        metrics.add_bytes_stored(10);
        metrics.remove_bytes_stored(4);
        assert_eq!(metrics.bytes_stored, 6);

        metrics.remove_bytes_stored(100);
        assert_eq!(metrics.bytes_stored, 0);
    }

    #[test]
    fn test_set_entries_stored() {
        let mut metrics = Metrics::new();
        metrics.set_entries_stored(42);
        assert_eq!(metrics.entries_stored, 42);
    }
}
