//! Cache Index Module
//!
//! Durable metadata registry mapping cache keys to payload descriptors.
//!
//! The index keeps running totals so that size queries never scan the map.
//! Mutation takes `&mut self`; callers share the index behind the
//! coordinator's lock, which gives one writer at a time and concurrent readers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::entry::ttl_elapsed;
use crate::error::Result;
use crate::storage::write_atomic;

/// On-disk format version of the index file.
const INDEX_FORMAT_VERSION: u32 = 1;

// == Index Entry ==
/// Durable record of one cached payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub key: String,
    /// Bytes written to storage; authoritative for size accounting
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
    /// Zero means the entry never expires
    pub ttl: Duration,
    pub access_count: u64,
    /// Payload location relative to the cache root
    pub file_path: PathBuf,
    /// Pinned entries are never selected for eviction
    #[serde(default)]
    pub pinned: bool,
}

impl IndexEntry {
    /// Creates a record for a payload written just now.
    pub fn new(key: impl Into<String>, size: u64, ttl: Duration, file_path: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            size,
            created_at: now,
            accessed_at: now,
            ttl,
            access_count: 0,
            file_path,
            pinned: false,
        }
    }

    /// Same TTL rule as [`crate::cache::Entry::is_expired_at`].
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        ttl_elapsed(self.created_at, self.ttl, now)
    }
}

// == Index Stats ==
/// Aggregate view over the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub total_size: u64,
    pub average_access_count: f64,
    pub last_compaction: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct PersistedIndexRef<'a> {
    version: u32,
    total_size: u64,
    last_compaction: Option<DateTime<Utc>>,
    entries: &'a HashMap<String, IndexEntry>,
}

#[derive(Deserialize)]
struct PersistedIndex {
    version: u32,
    #[serde(default)]
    total_size: u64,
    #[serde(default)]
    last_compaction: Option<DateTime<Utc>>,
    entries: HashMap<String, IndexEntry>,
}

// == Index ==
/// In-memory key → [`IndexEntry`] map backed by a single index file.
#[derive(Debug)]
pub struct Index {
    path: PathBuf,
    entries: HashMap<String, IndexEntry>,
    total_size: u64,
    total_access_count: u64,
    compaction_threshold: usize,
    last_compaction: Option<DateTime<Utc>>,
}

impl Index {
    // == Constructor ==
    /// Creates an empty index persisted at `path`.
    pub fn new(path: impl Into<PathBuf>, compaction_threshold: usize) -> Self {
        Self {
            path: path.into(),
            entries: HashMap::new(),
            total_size: 0,
            total_access_count: 0,
            compaction_threshold,
            last_compaction: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // == Load ==
    /// Replaces the in-memory map with the contents of the index file.
    ///
    /// A missing file yields an empty index. An unreadable or corrupt file
    /// is logged and also yields an empty index; payloads are untouched and
    /// will simply be fetched again.
    pub async fn load(&mut self) -> Result<()> {
        self.reset();

        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no index file, starting empty");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let persisted: PersistedIndex = match serde_json::from_slice(&bytes) {
            Ok(persisted) => persisted,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "corrupt index file, starting empty");
                return Ok(());
            }
        };

        if persisted.version != INDEX_FORMAT_VERSION {
            warn!(
                version = persisted.version,
                expected = INDEX_FORMAT_VERSION,
                "unsupported index version, starting empty"
            );
            return Ok(());
        }

        for (key, mut entry) in persisted.entries {
            entry.key = key.clone();
            self.total_size += entry.size;
            self.total_access_count += entry.access_count;
            self.entries.insert(key, entry);
        }
        self.last_compaction = persisted.last_compaction;

        if persisted.total_size != self.total_size {
            warn!(
                recorded = persisted.total_size,
                actual = self.total_size,
                "index size total drifted, using recomputed value"
            );
        }

        info!(
            entries = self.entries.len(),
            total_size = self.total_size,
            "index loaded"
        );
        Ok(())
    }

    // == Persist ==
    /// Writes the full map to the index file atomically.
    pub async fn persist(&self) -> Result<()> {
        let snapshot = PersistedIndexRef {
            version: INDEX_FORMAT_VERSION,
            total_size: self.total_size,
            last_compaction: self.last_compaction,
            entries: &self.entries,
        };
        let bytes = serde_json::to_vec(&snapshot)?;
        write_atomic(&self.path, &bytes).await?;
        debug!(entries = self.entries.len(), "index persisted");
        Ok(())
    }

    // == Get ==
    /// Returns a snapshot of the entry. Does not count as an access.
    pub fn get(&self, key: &str) -> Option<IndexEntry> {
        self.entries.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    // == Put ==
    /// Inserts or replaces an entry, returning the replaced one.
    pub fn put(&mut self, entry: IndexEntry) -> Option<IndexEntry> {
        self.total_size += entry.size;
        self.total_access_count += entry.access_count;
        let previous = self.entries.insert(entry.key.clone(), entry);
        if let Some(old) = &previous {
            self.forget_totals(old);
        }
        previous
    }

    // == Touch ==
    /// Records an access: bumps `accessed_at` and `access_count`.
    pub fn touch(&mut self, key: &str, now: DateTime<Utc>) -> Option<IndexEntry> {
        let entry = self.entries.get_mut(key)?;
        entry.accessed_at = now;
        entry.access_count += 1;
        self.total_access_count += 1;
        Some(entry.clone())
    }

    /// Marks an entry as exempt from (or eligible for) eviction.
    pub fn set_pinned(&mut self, key: &str, pinned: bool) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.pinned = pinned;
                true
            }
            None => false,
        }
    }

    // == Delete ==
    pub fn delete(&mut self, key: &str) -> Option<IndexEntry> {
        let removed = self.entries.remove(key)?;
        self.forget_totals(&removed);
        Some(removed)
    }

    /// Removes every entry, returning them.
    pub fn clear(&mut self) -> Vec<IndexEntry> {
        let removed = self.entries.drain().map(|(_, entry)| entry).collect();
        self.total_size = 0;
        self.total_access_count = 0;
        removed
    }

    // == Keys ==
    /// Returns all keys accepted by `filter`.
    pub fn keys<F>(&self, filter: F) -> Vec<String>
    where
        F: Fn(&str) -> bool,
    {
        self.entries
            .keys()
            .filter(|key| filter(key))
            .cloned()
            .collect()
    }

    /// Keys whose TTL has elapsed.
    pub fn expired_keys(&self) -> Vec<String> {
        self.expired_keys_at(Utc::now())
    }

    pub fn expired_keys_at(&self, now: DateTime<Utc>) -> Vec<String> {
        self.entries
            .values()
            .filter(|entry| entry.is_expired_at(now))
            .map(|entry| entry.key.clone())
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all entry sizes, from the running total.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    // == Stats ==
    /// Aggregate statistics. Totals come from running counters; only the
    /// expired count requires a pass over the entries.
    pub fn stats(&self) -> IndexStats {
        let total_entries = self.entries.len();
        let average_access_count = if total_entries == 0 {
            0.0
        } else {
            self.total_access_count as f64 / total_entries as f64
        };
        let now = Utc::now();

        IndexStats {
            total_entries,
            expired_entries: self.entries.values().filter(|e| e.is_expired_at(now)).count(),
            total_size: self.total_size,
            average_access_count,
            last_compaction: self.last_compaction,
        }
    }

    // == Cleanup ==
    /// Compacts the index when it has grown past the threshold, or always
    /// when `force` is set.
    ///
    /// Compaction drops expired entries and releases spare map capacity.
    /// The dropped entries are returned so their payloads can be released.
    pub fn cleanup(&mut self, force: bool) -> Vec<IndexEntry> {
        if !force && self.entries.len() <= self.compaction_threshold {
            return Vec::new();
        }

        let now = Utc::now();
        let removed: Vec<IndexEntry> = self
            .expired_keys_at(now)
            .into_iter()
            .filter_map(|key| self.delete(&key))
            .collect();
        self.entries.shrink_to_fit();
        self.last_compaction = Some(now);

        debug!(removed = removed.len(), remaining = self.entries.len(), "index compacted");
        removed
    }

    fn forget_totals(&mut self, entry: &IndexEntry) {
        self.total_size = self.total_size.saturating_sub(entry.size);
        self.total_access_count = self.total_access_count.saturating_sub(entry.access_count);
    }

    fn reset(&mut self) {
        self.entries.clear();
        self.total_size = 0;
        self.total_access_count = 0;
        self.last_compaction = None;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn entry(key: &str, size: u64) -> IndexEntry {
        IndexEntry::new(key, size, Duration::from_secs(3600), PathBuf::from(format!("blobs/{key}")))
    }

    fn expired_entry(key: &str, size: u64) -> IndexEntry {
        let mut e = entry(key, size);
        e.ttl = Duration::from_secs(1);
        e.created_at = Utc::now() - ChronoDuration::seconds(60);
        e
    }

    #[test]
    fn test_put_and_get() {
        let mut index = Index::new("index.db", 10);
        index.put(entry("a", 10));

        let got = index.get("a").unwrap();
        assert_eq!(got.size, 10);
        assert_eq!(index.total_size(), 10);
        assert!(index.get("missing").is_none());
    }

    #[test]
    fn test_get_returns_snapshot() {
        let mut index = Index::new("index.db", 10);
        index.put(entry("a", 10));

        let mut snapshot = index.get("a").unwrap();
        snapshot.access_count = 99;
        snapshot.size = 1;

        assert_eq!(index.get("a").unwrap().access_count, 0);
        assert_eq!(index.total_size(), 10);
    }

    #[test]
    fn test_put_replace_adjusts_total() {
        let mut index = Index::new("index.db", 10);
        index.put(entry("a", 10));
        index.put(entry("b", 5));
        let previous = index.put(entry("a", 3));

        assert_eq!(previous.unwrap().size, 10);
        assert_eq!(index.total_size(), 8);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_delete_updates_total() {
        let mut index = Index::new("index.db", 10);
        index.put(entry("a", 10));
        index.put(entry("b", 5));

        assert_eq!(index.delete("a").unwrap().size, 10);
        assert!(index.delete("a").is_none());
        assert_eq!(index.total_size(), 5);
    }

    #[test]
    fn test_touch_updates_access_tracking() {
        let mut index = Index::new("index.db", 10);
        index.put(entry("a", 10));
        let later = Utc::now() + ChronoDuration::seconds(5);

        let touched = index.touch("a", later).unwrap();
        assert_eq!(touched.access_count, 1);
        assert_eq!(touched.accessed_at, later);
        assert!(index.touch("missing", later).is_none());

        index.touch("a", later);
        assert_eq!(index.stats().average_access_count, 2.0);
    }

    #[test]
    fn test_keys_with_filter() {
        let mut index = Index::new("index.db", 10);
        index.put(entry("manifest:sha256:aa", 1));
        index.put(entry("sha256:bb", 1));

        let mut all = index.keys(|_| true);
        all.sort();
        assert_eq!(all, vec!["manifest:sha256:aa", "sha256:bb"]);
        assert_eq!(index.keys(|k| k.starts_with("manifest:")), vec!["manifest:sha256:aa"]);
    }

    #[test]
    fn test_expired_keys() {
        let mut index = Index::new("index.db", 10);
        index.put(entry("fresh", 1));
        index.put(expired_entry("stale", 1));
        let mut forever = expired_entry("forever", 1);
        forever.ttl = Duration::ZERO;
        index.put(forever);

        assert_eq!(index.expired_keys(), vec!["stale"]);
        assert_eq!(index.stats().expired_entries, 1);
    }

    #[test]
    fn test_stats_empty() {
        let index = Index::new("index.db", 10);
        let stats = index.stats();
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.total_size, 0);
        assert_eq!(stats.average_access_count, 0.0);
        assert!(stats.last_compaction.is_none());
    }

    #[test]
    fn test_cleanup_below_threshold_is_noop() {
        let mut index = Index::new("index.db", 10);
        index.put(expired_entry("stale", 4));

        assert!(index.cleanup(false).is_empty());
        assert_eq!(index.len(), 1);
        assert!(index.stats().last_compaction.is_none());
    }

    #[test]
    fn test_cleanup_forced_drops_expired() {
        let mut index = Index::new("index.db", 10);
        index.put(expired_entry("stale", 4));
        index.put(entry("fresh", 6));

        let removed = index.cleanup(true);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].key, "stale");
        assert_eq!(index.total_size(), 6);
        assert!(index.stats().last_compaction.is_some());
    }

    #[test]
    fn test_cleanup_over_threshold() {
        let mut index = Index::new("index.db", 2);
        index.put(entry("a", 1));
        index.put(entry("b", 1));
        index.put(expired_entry("c", 1));

        assert_eq!(index.cleanup(false).len(), 1);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut index = Index::new("index.db", 10);
        index.put(entry("a", 10));
        index.put(entry("b", 5));

        assert_eq!(index.clear().len(), 2);
        assert!(index.is_empty());
        assert_eq!(index.total_size(), 0);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut index = Index::new(dir.path().join("index.db"), 10);

        index.load().await.unwrap();
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_persist_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.db");

        let mut index = Index::new(&path, 10);
        index.put(entry("a", 10));
        index.put(entry("b", 32));
        index.touch("b", Utc::now());
        index.cleanup(true);
        index.persist().await.unwrap();

        let mut reloaded = Index::new(&path, 10);
        reloaded.load().await.unwrap();

        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.total_size(), 42);
        assert_eq!(reloaded.get("b").unwrap().access_count, 1);
        assert_eq!(reloaded.get("a"), index.get("a"));
        assert!(reloaded.stats().last_compaction.is_some());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.db");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let mut index = Index::new(&path, 10);
        index.put(entry("a", 10));
        index.load().await.unwrap();

        assert!(index.is_empty());
        assert_eq!(index.total_size(), 0);
    }
}
