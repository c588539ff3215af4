//! Cache Coordinator Module
//!
//! Orchestrates the manifest/blob/tag collaborators, the durable index, the
//! eviction strategy and the metrics, and owns the background maintenance task.
//!
//! Per-key lifecycle: absent → fresh (put) → stale (TTL elapsed, still
//! indexed) → absent (maintenance, delete or clear). Reads refresh recency
//! but never staleness: TTL is anchored to creation time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs::File;
use tokio::io::AsyncRead;
use tokio::sync::{watch, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{
    CompositeEviction, Entry, EvictionStrategy, Index, IndexEntry, Metrics, INDEX_FILE_NAME,
    MANIFEST_KEY_PREFIX, TAGS_FILE_NAME,
};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::storage::{
    BlobCache, Manifest, ManifestCache, Storage, StoredPayload, TagCache, BLOBS_DIR, MANIFESTS_DIR,
};
use crate::tasks::spawn_maintenance_task;

/// How long `close` waits for the maintenance task before aborting it.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Index key of a manifest digest.
pub fn manifest_key(digest: &str) -> String {
    format!("{MANIFEST_KEY_PREFIX}{digest}")
}

// == Stats ==
/// Aggregate cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub total_size: u64,
    pub max_size: u64,
    pub hit_rate: f64,
    pub evictions: u64,
    pub errors: u64,
    pub last_compaction: Option<DateTime<Utc>>,
    pub average_access_count: f64,
}

// == Maintenance Report ==
/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    /// Entries removed because their TTL elapsed
    pub expired: usize,
    /// Entries removed under size pressure
    pub evicted: usize,
    /// Entries dropped by index compaction
    pub compacted: usize,
    /// Per-key or persistence failures that were skipped
    pub errors: usize,
    pub persisted: bool,
}

// == Put Options ==
/// Per-put settings applied when the entry is indexed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Exempt the entry from size-pressure eviction from the moment it is indexed
    pub pinned: bool,
}

/// Everything guarded by the coordinator lock. Index, eviction bookkeeping
/// and metrics always change together.
struct CacheState {
    index: Index,
    strategy: Box<dyn EvictionStrategy>,
    metrics: Metrics,
}

impl CacheState {
    fn insert(&mut self, entry: IndexEntry) {
        self.strategy.on_add(&Entry::from_index(&entry));
        let size = entry.size;
        if let Some(previous) = self.index.put(entry) {
            self.metrics.remove_bytes_stored(previous.size);
        }
        self.metrics.add_bytes_stored(size);
        self.metrics.set_entries_stored(self.index.len());
    }

    fn forget(&mut self, key: &str) -> Option<IndexEntry> {
        let removed = self.index.delete(key)?;
        self.strategy.on_remove(key);
        self.metrics.remove_bytes_stored(removed.size);
        self.metrics.set_entries_stored(self.index.len());
        Some(removed)
    }
}

// == Shared ==
/// State shared between the coordinator handle and its maintenance task.
pub(crate) struct Shared {
    config: Config,
    storage: Storage,
    manifests: ManifestCache,
    blobs: BlobCache,
    tags: TagCache,
    state: RwLock<CacheState>,
    /// Shared by puts from payload write to indexing; held exclusively by
    /// anything that removes payloads (maintenance, delete, clear, close)
    payload_gate: RwLock<()>,
    wake: Notify,
}

impl Shared {
    /// Signalled when a put pushes the cache over budget.
    pub(crate) fn wake(&self) -> &Notify {
        &self.wake
    }

    /// Indexes a freshly written payload. Callers hold `payload_gate` shared
    /// from before the write until this returns.
    async fn record_put(
        &self,
        key: String,
        stored: StoredPayload,
        ttl: Duration,
        options: PutOptions,
    ) {
        let over_budget = {
            let mut state = self.state.write().await;
            let mut entry = IndexEntry::new(key, stored.size, ttl, stored.file_path);
            entry.pinned = options.pinned;
            if let Some(previous) = state.index.get(&entry.key) {
                entry.pinned |= previous.pinned;
            }
            state.insert(entry);
            state.index.total_size() > self.config.max_size_bytes
        };
        if over_budget {
            self.wake.notify_one();
        }
    }

    /// Counts a hit and refreshes access tracking. A payload that is on disk
    /// but missing from the index (lost index) is adopted back with its real size.
    async fn record_hit(&self, key: &str, file_path: PathBuf, ttl: Duration) {
        let indexed = self.state.read().await.index.contains(key);
        let adopt_size = if indexed {
            None
        } else {
            self.storage.size(&file_path).await.ok()
        };

        let mut state = self.state.write().await;
        if !state.index.contains(key) {
            if let Some(size) = adopt_size {
                debug!(key, size, "re-indexing unindexed payload");
                state.insert(IndexEntry::new(key, size, ttl, file_path));
            }
        }
        if let Some(touched) = state.index.touch(key, Utc::now()) {
            state.strategy.on_access(&Entry::from_index(&touched));
        }
        state.metrics.record_hit();
    }

    async fn record_miss(&self) {
        self.state.write().await.metrics.record_miss();
    }

    async fn record_error(&self) {
        self.state.write().await.metrics.record_error();
    }

    /// Removes the payload, then the index entry. The entry stays indexed
    /// if the payload could not be removed.
    async fn release(&self, state: &mut CacheState, key: &str) -> Result<bool> {
        let Some(entry) = state.index.get(key) else {
            return Ok(false);
        };
        self.storage.remove(&entry.file_path).await?;
        state.forget(key);
        Ok(true)
    }

    /// Drops `key` from the index once `remove_payload` succeeded. Either side
    /// being present counts as a successful delete.
    async fn delete_key<F>(&self, key: &str, remove_payload: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<bool>>,
    {
        let _gate = self.payload_gate.write().await;
        let mut state = self.state.write().await;
        let removed = remove_payload.await?;
        let forgotten = state.forget(key).is_some();
        if removed || forgotten {
            debug!(key, "entry deleted");
            Ok(())
        } else {
            Err(CacheError::NotFound(key.to_string()))
        }
    }

    // == Maintenance ==
    /// One pass: expire, evict under size pressure, compact, persist.
    ///
    /// Failures on individual keys are counted and skipped. Passes never overlap.
    pub(crate) async fn run_maintenance(&self) -> MaintenanceReport {
        let _gate = self.payload_gate.write().await;
        let mut report = MaintenanceReport::default();
        let mut state = self.state.write().await;

        let expired = state.index.expired_keys();
        for key in expired {
            match self.release(&mut state, &key).await {
                Ok(true) => {
                    state.metrics.record_eviction();
                    report.expired += 1;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(key = %key, error = %err, "failed to expire entry");
                    state.metrics.record_error();
                    report.errors += 1;
                }
            }
        }

        if state.index.total_size() > self.config.max_size_bytes {
            let population: HashMap<String, Entry> = state
                .index
                .entries()
                .map(|entry| (entry.key.clone(), Entry::from_index(entry)))
                .collect();
            let victims = state.strategy.select_for_eviction(&population);
            if victims.is_empty() {
                debug!(
                    total_size = state.index.total_size(),
                    "over budget but nothing is evictable"
                );
            }
            for key in victims {
                match self.release(&mut state, &key).await {
                    Ok(true) => {
                        state.metrics.record_eviction();
                        report.evicted += 1;
                    }
                    Ok(false) => {}
                    Err(err) => {
                        warn!(key = %key, error = %err, "failed to evict entry");
                        state.metrics.record_error();
                        report.errors += 1;
                    }
                }
            }
        }

        // Compaction drops index entries first; one whose payload cannot be
        // removed goes back in, untouched.
        let compacted = state.index.cleanup(false);
        for entry in compacted {
            match self.storage.remove(&entry.file_path).await {
                Ok(_) => {
                    state.strategy.on_remove(&entry.key);
                    state.metrics.remove_bytes_stored(entry.size);
                    state.metrics.record_eviction();
                    report.compacted += 1;
                }
                Err(err) => {
                    warn!(key = %entry.key, error = %err, "failed to release compacted payload");
                    state.index.put(entry);
                    state.metrics.record_error();
                    report.errors += 1;
                }
            }
        }
        let entries = state.index.len();
        state.metrics.set_entries_stored(entries);

        match state.index.persist().await {
            Ok(()) => report.persisted = true,
            Err(err) => {
                warn!(error = %err, "failed to persist index");
                state.metrics.record_error();
                report.errors += 1;
            }
        }

        report
    }
}

// == Coordinator ==
/// Entry point of the cache. Cheap to share behind an `Arc`.
pub struct Coordinator {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Coordinator {
    // == Constructor ==
    /// Validates `config`, loads the index under `storage_root`, wires the
    /// default eviction strategy and starts background maintenance.
    pub async fn open(config: Config, storage_root: impl Into<PathBuf>) -> Result<Self> {
        Self::start(config, storage_root.into(), None).await
    }

    /// Like [`Coordinator::open`], but maintenance also stops once
    /// `lifecycle` turns true or its sender is dropped.
    pub async fn open_with_lifecycle(
        config: Config,
        storage_root: impl Into<PathBuf>,
        lifecycle: watch::Receiver<bool>,
    ) -> Result<Self> {
        Self::start(config, storage_root.into(), Some(lifecycle)).await
    }

    async fn start(
        mut config: Config,
        storage_root: PathBuf,
        lifecycle: Option<watch::Receiver<bool>>,
    ) -> Result<Self> {
        config.set_defaults();
        config.validate()?;

        let storage = Storage::open(storage_root).await?;
        let mut index = Index::new(storage.resolve(INDEX_FILE_NAME), config.compaction_threshold);
        index.load().await?;

        // Metadata must never point at payloads that are gone
        let mut live: Vec<IndexEntry> = Vec::with_capacity(index.len());
        for entry in index.entries().cloned().collect::<Vec<_>>() {
            if storage.exists(&entry.file_path).await {
                live.push(entry);
            } else {
                warn!(key = %entry.key, "payload missing, dropping index entry");
                index.delete(&entry.key);
            }
        }

        let mut strategy: Box<dyn EvictionStrategy> =
            Box::new(CompositeEviction::for_budget(config.max_size_bytes));
        live.sort_by(|a, b| a.accessed_at.cmp(&b.accessed_at));
        for entry in &live {
            strategy.on_add(&Entry::from_index(entry));
        }

        let mut metrics = Metrics::new();
        metrics.add_bytes_stored(index.total_size());
        metrics.set_entries_stored(index.len());

        let tags = TagCache::load(
            storage.resolve(TAGS_FILE_NAME),
            config.default_ttl,
            config.tag_history_limit,
        )
        .await?;

        info!(
            root = %storage.root().display(),
            max_size_bytes = config.max_size_bytes,
            entries = index.len(),
            total_size = index.total_size(),
            "cache opened"
        );

        let interval = config.maintenance_interval;
        let shared = Arc::new(Shared {
            manifests: ManifestCache::new(storage.clone()),
            blobs: BlobCache::new(storage.clone()),
            storage,
            tags,
            config,
            state: RwLock::new(CacheState {
                index,
                strategy,
                metrics,
            }),
            payload_gate: RwLock::new(()),
            wake: Notify::new(),
        });

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = spawn_maintenance_task(shared.clone(), interval, shutdown_rx, lifecycle);

        Ok(Self {
            shared,
            shutdown,
            task: Mutex::new(Some(handle)),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(CacheError::Closed)
        } else {
            Ok(())
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // == Manifests ==
    /// Stores a manifest, indexing it only after the payload write succeeded.
    pub async fn put_manifest(&self, digest: &str, manifest: &Manifest) -> Result<()> {
        self.put_manifest_with(digest, manifest, PutOptions::default()).await
    }

    pub async fn put_manifest_with(
        &self,
        digest: &str,
        manifest: &Manifest,
        options: PutOptions,
    ) -> Result<()> {
        self.ensure_open()?;
        let _gate = self.shared.payload_gate.read().await;
        let stored = match self.shared.manifests.put_manifest(digest, manifest).await {
            Ok(stored) => stored,
            Err(err) => {
                self.shared.record_error().await;
                return Err(err);
            }
        };
        debug!(digest, size = stored.size, "manifest stored");
        let ttl = self.shared.config.default_ttl;
        self.shared
            .record_put(manifest_key(digest), stored, ttl, options)
            .await;
        Ok(())
    }

    /// Reads a manifest. Failures count as misses and are returned unchanged.
    pub async fn get_manifest(&self, digest: &str) -> Result<Manifest> {
        match self.shared.manifests.get_manifest(digest).await {
            Ok(manifest) => {
                let file_path = self.shared.manifests.path_for(digest)?;
                let ttl = self.shared.config.default_ttl;
                self.shared.record_hit(&manifest_key(digest), file_path, ttl).await;
                Ok(manifest)
            }
            Err(err) => {
                self.shared.record_miss().await;
                Err(err)
            }
        }
    }

    pub async fn delete_manifest(&self, digest: &str) -> Result<()> {
        self.ensure_open()?;
        let removal = self.shared.manifests.delete_manifest(digest);
        self.shared.delete_key(&manifest_key(digest), removal).await
    }

    // == Blobs ==
    /// Streams a blob into the cache and returns the number of bytes stored.
    pub async fn put_blob<R>(&self, digest: &str, reader: R) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        self.put_blob_with(digest, reader, PutOptions::default()).await
    }

    /// Like [`Coordinator::put_blob`], with per-put options such as pinning.
    pub async fn put_blob_with<R>(
        &self,
        digest: &str,
        mut reader: R,
        options: PutOptions,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        self.ensure_open()?;
        let _gate = self.shared.payload_gate.read().await;
        let stored = match self.shared.blobs.put_blob(digest, &mut reader).await {
            Ok(stored) => stored,
            Err(err) => {
                self.shared.record_error().await;
                return Err(err);
            }
        };
        let size = stored.size;
        debug!(digest, size, "blob stored");
        let ttl = self.shared.config.blob_ttl;
        self.shared
            .record_put(digest.to_string(), stored, ttl, options)
            .await;
        Ok(size)
    }

    /// Opens a cached blob for reading. Failures count as misses.
    pub async fn get_blob(&self, digest: &str) -> Result<File> {
        match self.shared.blobs.get_blob(digest).await {
            Ok(file) => {
                let file_path = self.shared.blobs.path_for(digest)?;
                let ttl = self.shared.config.blob_ttl;
                self.shared.record_hit(digest, file_path, ttl).await;
                Ok(file)
            }
            Err(err) => {
                self.shared.record_miss().await;
                Err(err)
            }
        }
    }

    pub async fn delete_blob(&self, digest: &str) -> Result<()> {
        self.ensure_open()?;
        let removal = self.shared.blobs.delete_blob(digest);
        self.shared.delete_key(digest, removal).await
    }

    // == Tags ==
    pub fn tags(&self) -> &TagCache {
        &self.shared.tags
    }

    // == Pinning ==
    /// Exempts an indexed key from (or returns it to) size-pressure eviction.
    /// Pinned entries still expire.
    pub async fn set_pinned(&self, key: &str, pinned: bool) -> Result<()> {
        self.ensure_open()?;
        if self.shared.state.write().await.index.set_pinned(key, pinned) {
            Ok(())
        } else {
            Err(CacheError::NotFound(key.to_string()))
        }
    }

    /// Snapshot of the index record for `key`.
    pub async fn index_entry(&self, key: &str) -> Option<IndexEntry> {
        self.shared.state.read().await.index.get(key)
    }

    // == Size ==
    /// Total indexed payload bytes.
    pub async fn size(&self) -> u64 {
        self.shared.state.read().await.index.total_size()
    }

    // == Clear ==
    /// Drops every entry, payload and tag mapping, then persists the empty index.
    pub async fn clear(&self) -> Result<()> {
        self.ensure_open()?;
        let _gate = self.shared.payload_gate.write().await;
        let mut state = self.shared.state.write().await;

        let removed = state.index.clear();
        for entry in &removed {
            state.strategy.on_remove(&entry.key);
        }
        let stored = state.metrics.bytes_stored;
        state.metrics.remove_bytes_stored(stored);
        state.metrics.set_entries_stored(0);

        for dir in [MANIFESTS_DIR, BLOBS_DIR] {
            if let Err(err) = self.shared.storage.remove_dir(Path::new(dir)).await {
                warn!(dir, error = %err, "failed to remove payload directory");
                state.metrics.record_error();
            }
        }
        state.index.persist().await?;
        drop(state);

        self.shared.tags.clear().await?;
        info!(entries = removed.len(), "cache cleared");
        Ok(())
    }

    // == Metrics & Stats ==
    pub async fn get_metrics(&self) -> Metrics {
        self.shared.state.read().await.metrics.clone()
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub async fn get_stats(&self) -> Stats {
        let state = self.shared.state.read().await;
        let index_stats = state.index.stats();
        Stats {
            total_entries: index_stats.total_entries,
            expired_entries: index_stats.expired_entries,
            total_size: index_stats.total_size,
            max_size: self.shared.config.max_size_bytes,
            hit_rate: state.metrics.hit_rate(),
            evictions: state.metrics.evictions,
            errors: state.metrics.errors,
            last_compaction: index_stats.last_compaction,
            average_access_count: index_stats.average_access_count,
        }
    }

    // == Maintenance ==
    /// Runs one maintenance pass now, serialized with the background task.
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport> {
        self.ensure_open()?;
        Ok(self.shared.run_maintenance().await)
    }

    // == Close ==
    /// Stops maintenance, waits for it to exit, then persists the index once.
    ///
    /// Idempotent: later calls return `Ok(())` without touching anything.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown.send_replace(true);

        if let Some(handle) = self.task.lock().await.take() {
            let abort = handle.abort_handle();
            match tokio::time::timeout(CLOSE_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "maintenance task ended abnormally"),
                Err(_) => {
                    warn!("maintenance task did not stop in time, aborting");
                    abort.abort();
                }
            }
        }

        let _gate = self.shared.payload_gate.write().await;
        self.shared.state.read().await.index.persist().await?;
        info!("cache closed");
        Ok(())
    }
}
