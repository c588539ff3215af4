//! Cache Maintenance Task
//!
//! Background task that periodically expires, evicts and compacts cache
//! entries, and persists the index.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::Shared;

/// Spawns the maintenance loop.
///
/// A pass runs every `interval` and whenever a put pushes the cache over
/// budget. The loop exits when `shutdown` turns true, or when `lifecycle`
/// turns true or loses its sender. A pass already running is finished first.
pub(crate) fn spawn_maintenance_task(
    shared: Arc<Shared>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut lifecycle: Option<watch::Receiver<bool>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs_f64(),
            "starting cache maintenance task"
        );

        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = signalled(&mut shutdown) => break,
                _ = cancelled(&mut lifecycle) => break,
                _ = ticker.tick() => {}
                _ = shared.wake().notified() => debug!("maintenance woken by size pressure"),
            }

            let report = shared.run_maintenance().await;
            if report.expired + report.evicted + report.compacted > 0 {
                info!(
                    expired = report.expired,
                    evicted = report.evicted,
                    compacted = report.compacted,
                    "maintenance pass finished"
                );
            } else {
                debug!("maintenance pass: nothing to remove");
            }
            if report.errors > 0 {
                warn!(errors = report.errors, "maintenance pass skipped failing entries");
            }
        }

        info!("cache maintenance task stopped");
    })
}

/// Resolves once the flag is true or the sender is gone.
async fn signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn cancelled(lifecycle: &mut Option<watch::Receiver<bool>>) {
    match lifecycle {
        Some(rx) => signalled(rx).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Coordinator;
    use crate::config::Config;
    use tempfile::TempDir;

    fn fast_config(max_size_bytes: u64, ttl: Duration) -> Config {
        let mut config = Config::new(max_size_bytes, ttl);
        config.blob_ttl = ttl;
        config.maintenance_interval = Duration::from_millis(30);
        config
    }

    #[tokio::test]
    async fn test_task_removes_expired_entries() {
        let dir = TempDir::new().unwrap();
        let cache = Coordinator::open(fast_config(1 << 20, Duration::from_millis(20)), dir.path())
            .await
            .unwrap();
        cache.put_blob("sha256:aa", &b"expire soon"[..]).await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(cache.index_entry("sha256:aa").await.is_none());
        assert_eq!(cache.size().await, 0);
        assert_eq!(cache.get_metrics().await.evictions, 1);
        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_task_preserves_fresh_entries() {
        let dir = TempDir::new().unwrap();
        let cache = Coordinator::open(fast_config(1 << 20, Duration::from_secs(3600)), dir.path())
            .await
            .unwrap();
        cache.put_blob("sha256:aa", &b"long lived"[..]).await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(cache.index_entry("sha256:aa").await.is_some());
        assert!(cache.get_stats().await.last_compaction.is_none());
        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_over_budget_put_wakes_task() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::new(50, Duration::from_secs(3600));
        config.maintenance_interval = Duration::from_secs(3600);
        let cache = Coordinator::open(config, dir.path()).await.unwrap();

        cache.put_blob("sha256:aa", &[0u8; 30][..]).await.unwrap();
        cache.put_blob("sha256:bb", &[0u8; 30][..]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(cache.size().await <= 50);
        assert_eq!(cache.get_metrics().await.evictions, 1);
        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_lifecycle_cancel_stops_task() {
        let dir = TempDir::new().unwrap();
        let (lifecycle, rx) = watch::channel(false);
        let cache = Coordinator::open_with_lifecycle(
            fast_config(1 << 20, Duration::from_millis(20)),
            dir.path(),
            rx,
        )
        .await
        .unwrap();

        lifecycle.send_replace(true);
        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.put_blob("sha256:aa", &b"stays"[..]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Stale, but nobody is left to remove it
        assert!(cache.index_entry("sha256:aa").await.is_some());
        assert_eq!(cache.get_stats().await.expired_entries, 1);
        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_lifecycle_sender_stops_task() {
        let dir = TempDir::new().unwrap();
        let (lifecycle, rx) = watch::channel(false);
        let cache = Coordinator::open_with_lifecycle(
            fast_config(1 << 20, Duration::from_millis(20)),
            dir.path(),
            rx,
        )
        .await
        .unwrap();

        drop(lifecycle);
        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.put_blob("sha256:aa", &b"stays"[..]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(cache.index_entry("sha256:aa").await.is_some());
        cache.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_signalled_on_flag_or_closed_sender() {
        let (tx, mut rx) = watch::channel(false);
        tx.send_replace(true);
        signalled(&mut rx).await;

        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        signalled(&mut rx).await;

        let mut none = None;
        let pending = tokio::time::timeout(Duration::from_millis(20), cancelled(&mut none)).await;
        assert!(pending.is_err());
    }
}
