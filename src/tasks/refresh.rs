//! Background Refresh Scheduler
//!
//! Periodically regenerates registered entries whose remaining TTL has fallen
//! into the refresh window, so hot keys are rewritten before they expire.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::TaskHandle;
use crate::cache::{CacheClient, RefreshEntry};
use crate::config::Config;

/// Scheduler timing and batch bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefreshSettings {
    pub tick: Duration,
    pub batch_size: usize,
    /// Refresh once `remaining <= window_ratio * original_ttl`
    pub window_ratio: f64,
}

impl RefreshSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tick: config.refresh_tick().max(Duration::from_millis(1)),
            batch_size: config.refresh_batch_size.max(1),
            window_ratio: config.refresh_window_ratio,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub examined: usize,
    pub refreshed: usize,
    /// Entries whose key no longer exists; removed from the queue
    pub dropped: usize,
    pub failed: usize,
}

enum Outcome {
    Fresh,
    Refreshed,
    Dropped,
}

// == Scheduler ==
pub struct RefreshScheduler {
    client: CacheClient,
    settings: RefreshSettings,
    running: AtomicBool,
}

/// Clears the running flag even if a tick unwinds.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RefreshScheduler {
    pub fn new(client: CacheClient, settings: RefreshSettings) -> Self {
        Self {
            client,
            settings,
            running: AtomicBool::new(false),
        }
    }

    /// Runs one refresh pass over the highest-priority batch.
    ///
    /// Returns `None` without doing anything while another pass is running.
    pub async fn tick(&self) -> Option<RefreshReport> {
        if self.running.swap(true, Ordering::AcqRel) {
            debug!("refresh pass still running, skipping tick");
            return None;
        }
        let _guard = RunningGuard(&self.running);

        let batch = self
            .client
            .refresh_queue()
            .batch(self.settings.batch_size)
            .await;
        let mut report = RefreshReport {
            examined: batch.len(),
            ..RefreshReport::default()
        };

        for entry in &batch {
            match self.refresh_entry(entry).await {
                Ok(Outcome::Fresh) => {}
                Ok(Outcome::Refreshed) => report.refreshed += 1,
                Ok(Outcome::Dropped) => report.dropped += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(key = %entry.key, error = %e, "background refresh failed");
                }
            }
        }

        if report.refreshed + report.dropped + report.failed > 0 {
            info!(
                examined = report.examined,
                refreshed = report.refreshed,
                dropped = report.dropped,
                failed = report.failed,
                "refresh pass complete"
            );
        } else {
            debug!(examined = report.examined, "refresh pass: nothing due");
        }
        Some(report)
    }

    async fn refresh_entry(&self, entry: &RefreshEntry) -> anyhow::Result<Outcome> {
        let queue = self.client.refresh_queue();

        // -2 absent, -1 persisted without expiry: neither can be kept warm.
        let remaining = self.client.remaining_ttl(&entry.key).await?;
        if remaining < 0 {
            queue.remove(&entry.key).await;
            debug!(key = %entry.key, "refresh entry dropped, key gone");
            return Ok(Outcome::Dropped);
        }

        let original = match self.client.original_ttl(&entry.key).await? {
            Some(ttl) => ttl,
            None => self.client.default_ttl(),
        };
        if remaining as f64 > self.settings.window_ratio * original as f64 {
            return Ok(Outcome::Fresh);
        }

        let payload = (entry.factory)().await?;
        // Gone if deleted while the factory ran. Otherwise a concurrent delete
        // waits on the registration until the write lands, then removes it.
        let Some(_registered) = queue.hold(&entry.key).await else {
            return Ok(Outcome::Dropped);
        };
        self.client
            .write_refreshed(&entry.key, &payload, original)
            .await?;
        debug!(key = %entry.key, ttl = original, "entry refreshed");
        Ok(Outcome::Refreshed)
    }
}

/// Spawns the scheduler loop. The first pass runs one tick after start.
pub fn spawn_refresh_task(client: CacheClient, settings: RefreshSettings) -> TaskHandle {
    let scheduler = RefreshScheduler::new(client, settings);

    TaskHandle::spawn("refresh-scheduler", move |mut shutdown| async move {
        info!(
            tick_ms = settings.tick.as_millis() as u64,
            batch_size = settings.batch_size,
            "Starting background refresh scheduler"
        );

        let mut ticker = tokio::time::interval(settings.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // interval fires immediately; skip that one.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    scheduler.tick().await;
                }
            }
        }

        info!("Background refresh scheduler stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SetOptions;
    use crate::store::testing::GatedStore;
    use crate::store::{KvStore, MemoryStore};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tokio::sync::Notify;

    fn settings(window_ratio: f64) -> RefreshSettings {
        RefreshSettings {
            tick: Duration::from_millis(20),
            batch_size: 10,
            window_ratio,
        }
    }

    fn counting_options(ttl: u64, calls: Arc<AtomicUsize>) -> SetOptions {
        SetOptions::new().ttl(ttl).background_refresh(1, move || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok::<_, anyhow::Error>(format!("v{}", n))
            }
        })
    }

    #[tokio::test]
    async fn test_entry_in_window_is_refreshed() {
        let store = Arc::new(MemoryStore::new());
        let cache = CacheClient::new(store.clone(), &Config::default());
        let calls = Arc::new(AtomicUsize::new(0));
        cache
            .set("k", "v0", counting_options(100, calls.clone()))
            .await;

        // Ten seconds left of a hundred: inside the 0.9 window.
        store.expire_in_ms("cache:k", 10_000).await;

        let scheduler = RefreshScheduler::new(cache.clone(), settings(0.9));
        let report = scheduler.tick().await.unwrap();

        assert_eq!(report.refreshed, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get::<String>("k").await.as_deref(), Some("v1"));
        let ttl = store.ttl_remaining("cache:k").await.unwrap();
        assert!((99..=100).contains(&ttl));
    }

    #[tokio::test]
    async fn test_fresh_entry_is_left_alone() {
        let store = Arc::new(MemoryStore::new());
        let cache = CacheClient::new(store.clone(), &Config::default());
        let calls = Arc::new(AtomicUsize::new(0));
        cache
            .set("k", "v0", counting_options(100, calls.clone()))
            .await;

        let scheduler = RefreshScheduler::new(cache.clone(), settings(0.5));
        let report = scheduler.tick().await.unwrap();

        assert_eq!(report.examined, 1);
        assert_eq!(report.refreshed, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.get::<String>("k").await.as_deref(), Some("v0"));
    }

    #[tokio::test]
    async fn test_missing_key_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        let cache = CacheClient::new(store.clone(), &Config::default());
        let calls = Arc::new(AtomicUsize::new(0));
        cache
            .set("k", "v0", counting_options(100, calls.clone()))
            .await;
        // Expired behind the client's back.
        store.delete(&["cache:k".to_string()]).await.unwrap();

        let scheduler = RefreshScheduler::new(cache.clone(), settings(0.9));
        let report = scheduler.tick().await.unwrap();

        assert_eq!(report.dropped, 1);
        assert!(cache.refresh_queue().is_empty().await);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_factory_failure_keeps_registration() {
        let store = Arc::new(MemoryStore::new());
        let cache = CacheClient::new(store.clone(), &Config::default());
        let opts = SetOptions::new()
            .ttl(100)
            .background_refresh(1, || async { Err::<String, _>(anyhow::anyhow!("upstream down")) });
        cache.set("k", "v0", opts).await;
        store.expire_in_ms("cache:k", 1_000).await;

        let scheduler = RefreshScheduler::new(cache.clone(), settings(0.9));
        let report = scheduler.tick().await.unwrap();

        assert_eq!(report.failed, 1);
        assert!(cache.refresh_queue().contains("k").await);
        assert_eq!(cache.get::<String>("k").await.as_deref(), Some("v0"));
    }

    #[tokio::test]
    async fn test_delete_during_factory_is_not_undone() {
        let store = Arc::new(MemoryStore::new());
        let cache = CacheClient::new(store.clone(), &Config::default());
        let started = Arc::new(Notify::new());
        let proceed = Arc::new(Notify::new());
        let opts = {
            let (started, proceed) = (started.clone(), proceed.clone());
            SetOptions::new().ttl(100).background_refresh(1, move || {
                let (started, proceed) = (started.clone(), proceed.clone());
                async move {
                    started.notify_one();
                    proceed.notified().await;
                    Ok::<_, anyhow::Error>("v1")
                }
            })
        };
        cache.set("k", "v0", opts).await;
        store.expire_in_ms("cache:k", 1_000).await;

        let scheduler = Arc::new(RefreshScheduler::new(cache.clone(), settings(0.9)));
        let tick = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.tick().await })
        };
        started.notified().await;
        assert!(cache.delete("k").await);
        proceed.notify_one();

        let report = tick.await.unwrap().unwrap();
        assert_eq!(report.dropped, 1);
        assert!(!cache.has("k").await);
        assert!(!store.exists("cache:k:originalTtl").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_during_refresh_write_wins() {
        let store = Arc::new(GatedStore::new());
        let cache = CacheClient::new(store.clone(), &Config::default());
        let calls = Arc::new(AtomicUsize::new(0));
        cache
            .set("k", "v0", counting_options(100, calls.clone()))
            .await;
        store.inner.expire_in_ms("cache:k", 1_000).await;

        store.arm();
        let scheduler = Arc::new(RefreshScheduler::new(cache.clone(), settings(0.9)));
        let tick = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.tick().await })
        };
        store.parked().await;

        let delete = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.delete("k").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!delete.is_finished());

        store.release();
        assert_eq!(tick.await.unwrap().unwrap().refreshed, 1);
        assert!(delete.await.unwrap());

        assert!(!cache.has("k").await);
        assert!(!store.exists("cache:k:originalTtl").await.unwrap());
        assert!(cache.refresh_queue().is_empty().await);
    }

    #[tokio::test]
    async fn test_batch_size_bounds_a_tick() {
        let store = Arc::new(MemoryStore::new());
        let cache = CacheClient::new(store.clone(), &Config::default());
        let calls = Arc::new(AtomicUsize::new(0));
        for i in 0..5 {
            cache
                .set(&format!("k{}", i), "v0", counting_options(100, calls.clone()))
                .await;
        }

        let scheduler = RefreshScheduler::new(
            cache.clone(),
            RefreshSettings {
                batch_size: 2,
                ..settings(1.0)
            },
        );
        let report = scheduler.tick().await.unwrap();

        assert_eq!(report.examined, 2);
        assert_eq!(report.refreshed, 2);
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let cache = CacheClient::new(Arc::new(MemoryStore::new()), &Config::default());
        let scheduler = RefreshScheduler::new(cache, settings(0.9));

        scheduler.running.store(true, Ordering::SeqCst);
        assert!(scheduler.tick().await.is_none());

        scheduler.running.store(false, Ordering::SeqCst);
        assert_eq!(scheduler.tick().await, Some(RefreshReport::default()));
    }

    #[tokio::test]
    async fn test_spawned_scheduler_refreshes_and_stops() {
        let store = Arc::new(MemoryStore::new());
        let cache = CacheClient::new(store.clone(), &Config::default());
        let calls = Arc::new(AtomicUsize::new(0));
        cache
            .set("k", "v0", counting_options(100, calls.clone()))
            .await;

        let handle = spawn_refresh_task(cache.clone(), settings(1.0));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.shutdown().await;

        assert!(calls.load(Ordering::SeqCst) >= 1);
        assert_ne!(cache.get::<String>("k").await.as_deref(), Some("v0"));
    }
}
