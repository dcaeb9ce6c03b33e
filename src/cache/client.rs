//! Cache Client Module
//!
//! The public face of the cache: basic operations, tag and pattern cascades,
//! statistics and events. Store and serialization failures are logged and
//! degraded to a miss or a no-op; none of them reaches the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::codec;
use super::events::{CacheEvent, InvalidationRequest};
use super::keys::KeyCodec;
use super::options::SetOptions;
use super::refresh::{RefreshEntry, RefreshQueue};
use super::stats::{CacheStats, StatsCollector};
use super::tags::TagIndex;
use super::ttl::TtlPolicy;
use crate::config::Config;
use crate::error::{CacheError, StoreResult};
use crate::store::KvStore;

/// Buffered events per subscriber before the slowest one starts lagging.
const EVENT_CAPACITY: usize = 256;

/// Keys per `DEL` when clearing the namespace.
const DELETE_BATCH: usize = 500;

// == Guard Settings ==
/// Timing of the regeneration lock used by `get_or_set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardSettings {
    /// Lock TTL in seconds
    pub lock_ttl: u64,
    /// Initial backoff and gap between polls
    pub lock_wait: Duration,
    /// Polls before regenerating locally
    pub poll_attempts: u32,
}

impl GuardSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            lock_ttl: config.lock_ttl.max(1),
            lock_wait: config.lock_wait(),
            poll_attempts: config.lock_poll_attempts,
        }
    }
}

// == Cache Client ==
/// Cache client for one namespace. Cloning is cheap and clones share state.
#[derive(Clone)]
pub struct CacheClient {
    pub(super) inner: Arc<ClientInner>,
}

pub(super) struct ClientInner {
    pub(super) store: Arc<dyn KvStore>,
    pub(super) keys: KeyCodec,
    pub(super) ttl: TtlPolicy,
    pub(super) guard: GuardSettings,
    pub(super) tags: TagIndex,
    pub(super) refresh: RefreshQueue,
    pub(super) stats: StatsCollector,
    pub(super) events: broadcast::Sender<CacheEvent>,
}

impl CacheClient {
    // == Constructor ==
    pub fn new(store: Arc<dyn KvStore>, config: &Config) -> Self {
        let keys = KeyCodec::new(&config.key_prefix);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(ClientInner {
                store,
                tags: TagIndex::new(keys.clone()),
                keys,
                ttl: TtlPolicy::new(config.default_ttl, config.stagger_ratio),
                guard: GuardSettings::from_config(config),
                refresh: RefreshQueue::new(),
                stats: StatsCollector::new(),
                events,
            }),
        }
    }

    // == Get ==
    /// Returns the cached value, or `None` on a miss, an unreadable payload
    /// or a store failure.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let started = Instant::now();
        let outcome = self.inner.store.get(&self.inner.keys.key(key)).await;
        self.inner.stats.record_get_latency(started.elapsed());

        let value = match outcome {
            Ok(Some(raw)) => match codec::decode(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    self.report(key, e.into());
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                self.report(key, e.into());
                None
            }
        };

        if value.is_some() {
            self.inner.stats.record_hit();
        } else {
            self.inner.stats.record_miss();
        }
        value
    }

    // == Set ==
    /// Stores `value` under `key`. Failures are logged and the write dropped.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, opts: SetOptions) {
        if KeyCodec::is_reserved(key) {
            self.report(key, CacheError::InvalidRequest(reserved_key_message(key)));
            return;
        }
        let payload = match codec::encode(value) {
            Ok(payload) => payload,
            Err(e) => {
                self.report(key, e.into());
                return;
            }
        };

        let ttl = self.inner.ttl.effective(opts.ttl, opts.staggered);
        let started = Instant::now();
        let written = self
            .inner
            .store
            .set(&self.inner.keys.key(key), &payload, ttl)
            .await;
        self.inner.stats.record_set_latency(started.elapsed());

        if let Err(e) = written {
            self.report(key, e.into());
            return;
        }

        if let Err(e) = self
            .inner
            .tags
            .associate(self.inner.store.as_ref(), key, &opts.tags, ttl)
            .await
        {
            self.report(key, e.into());
        }

        if let Some(refresh) = opts.refresh {
            let original_ttl = self.inner.ttl.nominal(opts.ttl).max(1);
            self.inner
                .refresh
                .upsert(RefreshEntry {
                    key: key.to_string(),
                    priority: refresh.priority,
                    factory: refresh.factory,
                })
                .await;
            if let Err(e) = self.write_original_ttl(key, original_ttl, ttl).await {
                self.report(key, e.into());
            }
        }

        self.emit(CacheEvent::Set {
            key: key.to_string(),
            ttl,
        });
    }

    // == Delete ==
    /// Removes `key`, its TTL sidecar, its refresh registration and its tag
    /// memberships. Returns whether the entry existed.
    pub async fn delete(&self, key: &str) -> bool {
        if KeyCodec::is_reserved(key) {
            self.report(key, CacheError::InvalidRequest(reserved_key_message(key)));
            return false;
        }
        let store = self.inner.store.as_ref();
        self.inner.refresh.remove(key).await;

        let targets = [
            self.inner.keys.key(key),
            self.inner.keys.original_ttl_key(key),
        ];
        let existed = match store.delete(&targets).await {
            Ok(removed) => removed > 0,
            Err(e) => {
                self.report(key, e.into());
                false
            }
        };

        if let Err(e) = self.inner.tags.remove_key(store, key).await {
            self.report(key, e.into());
            self.inner.tags.remove_key_locally(key).await;
        }

        self.emit(CacheEvent::Delete {
            key: key.to_string(),
        });
        existed
    }

    // == Has ==
    pub async fn has(&self, key: &str) -> bool {
        match self.inner.store.exists(&self.inner.keys.key(key)).await {
            Ok(exists) => exists,
            Err(e) => {
                self.report(key, e.into());
                false
            }
        }
    }

    // == Clear ==
    /// Removes everything under the namespace and forgets local tag and
    /// refresh state. Repeating it is harmless.
    pub async fn clear(&self) {
        let store = self.inner.store.as_ref();
        // Before the scan, so an in-flight refresh cannot rewrite a cleared key.
        self.inner.refresh.clear().await;
        match store.scan(&self.inner.keys.everything()).await {
            Ok(found) => {
                for chunk in found.chunks(DELETE_BATCH) {
                    if let Err(e) = store.delete(chunk).await {
                        self.report(self.inner.keys.namespace(), e.into());
                        break;
                    }
                }
            }
            Err(e) => self.report(self.inner.keys.namespace(), e.into()),
        }

        self.inner.tags.clear_local().await;
        self.emit(CacheEvent::Clear);
    }

    // == Delete By Tags ==
    /// Deletes every key carrying any of `tags`, then the tag sets
    /// themselves. Returns how many entries existed.
    pub async fn delete_by_tags(&self, tags: &[String]) -> usize {
        let store = self.inner.store.as_ref();
        let mut removed = 0;

        for tag in tags {
            for key in self.inner.tags.members(store, tag).await {
                if self.delete(&key).await {
                    removed += 1;
                }
            }
            if let Err(e) = self.inner.tags.forget_tag(store, tag).await {
                self.report(tag, e.into());
            }
        }

        self.emit(CacheEvent::DeleteByTags {
            tags: tags.to_vec(),
        });
        removed
    }

    // == Delete By Pattern ==
    /// Deletes every key whose logical name matches the glob `pattern`.
    ///
    /// Lock, tag and sidecar records are skipped; sidecars go with their key.
    pub async fn delete_by_pattern(&self, pattern: &str) -> usize {
        let found = match self
            .inner
            .store
            .scan(&self.inner.keys.pattern(pattern))
            .await
        {
            Ok(found) => found,
            Err(e) => {
                self.report(pattern, e.into());
                return 0;
            }
        };

        let mut removed = 0;
        for stored in &found {
            if self.inner.keys.is_auxiliary(stored) {
                continue;
            }
            if let Some(key) = self.inner.keys.strip(stored) {
                if self.delete(key).await {
                    removed += 1;
                }
            }
        }

        self.emit(CacheEvent::DeleteByPattern {
            pattern: pattern.to_string(),
        });
        removed
    }

    // == Invalidate ==
    /// Dispatches an invalidation request to `delete`, `delete_by_pattern`
    /// and `delete_by_tags` for each field present.
    pub async fn invalidate(&self, request: &InvalidationRequest) -> usize {
        if request.is_empty() {
            debug!("empty invalidation request ignored");
            return 0;
        }

        let mut removed = 0;
        if let Some(key) = &request.key {
            if self.delete(key).await {
                removed += 1;
            }
        }
        if let Some(pattern) = &request.pattern {
            removed += self.delete_by_pattern(pattern).await;
        }
        if let Some(tags) = &request.tags {
            removed += self.delete_by_tags(tags).await;
        }
        removed
    }

    // == Stats ==
    /// Snapshot of the counters. `size` comes from a full namespace scan,
    /// so this is O(n) in the number of stored keys.
    pub async fn stats(&self) -> CacheStats {
        let size = match self.inner.store.scan(&self.inner.keys.everything()).await {
            Ok(found) => found
                .iter()
                .filter(|stored| !self.inner.keys.is_auxiliary(stored))
                .count(),
            Err(e) => {
                self.report(self.inner.keys.namespace(), e.into());
                0
            }
        };
        self.inner.stats.snapshot(size)
    }

    /// Zeroes counters; cached entries are untouched.
    pub fn reset_stats(&self) {
        self.inner.stats.reset();
    }

    // == Events ==
    /// Receives every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    // == Health ==
    pub async fn is_available(&self) -> bool {
        self.inner.store.ping().await.is_ok()
    }

    pub fn store_name(&self) -> &'static str {
        self.inner.store.name()
    }

    // == Refresh Support ==
    pub fn refresh_queue(&self) -> &RefreshQueue {
        &self.inner.refresh
    }

    pub fn default_ttl(&self) -> u64 {
        self.inner.ttl.default_ttl
    }

    /// Remaining TTL of `key` in seconds; negative when absent.
    pub async fn remaining_ttl(&self, key: &str) -> StoreResult<i64> {
        self.inner
            .store
            .ttl_remaining(&self.inner.keys.key(key))
            .await
    }

    /// TTL recorded in the `<key>:originalTtl` sidecar, if any.
    pub async fn original_ttl(&self, key: &str) -> StoreResult<Option<u64>> {
        let raw = self
            .inner
            .store
            .get(&self.inner.keys.original_ttl_key(key))
            .await?;
        Ok(raw.and_then(|raw| raw.trim().parse().ok()))
    }

    /// Writes a regenerated payload and its sidecar, and extends its tag
    /// records to the new TTL. Unlike `set`, failures are returned so the
    /// scheduler can account for them.
    pub async fn write_refreshed(&self, key: &str, payload: &str, ttl: u64) -> StoreResult<()> {
        let ttl = ttl.max(1);
        self.inner
            .store
            .set(&self.inner.keys.key(key), payload, ttl)
            .await?;
        self.write_original_ttl(key, ttl, ttl).await?;
        self.inner
            .tags
            .touch(self.inner.store.as_ref(), key, ttl)
            .await?;
        self.emit(CacheEvent::Set {
            key: key.to_string(),
            ttl,
        });
        Ok(())
    }

    async fn write_original_ttl(&self, key: &str, original_ttl: u64, ttl: u64) -> StoreResult<()> {
        self.inner
            .store
            .set(
                &self.inner.keys.original_ttl_key(key),
                &original_ttl.to_string(),
                ttl,
            )
            .await
    }

    // == Reporting ==
    /// Logs a swallowed failure and publishes `cache.error`.
    pub(super) fn report(&self, key: &str, err: CacheError) {
        warn!(key = %key, error = %err, "cache operation degraded");
        self.emit(CacheEvent::Error {
            error: err.to_string(),
        });
    }

    pub(super) fn emit(&self, event: CacheEvent) {
        debug!(?event, "{}", event.name());
        // No subscribers is not an error.
        let _ = self.inner.events.send(event);
    }
}

fn reserved_key_message(key: &str) -> String {
    format!("Key '{}' collides with cache bookkeeping records", key)
}
