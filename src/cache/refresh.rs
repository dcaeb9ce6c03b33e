//! Refresh Queue Module
//!
//! Entries this process registered for background refresh. The queue is local
//! to the process: it is not persisted and other instances never see it.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tokio::sync::{RwLock, RwLockReadGuard};

use super::codec;

/// Produces a fresh encoded payload for one key.
pub type RefreshFactory =
    Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync>;

/// Wraps a typed async factory into a [`RefreshFactory`] that encodes its output.
pub fn refresh_factory<T, E, F, Fut>(factory: F) -> RefreshFactory
where
    T: Serialize + Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    Arc::new(move || {
        let pending = factory();
        async move {
            let value = pending.await.map_err(Into::<anyhow::Error>::into)?;
            Ok::<_, anyhow::Error>(codec::encode(&value)?)
        }
        .boxed()
    })
}

// == Refresh Entry ==
#[derive(Clone)]
pub struct RefreshEntry {
    pub key: String,
    /// Higher priorities are refreshed first
    pub priority: i64,
    pub factory: RefreshFactory,
}

impl fmt::Debug for RefreshEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshEntry")
            .field("key", &self.key)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Proof that a key was registered when taken. Removals wait until it drops.
pub struct Registration<'a> {
    _entries: RwLockReadGuard<'a, HashMap<String, RefreshEntry>>,
}

// == Refresh Queue ==
#[derive(Debug, Default)]
pub struct RefreshQueue {
    entries: RwLock<HashMap<String, RefreshEntry>>,
}

impl RefreshQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the registration for `entry.key`.
    pub async fn upsert(&self, entry: RefreshEntry) {
        self.entries.write().await.insert(entry.key.clone(), entry);
    }

    pub async fn remove(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    /// Pins the registration of `key` so `remove` blocks until the guard is
    /// dropped. `None` once the key is no longer registered.
    pub async fn hold(&self, key: &str) -> Option<Registration<'_>> {
        let entries = self.entries.read().await;
        if entries.contains_key(key) {
            Some(Registration { _entries: entries })
        } else {
            None
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Snapshot of at most `limit` entries, highest priority first.
    ///
    /// Ties are broken by key so the order is stable across ticks.
    pub async fn batch(&self, limit: usize) -> Vec<RefreshEntry> {
        let mut snapshot: Vec<RefreshEntry> =
            self.entries.read().await.values().cloned().collect();
        snapshot.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.key.cmp(&b.key))
        });
        snapshot.truncate(limit);
        snapshot
    }
}
