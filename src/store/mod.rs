//! Store Module
//!
//! Thin adapters over a shared key-value store with TTL, conditional-set and
//! set-collection primitives. Adapters never retry; every failure surfaces as a
//! [`StoreError`] and the caller decides how to degrade.

mod entry;
mod memory;
mod pattern;
mod redis_store;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{StoreError, StoreResult};

pub use entry::{current_timestamp_ms, StoreEntry};
pub use memory::MemoryStore;
pub use pattern::glob_match;
pub use redis_store::{spawn_invalidation_bridge, RedisStore};

// == Store Trait ==
/// Contract every backing store implements.
///
/// Keys passed here are already namespaced. TTLs are whole seconds.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// A name for logs and health output, e.g. "redis" or "memory".
    fn name(&self) -> &'static str;

    /// Returns the payload stored under `key`, `None` on a miss.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()>;

    /// Stores `token` only if `key` is absent. Returns whether the write happened.
    async fn set_if_absent(&self, key: &str, token: &str, ttl_secs: u64) -> StoreResult<bool>;

    /// Deletes `key` only while it still holds `token`. Returns whether it was deleted.
    async fn delete_if_equals(&self, key: &str, token: &str) -> StoreResult<bool>;

    /// Deletes every listed key, returning how many existed.
    async fn delete(&self, keys: &[String]) -> StoreResult<u64>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Sets the TTL of an existing key. Returns false when the key is absent.
    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool>;

    /// Remaining TTL in seconds: `-2` when absent, `-1` when the key has no expiry.
    async fn ttl_remaining(&self, key: &str) -> StoreResult<i64>;

    /// Every key matching a glob `pattern`. Pagination stays inside the adapter.
    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>>;

    async fn add_member(&self, set_key: &str, member: &str) -> StoreResult<()>;

    async fn members(&self, set_key: &str) -> StoreResult<Vec<String>>;

    async fn remove_member(&self, set_key: &str, member: &str) -> StoreResult<()>;

    /// Round trip used by health checks.
    async fn ping(&self) -> StoreResult<()>;
}

// == Connect ==
/// Builds the store described by `config`.
///
/// Without `REDIS_URL` the in-process [`MemoryStore`] is used. An unreachable
/// Redis is not fatal: the pool reconnects lazily and the cache fails open
/// until it comes back. Only a malformed URL is an error.
pub async fn connect(config: &Config) -> StoreResult<Arc<dyn KvStore>> {
    let Some(url) = config.redis_url.as_deref() else {
        info!("REDIS_URL not set, using in-process store");
        return Ok(Arc::new(MemoryStore::new()));
    };

    let store = RedisStore::connect(
        url,
        config.redis_pool_size,
        config.connect_timeout(),
        config.command_timeout(),
    )?;

    match store.ping().await {
        Ok(()) => info!(url = %url, "Connected to Redis"),
        Err(e) => warn!(
            url = %url,
            error = %e,
            "Redis not reachable yet, cache will fail open until it is"
        ),
    }

    Ok(Arc::new(store))
}

pub(crate) fn wrong_type(key: &str) -> StoreError {
    StoreError::Unavailable(format!(
        "WRONGTYPE operation against key '{}' holding the wrong kind of value",
        key
    ))
}
