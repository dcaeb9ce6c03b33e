//! Store doubles for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{KvStore, MemoryStore};
use crate::error::{StoreError, StoreResult};

/// A store whose every command fails, as if Redis were down.
#[derive(Debug, Default)]
pub struct FailingStore;

fn down<T>() -> StoreResult<T> {
    Err(StoreError::Unavailable("connection refused".to_string()))
}

#[async_trait]
impl KvStore for FailingStore {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        down()
    }

    async fn set(&self, _key: &str, _value: &str, _ttl_secs: u64) -> StoreResult<()> {
        down()
    }

    async fn set_if_absent(&self, _key: &str, _token: &str, _ttl_secs: u64) -> StoreResult<bool> {
        down()
    }

    async fn delete_if_equals(&self, _key: &str, _token: &str) -> StoreResult<bool> {
        down()
    }

    async fn delete(&self, _keys: &[String]) -> StoreResult<u64> {
        down()
    }

    async fn exists(&self, _key: &str) -> StoreResult<bool> {
        down()
    }

    async fn expire(&self, _key: &str, _ttl_secs: u64) -> StoreResult<bool> {
        down()
    }

    async fn ttl_remaining(&self, _key: &str) -> StoreResult<i64> {
        down()
    }

    async fn scan(&self, _pattern: &str) -> StoreResult<Vec<String>> {
        down()
    }

    async fn add_member(&self, _set_key: &str, _member: &str) -> StoreResult<()> {
        down()
    }

    async fn members(&self, _set_key: &str) -> StoreResult<Vec<String>> {
        down()
    }

    async fn remove_member(&self, _set_key: &str, _member: &str) -> StoreResult<()> {
        down()
    }

    async fn ping(&self) -> StoreResult<()> {
        down()
    }
}

/// An in-process store that, once armed, parks the next `set` until released.
#[derive(Debug, Default)]
pub struct GatedStore {
    pub inner: MemoryStore,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl GatedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `set` will wait for [`GatedStore::release`].
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Resolves once the armed `set` is parked.
    pub async fn parked(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl KvStore for GatedStore {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.set(key, value, ttl_secs).await
    }

    async fn set_if_absent(&self, key: &str, token: &str, ttl_secs: u64) -> StoreResult<bool> {
        self.inner.set_if_absent(key, token, ttl_secs).await
    }

    async fn delete_if_equals(&self, key: &str, token: &str) -> StoreResult<bool> {
        self.inner.delete_if_equals(key, token).await
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        self.inner.delete(keys).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.inner.exists(key).await
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool> {
        self.inner.expire(key, ttl_secs).await
    }

    async fn ttl_remaining(&self, key: &str) -> StoreResult<i64> {
        self.inner.ttl_remaining(key).await
    }

    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.inner.scan(pattern).await
    }

    async fn add_member(&self, set_key: &str, member: &str) -> StoreResult<()> {
        self.inner.add_member(set_key, member).await
    }

    async fn members(&self, set_key: &str) -> StoreResult<Vec<String>> {
        self.inner.members(set_key).await
    }

    async fn remove_member(&self, set_key: &str, member: &str) -> StoreResult<()> {
        self.inner.remove_member(set_key, member).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }
}
