//! In-Process Store Module
//!
//! A `KvStore` held entirely in process memory. It mirrors the Redis command
//! semantics the cache relies on (lazy TTL expiry, `SET NX`, sets, glob scan)
//! so a single instance can run without Redis and tests can run without I/O.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::entry::{current_timestamp_ms, expiry_after_ms, Slot, StoreEntry};
use super::{glob_match, wrong_type, KvStore};
use crate::error::StoreResult;

// == Memory Store ==
/// In-process store with Redis-compatible TTL and set semantics.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Key-value storage
    entries: RwLock<HashMap<String, StoreEntry>>,
}

impl MemoryStore {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Cleanup Expired ==
    /// Removes all expired entries, returning how many were dropped.
    pub async fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let now = current_timestamp_ms();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before - entries.len()
    }

    // == Length ==
    /// Number of live entries, including member sets.
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.values().filter(|e| !e.is_expired()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Entries held in memory, expired or not.
    pub async fn stored_len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Overwrites the expiry of an existing key. Used to simulate elapsed time.
    pub async fn expire_in_ms(&self, key: &str, ttl_ms: u64) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.expires_at = Some(expiry_after_ms(ttl_ms));
                true
            }
            _ => false,
        }
    }
}

/// Drops `key` if it has expired, mimicking Redis lazy expiry.
fn evict_if_expired(entries: &mut HashMap<String, StoreEntry>, key: &str) {
    if entries.get(key).is_some_and(StoreEntry::is_expired) {
        entries.remove(key);
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.write().await;
        evict_if_expired(&mut entries, key);

        match entries.get(key).map(|e| &e.slot) {
            Some(Slot::Value(value)) => Ok(Some(value.clone())),
            Some(Slot::Members(_)) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), StoreEntry::value(value.to_string(), ttl_secs));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, token: &str, ttl_secs: u64) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        evict_if_expired(&mut entries, key);

        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), StoreEntry::value(token.to_string(), ttl_secs));
        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, token: &str) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        evict_if_expired(&mut entries, key);

        let owned = matches!(
            entries.get(key).map(|e| &e.slot),
            Some(Slot::Value(current)) if current == token
        );
        if owned {
            entries.remove(key);
        }
        Ok(owned)
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        let mut entries = self.entries.write().await;
        let now = current_timestamp_ms();
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = entries.remove(key) {
                if !entry.is_expired_at(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).is_some_and(|e| !e.is_expired()))
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        evict_if_expired(&mut entries, key);

        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(expiry_after_ms(ttl_secs.saturating_mul(1000)));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl_remaining(&self, key: &str) -> StoreResult<i64> {
        let entries = self.entries.read().await;
        let ttl = match entries.get(key) {
            Some(entry) if !entry.is_expired() => match entry.ttl_remaining() {
                Some(secs) => secs as i64,
                None => -1,
            },
            _ => -2,
        };
        Ok(ttl)
    }

    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut entries = self.entries.write().await;
        let now = current_timestamp_ms();
        entries.retain(|_, entry| !entry.is_expired_at(now));

        Ok(entries
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect())
    }

    async fn add_member(&self, set_key: &str, member: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        evict_if_expired(&mut entries, set_key);

        let entry = entries
            .entry(set_key.to_string())
            .or_insert_with(StoreEntry::members);
        match &mut entry.slot {
            Slot::Members(members) => {
                members.insert(member.to_string());
                Ok(())
            }
            Slot::Value(_) => Err(wrong_type(set_key)),
        }
    }

    async fn members(&self, set_key: &str) -> StoreResult<Vec<String>> {
        let entries = self.entries.read().await;
        match entries.get(set_key) {
            Some(entry) if !entry.is_expired() => match &entry.slot {
                Slot::Members(members) => Ok(members.iter().cloned().collect()),
                Slot::Value(_) => Err(wrong_type(set_key)),
            },
            _ => Ok(Vec::new()),
        }
    }

    async fn remove_member(&self, set_key: &str, member: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        let now_empty = match entries.get_mut(set_key).map(|e| &mut e.slot) {
            Some(Slot::Members(members)) => {
                members.remove(member);
                members.is_empty()
            }
            Some(Slot::Value(_)) => return Err(wrong_type(set_key)),
            None => false,
        };
        // Redis deletes a set once its last member is removed.
        if now_empty {
            entries.remove(set_key);
        }
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
