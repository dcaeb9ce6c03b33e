//! Tag Index Module
//!
//! Bidirectional key↔tag associations. The store holds the authoritative sets
//! (`<ns>tag:<tag>` → keys, `<ns>tags:<key>` → tags); the in-memory map is a
//! read-through mirror of the tag side and is never trusted on its own.
//!
//! Both sets expire: a key's tag set with the entry, a tag's member set with
//! its longest-lived member. Members that expired on their own linger in the
//! tag set until then, which only costs a no-op delete during a cascade.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;
use tracing::warn;

use super::KeyCodec;
use crate::error::StoreResult;
use crate::store::KvStore;

// == Tag Index ==
#[derive(Debug)]
pub struct TagIndex {
    keys: KeyCodec,
    /// tag → member keys, mirrored from the store
    local: RwLock<HashMap<String, HashSet<String>>>,
}

impl TagIndex {
    pub fn new(keys: KeyCodec) -> Self {
        Self {
            keys,
            local: RwLock::new(HashMap::new()),
        }
    }

    // == Associate ==
    /// Adds `key` to every tag's set and every tag to the key's set, for an
    /// entry living `ttl` seconds.
    pub async fn associate(
        &self,
        store: &dyn KvStore,
        key: &str,
        tags: &[String],
        ttl: u64,
    ) -> StoreResult<()> {
        if tags.is_empty() {
            return Ok(());
        }

        let key_tags = self.keys.key_tags_key(key);
        for tag in tags {
            let tag_key = self.keys.tag_key(tag);
            store.add_member(&tag_key, key).await?;
            extend(store, &tag_key, ttl).await?;
            store.add_member(&key_tags, tag).await?;
            self.local
                .write()
                .await
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        store.expire(&key_tags, ttl).await?;
        Ok(())
    }

    /// Re-applies `ttl` to the tag records of `key` after it was rewritten.
    pub async fn touch(&self, store: &dyn KvStore, key: &str, ttl: u64) -> StoreResult<()> {
        let key_tags = self.keys.key_tags_key(key);
        if !store.expire(&key_tags, ttl).await? {
            return Ok(());
        }
        for tag in store.members(&key_tags).await? {
            extend(store, &self.keys.tag_key(&tag), ttl).await?;
        }
        Ok(())
    }

    // == Remove Key ==
    /// Removes `key` from every tag it belongs to and drops its tag set.
    pub async fn remove_key(&self, store: &dyn KvStore, key: &str) -> StoreResult<()> {
        let key_tags = self.keys.key_tags_key(key);
        let tags = store.members(&key_tags).await?;

        for tag in &tags {
            store.remove_member(&self.keys.tag_key(tag), key).await?;
            self.forget_locally(tag, key).await;
        }
        store.delete(&[key_tags]).await?;
        Ok(())
    }

    /// Drops `key` from the mirror only; used when the store is unreachable.
    pub async fn remove_key_locally(&self, key: &str) {
        let mut local = self.local.write().await;
        local.retain(|_, members| {
            members.remove(key);
            !members.is_empty()
        });
    }

    // == Members ==
    /// Member keys of `tag`, read from the store.
    ///
    /// Falls back to the local mirror when the store cannot be read, so a
    /// cascade still reaches the keys this process tagged.
    pub async fn members(&self, store: &dyn KvStore, tag: &str) -> Vec<String> {
        match store.members(&self.keys.tag_key(tag)).await {
            Ok(members) => {
                self.sync_local(tag, &members).await;
                members
            }
            Err(e) => {
                warn!(tag = %tag, error = %e, "failed to read tag members, using local mirror");
                self.local_members(tag).await
            }
        }
    }

    pub async fn local_members(&self, tag: &str) -> Vec<String> {
        self.local
            .read()
            .await
            .get(tag)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Deletes the tag's set from the store and the mirror.
    pub async fn forget_tag(&self, store: &dyn KvStore, tag: &str) -> StoreResult<()> {
        self.local.write().await.remove(tag);
        store.delete(&[self.keys.tag_key(tag)]).await?;
        Ok(())
    }

    pub async fn clear_local(&self) {
        self.local.write().await.clear();
    }

    async fn sync_local(&self, tag: &str, members: &[String]) {
        let mut local = self.local.write().await;
        if members.is_empty() {
            local.remove(tag);
        } else {
            local.insert(tag.to_string(), members.iter().cloned().collect());
        }
    }

    async fn forget_locally(&self, tag: &str, key: &str) {
        let mut local = self.local.write().await;
        if let Some(members) = local.get_mut(tag) {
            members.remove(key);
            if members.is_empty() {
                local.remove(tag);
            }
        }
    }
}

/// Raises the TTL of a tag set to `ttl`, never lowering it.
async fn extend(store: &dyn KvStore, tag_key: &str, ttl: u64) -> StoreResult<()> {
    // -1 (fresh set, no expiry yet) also lands here.
    if store.ttl_remaining(tag_key).await? < ttl as i64 {
        store.expire(tag_key, ttl).await?;
    }
    Ok(())
}
