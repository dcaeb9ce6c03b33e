//! Stampede Guard
//!
//! `get_or_set` lets exactly one caller regenerate a missing entry while the
//! rest wait for it. The regeneration lock is `<ns>lock:<key>`, taken with
//! `SET NX EX` and released only by the token that took it.
//!
//! Flow for a miss:
//!
//! ```text
//! NoEntry --lock taken--> LockAcquired --factory, set, release--> EntryPresent
//!    |
//!    +--lock held--> LockHeldByOther --poll sees entry--> EntryPresent
//!                          |
//!                          +--polls exhausted--> factory, set --> EntryPresent
//! ```
//!
//! Any store failure along the way falls through to calling the factory
//! directly. Factory errors are returned to the caller unchanged.

use std::future::Future;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::client::CacheClient;
use super::codec;
use super::options::SetOptions;
use crate::error::StoreResult;

/// Result of trying to take the regeneration lock.
enum LockOutcome {
    /// We own the lock; the token releases it.
    Acquired(String),
    HeldByOther,
}

impl CacheClient {
    // == Get Or Set ==
    /// Returns the cached value for `key`, or produces it with `factory`.
    ///
    /// Concurrent callers on a cold key share a single factory call as long
    /// as the store is reachable and the producer finishes within the
    /// polling window. When the store is down every caller runs its own
    /// factory.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        factory: F,
        opts: SetOptions,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let outcome = match self.acquire_lock(key).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(key = %key, error = %e, "lock unavailable, calling factory directly");
                self.report(key, e.into());
                return self.generate(key, factory, opts).await;
            }
        };

        match outcome {
            LockOutcome::Acquired(token) => {
                debug!(key = %key, "regeneration lock acquired");
                let result = self.generate(key, factory, opts).await;
                self.release_lock(key, &token).await;
                result
            }
            LockOutcome::HeldByOther => {
                debug!(key = %key, "regeneration lock held elsewhere, waiting");
                match self.await_generation(key).await {
                    Ok(Some(value)) => Ok(value),
                    Ok(None) => {
                        debug!(key = %key, "entry not produced in time, regenerating locally");
                        self.generate(key, factory, opts).await
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "polling failed, calling factory directly");
                        self.report(key, e.into());
                        self.generate(key, factory, opts).await
                    }
                }
            }
        }
    }

    async fn acquire_lock(&self, key: &str) -> StoreResult<LockOutcome> {
        let token = Uuid::new_v4().to_string();
        let acquired = self
            .inner
            .store
            .set_if_absent(
                &self.inner.keys.lock_key(key),
                &token,
                self.inner.guard.lock_ttl,
            )
            .await?;

        Ok(if acquired {
            LockOutcome::Acquired(token)
        } else {
            LockOutcome::HeldByOther
        })
    }

    async fn release_lock(&self, key: &str, token: &str) {
        match self
            .inner
            .store
            .delete_if_equals(&self.inner.keys.lock_key(key), token)
            .await
        {
            Ok(true) => debug!(key = %key, "regeneration lock released"),
            // Expired and possibly re-taken; the new holder's lock stays.
            Ok(false) => debug!(key = %key, "regeneration lock already gone"),
            Err(e) => self.report(key, e.into()),
        }
    }

    /// Waits one backoff, then polls up to `poll_attempts` times for the
    /// producer's write. An unreadable payload counts as not produced.
    async fn await_generation<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let stored = self.inner.keys.key(key);
        let guard = self.inner.guard;

        tokio::time::sleep(guard.lock_wait).await;
        for attempt in 1..=guard.poll_attempts {
            if let Some(raw) = self.inner.store.get(&stored).await? {
                return match codec::decode(&raw) {
                    Ok(value) => {
                        self.inner.stats.record_hit();
                        Ok(Some(value))
                    }
                    Err(e) => {
                        self.report(key, e.into());
                        Ok(None)
                    }
                };
            }
            if attempt < guard.poll_attempts {
                tokio::time::sleep(guard.lock_wait).await;
            }
        }
        Ok(None)
    }

    async fn generate<T, E, F, Fut>(&self, key: &str, factory: F, opts: SetOptions) -> Result<T, E>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let value = factory().await?;
        self.set(key, &value, opts).await;
        Ok(value)
    }
}
