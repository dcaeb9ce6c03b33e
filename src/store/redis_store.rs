//! Redis-backed store and the pub/sub bridge for fleet-wide invalidation.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config as PoolSettings, Connection, Pool, PoolConfig, Runtime};
use futures_util::StreamExt;
use redis::{AsyncCommands, RedisResult, Script};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::KvStore;
use crate::cache::InvalidationRequest;
use crate::error::{StoreError, StoreResult};
use crate::tasks::TaskHandle;

/// Deletes the lock only while it still holds the caller's token.
const RELEASE_IF_OWNER: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Keys requested per `SCAN` round trip.
const SCAN_BATCH: usize = 500;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Reconnect delay: doubles per failure up to [`MAX_BACKOFF`], back to
/// [`INITIAL_BACKOFF`] once a subscription succeeds.
#[derive(Debug)]
struct Backoff {
    current: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            current: INITIAL_BACKOFF,
        }
    }

    /// Delay to wait now; the next one is doubled.
    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(MAX_BACKOFF);
        delay
    }

    fn reset(&mut self) {
        self.current = INITIAL_BACKOFF;
    }
}

// == Redis Store ==
/// Store adapter over a pooled Redis connection.
///
/// Every command is bounded by the command timeout; a timeout is reported as
/// [`StoreError::Timeout`] and never retried here.
pub struct RedisStore {
    pool: Pool,
    command_timeout: Duration,
    release_script: Script,
}

impl RedisStore {
    /// Creates the connection pool. Connections are opened lazily, so this
    /// only fails for a malformed URL.
    pub fn connect(
        url: &str,
        pool_size: usize,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> StoreResult<Self> {
        let mut settings = PoolSettings::from_url(url);
        let mut pool_config = PoolConfig::new(pool_size);
        pool_config.timeouts.wait = Some(connect_timeout);
        pool_config.timeouts.create = Some(connect_timeout);
        pool_config.timeouts.recycle = Some(connect_timeout);
        settings.pool = Some(pool_config);

        let pool = settings
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Unavailable(format!("failed to create Redis pool: {e}")))?;

        Ok(Self {
            pool,
            command_timeout,
            release_script: Script::new(RELEASE_IF_OWNER),
        })
    }

    async fn conn(&self) -> StoreResult<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to get Redis connection: {e}")))
    }

    async fn timed<T, F>(&self, op: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::Unavailable(format!("Redis {op} error: {e}"))),
            Err(_) => Err(StoreError::Timeout(self.command_timeout)),
        }
    }
}

#[async_trait]
impl KvStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn().await?;
        let value: Option<String> = self.timed("GET", conn.get(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: () = self.timed("SETEX", conn.set_ex(key, value, ttl_secs)).await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, token: &str, ttl_secs: u64) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let reply: Option<String> = self
            .timed(
                "SET NX",
                redis::cmd("SET")
                    .arg(key)
                    .arg(token)
                    .arg("NX")
                    .arg("EX")
                    .arg(ttl_secs)
                    .query_async(&mut conn),
            )
            .await?;
        Ok(reply.is_some())
    }

    async fn delete_if_equals(&self, key: &str, token: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let deleted: i64 = self
            .timed(
                "EVALSHA",
                self.release_script
                    .key(key)
                    .arg(token)
                    .invoke_async(&mut conn),
            )
            .await?;
        Ok(deleted > 0)
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let removed: u64 = self.timed("DEL", conn.del(keys)).await?;
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let exists: bool = self.timed("EXISTS", conn.exists(key)).await?;
        Ok(exists)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let seconds = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        let applied: bool = self.timed("EXPIRE", conn.expire(key, seconds)).await?;
        Ok(applied)
    }

    async fn ttl_remaining(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        let ttl: i64 = self.timed("TTL", conn.ttl(key)).await?;
        Ok(ttl)
    }

    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = self
                .timed(
                    "SCAN",
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn),
                )
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once across pages.
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    async fn add_member(&self, set_key: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: i64 = self.timed("SADD", conn.sadd(set_key, member)).await?;
        Ok(())
    }

    async fn members(&self, set_key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let members: Vec<String> = self.timed("SMEMBERS", conn.smembers(set_key)).await?;
        Ok(members)
    }

    async fn remove_member(&self, set_key: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: i64 = self.timed("SREM", conn.srem(set_key, member)).await?;
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: String = self
            .timed("PING", redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }
}

// == Invalidation Bridge ==
/// Subscribes to `channel` and forwards every JSON invalidation request into
/// `sink`, so requests published by any instance reach this one.
///
/// Reconnects with exponential backoff (1s doubling, capped at 5 minutes),
/// starting over from 1s after every successful subscription.
/// Stops when the handle is shut down or the sink is closed.
pub fn spawn_invalidation_bridge(
    url: String,
    channel: String,
    sink: mpsc::Sender<InvalidationRequest>,
) -> TaskHandle {
    TaskHandle::spawn("invalidation-bridge", move |mut shutdown| async move {
        let mut backoff = Backoff::new();

        loop {
            let outcome = tokio::select! {
                _ = &mut shutdown => break,
                outcome = forward_invalidations(&url, &channel, &sink, &mut backoff) => outcome,
            };

            match outcome {
                Ok(()) => {
                    debug!("Invalidation sink closed, stopping bridge");
                    break;
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    error!(
                        error = %e,
                        backoff_secs = delay.as_secs(),
                        "Invalidation bridge error, reconnecting..."
                    );
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    })
}

/// Returns `Ok(())` only when the sink has gone away.
async fn forward_invalidations(
    url: &str,
    channel: &str,
    sink: &mpsc::Sender<InvalidationRequest>,
    backoff: &mut Backoff,
) -> StoreResult<()> {
    let client = redis::Client::open(url)
        .map_err(|e| StoreError::Unavailable(format!("failed to create Redis client: {e}")))?;

    let mut pubsub = client
        .get_async_pubsub()
        .await
        .map_err(|e| StoreError::Unavailable(format!("failed to get pub/sub connection: {e}")))?;

    pubsub
        .subscribe(channel)
        .await
        .map_err(|e| StoreError::Unavailable(format!("failed to subscribe: {e}")))?;

    info!(channel = %channel, "Subscribed to invalidation channel");
    backoff.reset();

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to read invalidation payload");
                continue;
            }
        };

        match serde_json::from_str::<InvalidationRequest>(&payload) {
            Ok(request) => {
                if sink.send(request).await.is_err() {
                    return Ok(());
                }
            }
            Err(e) => warn!(error = %e, payload = %payload, "malformed invalidation request"),
        }
    }

    Err(StoreError::Unavailable(
        "pub/sub connection closed".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let mut backoff = Backoff::new();
        let delays: Vec<u64> = (0..12).map(|_| backoff.next_delay().as_secs()).collect();

        assert_eq!(&delays[..5], &[1, 2, 4, 8, 16]);
        assert_eq!(*delays.last().unwrap(), 300);
    }

    #[test]
    fn test_backoff_resets_after_subscribing() {
        let mut backoff = Backoff::new();
        for _ in 0..20 {
            backoff.next_delay();
        }

        backoff.reset();

        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }
}
