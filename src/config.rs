//! Configuration Module
//!
//! Handles loading cache coordination settings from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Cache coordination parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace applied to every stored key
    pub key_prefix: String,
    /// TTL in seconds for entries stored without an explicit TTL
    pub default_ttl: u64,
    /// TTL in seconds of the regeneration lock
    pub lock_ttl: u64,
    /// Backoff between lock polls in milliseconds
    pub lock_wait_ms: u64,
    /// Number of polls before a waiter regenerates on its own
    pub lock_poll_attempts: u32,
    /// Jitter applied to staggered TTLs, as a fraction of the nominal TTL
    pub stagger_ratio: f64,
    /// Entries whose remaining TTL falls to this fraction of the original are refreshed
    pub refresh_window_ratio: f64,
    /// Background refresh tick in milliseconds
    pub refresh_tick_ms: u64,
    /// Maximum entries refreshed per tick
    pub refresh_batch_size: usize,
    /// Store connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Per-command store timeout in milliseconds
    pub command_timeout_ms: u64,
    /// Redis URL; the in-process store is used when absent
    pub redis_url: Option<String>,
    /// Maximum pooled Redis connections
    pub redis_pool_size: usize,
    /// Pub/sub channel carrying fleet-wide invalidation requests
    pub invalidation_channel: String,
    /// Admin HTTP port
    pub server_port: u16,
    /// Expired-entry sweep interval in seconds for the in-process store
    pub cleanup_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_KEY_PREFIX` - Key namespace (default: "cache")
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 3600)
    /// - `CACHE_LOCK_TTL` - Regeneration lock TTL in seconds (default: 10)
    /// - `CACHE_LOCK_WAIT_MS` - Poll backoff while another caller regenerates (default: 100)
    /// - `CACHE_LOCK_POLL_ATTEMPTS` - Polls before regenerating locally (default: 5)
    /// - `CACHE_STAGGER_RATIO` - Jitter fraction for staggered TTLs (default: 0.15)
    /// - `CACHE_REFRESH_WINDOW_RATIO` - Refresh threshold (default: 0.9)
    /// - `CACHE_REFRESH_TICK_MS` - Refresh tick (default: 5000)
    /// - `CACHE_REFRESH_BATCH_SIZE` - Entries per refresh tick (default: 10)
    /// - `CACHE_CONNECT_TIMEOUT_MS` - Connect timeout (default: 5000)
    /// - `CACHE_COMMAND_TIMEOUT_MS` - Command timeout (default: 200)
    /// - `REDIS_URL` - Shared store URL (default: unset, in-process store)
    /// - `REDIS_POOL_SIZE` - Pool size (default: 16)
    /// - `CACHE_INVALIDATION_CHANNEL` - Pub/sub channel (default: "cache:invalidate")
    /// - `SERVER_PORT` - Admin HTTP port (default: 3000)
    /// - `CLEANUP_INTERVAL` - In-process store sweep interval in seconds (default: 1)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            key_prefix: env::var("CACHE_KEY_PREFIX")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.key_prefix),
            default_ttl: parse_or("CACHE_DEFAULT_TTL", defaults.default_ttl),
            lock_ttl: parse_or("CACHE_LOCK_TTL", defaults.lock_ttl),
            lock_wait_ms: parse_or("CACHE_LOCK_WAIT_MS", defaults.lock_wait_ms),
            lock_poll_attempts: parse_or("CACHE_LOCK_POLL_ATTEMPTS", defaults.lock_poll_attempts),
            stagger_ratio: parse_or("CACHE_STAGGER_RATIO", defaults.stagger_ratio),
            refresh_window_ratio: parse_or(
                "CACHE_REFRESH_WINDOW_RATIO",
                defaults.refresh_window_ratio,
            ),
            refresh_tick_ms: parse_or("CACHE_REFRESH_TICK_MS", defaults.refresh_tick_ms),
            refresh_batch_size: parse_or("CACHE_REFRESH_BATCH_SIZE", defaults.refresh_batch_size),
            connect_timeout_ms: parse_or("CACHE_CONNECT_TIMEOUT_MS", defaults.connect_timeout_ms),
            command_timeout_ms: parse_or("CACHE_COMMAND_TIMEOUT_MS", defaults.command_timeout_ms),
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            redis_pool_size: parse_or("REDIS_POOL_SIZE", defaults.redis_pool_size),
            invalidation_channel: env::var("CACHE_INVALIDATION_CHANNEL")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.invalidation_channel),
            server_port: parse_or("SERVER_PORT", defaults.server_port),
            cleanup_interval: parse_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
        }
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    pub fn refresh_tick(&self) -> Duration {
        Duration::from_millis(self.refresh_tick_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval.max(1))
    }
}

fn parse_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_prefix: "cache".to_string(),
            default_ttl: 3600,
            lock_ttl: 10,
            lock_wait_ms: 100,
            lock_poll_attempts: 5,
            stagger_ratio: 0.15,
            refresh_window_ratio: 0.9,
            refresh_tick_ms: 5000,
            refresh_batch_size: 10,
            connect_timeout_ms: 5000,
            command_timeout_ms: 200,
            redis_url: None,
            redis_pool_size: 16,
            invalidation_channel: "cache:invalidate".to_string(),
            server_port: 3000,
            cleanup_interval: 1,
        }
    }
}
