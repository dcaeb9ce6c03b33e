//! Herd Cache - distributed cache coordination over a shared key-value store
//!
//! Namespaced keys, TTL jitter, stampede-protected `get_or_set`, background
//! refresh, tag-based invalidation, statistics and events. Every store failure
//! degrades to a miss or a no-op instead of an error.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod store;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheClient, CacheEvent, CacheStats, InvalidationRequest, SetOptions};
pub use config::Config;
pub use error::{CacheError, StoreError};
pub use store::KvStore;
pub use tasks::{
    spawn_cleanup_task, spawn_invalidation_sink, spawn_refresh_task, RefreshSettings, TaskHandle,
};
