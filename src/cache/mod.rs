//! Cache Module
//!
//! Coordination layer over a shared key-value store: namespaced keys, TTL
//! jitter, stampede protection, tag cascades, background refresh bookkeeping,
//! statistics and events.

mod client;
mod codec;
mod events;
mod keys;
mod options;
mod refresh;
mod stampede;
mod stats;
mod tags;
mod ttl;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use client::{CacheClient, GuardSettings};
pub use codec::{decode, encode};
pub use events::{CacheEvent, InvalidationRequest};
pub use keys::KeyCodec;
pub use options::{RefreshRegistration, SetOptions};
pub use refresh::{refresh_factory, RefreshEntry, RefreshFactory, RefreshQueue, Registration};
pub use stats::{hit_ratio, CacheStats, StatsCollector};
pub use tags::TagIndex;
pub use ttl::{stagger, TtlPolicy};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Longest TTL a write may carry, in seconds (ten years); longer requests are clamped
pub const MAX_TTL: u64 = 10 * 365 * 24 * 60 * 60;

/// Maximum allowed encoded value size in bytes
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB
