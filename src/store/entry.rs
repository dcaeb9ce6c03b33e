//! Store Entry Module
//!
//! Defines a single record held by the in-process store: either a plain
//! payload or a set of members, with an optional absolute expiry.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

// == Slot ==
/// What a key holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Value(String),
    Members(HashSet<String>),
}

// == Store Entry ==
/// A stored record with its expiry metadata.
#[derive(Debug, Clone)]
pub struct StoreEntry {
    /// The stored payload or member set
    pub slot: Slot,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl StoreEntry {
    // == Constructors ==
    /// Creates a payload entry expiring after `ttl_seconds`.
    ///
    /// Expiry saturates, so an absurd TTL means "effectively never".
    pub fn value(value: String, ttl_seconds: u64) -> Self {
        Self {
            slot: Slot::Value(value),
            expires_at: Some(expiry_after_ms(ttl_seconds.saturating_mul(1000))),
        }
    }

    /// Creates an empty, non-expiring member set.
    pub fn members() -> Self {
        Self {
            slot: Slot::Members(HashSet::new()),
            expires_at: None,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches its expiration time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(current_timestamp_ms()))
    }

    /// Remaining TTL in whole seconds, rounded to nearest like Redis `TTL`.
    pub fn ttl_remaining(&self) -> Option<u64> {
        self.ttl_remaining_ms().map(|ms| ms.saturating_add(500) / 1000)
    }
}

// == Utility Functions ==
/// Absolute expiry `ttl_ms` from now, saturating at `u64::MAX`.
pub fn expiry_after_ms(ttl_ms: u64) -> u64 {
    current_timestamp_ms().saturating_add(ttl_ms)
}

/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
