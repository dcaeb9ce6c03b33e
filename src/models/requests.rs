//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::Value;

use crate::cache::{KeyCodec, SetOptions, MAX_KEY_LENGTH, MAX_TTL, MAX_VALUE_SIZE};

/// Request body for the SET operation (PUT /set)
///
/// # Fields
/// - `key`: The logical cache key, without the namespace
/// - `value`: Any JSON value; strings are stored as-is
/// - `ttl`: Optional TTL in seconds (uses default if not specified)
/// - `tags`: Tags to group the key under
/// - `staggered`: Apply TTL jitter
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub staggered: bool,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if let Some(msg) = validate_key(&self.key) {
            return Some(msg);
        }
        match self.ttl {
            Some(0) => return Some("TTL must be at least 1 second".to_string()),
            Some(ttl) if ttl > MAX_TTL => {
                return Some(format!("TTL exceeds maximum of {} seconds", MAX_TTL))
            }
            _ => {}
        }
        if self.tags.iter().any(|tag| tag.is_empty()) {
            return Some("Tags cannot be empty".to_string());
        }
        if self.value.to_string().len() > MAX_VALUE_SIZE {
            return Some(format!(
                "Value exceeds maximum size of {} bytes",
                MAX_VALUE_SIZE
            ));
        }
        None
    }

    pub fn options(&self) -> SetOptions {
        let mut opts = SetOptions::new().tags(self.tags.iter().cloned());
        opts.ttl = self.ttl;
        opts.staggered = self.staggered;
        opts
    }
}

/// Shared key check for body and path parameters.
pub fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Some(format!(
            "Key exceeds maximum length of {} characters",
            MAX_KEY_LENGTH
        ));
    }
    if KeyCodec::is_reserved(key) {
        return Some(format!(
            "Key '{}' is reserved for cache bookkeeping (lock:, tag:, tags:, :originalTtl)",
            key
        ));
    }
    None
}
