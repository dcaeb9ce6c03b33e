//! Cache Events
//!
//! Outbound observability events published by the client, and the inbound
//! invalidation request consumed by the invalidation sink.

use serde::{Deserialize, Serialize};

// == Outbound Events ==
/// Emitted after each state-changing operation and on swallowed errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum CacheEvent {
    #[serde(rename = "cache.set")]
    Set { key: String, ttl: u64 },
    #[serde(rename = "cache.delete")]
    Delete { key: String },
    #[serde(rename = "cache.clear")]
    Clear,
    #[serde(rename = "cache.deleteByTags")]
    DeleteByTags { tags: Vec<String> },
    #[serde(rename = "cache.deleteByPattern")]
    DeleteByPattern { pattern: String },
    #[serde(rename = "cache.error")]
    Error { error: String },
}

impl CacheEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CacheEvent::Set { .. } => "cache.set",
            CacheEvent::Delete { .. } => "cache.delete",
            CacheEvent::Clear => "cache.clear",
            CacheEvent::DeleteByTags { .. } => "cache.deleteByTags",
            CacheEvent::DeleteByPattern { .. } => "cache.deleteByPattern",
            CacheEvent::Error { .. } => "cache.error",
        }
    }
}

// == Invalidation Request ==
/// `{key?, pattern?, tags?}`; any combination may be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl InvalidationRequest {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self {
            pattern: Some(pattern.into()),
            ..Self::default()
        }
    }

    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: Some(tags.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// True when no field is present; dispatching it is a no-op.
    pub fn is_empty(&self) -> bool {
        self.key.is_none() && self.pattern.is_none() && self.tags.is_none()
    }
}
