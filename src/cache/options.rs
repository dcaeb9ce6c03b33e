//! Write options accepted by `set` and `get_or_set`.

use std::fmt;
use std::future::Future;

use serde::Serialize;

use super::refresh::{refresh_factory, RefreshFactory};

/// Background refresh registration carried by a write.
#[derive(Clone)]
pub struct RefreshRegistration {
    pub priority: i64,
    pub factory: RefreshFactory,
}

impl fmt::Debug for RefreshRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshRegistration")
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

// == Set Options ==
/// Options for a cache write.
///
/// ```ignore
/// let opts = SetOptions::new()
///     .ttl(60)
///     .staggered()
///     .tags(["restaurant:7"]);
/// cache.set("menu:42", &menu, opts).await;
/// ```
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// TTL in seconds; the configured default when `None`
    pub ttl: Option<u64>,
    /// Apply jitter around the TTL
    pub staggered: bool,
    /// Tags the key is grouped under
    pub tags: Vec<String>,
    /// Keep the entry warm from the background scheduler
    pub refresh: Option<RefreshRegistration>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, seconds: u64) -> Self {
        self.ttl = Some(seconds);
        self
    }

    pub fn staggered(mut self) -> Self {
        self.staggered = true;
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Registers `factory` to regenerate the entry before it expires.
    pub fn background_refresh<T, E, F, Fut>(mut self, priority: i64, factory: F) -> Self
    where
        T: Serialize + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.refresh = Some(RefreshRegistration {
            priority,
            factory: refresh_factory(factory),
        });
        self
    }
}
