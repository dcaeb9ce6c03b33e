//! Key Codec Module
//!
//! Applies the namespace prefix to every key the cache writes, and derives the
//! auxiliary keys (locks, tag sets, TTL sidecars) from a logical key.

const LOCK_SEGMENT: &str = "lock:";
const TAG_SEGMENT: &str = "tag:";
const KEY_TAGS_SEGMENT: &str = "tags:";
const ORIGINAL_TTL_SUFFIX: &str = ":originalTtl";

// == Key Codec ==
/// Maps logical keys to namespaced store keys.
///
/// With prefix `cache`:
/// - `menu:42` → `cache:menu:42`
/// - lock → `cache:lock:menu:42`
/// - sidecar → `cache:menu:42:originalTtl`
/// - tag `restaurant:7` → `cache:tag:restaurant:7`
/// - tags of `menu:42` → `cache:tags:menu:42`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    namespace: String,
}

impl KeyCodec {
    /// Creates a codec for `prefix`. A trailing `:` is added when missing.
    pub fn new(prefix: &str) -> Self {
        let namespace = if prefix.ends_with(':') {
            prefix.to_string()
        } else {
            format!("{}:", prefix)
        };
        Self { namespace }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    pub fn lock_key(&self, key: &str) -> String {
        format!("{}{}{}", self.namespace, LOCK_SEGMENT, key)
    }

    pub fn original_ttl_key(&self, key: &str) -> String {
        format!("{}{}{}", self.namespace, key, ORIGINAL_TTL_SUFFIX)
    }

    pub fn tag_key(&self, tag: &str) -> String {
        format!("{}{}{}", self.namespace, TAG_SEGMENT, tag)
    }

    pub fn key_tags_key(&self, key: &str) -> String {
        format!("{}{}{}", self.namespace, KEY_TAGS_SEGMENT, key)
    }

    /// Namespaced form of a glob pattern over logical keys.
    pub fn pattern(&self, pattern: &str) -> String {
        self.key(pattern)
    }

    /// Glob matching everything in the namespace.
    pub fn everything(&self) -> String {
        format!("{}*", self.namespace)
    }

    /// Strips the namespace from a store key.
    pub fn strip<'a>(&self, stored: &'a str) -> Option<&'a str> {
        stored.strip_prefix(self.namespace.as_str())
    }

    /// True for store keys the cache writes for its own bookkeeping.
    pub fn is_auxiliary(&self, stored: &str) -> bool {
        self.strip(stored).map_or(true, Self::is_reserved)
    }

    /// True for logical keys that would land on a bookkeeping record. Writes
    /// to them are refused.
    pub fn is_reserved(key: &str) -> bool {
        key.starts_with(LOCK_SEGMENT)
            || key.starts_with(TAG_SEGMENT)
            || key.starts_with(KEY_TAGS_SEGMENT)
            || key.ends_with(ORIGINAL_TTL_SUFFIX)
    }
}
