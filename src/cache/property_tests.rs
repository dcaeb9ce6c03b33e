//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the cache's round-trip, jitter and statistics
//! properties against the in-process store.

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_test::block_on;

use crate::cache::{stagger, CacheClient, KeyCodec, SetOptions};
use crate::config::Config;
use crate::models::validate_key;
use crate::store::{glob_match, MemoryStore};

// == Test Configuration ==
const TEST_DEFAULT_TTL: u64 = 300;

fn test_client() -> CacheClient {
    let config = Config {
        default_ttl: TEST_DEFAULT_TTL,
        ..Config::default()
    };
    CacheClient::new(Arc::new(MemoryStore::new()), &config)
}

// == Strategies ==
/// Generates valid cache keys (non-empty, within length limit, not reserved)
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_:]{1,64}".prop_filter("bookkeeping key", |key| !KeyCodec::is_reserved(key))
}

fn text_value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ,.-]{0,128}"
}

/// Any printable text, weighted toward strings that are themselves JSON.
fn any_text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "\\PC{0,64}",
        any::<i64>().prop_map(|n| n.to_string()),
        Just("null".to_string()),
        Just("true".to_string()),
        "[a-z]{0,8}".prop_map(|s| format!("\"{}\"", s)),
        "[a-z0-9,]{0,16}".prop_map(|s| format!("[{}]", s)),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Menu {
    id: u32,
    dishes: Vec<String>,
    price: Option<i64>,
    open: bool,
}

fn menu_strategy() -> impl Strategy<Value = Menu> {
    (
        any::<u32>(),
        prop::collection::vec(text_value_strategy(), 0..8),
        any::<Option<i64>>(),
        any::<bool>(),
    )
        .prop_map(|(id, dishes, price, open)| Menu {
            id,
            dishes,
            price,
            open,
        })
}

/// Generates a sequence of cache operations for testing
#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: String },
    Get { key: String },
    Delete { key: String },
}

/// Keys drawn from a small pool so operations collide.
fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    let key = "k[0-9]";
    prop_oneof![
        (key, text_value_strategy()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        key.prop_map(|key| CacheOp::Get { key }),
        key.prop_map(|key| CacheOp::Delete { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Round trip: get(k) after set(k, v) returns v for structured values.
    #[test]
    fn prop_roundtrip_structured(key in valid_key_strategy(), menu in menu_strategy()) {
        let cache = test_client();
        let read: Option<Menu> = block_on(async {
            cache.set(&key, &menu, SetOptions::new()).await;
            cache.get(&key).await
        });
        prop_assert_eq!(read, Some(menu));
    }

    // Round trip for any string, including text that parses as JSON.
    #[test]
    fn prop_roundtrip_text(key in valid_key_strategy(), value in any_text_strategy()) {
        let cache = test_client();
        let read: Option<String> = block_on(async {
            cache.set(&key, &value, SetOptions::new()).await;
            cache.get(&key).await
        });
        prop_assert_eq!(read, Some(value));
    }

    // A JSON string value reads back as a string, never as the JSON it spells.
    #[test]
    fn prop_roundtrip_json_string_value(key in valid_key_strategy(), value in any_text_strategy()) {
        let cache = test_client();
        let stored = serde_json::Value::String(value);
        let read: Option<serde_json::Value> = block_on(async {
            cache.set(&key, &stored, SetOptions::new()).await;
            cache.get(&key).await
        });
        prop_assert_eq!(read, Some(stored));
    }

    // Jitter stays within [floor(ttl - j), floor(ttl + j)] and never below 1.
    #[test]
    fn prop_stagger_bounds(ttl in 0u64..1_000_000, ratio in 0.0f64..0.5, seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let drawn = stagger(ttl, ratio, &mut rng);

        let nominal = ttl as f64;
        let low = ((nominal - nominal * ratio).floor() as u64).max(1);
        let high = ((nominal + nominal * ratio).floor() as u64).max(1);
        prop_assert!(drawn >= low, "{} below {}", drawn, low);
        prop_assert!(drawn <= high, "{} above {}", drawn, high);
    }

    // Hits and misses match a model of which keys are present.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..50)) {
        let cache = test_client();
        let mut present: HashSet<String> = HashSet::new();
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        block_on(async {
            for op in ops {
                match op {
                    CacheOp::Set { key, value } => {
                        cache.set(&key, &value, SetOptions::new()).await;
                        present.insert(key);
                    }
                    CacheOp::Get { key } => {
                        let found = cache.get::<String>(&key).await.is_some();
                        assert_eq!(found, present.contains(&key));
                        if found {
                            expected_hits += 1;
                        } else {
                            expected_misses += 1;
                        }
                    }
                    CacheOp::Delete { key } => {
                        let existed = cache.delete(&key).await;
                        assert_eq!(existed, present.remove(&key));
                    }
                }
            }
        });

        let stats = block_on(cache.stats());
        prop_assert_eq!(stats.hits, expected_hits);
        prop_assert_eq!(stats.misses, expected_misses);
        prop_assert_eq!(stats.size, present.len());
    }

    // A namespaced pattern matches exactly the namespaced form of matching keys.
    #[test]
    fn prop_pattern_is_namespaced(key in "[a-z0-9:]{1,24}", prefix in "[a-z]{1,8}") {
        let codec = KeyCodec::new(&prefix);
        let stored = codec.key(&key);
        prop_assert!(glob_match(&codec.pattern("*"), &stored));
        prop_assert!(glob_match(&codec.pattern(&key), &stored));
        prop_assert_eq!(codec.strip(&stored), Some(key.as_str()));
    }
}

#[test]
fn test_key_length_validation() {
    let key = "a".repeat(crate::cache::MAX_KEY_LENGTH + 1);
    assert!(validate_key(&key).is_some());
    assert!(validate_key("menu:42").is_none());
}
