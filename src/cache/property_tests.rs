//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the facade's behavior over generated keys and values.

use proptest::prelude::*;
use serde_json::{json, Map, Value};

use crate::cache::{Cache, CacheValue, Ttl, FORBIDDEN_KEY_CHARS};
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::store::{MemoryConnector, MemoryServer};

// == Helpers ==
fn create_cache(server: &MemoryServer, prefix: &str) -> Cache<MemoryConnector> {
    Cache::with_connector(
        CacheConfig::default().with_prefix(prefix),
        server.connector(),
    )
}

// == Strategies ==
/// Generates valid cache keys (no reserved characters)
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_.-]{1,64}".prop_map(|s| s)
}

/// Generates keys containing at least one reserved character
fn invalid_key_strategy() -> impl Strategy<Value = String> {
    let reserved: Vec<char> = FORBIDDEN_KEY_CHARS.chars().collect();
    (
        "[a-z0-9]{0,16}",
        prop::sample::select(reserved),
        "[a-z0-9]{0,16}",
    )
        .prop_map(|(head, c, tail)| format!("{}{}{}", head, c, tail))
}

/// Floats with exact short decimal forms, so JSON parsing is lossless
fn float_strategy() -> impl Strategy<Value = f64> {
    (-1_000_000i32..1_000_000).prop_map(|n| n as f64 / 4.0)
}

fn leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        float_strategy().prop_map(Value::from),
        "[ -~]{0,32}".prop_map(Value::from),
    ]
}

/// Generates values of every supported kind, including nested containers
fn cache_value_strategy() -> impl Strategy<Value = CacheValue> {
    let nested = leaf_strategy().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    });
    nested.prop_filter_map("unsupported kind", CacheValue::from_json)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // **Property 1: Round-trip**
    // *For any* supported value and valid key, set followed by get SHALL
    // return a value equal to the one stored.
    #[test]
    fn prop_roundtrip(key in valid_key_strategy(), value in cache_value_strategy()) {
        let server = MemoryServer::new();
        let mut cache = create_cache(&server, "cache_");

        prop_assert!(cache.set(&key, &value, None).unwrap());
        let retrieved = cache.get_value(&key).unwrap();
        prop_assert_eq!(retrieved, Some(value));
    }

    // **Property 2: Prefix isolation**
    // *For any* key, two caches with different prefixes over one store
    // SHALL NOT observe each other's entries.
    #[test]
    fn prop_prefix_isolation(key in valid_key_strategy(), value in any::<i64>()) {
        let server = MemoryServer::new();
        let mut first = create_cache(&server, "first_");
        let mut second = create_cache(&server, "second_");

        first.set(&key, &value, None).unwrap();

        prop_assert!(first.has(&key).unwrap());
        prop_assert!(!second.has(&key).unwrap());
        prop_assert_eq!(second.get::<i64>(&key).unwrap(), None);
    }

    // **Property 3: Reserved characters**
    // *For any* key holding a reserved character, every keyed operation
    // SHALL fail with InvalidKey without opening a connection.
    #[test]
    fn prop_reserved_characters(key in invalid_key_strategy()) {
        let server = MemoryServer::new();
        let mut cache = create_cache(&server, "cache_");

        prop_assert!(matches!(cache.get::<Value>(&key), Err(CacheError::InvalidKey(_))));
        prop_assert!(matches!(cache.set(&key, &1, None), Err(CacheError::InvalidKey(_))));
        prop_assert!(matches!(cache.delete(&key), Err(CacheError::InvalidKey(_))));
        prop_assert!(matches!(cache.has(&key), Err(CacheError::InvalidKey(_))));
        prop_assert!(matches!(cache.increment(&key, 1), Err(CacheError::InvalidKey(_))));
        prop_assert!(matches!(cache.decrement(&key, 1), Err(CacheError::InvalidKey(_))));

        prop_assert!(!cache.is_connected(), "No connection should have been opened");
    }

    // **Property 4: Negative TTL rejection**
    // *For any* negative TTL, set SHALL return false and write nothing.
    #[test]
    fn prop_negative_ttl_rejected(key in valid_key_strategy(), ttl in i64::MIN..0) {
        let server = MemoryServer::new();
        let mut cache = create_cache(&server, "cache_");

        let value = json!({"a": 1});
        prop_assert!(!cache.set(&key, &value, Some(Ttl::Seconds(ttl))).unwrap());
        prop_assert!(!cache.has(&key).unwrap());
    }

    // **Property 7: Counter semantics**
    // *For any* offsets, incrementing then decrementing a fresh counter
    // SHALL return the running sum.
    #[test]
    fn prop_counter_semantics(
        key in valid_key_strategy(),
        up in -1_000_000i64..1_000_000,
        down in -1_000_000i64..1_000_000
    ) {
        let server = MemoryServer::new();
        let mut cache = create_cache(&server, "cache_");

        prop_assert_eq!(cache.increment(&key, up).unwrap(), up);
        prop_assert_eq!(cache.decrement(&key, down).unwrap(), up - down);
    }

    // **Property 8: Delete semantics**
    // *For any* stored key, delete SHALL return true once, then false, and
    // the key SHALL no longer exist.
    #[test]
    fn prop_delete_semantics(key in valid_key_strategy(), value in cache_value_strategy()) {
        let server = MemoryServer::new();
        let mut cache = create_cache(&server, "cache_");

        cache.set(&key, &value, None).unwrap();
        prop_assert!(cache.delete(&key).unwrap());
        prop_assert!(!cache.has(&key).unwrap());
        prop_assert!(!cache.delete(&key).unwrap());
    }
}
