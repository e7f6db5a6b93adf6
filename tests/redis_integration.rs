//! Redis integration tests.
//!
//! These tests require a reachable Redis server. Set the environment
//! variable `PGLANE_TEST_REDIS_URL` to enable them (host:port form):
//!
//! ```bash
//! export PGLANE_TEST_REDIS_URL="localhost:6379"
//! cargo test redis_integration
//! ```

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::env;
use std::time::Duration;

use pglane::{
    CacheCoordinator, CacheSettings, CacheTarget, ExecKind, KeyValueStore, Predicate, QueryResult,
    QuerySpec, RedisStore,
};

/// Environment variable for the Redis test target.
const REDIS_URL_ENV: &str = "PGLANE_TEST_REDIS_URL";

fn get_redis_target() -> Option<CacheTarget> {
    let value = env::var(REDIS_URL_ENV).ok()?;
    let (host, port) = value.split_once(':')?;
    Some(CacheTarget::new(host, port.parse().ok()?))
}

/// Macro to skip tests when Redis is not available.
macro_rules! require_redis {
    () => {
        match get_redis_target() {
            Some(target) => target,
            None => {
                eprintln!(
                    "Skipping test: {} not set. Set this environment variable to run Redis \
                     tests.",
                    REDIS_URL_ENV
                );
                return;
            },
        }
    };
}

fn unique_prefix() -> String {
    format!("pglane_it_{}:", uuid::Uuid::new_v4().simple())
}

#[test]
fn store_operations_round_trip() {
    let target = require_redis!();
    let prefix = unique_prefix();
    let settings = CacheSettings::default().with_key_prefix(prefix.clone());
    let store = RedisStore::connect(&target, &settings).unwrap();

    let key = format!("{prefix}k1");
    store.set_ex(&key, "v1", Duration::from_secs(30)).unwrap();
    assert_eq!(store.get(&key).unwrap(), Some("v1".to_string()));

    let listed = store.keys(&format!("{prefix}*")).unwrap();
    assert!(listed.contains(&key));

    assert_eq!(store.del(&[key.clone()]).unwrap(), 1);
    assert_eq!(store.get(&key).unwrap(), None);

    assert!(store.connected());
}

#[test]
fn set_membership_round_trip() {
    let target = require_redis!();
    let prefix = unique_prefix();
    let settings = CacheSettings::default().with_key_prefix(prefix.clone());
    let store = RedisStore::connect(&target, &settings).unwrap();

    let set_key = format!("{prefix}dep:default.orders");
    store.sadd(&set_key, "a").unwrap();
    store.sadd(&set_key, "b").unwrap();
    store.sadd(&set_key, "a").unwrap();

    let mut members = store.smembers(&set_key).unwrap();
    members.sort();
    assert_eq!(members, vec!["a".to_string(), "b".to_string()]);

    store.del(&[set_key]).unwrap();
}

#[test]
fn coordinator_round_trip_against_live_store() {
    let target = require_redis!();
    let prefix = unique_prefix();
    let settings = CacheSettings::default().with_key_prefix(prefix);
    let store = RedisStore::connect(&target, &settings).unwrap();
    let coordinator = CacheCoordinator::new(Box::new(store), settings.clone());

    let spec = QuerySpec::new(ExecKind::Find, "products")
        .with_predicate(Predicate::eq("category", "drones"));
    let key = coordinator.fingerprint(&spec);
    let result = QueryResult::Rows(vec![serde_json::json!({"id": 1})]);

    assert!(coordinator.fetch(&key).is_none());
    coordinator.store_result(&spec, &key, &result);
    assert_eq!(coordinator.fetch(&key), Some(result));

    // A write to the same table drops the entry.
    let write = QuerySpec::new(ExecKind::Update, "products").with_payload("price", 1i64);
    coordinator.invalidate(&write);
    assert!(coordinator.fetch(&key).is_none());

    let stats = coordinator.stats();
    assert!(stats.connected);
    assert_eq!(stats.breaker_state, "closed");

    coordinator.flush().unwrap();
}

#[test]
fn unreachable_store_fails_open() {
    // Port 1 is never a Redis server; every command errors after retries.
    let target = CacheTarget::new("localhost", 1);
    let settings = CacheSettings::default()
        .with_max_retries(1)
        .with_retry_delay(Duration::from_millis(10));
    let store = RedisStore::connect(&target, &settings).unwrap();
    let coordinator = CacheCoordinator::new(Box::new(store), settings);

    let spec = QuerySpec::new(ExecKind::Find, "products");
    let key = coordinator.fingerprint(&spec);
    assert!(coordinator.fetch(&key).is_none());
    coordinator.store_result(&spec, &key, &QueryResult::Rows(Vec::new()));
    assert!(!coordinator.stats().connected);
}
