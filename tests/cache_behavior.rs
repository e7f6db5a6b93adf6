//! Cache layer behavior without a live store.
//!
//! Exercises the coordinator against in-memory and always-failing store
//! stubs: hit/miss flow, invalidation on writes, fingerprint determinism,
//! breaker tripping and the fail-open guarantee.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use pglane::{
    CacheCoordinator, CacheSettings, ExecKind, KeyValueStore, Predicate, QueryResult, QuerySpec,
};
use serde_json::json;

/// In-memory key-value store mirroring the operations the layer uses.
#[derive(Default)]
struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    sets: Mutex<HashMap<String, HashSet<String>>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> pglane::Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set_ex(&self, key: &str, value: &str, _ttl: Duration) -> pglane::Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn del(&self, keys: &[String]) -> pglane::Result<u64> {
        let mut entries = self.entries.lock().unwrap();
        let mut sets = self.sets.lock().unwrap();
        let mut removed = 0;
        for key in keys {
            if entries.remove(key).is_some() || sets.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn keys(&self, pattern: &str) -> pglane::Result<Vec<String>> {
        let prefix = pattern.trim_end_matches('*');
        let entries = self.entries.lock().unwrap();
        let sets = self.sets.lock().unwrap();
        Ok(entries
            .keys()
            .chain(sets.keys())
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn sadd(&self, key: &str, member: &str) -> pglane::Result<()> {
        self.sets
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    fn smembers(&self, key: &str) -> pglane::Result<Vec<String>> {
        Ok(self
            .sets
            .lock()
            .unwrap()
            .get(key)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn connected(&self) -> bool {
        true
    }
}

/// A store where every operation errors.
struct BrokenStore;

impl KeyValueStore for BrokenStore {
    fn get(&self, _key: &str) -> pglane::Result<Option<String>> {
        Err(down())
    }
    fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> pglane::Result<()> {
        Err(down())
    }
    fn del(&self, _keys: &[String]) -> pglane::Result<u64> {
        Err(down())
    }
    fn keys(&self, _pattern: &str) -> pglane::Result<Vec<String>> {
        Err(down())
    }
    fn sadd(&self, _key: &str, _member: &str) -> pglane::Result<()> {
        Err(down())
    }
    fn smembers(&self, _key: &str) -> pglane::Result<Vec<String>> {
        Err(down())
    }
    fn connected(&self) -> bool {
        false
    }
}

fn down() -> pglane::Error {
    pglane::Error::OperationFailed {
        operation: "store".to_string(),
        cause: "connection refused".to_string(),
    }
}

fn repeated_find() -> QuerySpec {
    QuerySpec::new(ExecKind::Find, "products")
        .with_predicate(Predicate::eq("category", "drones"))
        .with_take(5)
}

#[test]
fn warm_store_serves_repeated_find() {
    let coordinator =
        CacheCoordinator::new(Box::new(MemoryStore::default()), CacheSettings::default());
    let spec = repeated_find();
    let key = coordinator.fingerprint(&spec);
    let db_result = QueryResult::Rows(vec![json!({"id": 1, "name": "Drone X1"})]);

    // Cold: miss, then the executor's result is written back.
    assert!(coordinator.fetch(&key).is_none());
    coordinator.store_result(&spec, &key, &db_result);

    // Warm: an identical record produces the identical key and the cached
    // shape comes back without a database round-trip.
    let key_again = coordinator.fingerprint(&repeated_find());
    assert_eq!(key, key_again);
    assert_eq!(coordinator.fetch(&key_again), Some(db_result));
}

#[test]
fn write_to_same_table_invalidates_next_find() {
    let coordinator =
        CacheCoordinator::new(Box::new(MemoryStore::default()), CacheSettings::default());
    let spec = repeated_find();
    let key = coordinator.fingerprint(&spec);
    coordinator.store_result(&spec, &key, &QueryResult::Rows(Vec::new()));
    assert!(coordinator.fetch(&key).is_some());

    let write = QuerySpec::new(ExecKind::Insert, "products").with_payload("name", "Drone X2");
    coordinator.invalidate(&write);

    // The next identical find reaches the database.
    assert!(coordinator.fetch(&key).is_none());
}

#[test]
fn unrelated_write_keeps_cached_find() {
    let coordinator =
        CacheCoordinator::new(Box::new(MemoryStore::default()), CacheSettings::default());
    let spec = repeated_find();
    let key = coordinator.fingerprint(&spec);
    coordinator.store_result(&spec, &key, &QueryResult::Rows(Vec::new()));

    let write = QuerySpec::new(ExecKind::Insert, "orders").with_payload("total", 10i64);
    coordinator.invalidate(&write);
    assert!(coordinator.fetch(&key).is_some());
}

#[test]
fn broken_store_is_never_visible_to_callers() {
    let coordinator = CacheCoordinator::new(Box::new(BrokenStore), CacheSettings::default());
    let spec = repeated_find();
    let key = coordinator.fingerprint(&spec);

    // Every path degrades silently; none of these panic or error.
    assert!(coordinator.fetch(&key).is_none());
    coordinator.store_result(&spec, &key, &QueryResult::Rows(Vec::new()));
    coordinator.invalidate(&QuerySpec::new(ExecKind::Update, "products"));

    let stats = coordinator.stats();
    assert!(!stats.connected);
}

#[test]
fn breaker_opens_and_short_circuits_after_repeated_failures() {
    let settings = CacheSettings::default()
        .with_breaker_threshold(3)
        .with_breaker_timeout(Duration::from_secs(60));
    let coordinator = CacheCoordinator::new(Box::new(BrokenStore), settings);
    let key = "pgcache:probe";

    for _ in 0..3 {
        assert!(coordinator.fetch(key).is_none());
    }
    assert_eq!(coordinator.stats().breaker_state, "open");

    // Once open, fetches bypass the store entirely and still just miss.
    assert!(coordinator.fetch(key).is_none());
}

#[test]
fn fingerprints_ignore_nocache_and_debug() {
    let coordinator =
        CacheCoordinator::new(Box::new(MemoryStore::default()), CacheSettings::default());
    let plain = coordinator.fingerprint(&repeated_find());
    let with_flags = coordinator.fingerprint(&repeated_find().with_debug(true).with_nocache(true));
    assert_eq!(plain, with_flags);
}

#[test]
fn custom_entries_live_under_their_own_prefix() {
    let store = MemoryStore::default();
    let coordinator = CacheCoordinator::new(Box::new(store), CacheSettings::default());

    coordinator
        .custom_set("session:42", "{\"user\":7}", None)
        .unwrap();
    assert_eq!(
        coordinator.custom_get("session:42").unwrap(),
        Some("{\"user\":7}".to_string())
    );
    assert!(coordinator.custom_del("session:42").unwrap());
    assert!(!coordinator.custom_del("session:42").unwrap());
}
