//! Cache coordination: fingerprints, TTL policy, read-through and
//! write-invalidate routing.
//!
//! The coordinator is strictly fail-open. Every store interaction is guarded
//! by the circuit breaker; an open breaker, a store error, or a corrupt
//! entry all degrade to "not cached" and the request proceeds against the
//! database. Callers never observe cache failures as errors.
//!
//! Invalidation keeps an exact secondary index instead of scanning keys:
//! alongside each cached entry the key is recorded in a per-table dependency
//! set, and table-less raw reads are recorded in a shared `dep:raw` set. A
//! write drops its table's set plus the raw set; a table-less raw write
//! flushes the whole prefix.

use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::breaker::CircuitBreaker;
use super::store::KeyValueStore;
use crate::config::CacheSettings;
use crate::models::{ExecKind, Predicate, QueryResult, QuerySpec};
use crate::observability;
use crate::Result;

/// Matcher for raw statements that mutate data.
fn write_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*(insert|update|delete|drop|truncate)\b")
            .expect("write pattern is valid")
    })
}

/// Returns whether a filter record mutates data and must invalidate instead
/// of reading through.
///
/// Structured kinds classify directly; raw kinds classify by their leading
/// keyword, case-insensitively.
#[must_use]
pub fn is_write(spec: &QuerySpec) -> bool {
    match spec.exec {
        ExecKind::Insert
        | ExecKind::Update
        | ExecKind::Remove
        | ExecKind::Drop
        | ExecKind::Truncate => true,
        ExecKind::Query | ExecKind::Command => spec
            .query
            .as_deref()
            .is_some_and(|query| write_pattern().is_match(query)),
        _ => false,
    }
}

/// Store health snapshot for the admin surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Whether the store currently answers.
    pub connected: bool,
    /// Breaker state name: `closed`, `open` or `half_open`.
    pub breaker_state: &'static str,
    /// Breaker failure count.
    pub failures: u32,
}

/// Read-through / write-invalidate coordinator in front of one store.
pub struct CacheCoordinator {
    store: Box<dyn KeyValueStore>,
    breaker: Mutex<CircuitBreaker>,
    settings: CacheSettings,
}

impl CacheCoordinator {
    /// Creates a coordinator over the given store.
    #[must_use]
    pub fn new(store: Box<dyn KeyValueStore>, settings: CacheSettings) -> Self {
        let settings = settings.effective();
        let breaker = CircuitBreaker::new(settings.breaker_threshold, settings.breaker_timeout);
        Self {
            store,
            breaker: Mutex::new(breaker),
            settings,
        }
    }

    /// Deterministic cache key for a filter record.
    ///
    /// The key is the configured prefix plus a SHA-256 over the canonical
    /// serialization of the record's read-relevant attributes; identical
    /// records always produce identical keys.
    #[must_use]
    pub fn fingerprint(&self, spec: &QuerySpec) -> String {
        #[derive(Serialize)]
        struct KeyParts<'a> {
            exec: &'a str,
            table: &'a str,
            schema: &'a str,
            filter: &'a [Predicate],
            sort: &'a [String],
            fields: &'a [String],
            language: Option<&'a str>,
            take: Option<u32>,
            skip: Option<u32>,
            query: Option<&'a str>,
        }

        let parts = KeyParts {
            exec: spec.exec.as_str(),
            table: &spec.table,
            schema: spec.schema.as_deref().unwrap_or("default"),
            filter: &spec.filter,
            sort: &spec.sort,
            fields: &spec.fields,
            language: spec.language.as_deref(),
            take: spec.take,
            skip: spec.skip,
            query: spec.query.as_deref(),
        };
        let canonical = serde_json::to_vec(&parts).unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        format!("{}{:x}", self.settings.key_prefix, hasher.finalize())
    }

    /// Read path: returns the cached result for `key`, or `None` on miss,
    /// open breaker, store error or corrupt entry.
    pub fn fetch(&self, key: &str) -> Option<QueryResult> {
        if !self.allow() {
            observability::record_cache("bypass");
            return None;
        }
        match self.store.get(key) {
            Ok(Some(payload)) => {
                self.on_success();
                match serde_json::from_str(&payload) {
                    Ok(result) => {
                        observability::record_cache("hit");
                        Some(result)
                    },
                    Err(error) => {
                        tracing::warn!(
                            target: "cache",
                            key,
                            error = %error,
                            "corrupt cache entry, dropping"
                        );
                        observability::record_cache("error");
                        let _ = self.store.del(&[key.to_string()]);
                        None
                    },
                }
            },
            Ok(None) => {
                self.on_success();
                observability::record_cache("miss");
                None
            },
            Err(error) => {
                self.on_failure("store_get", &error);
                observability::record_cache("error");
                None
            },
        }
    }

    /// Write-through after a successful database read: stores the result
    /// under `key` and records the key in the table's dependency set.
    /// Best-effort; failures are logged and fed to the breaker only.
    pub fn store_result(&self, spec: &QuerySpec, key: &str, result: &QueryResult) {
        if !self.allow() {
            return;
        }
        let Ok(payload) = serde_json::to_string(result) else {
            return;
        };
        let ttl = self.ttl_for(spec);
        let written = self
            .store
            .set_ex(key, &payload, ttl)
            .and_then(|()| self.store.sadd(&self.dependency_key(spec), key));
        match written {
            Ok(()) => self.on_success(),
            Err(error) => self.on_failure("store_set", &error),
        }
    }

    /// Write path: drops every cached read recorded against the written
    /// table, plus all table-less raw reads. Best-effort; failures are
    /// logged only.
    pub fn invalidate(&self, spec: &QuerySpec) {
        if !self.allow() {
            return;
        }
        let outcome = if spec.table.is_empty() {
            // Raw write with no table attribute: nothing to pin the blast
            // radius to, so the whole prefix goes.
            self.flush()
        } else {
            self.invalidate_table(&spec.table, spec.schema.as_deref())
        };
        match outcome {
            Ok(removed) => {
                self.on_success();
                tracing::debug!(
                    target: "cache",
                    table = %spec.table,
                    removed,
                    "invalidated cached reads"
                );
            },
            Err(error) => self.on_failure("store_invalidate", &error),
        }
    }

    /// Drops the dependency sets of one table (and the raw-read set),
    /// returning how many entries were removed.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unreachable.
    pub fn invalidate_table(&self, table: &str, schema: Option<&str>) -> Result<u64> {
        let mut removed = 0;
        for dependency_key in [self.table_dependency_key(table, schema), self.raw_dependency_key()]
        {
            let members = self.store.smembers(&dependency_key)?;
            if !members.is_empty() {
                removed += self.store.del(&members)?;
            }
            self.store.del(&[dependency_key])?;
        }
        Ok(removed)
    }

    /// Deletes every key under the configured prefix.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unreachable.
    pub fn flush(&self) -> Result<u64> {
        let keys = self.store.keys(&format!("{}*", self.settings.key_prefix))?;
        if keys.is_empty() {
            return Ok(0);
        }
        self.store.del(&keys)
    }

    /// Store and breaker snapshot.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let breaker = self.breaker.lock().unwrap_or_else(PoisonError::into_inner);
        CacheStats {
            connected: self.store.connected(),
            breaker_state: breaker.state_name(),
            failures: breaker.failure_count(),
        }
    }

    /// Writes a caller-managed entry under the custom prefix.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unreachable.
    pub fn custom_set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.store.set_ex(
            &self.custom_key(key),
            value,
            ttl.unwrap_or(self.settings.default_ttl),
        )
    }

    /// Reads a caller-managed entry.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unreachable.
    pub fn custom_get(&self, key: &str) -> Result<Option<String>> {
        self.store.get(&self.custom_key(key))
    }

    /// Deletes a caller-managed entry, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unreachable.
    pub fn custom_del(&self, key: &str) -> Result<bool> {
        Ok(self.store.del(&[self.custom_key(key)])? > 0)
    }

    /// Per-operation TTL, clamped to the configured maximum.
    fn ttl_for(&self, spec: &QuerySpec) -> Duration {
        let base = self.settings.default_ttl;
        let ttl = match spec.exec {
            ExecKind::Count | ExecKind::Scalar => base * 2,
            ExecKind::Find | ExecKind::Read if spec.take.map_or(true, |take| take <= 10) => {
                base * 3
            },
            ExecKind::List => (base / 2).max(Duration::from_secs(60)),
            _ => base,
        };
        ttl.min(self.settings.max_ttl)
    }

    fn dependency_key(&self, spec: &QuerySpec) -> String {
        if spec.table.is_empty() {
            self.raw_dependency_key()
        } else {
            self.table_dependency_key(&spec.table, spec.schema.as_deref())
        }
    }

    fn table_dependency_key(&self, table: &str, schema: Option<&str>) -> String {
        format!(
            "{}dep:{}.{table}",
            self.settings.key_prefix,
            schema.unwrap_or("default")
        )
    }

    fn raw_dependency_key(&self) -> String {
        format!("{}dep:raw", self.settings.key_prefix)
    }

    fn custom_key(&self, key: &str) -> String {
        format!("{}custom:{key}", self.settings.key_prefix)
    }

    fn allow(&self) -> bool {
        let mut breaker = self.breaker.lock().unwrap_or_else(PoisonError::into_inner);
        let allowed = breaker.allow();
        observability::record_breaker_state(breaker.state_value());
        allowed
    }

    fn on_success(&self) {
        let mut breaker = self.breaker.lock().unwrap_or_else(PoisonError::into_inner);
        breaker.on_success();
        observability::record_breaker_state(breaker.state_value());
    }

    fn on_failure(&self, operation: &'static str, error: &crate::Error) {
        tracing::warn!(target: "cache", operation, error = %error, "cache store failure");
        let mut breaker = self.breaker.lock().unwrap_or_else(PoisonError::into_inner);
        breaker.on_failure();
        observability::record_breaker_state(breaker.state_value());
    }
}
