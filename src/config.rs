//! Configuration surfaces for the cache layer and its store.

use std::str::FromStr;
use std::time::Duration;

/// Default cache key prefix.
pub const DEFAULT_KEY_PREFIX: &str = "pgcache:";

/// Cache layer tuning knobs.
///
/// Every knob is clamped to a sensible minimum by [`CacheSettings::effective`];
/// the clamped value is what the cache layer actually runs with.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Base TTL applied to cached results.
    pub default_ttl: Duration,
    /// Upper bound no per-operation TTL adjustment may exceed.
    pub max_ttl: Duration,
    /// Prefix for every key the layer writes.
    pub key_prefix: String,
    /// Maximum store attempts per operation.
    pub max_retries: u32,
    /// Base delay between retries; attempt `i` waits `retry_delay * i`.
    pub retry_delay: Duration,
    /// Consecutive store failures before the circuit breaker opens.
    pub breaker_threshold: u32,
    /// How long the breaker stays open before allowing a probe.
    pub breaker_timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            max_ttl: Duration::from_secs(3600),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
            breaker_threshold: 5,
            breaker_timeout: Duration::from_secs(30),
        }
    }
}

impl CacheSettings {
    /// Loads cache settings from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies `PGLANE_CACHE_*` environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(secs) = parse_env::<u64>("PGLANE_CACHE_DEFAULT_TTL_SECS") {
            self.default_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>("PGLANE_CACHE_MAX_TTL_SECS") {
            self.max_ttl = Duration::from_secs(secs);
        }
        if let Ok(prefix) = std::env::var("PGLANE_CACHE_KEY_PREFIX") {
            self.key_prefix = prefix;
        }
        if let Some(retries) = parse_env::<u32>("PGLANE_CACHE_MAX_RETRIES") {
            self.max_retries = retries;
        }
        if let Some(ms) = parse_env::<u64>("PGLANE_CACHE_RETRY_DELAY_MS") {
            self.retry_delay = Duration::from_millis(ms);
        }
        if let Some(threshold) = parse_env::<u32>("PGLANE_CACHE_BREAKER_THRESHOLD") {
            self.breaker_threshold = threshold;
        }
        if let Some(secs) = parse_env::<u64>("PGLANE_CACHE_BREAKER_TIMEOUT_SECS") {
            self.breaker_timeout = Duration::from_secs(secs);
        }
        self
    }

    /// Sets the base TTL.
    #[must_use]
    pub const fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Sets the TTL upper bound.
    #[must_use]
    pub const fn with_max_ttl(mut self, ttl: Duration) -> Self {
        self.max_ttl = ttl;
        self
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Sets the maximum store attempts per operation.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the base retry delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the breaker failure threshold.
    #[must_use]
    pub const fn with_breaker_threshold(mut self, threshold: u32) -> Self {
        self.breaker_threshold = threshold;
        self
    }

    /// Sets the breaker open timeout.
    #[must_use]
    pub const fn with_breaker_timeout(mut self, timeout: Duration) -> Self {
        self.breaker_timeout = timeout;
        self
    }

    /// Returns the effective configuration with every knob clamped to its
    /// minimum.
    #[must_use]
    pub fn effective(mut self) -> Self {
        self.default_ttl = self.default_ttl.max(Duration::from_secs(1));
        self.max_ttl = self.max_ttl.max(self.default_ttl);
        if self.key_prefix.is_empty() {
            self.key_prefix = DEFAULT_KEY_PREFIX.to_string();
        }
        self.max_retries = self.max_retries.max(1);
        self.retry_delay = self.retry_delay.max(Duration::from_millis(10));
        self.breaker_threshold = self.breaker_threshold.max(1);
        self.breaker_timeout = self.breaker_timeout.max(Duration::from_secs(1));
        self
    }
}

/// Location of the external key-value store.
#[derive(Debug, Clone)]
pub struct CacheTarget {
    /// Store host.
    pub host: String,
    /// Store port.
    pub port: u16,
    /// Optional password.
    pub password: Option<String>,
}

impl Default for CacheTarget {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
        }
    }
}

impl CacheTarget {
    /// Creates a target for the given host and port.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: None,
        }
    }

    /// Sets the store password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Connection URL for the store client.
    #[must_use]
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!("redis://:{password}@{}:{}/", self.host, self.port),
            None => format!("redis://{}:{}/", self.host, self.port),
        }
    }
}

/// Parses an environment variable, ignoring unset or malformed values.
fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}
