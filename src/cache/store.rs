//! Cache store client.
//!
//! [`RedisStore`] maintains a reusable connection via
//! `Mutex<Option<Connection>>`: the connection is lazily created, handed out
//! for one command, and returned on success. A failed command drops the
//! connection so the next attempt starts fresh. Connections carry a
//! five-second read/write timeout so a slow store cannot block callers
//! indefinitely.
//!
//! Every command retries up to the configured attempt limit with linear
//! backoff: attempt `i` waits `retry_delay * i` before the next try.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use redis::{Client, Commands, Connection};

use crate::config::{CacheSettings, CacheTarget};
use crate::{Error, Result};

/// Response timeout for store commands.
const STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Operations the cache layer needs from a key-value store.
///
/// The production implementation is [`RedisStore`]; tests substitute
/// in-memory or failing stores to exercise the fail-open paths.
pub trait KeyValueStore: Send + Sync {
    /// Reads a key.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unreachable.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes a key with a TTL.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unreachable.
    fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Deletes keys, returning how many existed.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unreachable.
    fn del(&self, keys: &[String]) -> Result<u64>;

    /// Lists keys matching a glob pattern.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unreachable.
    fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Adds a member to a set.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unreachable.
    fn sadd(&self, key: &str, member: &str) -> Result<()>;

    /// Reads all members of a set.
    ///
    /// # Errors
    ///
    /// Returns an error when the store is unreachable.
    fn smembers(&self, key: &str) -> Result<Vec<String>>;

    /// Whether the store currently answers a ping.
    fn connected(&self) -> bool;
}

/// Redis-backed [`KeyValueStore`].
pub struct RedisStore {
    client: Client,
    connection: Mutex<Option<Connection>>,
    max_retries: u32,
    retry_delay: Duration,
}

impl RedisStore {
    /// Creates a store client for the given target.
    ///
    /// The underlying connection is established lazily on first use.
    ///
    /// # Errors
    ///
    /// Returns an error when the target renders an invalid connection URL.
    pub fn connect(target: &CacheTarget, settings: &CacheSettings) -> Result<Self> {
        let client = Client::open(target.url()).map_err(|e| Error::OperationFailed {
            operation: "store_connect".to_string(),
            cause: e.to_string(),
        })?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
            max_retries: settings.max_retries.max(1),
            retry_delay: settings.retry_delay,
        })
    }

    /// Takes the cached connection, creating a fresh one when absent.
    fn get_connection(&self) -> Result<Connection> {
        let mut guard = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(connection) = guard.take() {
            return Ok(connection);
        }
        drop(guard);

        let connection = self
            .client
            .get_connection()
            .map_err(|e| Error::OperationFailed {
                operation: "store_get_connection".to_string(),
                cause: e.to_string(),
            })?;
        connection
            .set_read_timeout(Some(STORE_TIMEOUT))
            .map_err(|e| Error::OperationFailed {
                operation: "store_set_read_timeout".to_string(),
                cause: e.to_string(),
            })?;
        connection
            .set_write_timeout(Some(STORE_TIMEOUT))
            .map_err(|e| Error::OperationFailed {
                operation: "store_set_write_timeout".to_string(),
                cause: e.to_string(),
            })?;
        Ok(connection)
    }

    /// Returns a healthy connection to the cache for reuse.
    fn return_connection(&self, connection: Connection) {
        if let Ok(mut guard) = self.connection.lock() {
            *guard = Some(connection);
        }
    }

    /// Runs one command with bounded, linearly backed-off retries.
    fn with_retry<T>(
        &self,
        operation: &'static str,
        mut command: impl FnMut(&mut Connection) -> redis::RedisResult<T>,
    ) -> Result<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = self.try_once(operation, &mut command);
            match outcome {
                Ok(value) => return Ok(value),
                Err(error) if attempt < self.max_retries => {
                    tracing::debug!(
                        target: "cache",
                        operation,
                        attempt,
                        max_attempts = self.max_retries,
                        error = %error,
                        "store command failed, retrying"
                    );
                    std::thread::sleep(self.retry_delay * attempt);
                },
                Err(error) => return Err(error),
            }
        }
    }

    fn try_once<T>(
        &self,
        operation: &'static str,
        command: &mut impl FnMut(&mut Connection) -> redis::RedisResult<T>,
    ) -> Result<T> {
        let mut connection = self.get_connection()?;
        match command(&mut connection) {
            Ok(value) => {
                self.return_connection(connection);
                Ok(value)
            },
            // A failed connection is dropped; the next attempt starts fresh.
            Err(e) => Err(Error::OperationFailed {
                operation: operation.to_string(),
                cause: e.to_string(),
            }),
        }
    }
}

impl KeyValueStore for RedisStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_retry("store_get", |connection| connection.get(key))
    }

    fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let seconds = ttl.as_secs().max(1);
        self.with_retry("store_set", |connection| {
            connection.set_ex(key, value, seconds)
        })
    }

    fn del(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.with_retry("store_del", |connection| connection.del(keys))
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.with_retry("store_keys", |connection| connection.keys(pattern))
    }

    fn sadd(&self, key: &str, member: &str) -> Result<()> {
        self.with_retry("store_sadd", |connection| connection.sadd(key, member))
    }

    fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.with_retry("store_smembers", |connection| connection.smembers(key))
    }

    fn connected(&self) -> bool {
        let Ok(mut connection) = self.get_connection() else {
            return false;
        };
        let alive = redis::cmd("PING")
            .query::<String>(&mut connection)
            .is_ok();
        if alive {
            self.return_connection(connection);
        }
        alive
    }
}
