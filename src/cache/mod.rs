//! Read-through / write-invalidate cache layer.
//!
//! Reads check the store first and fall back to the database on a miss;
//! successful database reads are written back with a per-operation TTL.
//! Writes execute against the database first, then invalidate the cached
//! reads recorded against the written table. A circuit breaker guards every
//! store interaction, and the whole layer fails open: cache trouble means a
//! cache miss, never a caller-visible error.

pub mod breaker;
pub mod coordinator;
pub mod store;

pub use breaker::CircuitBreaker;
pub use coordinator::{is_write, CacheCoordinator, CacheStats};
pub use store::{KeyValueStore, RedisStore};
