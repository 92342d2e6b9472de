//! Store Module
//!
//! The backing key-value store seen by the cache facade: a `Connector` opens
//! a connection, a `KeyValueStore` runs the handful of commands the facade
//! needs on it.

mod memory;
mod redis_store;

use std::time::Duration;

use thiserror::Error;

pub use self::memory::{MemoryConnector, MemoryServer, MemoryStore, MAX_DATABASES};
pub use self::redis_store::{RedisConnector, RedisStore};

// == Store Error ==
/// Failure reported by a backing store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Error raised by the Redis client
    #[error(transparent)]
    Redis(#[from] ::redis::RedisError),

    /// The server could not be reached
    #[error("connection refused by {0}")]
    Unreachable(String),

    /// The server rejected a command
    #[error("{0}")]
    Command(String),
}

/// Convenience Result type for backing store calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// == Key Value Store ==
/// Commands a connected backing store must support.
///
/// Keys arrive already prefixed and validated; values are opaque bytes.
pub trait KeyValueStore {
    /// Authenticates the connection. Returns false if the password is rejected.
    fn auth(&mut self, password: &str) -> StoreResult<bool>;

    /// Switches to the numbered database. Returns false if it does not exist.
    fn select(&mut self, database: i64) -> StoreResult<bool>;

    /// Returns the raw bytes stored at `key`, or None if absent.
    fn get(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Stores raw bytes at `key`, replacing any value and expiration.
    fn set(&mut self, key: &str, value: &[u8]) -> StoreResult<bool>;

    /// Sets an absolute expiration as a unix timestamp in seconds.
    fn expire_at(&mut self, key: &str, unix_seconds: i64) -> StoreResult<bool>;

    /// Removes `key`, returning the number of keys removed.
    fn delete(&mut self, key: &str) -> StoreResult<u64>;

    fn exists(&mut self, key: &str) -> StoreResult<bool>;

    /// Adds `delta` to the integer stored at `key` and returns the new value.
    /// A missing key counts as 0.
    fn incr_by(&mut self, key: &str, delta: i64) -> StoreResult<i64>;

    /// Removes every key of the selected database.
    fn flush_db(&mut self) -> StoreResult<bool>;
}

// == Connector ==
/// Opens connections to the backing store it points at.
pub trait Connector {
    type Store: KeyValueStore;

    /// Opens a new connection. A `timeout` of None waits indefinitely.
    fn connect(&self, timeout: Option<Duration>) -> StoreResult<Self::Store>;
}
