//! Redis Cache - A small cache facade over a Redis server
//!
//! Prefixes keys, wraps values in a typed envelope and manages expiration.
//! The connection is opened lazily on the first operation and kept for the
//! lifetime of the facade.

pub mod cache;
pub mod config;
pub mod error;
pub mod store;

pub use cache::{Cache, CacheValue, Expiry, Ttl, ValueKind};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use store::{MemoryConnector, MemoryServer, RedisConnector};
