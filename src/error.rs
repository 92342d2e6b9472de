//! Error types for the cache facade
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

use crate::store::StoreError;

// == Cache Error Enum ==
/// Unified error type for the cache facade.
///
/// Soft failures of `set` (unsupported value, negative TTL, rejected write)
/// are not errors; they are reported as `Ok(false)`.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The backing store client could not be created
    #[error("Environment error: {0}")]
    Environment(String),

    /// Connecting, authenticating or selecting the database failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Composed key contains a forbidden character
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// TTL or option document of an unsupported shape
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Backing store command failed after the connection was established
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Stored payload does not decode into the requested type
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the cache facade.
pub type Result<T> = std::result::Result<T, CacheError>;
