//! Cache Module
//!
//! Provides the cache facade with key prefixing, typed value envelopes and
//! TTL normalization.

mod envelope;
mod facade;
mod key;
mod ttl;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use envelope::{decode, encode, CacheValue, ValueKind};
pub use facade::Cache;
pub use key::{compose_key, validate_key, FORBIDDEN_KEY_CHARS};
pub use ttl::{expiry_deadline, ttl_calc, Expiry, Ttl};
