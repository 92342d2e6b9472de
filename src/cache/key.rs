//! Key Module
//!
//! Composes the prefixed key sent to the store and rejects reserved characters.

use crate::error::{CacheError, Result};

/// Characters a composed key must not contain
pub const FORBIDDEN_KEY_CHARS: &str = "{}()/\\@:";

// == Compose Key ==
/// Prepends `prefix` to `key` and validates the result.
pub fn compose_key(prefix: &str, key: &str) -> Result<String> {
    let name = format!("{}{}", prefix, key);
    validate_key(&name)?;
    Ok(name)
}

// == Validate Key ==
/// Fails with `InvalidKey` if `name` contains any of [`FORBIDDEN_KEY_CHARS`].
pub fn validate_key(name: &str) -> Result<()> {
    if name.contains(|c| FORBIDDEN_KEY_CHARS.contains(c)) {
        return Err(CacheError::InvalidKey(format!(
            "Cache name cannot contain \"{}\" characters: {}",
            FORBIDDEN_KEY_CHARS, name
        )));
    }
    Ok(())
}
