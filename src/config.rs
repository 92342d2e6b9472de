//! Configuration Module
//!
//! Handles loading and managing the facade's connection configuration from
//! defaults, option documents and environment variables.

use std::env;

use serde::Deserialize;

use crate::error::{CacheError, Result};

/// Default key prefix
pub const DEFAULT_PREFIX: &str = "cache_";

/// Default Redis host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default Redis port
pub const DEFAULT_PORT: u16 = 6379;

/// Connection configuration for the cache facade.
///
/// Fixed once the facade is constructed. Every field has a default, so an
/// option document only needs to carry the keys it wants to override.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Prepended to every caller-supplied key
    pub prefix: String,
    /// Redis server host
    pub host: String,
    /// Password sent with AUTH, None = no authentication
    pub password: Option<String>,
    /// Redis server port
    pub port: u16,
    /// Connect timeout in seconds, 0 = no timeout
    pub timeout: f64,
    /// Database index sent with SELECT, None = no selection
    pub database: Option<i64>,
}

impl CacheConfig {
    /// Merges a JSON object of options over the defaults.
    ///
    /// Unknown keys are ignored. An explicit `null` for `password` or
    /// `database` disables that connection step.
    pub fn from_options(options: serde_json::Value) -> Result<Self> {
        if !options.is_object() {
            return Err(CacheError::InvalidArgument(
                "cache options must be a JSON object".to_string(),
            ));
        }
        serde_json::from_value(options).map_err(|e| CacheError::InvalidArgument(e.to_string()))
    }

    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_PREFIX` - Key prefix (default: cache_)
    /// - `REDIS_HOST` - Redis host (default: 127.0.0.1)
    /// - `REDIS_PASSWORD` - Redis password (default: none)
    /// - `REDIS_PORT` - Redis port (default: 6379)
    /// - `REDIS_TIMEOUT` - Connect timeout in seconds (default: 0)
    /// - `REDIS_DATABASE` - Database index (default: 0)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            prefix: env::var("CACHE_PREFIX").unwrap_or(defaults.prefix),
            host: env::var("REDIS_HOST").unwrap_or(defaults.host),
            password: env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()),
            port: env::var("REDIS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            timeout: env::var("REDIS_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout),
            database: env::var("REDIS_DATABASE")
                .ok()
                .and_then(|v| v.parse().ok())
                .or(defaults.database),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn with_database(mut self, database: Option<i64>) -> Self {
        self.database = database;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            host: DEFAULT_HOST.to_string(),
            password: None,
            port: DEFAULT_PORT,
            timeout: 0.0,
            database: Some(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.prefix, "cache_");
        assert_eq!(config.host, "127.0.0.1");
        assert!(config.password.is_none());
        assert_eq!(config.port, 6379);
        assert_eq!(config.timeout, 0.0);
        assert_eq!(config.database, Some(0));
    }

    #[test]
    fn test_options_merge_over_defaults() {
        let config = CacheConfig::from_options(json!({
            "prefix": "app_",
            "port": 6380,
            "unknown": "ignored"
        }))
        .unwrap();

        assert_eq!(config.prefix, "app_");
        assert_eq!(config.port, 6380);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.database, Some(0));
    }

    #[test]
    fn test_options_null_disables_steps() {
        let config = CacheConfig::from_options(json!({
            "password": null,
            "database": null
        }))
        .unwrap();

        assert!(config.password.is_none());
        assert!(config.database.is_none());
    }

    #[test]
    fn test_options_empty_object_is_default() {
        let config = CacheConfig::from_options(json!({})).unwrap();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_options_must_be_object() {
        let result = CacheConfig::from_options(json!(["prefix"]));
        assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
    }

    #[test]
    fn test_options_wrong_type() {
        let result = CacheConfig::from_options(json!({ "port": "not a port" }));
        assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
    }

    #[test]
    fn test_builder_setters() {
        let config = CacheConfig::default()
            .with_prefix("p_")
            .with_host("redis.local")
            .with_password("secret")
            .with_port(7000)
            .with_timeout(2.5)
            .with_database(None);

        assert_eq!(config.prefix, "p_");
        assert_eq!(config.host, "redis.local");
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.port, 7000);
        assert_eq!(config.timeout, 2.5);
        assert!(config.database.is_none());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("CACHE_PREFIX");
        env::remove_var("REDIS_HOST");
        env::remove_var("REDIS_PASSWORD");
        env::remove_var("REDIS_PORT");
        env::remove_var("REDIS_TIMEOUT");
        env::remove_var("REDIS_DATABASE");

        let config = CacheConfig::from_env();
        assert_eq!(config, CacheConfig::default());
    }
}
