//! Cache Facade Module
//!
//! The public cache API: prefixed keys, enveloped values, TTLs, and a single
//! lazily opened connection to the backing store.

use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::envelope::{self, CacheValue};
use crate::cache::key::compose_key;
use crate::cache::ttl::{expiry_deadline, ttl_calc, Expiry, Ttl};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::store::{Connector, KeyValueStore, RedisConnector, StoreError};

// == Cache ==
/// Key-value cache over a backing store.
///
/// The connection is opened by the first operation that needs one and then
/// reused until [`Cache::close`] is called or the cache is dropped. Methods
/// take `&mut self`; share a cache between threads behind a lock.
pub struct Cache<C: Connector = RedisConnector> {
    config: CacheConfig,
    connector: C,
    connection: Option<C::Store>,
}

impl Cache<RedisConnector> {
    // == Constructor ==
    /// Creates a Redis-backed cache. Does not connect.
    ///
    /// Fails only if no Redis client can be created; unreachable servers and
    /// bad credentials surface on the first operation.
    pub fn new(config: CacheConfig) -> Result<Self> {
        let connector = RedisConnector::new(&config.host, config.port)
            .map_err(|e| CacheError::Environment(e.to_string()))?;
        Ok(Self::with_connector(config, connector))
    }
}

impl<C: Connector> Cache<C> {
    /// Creates a cache over any backing store connector. Does not connect.
    pub fn with_connector(config: CacheConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            connection: None,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Whether a connection is currently held.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Returns the prefixed key `key` is stored under.
    pub fn composed_key(&self, key: &str) -> Result<String> {
        compose_key(&self.config.prefix, key)
    }

    // == Connection ==
    /// Returns the cached connection, opening it first if needed.
    ///
    /// Every failure while connecting, authenticating or selecting the
    /// database is reported as `CacheError::Connection`.
    pub fn connection(&mut self) -> Result<&mut C::Store> {
        if self.connection.is_none() {
            let store = self.open_connection()?;
            info!(
                "Cache connected to {}:{}",
                self.config.host, self.config.port
            );
            self.connection = Some(store);
        }
        self.connection
            .as_mut()
            .ok_or_else(|| CacheError::Connection("connection unavailable".to_string()))
    }

    fn open_connection(&self) -> Result<C::Store> {
        let client_error =
            |e: StoreError| CacheError::Connection(format!("A redis exception is caught: {}", e));

        let timeout = (self.config.timeout > 0.0)
            .then(|| Duration::try_from_secs_f64(self.config.timeout))
            .transpose()
            .map_err(|e| CacheError::Connection(format!("Invalid connect timeout: {}", e)))?;

        let mut store = self.connector.connect(timeout).map_err(|e| {
            CacheError::Connection(format!("Redis Cache connection failed: {}", e))
        })?;

        if let Some(password) = &self.config.password {
            if !store.auth(password).map_err(client_error)? {
                return Err(CacheError::Connection(
                    "Redis Cache authentication failed.".to_string(),
                ));
            }
        }

        if let Some(database) = self.config.database {
            if !store.select(database).map_err(client_error)? {
                return Err(CacheError::Connection(format!(
                    "Redis Cache: database {} could not be selected.",
                    database
                )));
            }
        }

        Ok(store)
    }

    // == Close ==
    /// Releases the connection. The next operation reconnects.
    pub fn close(&mut self) {
        if self.connection.take().is_some() {
            debug!("Cache connection released");
        }
    }

    // == Get ==
    /// Returns the dynamic value stored at `key`, or None if it is missing
    /// or not a well-formed envelope.
    pub fn get_value(&mut self, key: &str) -> Result<Option<CacheValue>> {
        let name = self.composed_key(key)?;
        let value = self
            .connection()?
            .get(&name)?
            .and_then(|bytes| envelope::decode(&bytes));

        match &value {
            Some(v) => debug!("Cache hit: {} ({:?})", name, v.kind()),
            None => debug!("Cache miss: {}", name),
        }
        Ok(value)
    }

    /// Returns the value stored at `key` decoded as `T`.
    ///
    /// A found envelope whose payload does not decode as `T` is a
    /// `Serialization` error, not a miss.
    pub fn get<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        match self.get_value(key)? {
            Some(value) => Ok(Some(value.into_typed()?)),
            None => Ok(None),
        }
    }

    /// Returns the value stored at `key`, or `default` if it is missing.
    pub fn get_or<T: DeserializeOwned>(&mut self, key: &str, default: T) -> Result<T> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Returns the value stored at `key`, or the result of `default` if it is
    /// missing. `default` is only called on a miss.
    pub fn get_or_else<T, F>(&mut self, key: &str, default: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnOnce() -> T,
    {
        Ok(self.get(key)?.unwrap_or_else(default))
    }

    // == Set ==
    /// Stores `value` at `key` with an optional TTL.
    ///
    /// Returns `Ok(false)` without writing if the TTL is negative or the
    /// value is not of a supported kind, and `Ok(false)` if the store refuses
    /// the write. A TTL whose deadline cannot be represented is an
    /// `InvalidArgument`, raised before any write.
    ///
    /// The expiration is applied after the write as a separate command. If
    /// that command fails the error is returned, but the value stays written
    /// without an expiration.
    pub fn set<V: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &V,
        ttl: Option<Ttl>,
    ) -> Result<bool> {
        let name = self.composed_key(key)?;
        self.set_composed(&name, value, ttl)
    }

    /// Stores a dynamic value, reading the TTL from JSON.
    ///
    /// The TTL may be `null`, an integer number of seconds or an RFC 3339
    /// deadline; any other shape is an `InvalidArgument`.
    pub fn set_json(
        &mut self,
        key: &str,
        value: &serde_json::Value,
        ttl: &serde_json::Value,
    ) -> Result<bool> {
        let name = self.composed_key(key)?;
        let ttl = Ttl::from_json(ttl)?;
        self.set_composed(&name, value, ttl)
    }

    fn set_composed<V: Serialize + ?Sized>(
        &mut self,
        name: &str,
        value: &V,
        ttl: Option<Ttl>,
    ) -> Result<bool> {
        let now = Utc::now();
        let deadline = match ttl_calc(ttl, now) {
            Expiry::Persistent => None,
            Expiry::Seconds(seconds) => Some(expiry_deadline(now, seconds)?),
            Expiry::Rejected => {
                warn!("Cache write rejected, negative TTL: {}", name);
                return Ok(false);
            }
        };

        let Some(value) = CacheValue::classify(value) else {
            warn!("Cache write rejected, unsupported value: {}", name);
            return Ok(false);
        };
        let bytes = match envelope::encode(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cache write rejected, envelope encoding failed: {}: {}", name, e);
                return Ok(false);
            }
        };

        let store = self.connection()?;
        match store.set(name, &bytes) {
            Ok(true) => {}
            Ok(false) => {
                warn!("Cache write refused: {}", name);
                return Ok(false);
            }
            Err(e) => {
                warn!("Cache write failed: {}: {}", name, e);
                return Ok(false);
            }
        }

        if let Some(deadline) = deadline {
            if !store.expire_at(name, deadline)? {
                warn!("Cache expiration not applied: {}", name);
            }
        }

        debug!("Cache set: {} (expires at: {:?})", name, deadline);
        Ok(true)
    }

    // == Delete ==
    /// Removes `key`. Returns true iff exactly one key was removed.
    pub fn delete(&mut self, key: &str) -> Result<bool> {
        let name = self.composed_key(key)?;
        let removed = self.connection()?.delete(&name)?;
        debug!("Cache delete: {} (removed: {})", name, removed);
        Ok(removed == 1)
    }

    // == Has ==
    pub fn has(&mut self, key: &str) -> Result<bool> {
        let name = self.composed_key(key)?;
        Ok(self.connection()?.exists(&name)?)
    }

    // == Counters ==
    /// Adds `offset` to the integer stored at `key` and returns the result.
    ///
    /// Counters are raw integers, not envelopes: a key written with `set`
    /// cannot be incremented, and a counter is not readable with `get`.
    pub fn increment(&mut self, key: &str, offset: i64) -> Result<i64> {
        let name = self.composed_key(key)?;
        self.incr_by(&name, offset)
    }

    /// Subtracts `offset` from the integer stored at `key`.
    pub fn decrement(&mut self, key: &str, offset: i64) -> Result<i64> {
        let name = self.composed_key(key)?;
        let delta = offset.checked_neg().ok_or_else(|| {
            CacheError::InvalidArgument(format!("decrement offset out of range: {}", offset))
        })?;
        self.incr_by(&name, delta)
    }

    fn incr_by(&mut self, name: &str, delta: i64) -> Result<i64> {
        let value = self.connection()?.incr_by(name, delta)?;
        debug!("Cache increment: {} by {} -> {}", name, delta, value);
        Ok(value)
    }

    // == Clear ==
    /// Flushes the whole selected database, including keys that do not carry
    /// this cache's prefix.
    pub fn clear(&mut self) -> Result<bool> {
        let flushed = self.connection()?.flush_db()?;
        info!("Cache database flushed");
        Ok(flushed)
    }
}
