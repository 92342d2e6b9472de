//! Redis Store Module
//!
//! Backing store over the `redis` crate's synchronous connection.

use std::time::Duration;

use redis::{Client, Commands, ConnectionAddr, ConnectionInfo, ErrorKind, RedisConnectionInfo};
use tracing::debug;

use super::{Connector, KeyValueStore, StoreResult};

// == Redis Connector ==
/// Opens connections to a single Redis server.
///
/// Creating the connector does not touch the network. The connection info
/// carries neither password nor database: the facade runs AUTH and SELECT
/// itself so each step can fail on its own.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    client: Client,
}

impl RedisConnector {
    pub fn new(host: &str, port: u16) -> redis::RedisResult<Self> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(host.to_string(), port),
            redis: RedisConnectionInfo::default(),
        };
        let client = Client::open(info)?;
        Ok(Self { client })
    }
}

impl Connector for RedisConnector {
    type Store = RedisStore;

    fn connect(&self, timeout: Option<Duration>) -> StoreResult<RedisStore> {
        debug!("Opening Redis connection to {:?}", self.client.get_connection_info().addr);
        let conn = match timeout {
            Some(timeout) => self.client.get_connection_with_timeout(timeout)?,
            None => self.client.get_connection()?,
        };
        Ok(RedisStore { conn })
    }
}

// == Redis Store ==
/// A live Redis connection.
pub struct RedisStore {
    conn: redis::Connection,
}

/// Maps a server-side refusal to `false`, keeping transport errors as errors.
fn refused_as_false(result: redis::RedisResult<()>) -> StoreResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::IoError => Err(e.into()),
        Err(e) => {
            debug!("Redis refused command: {}", e);
            Ok(false)
        }
    }
}

impl KeyValueStore for RedisStore {
    fn auth(&mut self, password: &str) -> StoreResult<bool> {
        refused_as_false(redis::cmd("AUTH").arg(password).query(&mut self.conn))
    }

    fn select(&mut self, database: i64) -> StoreResult<bool> {
        refused_as_false(redis::cmd("SELECT").arg(database).query(&mut self.conn))
    }

    fn get(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.conn.get(key)?)
    }

    fn set(&mut self, key: &str, value: &[u8]) -> StoreResult<bool> {
        let _: () = self.conn.set(key, value)?;
        Ok(true)
    }

    fn expire_at(&mut self, key: &str, unix_seconds: i64) -> StoreResult<bool> {
        Ok(redis::cmd("EXPIREAT")
            .arg(key)
            .arg(unix_seconds)
            .query(&mut self.conn)?)
    }

    fn delete(&mut self, key: &str) -> StoreResult<u64> {
        Ok(self.conn.del(key)?)
    }

    fn exists(&mut self, key: &str) -> StoreResult<bool> {
        Ok(self.conn.exists(key)?)
    }

    fn incr_by(&mut self, key: &str, delta: i64) -> StoreResult<i64> {
        Ok(self.conn.incr(key, delta)?)
    }

    fn flush_db(&mut self) -> StoreResult<bool> {
        let _: () = redis::cmd("FLUSHDB").query(&mut self.conn)?;
        Ok(true)
    }
}
