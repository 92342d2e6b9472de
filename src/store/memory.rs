//! Memory Store Module
//!
//! In-process backing store with Redis semantics for the commands the facade
//! uses: numbered databases, optional password, absolute expiration and
//! integer counters over raw values.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

use super::{Connector, KeyValueStore, StoreError, StoreResult};

/// Number of databases a memory server exposes (Redis default)
pub const MAX_DATABASES: usize = 16;

// == Entry ==
/// A stored value with its optional expiration.
#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    expires_at: Option<u64>,
}

impl Entry {
    fn new(value: Vec<u8>) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// An entry is expired once the current time reaches its expiration.
    fn is_expired(&self, now_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }
}

/// Returns current Unix timestamp in milliseconds.
fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// == Server State ==
#[derive(Debug)]
struct ServerState {
    databases: Vec<HashMap<String, Entry>>,
    password: Option<String>,
    accepting: bool,
    read_only: bool,
}

impl ServerState {
    /// Returns the live entry at `key`, dropping it first if it has expired.
    /// None for a missing key or a database index out of range.
    fn live_entry(&mut self, database: usize, key: &str) -> Option<&mut Entry> {
        let db = self.databases.get_mut(database)?;
        if db
            .get(key)
            .is_some_and(|entry| entry.is_expired(current_timestamp_ms()))
        {
            db.remove(key);
        }
        db.get_mut(key)
    }
}

// == Memory Server ==
/// Shared handle to an in-process key-value server.
///
/// Clones point at the same data, so several facades (and the test that
/// built them) observe one another's writes the way clients of one Redis
/// server do.
#[derive(Debug, Clone)]
pub struct MemoryServer {
    state: Arc<Mutex<ServerState>>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                databases: vec![HashMap::new(); MAX_DATABASES],
                password: None,
                accepting: true,
                read_only: false,
            })),
        }
    }

    /// Creates a server that requires AUTH before any data command.
    pub fn with_password(password: impl Into<String>) -> Self {
        let server = Self::new();
        if let Ok(mut state) = server.state.lock() {
            state.password = Some(password.into());
        }
        server
    }

    /// Returns a connector opening connections to this server.
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            server: self.clone(),
        }
    }

    /// Stops or resumes accepting new connections. Open ones are unaffected.
    pub fn set_accepting(&self, accepting: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.accepting = accepting;
        }
    }

    /// Makes every client write fail with a READONLY error, as a replica
    /// does. Reads and raw access are unaffected.
    pub fn set_read_only(&self, read_only: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.read_only = read_only;
        }
    }

    /// Writes raw bytes, bypassing any client. Ignored if `database` is out
    /// of range.
    pub fn insert_raw(&self, database: usize, key: &str, value: impl Into<Vec<u8>>) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(db) = state.databases.get_mut(database) {
                db.insert(key.to_string(), Entry::new(value.into()));
            }
        }
    }

    /// Reads raw bytes, bypassing any client.
    pub fn get_raw(&self, database: usize, key: &str) -> Option<Vec<u8>> {
        let mut state = self.state.lock().ok()?;
        state.live_entry(database, key).map(|entry| entry.value.clone())
    }

    /// Remaining time to live of `key`, None if absent or persistent.
    pub fn ttl(&self, database: usize, key: &str) -> Option<Duration> {
        let mut state = self.state.lock().ok()?;
        let expires = state.live_entry(database, key)?.expires_at?;
        Some(Duration::from_millis(
            expires.saturating_sub(current_timestamp_ms()),
        ))
    }

    /// Number of live keys in `database`.
    pub fn len(&self, database: usize) -> usize {
        let now = current_timestamp_ms();
        self.state
            .lock()
            .ok()
            .and_then(|state| {
                state
                    .databases
                    .get(database)
                    .map(|db| db.values().filter(|entry| !entry.is_expired(now)).count())
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self, database: usize) -> bool {
        self.len(database) == 0
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, ServerState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Command("memory server state poisoned".to_string()))
    }
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

// == Memory Connector ==
/// Opens connections to a [`MemoryServer`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    server: MemoryServer,
}

impl Connector for MemoryConnector {
    type Store = MemoryStore;

    fn connect(&self, _timeout: Option<Duration>) -> StoreResult<MemoryStore> {
        let state = self.server.lock()?;
        if !state.accepting {
            return Err(StoreError::Unreachable("memory server".to_string()));
        }
        let authenticated = state.password.is_none();
        drop(state);

        debug!("Opened memory store connection");
        Ok(MemoryStore {
            server: self.server.clone(),
            database: 0,
            authenticated,
        })
    }
}

// == Memory Store ==
/// A connection to a [`MemoryServer`], with its own selected database.
#[derive(Debug)]
pub struct MemoryStore {
    server: MemoryServer,
    database: usize,
    authenticated: bool,
}

impl MemoryStore {
    /// Locks the server for a data command, enforcing authentication.
    fn state(&self) -> StoreResult<MutexGuard<'_, ServerState>> {
        if !self.authenticated {
            return Err(StoreError::Command(
                "NOAUTH Authentication required.".to_string(),
            ));
        }
        self.server.lock()
    }

    /// Locks the server for a write command, enforcing read-only mode.
    fn writable_state(&self) -> StoreResult<MutexGuard<'_, ServerState>> {
        let state = self.state()?;
        if state.read_only {
            return Err(StoreError::Command(
                "READONLY You can't write against a read only replica.".to_string(),
            ));
        }
        Ok(state)
    }
}

impl KeyValueStore for MemoryStore {
    fn auth(&mut self, password: &str) -> StoreResult<bool> {
        let state = self.server.lock()?;
        let accepted = match &state.password {
            Some(expected) => expected == password,
            None => {
                return Err(StoreError::Command(
                    "ERR AUTH called without any password configured".to_string(),
                ))
            }
        };
        drop(state);
        self.authenticated = accepted;
        Ok(accepted)
    }

    fn select(&mut self, database: i64) -> StoreResult<bool> {
        self.state()?;
        match usize::try_from(database) {
            Ok(index) if index < MAX_DATABASES => {
                self.database = index;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn get(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let database = self.database;
        let mut state = self.state()?;
        Ok(state
            .live_entry(database, key)
            .map(|entry| entry.value.clone()))
    }

    fn set(&mut self, key: &str, value: &[u8]) -> StoreResult<bool> {
        let database = self.database;
        let mut state = self.writable_state()?;
        state.databases[database].insert(key.to_string(), Entry::new(value.to_vec()));
        Ok(true)
    }

    fn expire_at(&mut self, key: &str, unix_seconds: i64) -> StoreResult<bool> {
        let database = self.database;
        let mut state = self.writable_state()?;
        match state.live_entry(database, key) {
            Some(entry) => {
                entry.expires_at = Some((unix_seconds.max(0) as u64).saturating_mul(1000));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete(&mut self, key: &str) -> StoreResult<u64> {
        let database = self.database;
        let mut state = self.writable_state()?;
        if state.live_entry(database, key).is_none() {
            return Ok(0);
        }
        state.databases[database].remove(key);
        Ok(1)
    }

    fn exists(&mut self, key: &str) -> StoreResult<bool> {
        let database = self.database;
        let mut state = self.state()?;
        Ok(state.live_entry(database, key).is_some())
    }

    fn incr_by(&mut self, key: &str, delta: i64) -> StoreResult<i64> {
        let database = self.database;
        let mut state = self.writable_state()?;
        let not_an_integer =
            || StoreError::Command("ERR value is not an integer or out of range".to_string());

        let current = match state.live_entry(database, key) {
            Some(entry) => std::str::from_utf8(&entry.value)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(not_an_integer)?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or_else(|| {
            StoreError::Command("ERR increment or decrement would overflow".to_string())
        })?;

        // INCRBY keeps an existing expiration
        let bytes = next.to_string().into_bytes();
        match state.live_entry(database, key) {
            Some(entry) => entry.value = bytes,
            None => {
                state.databases[database].insert(key.to_string(), Entry::new(bytes));
            }
        }
        Ok(next)
    }

    fn flush_db(&mut self) -> StoreResult<bool> {
        let database = self.database;
        let mut state = self.writable_state()?;
        state.databases[database].clear();
        Ok(true)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn connect(server: &MemoryServer) -> MemoryStore {
        server.connector().connect(None).unwrap()
    }

    fn now_seconds() -> i64 {
        (current_timestamp_ms() / 1000) as i64
    }

    #[test]
    fn test_set_and_get() {
        let server = MemoryServer::new();
        let mut store = connect(&server);

        assert!(store.set("key1", b"value1").unwrap());
        assert_eq!(store.get("key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn test_connections_share_data() {
        let server = MemoryServer::new();
        let mut first = connect(&server);
        let mut second = connect(&server);

        first.set("shared", b"1").unwrap();
        assert!(second.exists("shared").unwrap());
    }

    #[test]
    fn test_databases_are_isolated() {
        let server = MemoryServer::new();
        let mut store = connect(&server);

        store.set("key", b"db0").unwrap();
        assert!(store.select(3).unwrap());
        assert!(!store.exists("key").unwrap());

        store.set("key", b"db3").unwrap();
        assert_eq!(server.get_raw(0, "key"), Some(b"db0".to_vec()));
        assert_eq!(server.get_raw(3, "key"), Some(b"db3".to_vec()));
    }

    #[test]
    fn test_select_out_of_range() {
        let server = MemoryServer::new();
        let mut store = connect(&server);

        assert!(!store.select(MAX_DATABASES as i64).unwrap());
        assert!(!store.select(-1).unwrap());
    }

    #[test]
    fn test_delete_counts() {
        let server = MemoryServer::new();
        let mut store = connect(&server);

        store.set("key", b"v").unwrap();
        assert_eq!(store.delete("key").unwrap(), 1);
        assert_eq!(store.delete("key").unwrap(), 0);
    }

    #[test]
    fn test_expire_at_past_removes_key() {
        let server = MemoryServer::new();
        let mut store = connect(&server);

        store.set("key", b"v").unwrap();
        assert!(store.expire_at("key", now_seconds() - 10).unwrap());
        assert!(!store.exists("key").unwrap());
    }

    #[test]
    fn test_expire_at_missing_key() {
        let server = MemoryServer::new();
        let mut store = connect(&server);

        assert!(!store.expire_at("missing", now_seconds() + 10).unwrap());
    }

    #[test]
    fn test_expiration() {
        let server = MemoryServer::new();
        let mut store = connect(&server);

        store.set("key", b"v").unwrap();
        store.expire_at("key", now_seconds() + 2).unwrap();
        assert!(server.ttl(0, "key").is_some());

        // Wait for expiration
        sleep(Duration::from_millis(3100));

        assert_eq!(store.get("key").unwrap(), None);
    }

    #[test]
    fn test_set_clears_expiration() {
        let server = MemoryServer::new();
        let mut store = connect(&server);

        store.set("key", b"v").unwrap();
        store.expire_at("key", now_seconds() + 60).unwrap();
        store.set("key", b"w").unwrap();

        assert!(server.ttl(0, "key").is_none());
    }

    #[test]
    fn test_incr_by_from_missing() {
        let server = MemoryServer::new();
        let mut store = connect(&server);

        assert_eq!(store.incr_by("counter", 5).unwrap(), 5);
        assert_eq!(store.incr_by("counter", -7).unwrap(), -2);
        assert_eq!(server.get_raw(0, "counter"), Some(b"-2".to_vec()));
    }

    #[test]
    fn test_incr_by_non_integer() {
        let server = MemoryServer::new();
        let mut store = connect(&server);

        store.set("text", b"hello").unwrap();
        assert!(matches!(
            store.incr_by("text", 1),
            Err(StoreError::Command(_))
        ));
    }

    #[test]
    fn test_incr_by_overflow() {
        let server = MemoryServer::new();
        let mut store = connect(&server);

        store.set("big", i64::MAX.to_string().as_bytes()).unwrap();
        assert!(store.incr_by("big", 1).is_err());
    }

    #[test]
    fn test_flush_db_only_selected() {
        let server = MemoryServer::new();
        let mut store = connect(&server);

        store.set("a", b"1").unwrap();
        server.insert_raw(1, "b", "2");

        assert!(store.flush_db().unwrap());
        assert!(server.is_empty(0));
        assert_eq!(server.len(1), 1);
    }

    #[test]
    fn test_auth_required() {
        let server = MemoryServer::with_password("secret");
        let mut store = connect(&server);

        assert!(store.get("key").is_err());
        assert!(!store.auth("wrong").unwrap());
        assert!(store.auth("secret").unwrap());
        assert_eq!(store.get("key").unwrap(), None);
    }

    #[test]
    fn test_auth_without_password_configured() {
        let server = MemoryServer::new();
        let mut store = connect(&server);

        assert!(store.auth("anything").is_err());
    }

    #[test]
    fn test_refuses_connections() {
        let server = MemoryServer::new();
        server.set_accepting(false);

        assert!(matches!(
            server.connector().connect(None),
            Err(StoreError::Unreachable(_))
        ));
    }

    #[test]
    fn test_read_only_refuses_writes() {
        let server = MemoryServer::new();
        let mut store = connect(&server);

        store.set("key", b"v").unwrap();
        server.set_read_only(true);

        assert!(matches!(store.set("key", b"w"), Err(StoreError::Command(_))));
        assert!(store.expire_at("key", now_seconds() + 10).is_err());
        assert!(store.incr_by("counter", 1).is_err());
        assert!(store.delete("key").is_err());
        assert!(store.flush_db().is_err());

        assert_eq!(store.get("key").unwrap(), Some(b"v".to_vec()));
        assert!(store.exists("key").unwrap());

        server.set_read_only(false);
        assert!(store.set("key", b"w").unwrap());
    }

    #[test]
    fn test_raw_access_out_of_range_database() {
        let server = MemoryServer::new();

        server.insert_raw(MAX_DATABASES, "key", "v");
        assert_eq!(server.get_raw(MAX_DATABASES, "key"), None);
        assert_eq!(server.ttl(MAX_DATABASES, "key"), None);
        assert_eq!(server.len(MAX_DATABASES), 0);
        assert!(server.is_empty(usize::MAX));
    }
}
