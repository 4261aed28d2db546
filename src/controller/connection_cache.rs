//! # Connection Cache
//!
//! Open database connections keyed by `namespace.name` of the owning
//! `DatabaseSchema`. Entries live until evicted: on a broken connection, on
//! deletion of the resource, or when the resolved DSN no longer matches the
//! one the connection was opened with.
//!
//! The cache is shared by reconciliations of different resources running
//! concurrently. The lock is never held across an `.await`.

use crate::controller::driver::MigrationConnection;
use crate::observability::metrics;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared handle to an open connection
pub type ConnectionHandle = Arc<dyn MigrationConnection>;

struct CachedConnection {
    handle: ConnectionHandle,
    dsn_fingerprint: String,
}

/// Result of looking a key up against the DSN resolved for this reconciliation
pub enum CacheLookup {
    /// Cached connection opened with the same DSN
    Hit(ConnectionHandle),
    /// Nothing cached for this key
    Miss,
    /// A connection was cached for a different DSN; it has been removed and is returned for closing
    Stale(ConnectionHandle),
}

impl fmt::Debug for CacheLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheLookup::Hit(_) => f.write_str("Hit"),
            CacheLookup::Miss => f.write_str("Miss"),
            CacheLookup::Stale(_) => f.write_str("Stale"),
        }
    }
}

#[derive(Default)]
pub struct ConnectionCache {
    entries: Mutex<HashMap<String, CachedConnection>>,
}

impl fmt::Debug for ConnectionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCache")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl ConnectionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for a schema resource
    #[must_use]
    pub fn key_for(namespace: &str, name: &str) -> String {
        format!("{namespace}.{name}")
    }

    /// SHA-256 of a DSN, so the cache never keeps the credential itself
    #[must_use]
    pub fn fingerprint(dsn: &str) -> String {
        format!("{:x}", Sha256::digest(dsn.as_bytes()))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedConnection>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached connection for `key`, regardless of which DSN opened it
    #[must_use]
    pub fn get(&self, key: &str) -> Option<ConnectionHandle> {
        self.lock().get(key).map(|entry| Arc::clone(&entry.handle))
    }

    /// Cached connection for `key` if it was opened with `dsn`
    ///
    /// A connection opened with another DSN is evicted and handed back as `Stale`.
    pub fn get_for(&self, key: &str, dsn: &str) -> CacheLookup {
        let fingerprint = Self::fingerprint(dsn);
        let mut entries = self.lock();
        let same_dsn = match entries.get(key) {
            None => return CacheLookup::Miss,
            Some(entry) => entry.dsn_fingerprint == fingerprint,
        };
        if same_dsn {
            return entries
                .get(key)
                .map_or(CacheLookup::Miss, |entry| CacheLookup::Hit(Arc::clone(&entry.handle)));
        }
        let stale = entries.remove(key);
        metrics::set_cached_connections(entries.len());
        stale.map_or(CacheLookup::Miss, |entry| CacheLookup::Stale(entry.handle))
    }

    /// Insert or replace the connection for `key`
    pub fn put(&self, key: &str, dsn: &str, handle: ConnectionHandle) {
        let mut entries = self.lock();
        entries.insert(
            key.to_string(),
            CachedConnection {
                handle,
                dsn_fingerprint: Self::fingerprint(dsn),
            },
        );
        metrics::set_cached_connections(entries.len());
    }

    /// Remove the connection for `key`, returning it so the caller can close it
    pub fn evict(&self, key: &str) -> Option<ConnectionHandle> {
        let mut entries = self.lock();
        let removed = entries.remove(key).map(|entry| entry.handle);
        metrics::set_cached_connections(entries.len());
        removed
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
