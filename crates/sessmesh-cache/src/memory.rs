//! In-process cache for tests and single-node runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use crate::client::{CacheClient, Expiry, validate_key};
use crate::error::{CacheError, Result};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Cache backed by a `HashMap` in the current process.
///
/// Applies the same key rules as memcached so code tested against it behaves
/// the same against a real server. Expired entries are dropped lazily on read.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    offline: AtomicBool,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable server: while offline every operation fails
    /// with a connection error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of live (non-expired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    /// Whether the cache holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live entry exists for `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .get(key)
            .is_some_and(|e| !e.is_expired(now))
    }

    /// Sorted list of live keys.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "memory cache is offline",
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_online()?;
        validate_key(key)?;

        let mut entries = self.entries.lock();
        let now = Instant::now();
        let expired = match entries.get(key) {
            Some(entry) if entry.is_expired(now) => true,
            Some(entry) => {
                trace!(key = %key, bytes = entry.value.len(), "memory cache hit");
                return Ok(Some(entry.value.clone()));
            }
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, expiry: Expiry, value: &[u8]) -> Result<()> {
        self.check_online()?;
        validate_key(key)?;

        let expires_at = match expiry {
            Expiry::Never => None,
            Expiry::After(d) => Some(Instant::now() + d),
        };
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at,
            },
        );
        trace!(key = %key, bytes = value.len(), "memory cache set");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_online()?;
        validate_key(key)?;

        let now = Instant::now();
        let existed = self
            .entries
            .lock()
            .remove(key)
            .is_some_and(|e| !e.is_expired(now));
        Ok(existed)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCache::new();

        assert_eq!(cache.get("a").await.unwrap(), None);
        cache.set("a", Expiry::Never, b"1").await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), Some(b"1".to_vec()));

        assert!(cache.delete("a").await.unwrap());
        assert!(!cache.delete("a").await.unwrap());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_overwrite() {
        let cache = MemoryCache::new();
        cache.set("a", Expiry::Never, b"1").await.unwrap();
        cache.set("a", Expiry::Never, b"2").await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), Some(b"2".to_vec()));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_expiry() {
        let cache = MemoryCache::new();
        cache
            .set("short", Expiry::After(Duration::from_millis(20)), b"x")
            .await
            .unwrap();
        cache.set("long", Expiry::Never, b"y").await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(cache.get("short").await.unwrap(), None);
        assert!(cache.contains_key("long"));
        assert_eq!(cache.keys(), vec!["long".to_string()]);
    }

    #[tokio::test]
    async fn test_rejects_invalid_keys() {
        let cache = MemoryCache::new();
        let err = cache.set("bad key", Expiry::Never, b"x").await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidKey { .. }));
    }

    #[tokio::test]
    async fn test_offline() {
        let cache = MemoryCache::new();
        cache.set("a", Expiry::Never, b"1").await.unwrap();

        cache.set_offline(true);
        assert!(matches!(cache.get("a").await, Err(CacheError::Io(_))));
        assert!(cache.set("a", Expiry::Never, b"2").await.is_err());

        cache.set_offline(false);
        assert_eq!(cache.get("a").await.unwrap(), Some(b"1".to_vec()));
    }
}
