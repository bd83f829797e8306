//! The session index: the list of live cluster ids kept under one cache key.
//!
//! The cache cannot enumerate its keys, so this list is the only way to find
//! every session (for the scavenger and for admin listing). Mutations are a
//! read-modify-write of a single key, serialized by a mutex owned by the
//! index. That lock only covers this process: two nodes mutating the index at
//! the same time race and the last write wins. Ids lost that way are never
//! scavenged; ids left behind for deleted sessions are skipped by readers.

use std::sync::Arc;

use sessmesh_cache::{CacheClient, Expiry};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Mutex-guarded access to the session index.
///
/// Create one per process and cache cluster and share it (`Arc`) between
/// every manager using that cache, so that all local mutations go through
/// the same lock.
pub struct SessionIndex {
    cache: Arc<dyn CacheClient>,
    key: String,
    lock: Mutex<()>,
}

impl SessionIndex {
    /// Create an index stored under `key`.
    pub fn new(cache: Arc<dyn CacheClient>, key: impl Into<String>) -> Self {
        Self {
            cache,
            key: key.into(),
            lock: Mutex::new(()),
        }
    }

    /// The cache key holding the index.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Snapshot of the live cluster ids, in insertion order.
    pub async fn ids(&self) -> Result<Vec<String>> {
        self.read().await
    }

    /// Number of ids in the index.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.read().await?.len())
    }

    /// Whether the index is empty.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Whether the index lists `cluster_id`.
    pub async fn contains(&self, cluster_id: &str) -> Result<bool> {
        Ok(self.read().await?.iter().any(|id| id == cluster_id))
    }

    /// Append `cluster_id`. Returns the new length.
    ///
    /// An id that is already listed is not added twice.
    pub async fn add(&self, cluster_id: &str) -> Result<usize> {
        let _guard = self.lock.lock().await;

        let mut ids = self.read().await?;
        if ids.iter().any(|id| id == cluster_id) {
            trace!(cluster_id = %cluster_id, "id already indexed");
            return Ok(ids.len());
        }
        ids.push(cluster_id.to_string());
        self.write(&ids).await?;

        debug!(cluster_id = %cluster_id, index_len = ids.len(), "id added to session index");
        Ok(ids.len())
    }

    /// Remove `cluster_id`. Returns whether it was listed.
    pub async fn remove(&self, cluster_id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;

        let mut ids = self.read().await?;
        let before = ids.len();
        ids.retain(|id| id != cluster_id);
        if ids.len() == before {
            return Ok(false);
        }
        self.write(&ids).await?;

        debug!(cluster_id = %cluster_id, index_len = ids.len(), "id removed from session index");
        Ok(true)
    }

    async fn read(&self) -> Result<Vec<String>> {
        match self.cache.get(&self.key).await? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| Error::codec(&self.key, e)),
            None => Ok(Vec::new()),
        }
    }

    async fn write(&self, ids: &[String]) -> Result<()> {
        let bytes = serde_json::to_vec(ids).map_err(|e| Error::codec(&self.key, e))?;
        self.cache.set(&self.key, Expiry::Never, &bytes).await?;
        Ok(())
    }
}

impl std::fmt::Debug for SessionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIndex")
            .field("key", &self.key)
            .field("cache", &self.cache.name())
            .finish()
    }
}
