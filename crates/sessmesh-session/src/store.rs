//! Session records and attribute entries in the cache.
//!
//! Key layout:
//! - `<cluster_id>` holds the [`SessionRecord`]
//! - `<cluster_id>/<name>` holds one attribute value
//!
//! Every mutation is a plain read-modify-write. There is no versioning, so
//! two writers updating the same session concurrently (two requests, or two
//! nodes) can lose each other's changes. A mutation touching both the record
//! and an attribute entry issues two independent writes; a crash in between
//! leaves the record's name set and the entries out of step. Readers treat a
//! missing entry as a missing attribute regardless of what the record lists.

use std::collections::BTreeSet;
use std::sync::Arc;

use sessmesh_cache::{CacheClient, Expiry, validate_key};
use tracing::{debug, trace};

use crate::attribute::{self, Attribute, SessionEvent};
use crate::error::{Error, Result};
use crate::id::attribute_key;
use crate::record::SessionRecord;

/// Reads and writes session records and attribute entries.
#[derive(Clone)]
pub struct RecordStore {
    cache: Arc<dyn CacheClient>,
}

impl RecordStore {
    /// Create a store on top of the given cache.
    pub fn new(cache: Arc<dyn CacheClient>) -> Self {
        Self { cache }
    }

    /// The underlying cache client.
    pub fn cache(&self) -> &Arc<dyn CacheClient> {
        &self.cache
    }

    /// Load a session record. `None` means the session does not exist or
    /// has already been removed.
    pub async fn load(&self, cluster_id: &str) -> Result<Option<SessionRecord>> {
        match self.cache.get(cluster_id).await? {
            Some(bytes) => SessionRecord::decode(cluster_id, &bytes).map(Some),
            None => {
                trace!(cluster_id = %cluster_id, "session record not found");
                Ok(None)
            }
        }
    }

    /// Write a session record. Records never expire through the cache;
    /// the scavenger decides when a session is gone.
    pub async fn save(&self, cluster_id: &str, record: &SessionRecord) -> Result<()> {
        let bytes = record.encode(cluster_id)?;
        self.cache.set(cluster_id, Expiry::Never, &bytes).await?;
        Ok(())
    }

    /// Create and write the record of a new session.
    pub async fn create(
        &self,
        cluster_id: &str,
        created: i64,
        max_idle_ms: i64,
    ) -> Result<SessionRecord> {
        let record = SessionRecord::new(created, max_idle_ms);
        self.save(cluster_id, &record).await?;
        debug!(cluster_id = %cluster_id, created, max_idle_ms, "session record created");
        Ok(record)
    }

    /// Store an attribute value.
    ///
    /// A value that serializes to `null` removes the attribute instead.
    /// Values with the activation capability get `will_passivate` before
    /// they are written.
    pub async fn set_attribute<T: Attribute>(
        &self,
        cluster_id: &str,
        name: &str,
        value: &T,
    ) -> Result<()> {
        // Reject a bad name before the record lists it.
        let key = attribute_key(cluster_id, name);
        validate_key(&key)?;

        if let Some(listener) = value.as_listener() {
            listener.will_passivate(&SessionEvent::new(cluster_id));
        }

        let Some(bytes) = attribute::encode(&key, value)? else {
            return self.remove_attribute(cluster_id, name).await;
        };

        let mut record = self
            .load(cluster_id)
            .await?
            .ok_or_else(|| Error::SessionGone(cluster_id.to_string()))?;

        let record_bytes = if record.keys.insert(name.to_string()) {
            Some(record.encode(cluster_id)?)
        } else {
            None
        };

        let write_record = async {
            match record_bytes {
                Some(ref bytes) => self.cache.set(cluster_id, Expiry::Never, bytes).await,
                None => Ok(()),
            }
        };
        let write_entry = self.cache.set(&key, Expiry::Never, &bytes);
        tokio::try_join!(write_record, write_entry)?;

        trace!(cluster_id = %cluster_id, name = %name, "attribute set");
        Ok(())
    }

    /// Read an attribute value. `None` if it is not stored.
    ///
    /// Values with the activation capability get `did_activate` before they
    /// are returned.
    pub async fn get_attribute<T: Attribute>(
        &self,
        cluster_id: &str,
        name: &str,
    ) -> Result<Option<T>> {
        let key = attribute_key(cluster_id, name);
        let Some(bytes) = self.cache.get(&key).await? else {
            return Ok(None);
        };

        let mut value: T = attribute::decode(&key, &bytes)?;
        if let Some(listener) = value.as_listener_mut() {
            listener.did_activate(&SessionEvent::new(cluster_id));
        }
        Ok(Some(value))
    }

    /// Remove an attribute. Removing an attribute that is not there is fine.
    pub async fn remove_attribute(&self, cluster_id: &str, name: &str) -> Result<()> {
        let key = attribute_key(cluster_id, name);
        validate_key(&key)?;

        let record_bytes = match self.load(cluster_id).await? {
            Some(mut record) => {
                if record.keys.remove(name) {
                    Some(record.encode(cluster_id)?)
                } else {
                    None
                }
            }
            None => None,
        };

        let write_record = async {
            match record_bytes {
                Some(ref bytes) => self.cache.set(cluster_id, Expiry::Never, bytes).await,
                None => Ok(()),
            }
        };
        let delete_entry = self.cache.delete(&key);
        tokio::try_join!(write_record, delete_entry)?;

        trace!(cluster_id = %cluster_id, name = %name, "attribute removed");
        Ok(())
    }

    /// Names of the attributes the record lists; empty if the session is gone.
    pub async fn list_attribute_names(&self, cluster_id: &str) -> Result<BTreeSet<String>> {
        Ok(self
            .load(cluster_id)
            .await?
            .map(|record| record.keys)
            .unwrap_or_default())
    }

    /// Record an access at `now` and return the updated record, or `None`
    /// if the session is gone.
    pub async fn touch(&self, cluster_id: &str, now: i64) -> Result<Option<SessionRecord>> {
        self.update(cluster_id, |record| record.accessed = now).await
    }

    /// Change the idle timeout. Returns `false` if the session is gone.
    pub async fn set_max_idle(&self, cluster_id: &str, max_idle_ms: i64) -> Result<bool> {
        Ok(self
            .update(cluster_id, |record| record.max_idle_ms = max_idle_ms)
            .await?
            .is_some())
    }

    /// Change the id-changed flag. Returns `false` if the session is gone.
    pub async fn set_id_changed(&self, cluster_id: &str, changed: bool) -> Result<bool> {
        Ok(self
            .update(cluster_id, |record| record.id_changed = changed)
            .await?
            .is_some())
    }

    /// Note that a routing cookie was issued at `now` and clear the
    /// id-changed flag. Returns `false` if the session is gone.
    pub async fn set_cookie_set(&self, cluster_id: &str, now: i64) -> Result<bool> {
        Ok(self
            .update(cluster_id, |record| {
                record.cookie_set = now;
                record.id_changed = false;
            })
            .await?
            .is_some())
    }

    /// Delete every attribute entry the record lists, then the record.
    ///
    /// Returns the deleted record, or `None` if there was nothing to delete.
    pub async fn delete_all(&self, cluster_id: &str) -> Result<Option<SessionRecord>> {
        let Some(record) = self.load(cluster_id).await? else {
            return Ok(None);
        };

        for name in &record.keys {
            self.cache.delete(&attribute_key(cluster_id, name)).await?;
        }
        self.cache.delete(cluster_id).await?;

        debug!(
            cluster_id = %cluster_id,
            attributes = record.keys.len(),
            "session record deleted"
        );
        Ok(Some(record))
    }

    async fn update<F>(&self, cluster_id: &str, f: F) -> Result<Option<SessionRecord>>
    where
        F: FnOnce(&mut SessionRecord),
    {
        let Some(mut record) = self.load(cluster_id).await? else {
            return Ok(None);
        };
        f(&mut record);
        self.save(cluster_id, &record).await?;
        Ok(Some(record))
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("cache", &self.cache.name())
            .finish()
    }
}
