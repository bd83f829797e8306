//! Handle to one session, as handed to request code.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::attribute::Attribute;
use crate::error::Result;
use crate::record::SessionRecord;
use crate::store::RecordStore;

/// A session handle.
///
/// Holds no attribute state of its own: every read goes to the cache and
/// every write goes straight through. Two handles for the same session are
/// equal and see each other's changes.
#[derive(Clone)]
pub struct Session {
    cluster_id: String,
    node_id: String,
    created: i64,
    store: RecordStore,
}

impl Session {
    pub(crate) fn new(cluster_id: String, node_id: String, created: i64, store: RecordStore) -> Self {
        Self {
            cluster_id,
            node_id,
            created,
            store,
        }
    }

    /// Cluster id of the session.
    pub fn id(&self) -> &str {
        &self.cluster_id
    }

    /// Node id of the session on this worker.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Creation time in ms since the epoch.
    pub fn creation_time(&self) -> i64 {
        self.created
    }

    /// The current record, `None` once the session is gone.
    pub async fn record(&self) -> Result<Option<SessionRecord>> {
        self.store.load(&self.cluster_id).await
    }

    /// Last access time in ms since the epoch.
    pub async fn last_accessed_time(&self) -> Result<Option<i64>> {
        Ok(self.record().await?.map(|record| record.accessed))
    }

    /// Idle timeout in ms; zero or negative never expires.
    pub async fn max_idle_ms(&self) -> Result<Option<i64>> {
        Ok(self.record().await?.map(|record| record.max_idle_ms))
    }

    /// Change the idle timeout. Returns `false` if the session is gone.
    pub async fn set_max_idle_ms(&self, max_idle_ms: i64) -> Result<bool> {
        self.store.set_max_idle(&self.cluster_id, max_idle_ms).await
    }

    /// Change the idle timeout; `None` means never expire.
    pub async fn set_max_idle(&self, max_idle: Option<Duration>) -> Result<bool> {
        let ms = max_idle.map(|d| d.as_millis() as i64).unwrap_or(-1);
        self.set_max_idle_ms(ms).await
    }

    /// Read an attribute.
    pub async fn get_attribute<T: Attribute>(&self, name: &str) -> Result<Option<T>> {
        self.store.get_attribute(&self.cluster_id, name).await
    }

    /// Store an attribute. A value that serializes to `null` removes it.
    pub async fn set_attribute<T: Attribute>(&self, name: &str, value: &T) -> Result<()> {
        self.store.set_attribute(&self.cluster_id, name, value).await
    }

    /// Remove an attribute.
    pub async fn remove_attribute(&self, name: &str) -> Result<()> {
        self.store.remove_attribute(&self.cluster_id, name).await
    }

    /// Names of the stored attributes.
    pub async fn attribute_names(&self) -> Result<BTreeSet<String>> {
        self.store.list_attribute_names(&self.cluster_id).await
    }

    /// Whether the routing cookie is due to be re-issued.
    pub async fn is_id_changed(&self) -> Result<bool> {
        Ok(self
            .record()
            .await?
            .is_some_and(|record| record.id_changed))
    }

    /// Set or clear the id-changed flag.
    pub async fn set_id_changed(&self, changed: bool) -> Result<bool> {
        self.store.set_id_changed(&self.cluster_id, changed).await
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.cluster_id == other.cluster_id && self.node_id == other.node_id
    }
}

impl Eq for Session {}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("cluster_id", &self.cluster_id)
            .field("node_id", &self.node_id)
            .field("created", &self.created)
            .finish()
    }
}

/// Routing cookie the container should send back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    /// The node id.
    pub value: String,
    pub path: String,
    pub secure: bool,
    /// `None` for a browser-session cookie.
    pub max_age: Option<Duration>,
}

impl SessionCookie {
    /// Render as a `Set-Cookie` header value.
    pub fn to_header_value(&self) -> String {
        let mut header = format!("{}={}; Path={}", self.name, self.value, self.path);
        if let Some(max_age) = self.max_age {
            header.push_str(&format!("; Max-Age={}", max_age.as_secs()));
        }
        if self.secure {
            header.push_str("; Secure");
        }
        header.push_str("; HttpOnly");
        header
    }
}
