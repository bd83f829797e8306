//! Session identifiers: cluster ids, node ids and the id manager seam.
//!
//! A cluster id names a session across the whole cluster. A node id is the
//! cluster id qualified with the name of the worker that served it
//! (`<cluster>.<worker>`), which is what goes into the routing cookie so a
//! load balancer can keep a client pinned to one node.
//!
//! Translation back to the cluster id cuts at the *last* `.`; worker names
//! containing `.` therefore do not round-trip. That is not checked at runtime.

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;

/// Build the node id for `cluster_id` on the worker `worker_name`.
pub fn node_id(cluster_id: &str, worker_name: Option<&str>) -> String {
    match worker_name {
        Some(worker) if !worker.is_empty() => format!("{cluster_id}.{worker}"),
        _ => cluster_id.to_string(),
    }
}

/// Strip the worker suffix from a node id.
///
/// A leading `.` is not treated as a separator.
pub fn cluster_id(node_id: &str) -> &str {
    match node_id.rfind('.') {
        Some(dot) if dot > 0 => &node_id[..dot],
        _ => node_id,
    }
}

/// Cache key of one attribute of a session.
pub fn attribute_key(cluster_id: &str, name: &str) -> String {
    format!("{cluster_id}/{name}")
}

/// What the container knows about the request that triggered a session
/// creation.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Session id the client asked for (cookie or URL), if any.
    pub requested_session_id: Option<String>,
}

impl RequestContext {
    /// A request that carried the given session id.
    pub fn with_requested_id(id: impl Into<String>) -> Self {
        Self {
            requested_session_id: Some(id.into()),
        }
    }
}

/// Hands out session ids and is told about session lifecycle events.
///
/// The notification hooks exist for a surrounding identity layer (for example
/// one that shares ids across web contexts). Uniqueness beyond random id
/// generation is that layer's business.
#[async_trait]
pub trait SessionIdManager: Send + Sync {
    /// Name of this worker, if one is configured.
    fn worker_name(&self) -> Option<&str>;

    /// Cluster id for a node id.
    fn cluster_id<'a>(&self, node_id: &'a str) -> &'a str {
        cluster_id(node_id)
    }

    /// Node id of a cluster id on this worker.
    fn node_id(&self, cluster_id: &str) -> String {
        node_id(cluster_id, self.worker_name())
    }

    /// A fresh random id. Must not contain `.` or `/`.
    fn generate_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Whether some context already uses this cluster id.
    async fn id_in_use(&self, _cluster_id: &str) -> Result<bool> {
        Ok(false)
    }

    /// Pick the cluster id for a new session.
    ///
    /// Reuses the requested id when it is already in use elsewhere, otherwise
    /// generates ids until one is free.
    async fn new_session_id(&self, request: &RequestContext) -> Result<String> {
        if let Some(requested) = request.requested_session_id.as_deref() {
            let cluster = self.cluster_id(requested);
            if self.id_in_use(cluster).await? {
                return Ok(cluster.to_string());
            }
        }

        loop {
            let id = self.generate_id();
            if !id.is_empty() && !self.id_in_use(&id).await? {
                return Ok(id);
            }
        }
    }

    /// A session was created.
    async fn add_session(&self, _cluster_id: &str) -> Result<()> {
        Ok(())
    }

    /// A session was removed.
    async fn remove_session(&self, _cluster_id: &str) -> Result<()> {
        Ok(())
    }

    /// A session was invalidated; other contexts sharing the id should drop it.
    async fn invalidate_all(&self, _cluster_id: &str) -> Result<()> {
        Ok(())
    }
}

/// Default id manager: random ids and a fixed worker name.
#[derive(Debug, Clone, Default)]
pub struct ClusterIdManager {
    worker_name: Option<String>,
}

impl ClusterIdManager {
    /// Create an id manager for the given worker.
    pub fn new(worker_name: Option<String>) -> Self {
        let worker_name = worker_name.filter(|w| !w.is_empty());
        if let Some(ref worker) = worker_name
            && worker.contains('.')
        {
            warn!(
                worker = %worker,
                "worker name contains '.', node ids will not map back to cluster ids"
            );
        }
        Self { worker_name }
    }
}

#[async_trait]
impl SessionIdManager for ClusterIdManager {
    fn worker_name(&self) -> Option<&str> {
        self.worker_name.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id() {
        assert_eq!(node_id("abc", Some("node0")), "abc.node0");
        assert_eq!(node_id("abc", Some("")), "abc");
        assert_eq!(node_id("abc", None), "abc");
    }

    #[test]
    fn test_cluster_id() {
        assert_eq!(cluster_id("abc.node0"), "abc");
        assert_eq!(cluster_id("abc"), "abc");
        assert_eq!(cluster_id(".abc"), ".abc");
        assert_eq!(cluster_id("a.b.node0"), "a.b");
    }

    #[test]
    fn test_cluster_id_inverts_node_id() {
        let ids = ["abc", "0f3e9a", "x", "with-dash_and_underscore"];
        let workers = [None, Some("node0"), Some("w"), Some("worker-12")];

        for id in ids {
            for worker in workers {
                assert_eq!(cluster_id(&node_id(id, worker)), id, "{id} / {worker:?}");
            }
        }
    }

    #[test]
    fn test_dotted_worker_does_not_round_trip() {
        let node = node_id("abc", Some("host.example"));
        assert_ne!(cluster_id(&node), "abc");
    }

    #[test]
    fn test_attribute_key() {
        assert_eq!(attribute_key("abc", "foo"), "abc/foo");
    }

    #[tokio::test]
    async fn test_generated_ids_are_unique_and_dot_free() {
        let ids = ClusterIdManager::new(Some("node0".to_string()));
        let a = ids.new_session_id(&RequestContext::default()).await.unwrap();
        let b = ids.new_session_id(&RequestContext::default()).await.unwrap();

        assert_ne!(a, b);
        assert!(!a.contains('.'));
        assert!(!a.contains('/'));
        assert_eq!(ids.node_id(&a), format!("{a}.node0"));
        assert_eq!(ids.cluster_id(&ids.node_id(&a)), a);
    }

    struct SharedIds;

    #[async_trait]
    impl SessionIdManager for SharedIds {
        fn worker_name(&self) -> Option<&str> {
            Some("node1")
        }

        async fn id_in_use(&self, cluster_id: &str) -> Result<bool> {
            Ok(cluster_id == "shared")
        }
    }

    #[tokio::test]
    async fn test_requested_id_reused_when_in_use() {
        let ids = SharedIds;

        let request = RequestContext::with_requested_id("shared.node7");
        assert_eq!(ids.new_session_id(&request).await.unwrap(), "shared");

        let request = RequestContext::with_requested_id("unknown.node7");
        let id = ids.new_session_id(&request).await.unwrap();
        assert_ne!(id, "unknown");
        assert_ne!(id, "shared");
    }
}
