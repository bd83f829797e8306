//! Session manager: creates, finds and removes sessions and drives the
//! scavenger.
//!
//! Lifecycle of a session: created (record written, id indexed), live, then
//! removed (invalidated or explicitly removed) or expired (scavenged). A
//! removed id is never handed out again.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use sessmesh_cache::CacheClient;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::Result;
use crate::id::{ClusterIdManager, RequestContext, SessionIdManager};
use crate::index::SessionIndex;
use crate::record::SessionRecord;
use crate::scavenger::{ScavengeReport, Scavenger};
use crate::session::{Session, SessionCookie};
use crate::store::RecordStore;

/// Current wall-clock time in milliseconds since the unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    New,
    Running,
    Stopping,
    Stopped,
}

struct Lifecycle {
    state: State,
    scavenge_period: Duration,
    scavenger: Option<Scavenger>,
}

pub(crate) struct ManagerInner {
    config: SessionConfig,
    store: RecordStore,
    index: Arc<SessionIndex>,
    ids: Arc<dyn SessionIdManager>,
    lifecycle: Mutex<Lifecycle>,
}

/// One indexed id and its record, as seen by an admin listing.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// The indexed cluster id.
    pub cluster_id: String,

    /// The session record, or `None` if the index has drifted and the
    /// record is gone.
    pub record: Option<SessionRecord>,
}

/// Builder for [`SessionManager`].
pub struct SessionManagerBuilder {
    cache: Arc<dyn CacheClient>,
    config: SessionConfig,
    index: Option<Arc<SessionIndex>>,
    ids: Option<Arc<dyn SessionIdManager>>,
}

impl SessionManagerBuilder {
    /// Use the given configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing index (and its lock) with other managers.
    pub fn index(mut self, index: Arc<SessionIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Use a custom id manager instead of [`ClusterIdManager`].
    pub fn id_manager(mut self, ids: Arc<dyn SessionIdManager>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Build the manager. The scavenger does not run until [`SessionManager::start`].
    pub fn build(self) -> Result<SessionManager> {
        self.config.validate()?;

        let index = self.index.unwrap_or_else(|| {
            Arc::new(SessionIndex::new(
                self.cache.clone(),
                self.config.index_key.clone(),
            ))
        });
        let ids: Arc<dyn SessionIdManager> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(ClusterIdManager::new(self.config.worker_name.clone())),
        };

        let lifecycle = Lifecycle {
            state: State::New,
            scavenge_period: self.config.scavenge_period,
            scavenger: None,
        };

        Ok(SessionManager {
            inner: Arc::new(ManagerInner {
                store: RecordStore::new(self.cache),
                config: self.config,
                index,
                ids,
                lifecycle: Mutex::new(lifecycle),
            }),
        })
    }
}

/// Manages sessions stored in a shared cache.
///
/// Cheap to clone; clones share the same state and scavenger.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    /// Create a manager with its own index and the default id manager.
    pub fn new(cache: Arc<dyn CacheClient>, config: SessionConfig) -> Result<Self> {
        Self::builder(cache).config(config).build()
    }

    /// Start building a manager on top of `cache`.
    pub fn builder(cache: Arc<dyn CacheClient>) -> SessionManagerBuilder {
        SessionManagerBuilder {
            cache,
            config: SessionConfig::default(),
            index: None,
            ids: None,
        }
    }

    pub(crate) fn from_inner(inner: Arc<ManagerInner>) -> Self {
        Self { inner }
    }

    /// The manager configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// The record store.
    pub fn store(&self) -> &RecordStore {
        &self.inner.store
    }

    /// The session index.
    pub fn index(&self) -> &Arc<SessionIndex> {
        &self.inner.index
    }

    /// The id manager.
    pub fn id_manager(&self) -> &Arc<dyn SessionIdManager> {
        &self.inner.ids
    }

    /// Create a new session for a request.
    ///
    /// The record is written before the id is indexed. If indexing fails the
    /// error is returned and the record stays behind unindexed: usable by id,
    /// invisible to the scavenger.
    pub async fn create_session(&self, request: &RequestContext) -> Result<Session> {
        let created = now_ms();
        let cluster_id = self.inner.ids.new_session_id(request).await?;

        let record = self
            .inner
            .store
            .create(&cluster_id, created, self.inner.config.max_idle_ms())
            .await?;
        let index_len = self.inner.index.add(&cluster_id).await?;
        self.inner.ids.add_session(&cluster_id).await?;

        debug!(cluster_id = %cluster_id, index_len, "session created");
        Ok(self.handle(cluster_id, &record))
    }

    /// Find a session by node id (or cluster id).
    ///
    /// Returns `None` for unknown or expired sessions. When the id names a
    /// different node than this one, the session is flagged so the next
    /// [`access`](Self::access) re-issues the routing cookie.
    pub async fn get_session(&self, node_id: &str) -> Result<Option<Session>> {
        let cluster_id = self.inner.ids.cluster_id(node_id).to_string();
        let Some(record) = self.inner.store.load(&cluster_id).await? else {
            return Ok(None);
        };

        let session = self.handle(cluster_id, &record);
        if session.node_id() != node_id {
            debug!(
                cluster_id = %session.id(),
                requested = %node_id,
                node_id = %session.node_id(),
                "session reached through another node"
            );
            self.inner.store.set_id_changed(session.id(), true).await?;
        }
        Ok(Some(session))
    }

    /// Record a request's access to a session.
    ///
    /// Returns a routing cookie when the client needs a new one: after it
    /// reached the session through another node, or when cookie refresh is
    /// configured and the current cookie is old enough. Returns `None`
    /// otherwise, and for sessions that no longer exist.
    pub async fn access(&self, session: &Session, secure: bool) -> Result<Option<SessionCookie>> {
        let now = now_ms();
        let Some(record) = self.inner.store.touch(session.id(), now).await? else {
            return Ok(None);
        };

        let config = &self.inner.config;
        let refresh_due = match (config.max_cookie_age, config.refresh_cookie_age) {
            (Some(max_age), Some(refresh)) if !max_age.is_zero() && !refresh.is_zero() => {
                now - record.cookie_set > refresh.as_millis() as i64
            }
            _ => false,
        };

        if !record.id_changed && !refresh_due {
            return Ok(None);
        }

        let cookie = self.session_cookie(session, &config.cookie_path, secure);
        self.inner.store.set_cookie_set(session.id(), now).await?;
        debug!(cluster_id = %session.id(), value = %cookie.value, "routing cookie issued");
        Ok(Some(cookie))
    }

    /// The routing cookie for a session.
    pub fn session_cookie(&self, session: &Session, context_path: &str, secure: bool) -> SessionCookie {
        let config = &self.inner.config;
        SessionCookie {
            name: config.cookie_name.clone(),
            value: session.node_id().to_string(),
            path: if context_path.is_empty() {
                "/".to_string()
            } else {
                context_path.to_string()
            },
            secure,
            max_age: config.max_cookie_age,
        }
    }

    /// Remove a session: its attribute entries, its record and its index
    /// entry, in that order.
    ///
    /// Returns whether a record existed. Removing a session that is already
    /// gone succeeds; a stale index entry for it is dropped.
    pub async fn remove_session(&self, cluster_id: &str) -> Result<bool> {
        let record = self.inner.store.delete_all(cluster_id).await?;
        let indexed = self.inner.index.remove(cluster_id).await?;

        if record.is_none() {
            if indexed {
                debug!(cluster_id = %cluster_id, "dropped stale index entry");
            }
            return Ok(false);
        }

        self.inner.ids.remove_session(cluster_id).await?;
        debug!(cluster_id = %cluster_id, "session removed");
        Ok(true)
    }

    /// Invalidate a session: remove it and tell the id manager so other
    /// contexts sharing the id drop it too.
    pub async fn invalidate(&self, session: &Session) -> Result<()> {
        self.remove_session(session.id()).await?;
        self.inner.ids.invalidate_all(session.id()).await
    }

    /// Invalidate every session. Does nothing.
    ///
    /// Sessions live in the shared cache and are served by other nodes too;
    /// one node shutting down must not destroy them.
    pub fn invalidate_sessions(&self) {
        debug!("invalidate_sessions: sessions are shared with the cluster, leaving them in place");
    }

    /// Every indexed session whose record still exists.
    pub async fn sessions(&self) -> Result<Vec<Session>> {
        Ok(self
            .index_entries()
            .await?
            .into_iter()
            .filter_map(|entry| {
                let record = entry.record?;
                Some(self.handle(entry.cluster_id, &record))
            })
            .collect())
    }

    /// Every indexed id with its record, including ids whose record is gone.
    pub async fn index_entries(&self) -> Result<Vec<IndexEntry>> {
        let ids = self.inner.index.ids().await?;
        let mut entries = Vec::with_capacity(ids.len());
        for cluster_id in ids {
            let record = self.inner.store.load(&cluster_id).await?;
            if record.is_none() {
                warn!(cluster_id = %cluster_id, "indexed session has no record");
            }
            entries.push(IndexEntry { cluster_id, record });
        }
        Ok(entries)
    }

    /// Number of indexed sessions.
    pub async fn session_count(&self) -> Result<usize> {
        self.inner.index.len().await
    }

    /// Start the manager and, if the scavenge period is non-zero, the
    /// scavenger. Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.state == State::Running {
            return;
        }
        lifecycle.state = State::Running;
        self.schedule(&mut lifecycle);
        info!(
            worker = self.inner.ids.worker_name().unwrap_or("-"),
            index_key = %self.inner.index.key(),
            "session manager started"
        );
    }

    /// Stop the scavenger and wait for it to exit. Sessions stay in the cache.
    pub async fn stop(&self) {
        let scavenger = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if matches!(lifecycle.state, State::Stopping | State::Stopped) {
                return;
            }
            lifecycle.state = State::Stopping;
            lifecycle.scavenger.take()
        };

        if let Some(scavenger) = scavenger {
            scavenger.shutdown().await;
        }
        self.invalidate_sessions();

        self.inner.lifecycle.lock().state = State::Stopped;
        info!("session manager stopped");
    }

    /// Whether the manager has been started and not stopped.
    pub fn is_running(&self) -> bool {
        self.inner.lifecycle.lock().state == State::Running
    }

    /// Whether the scavenger task is scheduled.
    pub fn is_scavenging(&self) -> bool {
        self.inner.lifecycle.lock().scavenger.is_some()
    }

    /// Current scavenge period.
    pub fn scavenge_period(&self) -> Duration {
        self.inner.lifecycle.lock().scavenge_period
    }

    /// Change the scavenge period. A running scavenger is rescheduled;
    /// `Duration::ZERO` turns it off.
    pub fn set_scavenge_period(&self, period: Duration) {
        let mut lifecycle = self.inner.lifecycle.lock();
        lifecycle.scavenge_period = period;
        if lifecycle.state == State::Running {
            self.schedule(&mut lifecycle);
        }
    }

    /// Run one sweep now.
    pub async fn scavenge(&self) -> Result<ScavengeReport> {
        self.scavenge_at(now_ms()).await
    }

    /// Run one sweep as if the current time were `now` (ms since epoch).
    ///
    /// Walks a snapshot of the index in insertion order and removes every
    /// session idle past its timeout. Ids whose record is gone are skipped.
    /// A failure on one id is logged and the sweep moves on.
    pub async fn scavenge_at(&self, now: i64) -> Result<ScavengeReport> {
        if self.is_shutting_down() {
            return Ok(ScavengeReport::skipped());
        }

        let ids = self.inner.index.ids().await?;
        let mut report = ScavengeReport::default();

        for cluster_id in ids {
            if self.is_shutting_down() {
                report.skipped = true;
                break;
            }
            report.checked += 1;

            let record = match self.inner.store.load(&cluster_id).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    report.missing += 1;
                    continue;
                }
                Err(e) => {
                    warn!(cluster_id = %cluster_id, error = %e, "could not load session during scavenge");
                    report.failed += 1;
                    continue;
                }
            };

            if !record.is_expired(now) {
                continue;
            }

            match self.remove_session(&cluster_id).await {
                Ok(false) => {
                    debug!(cluster_id = %cluster_id, "expired session already removed elsewhere");
                    report.missing += 1;
                }
                Ok(true) => {
                    debug!(
                        cluster_id = %cluster_id,
                        idle_ms = now.saturating_sub(record.accessed),
                        max_idle_ms = record.max_idle_ms,
                        "expired session scavenged"
                    );
                    report.expired += 1;
                }
                Err(e) => {
                    warn!(cluster_id = %cluster_id, error = %e, "could not remove expired session");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    fn is_shutting_down(&self) -> bool {
        matches!(
            self.inner.lifecycle.lock().state,
            State::Stopping | State::Stopped
        )
    }

    fn schedule(&self, lifecycle: &mut Lifecycle) {
        if let Some(previous) = lifecycle.scavenger.take() {
            previous.cancel();
        }
        if lifecycle.scavenge_period.is_zero() {
            debug!("scavenge period is zero, scavenger disabled");
            return;
        }
        let weak: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        lifecycle.scavenger = Some(Scavenger::spawn(weak, lifecycle.scavenge_period));
    }

    fn handle(&self, cluster_id: String, record: &SessionRecord) -> Session {
        let node_id = self.inner.ids.node_id(&cluster_id);
        Session::new(cluster_id, node_id, record.created, self.inner.store.clone())
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        if let Some(scavenger) = self.lifecycle.get_mut().scavenger.take() {
            scavenger.cancel();
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.inner.config)
            .field("index", &self.inner.index)
            .finish()
    }
}
