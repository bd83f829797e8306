//! Clustered HTTP session storage on top of a shared key-value cache.
//!
//! Sessions are kept entirely in the cache so any node of the cluster can
//! serve any request:
//! - one record per session under its cluster id
//! - one entry per attribute under `<cluster_id>/<name>`
//! - one index key listing every live cluster id, walked by the scavenger
//!
//! Nodes hand out node ids (`<cluster_id>.<worker>`) in the routing cookie.
//! A request that reaches a session through another node's id gets a fresh
//! cookie pinning it to the serving node.
//!
//! # Example
//!
//! ```rust,ignore
//! use sessmesh_session::{SessionConfig, SessionManager, RequestContext};
//!
//! let config = SessionConfig::default()
//!     .with_worker_name("node0")
//!     .with_max_idle(Duration::from_secs(1800));
//!
//! let manager = SessionManager::new(cache, config)?;
//! manager.start();
//!
//! let session = manager.create_session(&RequestContext::default()).await?;
//! session.set_attribute("foo", &1000i64).await?;
//! ```

mod attribute;
mod config;
mod error;
mod id;
mod index;
mod manager;
mod record;
mod scavenger;
mod session;
mod store;

pub use attribute::{ActivationListener, Attribute, SessionEvent};
pub use config::{
    DEFAULT_COOKIE_NAME, DEFAULT_INDEX_KEY, DEFAULT_MAX_IDLE, DEFAULT_SCAVENGE_PERIOD,
    SessionConfig,
};
pub use error::{Error, Result};
pub use id::{ClusterIdManager, RequestContext, SessionIdManager, attribute_key, cluster_id, node_id};
pub use index::SessionIndex;
pub use manager::{IndexEntry, SessionManager, SessionManagerBuilder, now_ms};
pub use record::SessionRecord;
pub use scavenger::ScavengeReport;
pub use session::{Session, SessionCookie};
pub use store::RecordStore;
