//! Error types for session operations.
//!
//! Absence is not an error here: a missing session or attribute comes back
//! as `None`. What remains are failures that abort the current operation.

/// Error type for session operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The cache could not be reached or rejected a request.
    #[error("cache error: {0}")]
    Cache(#[from] sessmesh_cache::CacheError),

    /// A stored record, index or attribute could not be encoded or decoded.
    #[error("codec error for key '{key}': {source}")]
    Codec {
        key: String,
        source: serde_json::Error,
    },

    /// A write targeted a session whose record no longer exists.
    #[error("session no longer exists: {0}")]
    SessionGone(String),

    /// The manager configuration is unusable.
    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn codec(key: impl Into<String>, source: serde_json::Error) -> Self {
        Error::Codec {
            key: key.into(),
            source,
        }
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;
