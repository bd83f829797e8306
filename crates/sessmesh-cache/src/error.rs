//! Error types for cache operations.

/// Error type for cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Could not establish a connection to the cache server.
    #[error("failed to connect to cache at {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// I/O failure on an established connection.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation did not complete within the configured timeout.
    #[error("cache operation '{op}' timed out after {millis}ms")]
    Timeout { op: &'static str, millis: u64 },

    /// The server answered with something the protocol does not allow here.
    #[error("unexpected cache response: {0}")]
    Protocol(String),

    /// The server refused to store the value.
    #[error("cache refused to store key '{0}'")]
    NotStored(String),

    /// The key cannot be represented on the wire.
    #[error("invalid cache key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
