//! The cache client trait and shared key / expiry rules.
//!
//! Implementations must be `Send + Sync`: one client instance is shared by
//! every in-flight request and by the background scavenger.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::error::{CacheError, Result};

/// Longest key memcached accepts.
pub const MAX_KEY_LEN: usize = 250;

/// Relative expirations above this many seconds are read by memcached as
/// absolute unix timestamps.
const MAX_RELATIVE_EXPIRY_SECS: u64 = 60 * 60 * 24 * 30;

/// How long the cache should keep an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    /// Never expire through the cache's own mechanism.
    #[default]
    Never,

    /// Expire after the given duration.
    After(Duration),
}

impl Expiry {
    /// The memcached `exptime` field for this expiry.
    ///
    /// `0` means never. Durations longer than thirty days are converted to an
    /// absolute unix time, and sub-second durations round up to one second so
    /// they are not mistaken for "never".
    pub fn as_exptime(&self) -> u64 {
        match self {
            Expiry::Never => 0,
            Expiry::After(d) => {
                let secs = d.as_secs().max(1);
                if secs <= MAX_RELATIVE_EXPIRY_SECS {
                    secs
                } else {
                    let now = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or_default();
                    now + secs
                }
            }
        }
    }
}

/// Check that a key is usable on the memcached wire protocol.
pub fn validate_key(key: &str) -> Result<()> {
    let reason = if key.is_empty() {
        Some("key is empty")
    } else if key.len() > MAX_KEY_LEN {
        Some("key is longer than 250 bytes")
    } else if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        Some("key contains whitespace or control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(CacheError::InvalidKey {
            key: key.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// A remote key-value cache offering only get, set-with-expiry and delete.
///
/// There is no locking, no compare-and-swap and no way to list keys; callers
/// that need those guarantees have to build them on top.
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Fetch the value stored under `key`.
    ///
    /// Returns `Ok(None)` if the key is absent or has expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// Returns only once the cache has acknowledged the write.
    async fn set(&self, key: &str, expiry: Expiry, value: &[u8]) -> Result<()>;

    /// Delete `key`.
    ///
    /// Returns `true` if the key existed. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Short name used in log output.
    fn name(&self) -> &str {
        "cache"
    }
}
