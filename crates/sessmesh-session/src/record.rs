//! The per-session metadata record kept in the cache.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Metadata envelope of one session, stored under its cluster id.
///
/// Timestamps are milliseconds since the unix epoch. The attribute values
/// themselves live under their own keys; `keys` only lists their names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// When the session was created.
    pub created: i64,

    /// When the session was last accessed.
    pub accessed: i64,

    /// Idle timeout in milliseconds. Zero or negative never expires.
    pub max_idle_ms: i64,

    /// Set when the routing cookie needs to be re-issued.
    #[serde(default)]
    pub id_changed: bool,

    /// When the routing cookie was last handed out (0 = never).
    #[serde(default)]
    pub cookie_set: i64,

    /// Names of the attributes currently stored for this session.
    #[serde(default)]
    pub keys: BTreeSet<String>,
}

impl SessionRecord {
    /// A fresh record: accessed at creation time, no attributes.
    pub fn new(created: i64, max_idle_ms: i64) -> Self {
        Self {
            created,
            accessed: created,
            max_idle_ms,
            id_changed: false,
            cookie_set: 0,
            keys: BTreeSet::new(),
        }
    }

    /// Whether the session has been idle longer than its timeout at `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        self.max_idle_ms > 0 && self.accessed.saturating_add(self.max_idle_ms) < now
    }

    /// Milliseconds until the session expires, `None` if it never does.
    pub fn remaining_ms(&self, now: i64) -> Option<i64> {
        (self.max_idle_ms > 0).then(|| {
            self.accessed
                .saturating_add(self.max_idle_ms)
                .saturating_sub(now)
                .max(0)
        })
    }

    pub(crate) fn encode(&self, key: &str) -> crate::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| crate::Error::codec(key, e))
    }

    pub(crate) fn decode(key: &str, bytes: &[u8]) -> crate::Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| crate::Error::codec(key, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record() {
        let record = SessionRecord::new(1_000, 3_000);
        assert_eq!(record.accessed, 1_000);
        assert!(record.keys.is_empty());
        assert!(!record.id_changed);
    }

    #[test]
    fn test_expiry() {
        let record = SessionRecord::new(1_000, 3_000);
        assert!(!record.is_expired(3_999));
        assert!(!record.is_expired(4_000));
        assert!(record.is_expired(4_001));
        assert_eq!(record.remaining_ms(2_000), Some(2_000));
        assert_eq!(record.remaining_ms(9_000), Some(0));
    }

    #[test]
    fn test_unbounded_never_expires() {
        for max_idle in [0, -1] {
            let record = SessionRecord::new(0, max_idle);
            assert!(!record.is_expired(i64::MAX));
            assert_eq!(record.remaining_ms(1), None);
        }
    }

    #[test]
    fn test_decode_tolerates_missing_optional_fields() {
        let record =
            SessionRecord::decode("abc", br#"{"created":5,"accessed":6,"max_idle_ms":7}"#)
                .unwrap();
        assert_eq!(record.created, 5);
        assert_eq!(record.cookie_set, 0);
        assert!(record.keys.is_empty());
    }

    #[test]
    fn test_decode_garbage() {
        let err = SessionRecord::decode("abc", b"not json").unwrap_err();
        assert!(matches!(err, crate::Error::Codec { key, .. } if key == "abc"));
    }
}
