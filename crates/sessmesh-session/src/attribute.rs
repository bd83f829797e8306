//! Session attribute values and the activation / passivation capability.
//!
//! Attribute values leave process memory every time they are written and
//! come back every time they are read. A value that wants to know about
//! that crossing implements [`ActivationListener`] and exposes it through
//! [`Attribute::as_listener`] / [`Attribute::as_listener_mut`]. Values that
//! don't are stored and loaded without any callback.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Identifies the session an activation callback fires for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    cluster_id: String,
}

impl SessionEvent {
    /// Event for the session with the given cluster id.
    pub fn new(cluster_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
        }
    }

    /// Cluster id of the session.
    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }
}

/// Callbacks fired when a value crosses the process boundary.
pub trait ActivationListener {
    /// The value is about to be written to the cache.
    fn will_passivate(&self, _event: &SessionEvent) {}

    /// The value has just been read back from the cache.
    fn did_activate(&mut self, _event: &SessionEvent) {}
}

/// A value that can be stored as a session attribute.
///
/// Values are stored as JSON. A value that serializes to `null` (such as
/// `None`) is treated as "no value" and removes the attribute.
pub trait Attribute: Serialize + DeserializeOwned + Send + Sync {
    /// The value's activation capability, if it has one.
    fn as_listener(&self) -> Option<&dyn ActivationListener> {
        None
    }

    /// Mutable access to the value's activation capability, if it has one.
    fn as_listener_mut(&mut self) -> Option<&mut dyn ActivationListener> {
        None
    }
}

macro_rules! plain_attribute {
    ($($ty:ty),* $(,)?) => {
        $(impl Attribute for $ty {})*
    };
}

plain_attribute!(
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    String,
    serde_json::Value,
);

impl<T: Attribute> Attribute for Option<T> {
    fn as_listener(&self) -> Option<&dyn ActivationListener> {
        self.as_ref().and_then(|v| v.as_listener())
    }

    fn as_listener_mut(&mut self) -> Option<&mut dyn ActivationListener> {
        self.as_mut().and_then(|v| v.as_listener_mut())
    }
}

impl<T: Attribute> Attribute for Vec<T> {}

impl<V: Attribute> Attribute for BTreeMap<String, V> {}

impl<V: Attribute> Attribute for HashMap<String, V> {}

/// Serialize a value, returning `None` when it stands for "no value".
pub(crate) fn encode<T: Attribute>(key: &str, value: &T) -> crate::Result<Option<Vec<u8>>> {
    let json = serde_json::to_value(value).map_err(|e| crate::Error::codec(key, e))?;
    if json.is_null() {
        return Ok(None);
    }
    serde_json::to_vec(&json)
        .map(Some)
        .map_err(|e| crate::Error::codec(key, e))
}

pub(crate) fn decode<T: Attribute>(key: &str, bytes: &[u8]) -> crate::Result<T> {
    serde_json::from_slice(bytes).map_err(|e| crate::Error::codec(key, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Tracked {
        label: String,
        #[serde(skip)]
        activations: u32,
    }

    impl ActivationListener for Tracked {
        fn did_activate(&mut self, _event: &SessionEvent) {
            self.activations += 1;
        }
    }

    impl Attribute for Tracked {
        fn as_listener(&self) -> Option<&dyn ActivationListener> {
            Some(self)
        }

        fn as_listener_mut(&mut self) -> Option<&mut dyn ActivationListener> {
            Some(self)
        }
    }

    #[test]
    fn test_plain_values_have_no_listener() {
        assert!(42i64.as_listener().is_none());
        assert!(String::from("x").as_listener().is_none());
    }

    #[test]
    fn test_option_delegates_listener() {
        let mut some = Some(Tracked::default());
        assert!(some.as_listener().is_some());

        let event = SessionEvent::new("abc");
        if let Some(listener) = some.as_listener_mut() {
            listener.did_activate(&event);
        }
        assert_eq!(some.as_ref().map(|t| t.activations), Some(1));

        let none: Option<Tracked> = None;
        assert!(none.as_listener().is_none());
    }

    #[test]
    fn test_null_encodes_to_nothing() {
        assert!(encode("k", &None::<i64>).unwrap().is_none());
        assert!(encode("k", &serde_json::Value::Null).unwrap().is_none());
        assert_eq!(encode("k", &1000i64).unwrap(), Some(b"1000".to_vec()));
    }

    #[test]
    fn test_decode_wrong_type() {
        let err = decode::<i64>("abc/foo", b"\"text\"").unwrap_err();
        assert!(matches!(err, crate::Error::Codec { .. }));
    }
}
