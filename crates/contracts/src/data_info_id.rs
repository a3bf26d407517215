//! DataInfoId - logical key of one publishable data item
//!
//! Uses `Arc<str>` internally: ids are parsed once at registration time and
//! then cloned into every group, snapshot, summary and change notification.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Separator between the parts of a fully qualified data id.
pub const DATA_INFO_SEPARATOR: &str = "#@#";

/// Logical key of a data item.
///
/// A fully qualified id has the form `dataId#@#instanceId#@#group`, but any
/// string is accepted; the store only hashes and compares it.
///
/// # Examples
/// ```
/// use contracts::DataInfoId;
///
/// let id = DataInfoId::compose("com.foo.Service", "DEFAULT_INSTANCE_ID", "RPC");
/// assert_eq!(id.as_str(), "com.foo.Service#@#DEFAULT_INSTANCE_ID#@#RPC");
/// assert_eq!(id.data_id(), "com.foo.Service");
/// assert_eq!(id.group(), Some("RPC"));
/// ```
#[derive(Clone, Default)]
pub struct DataInfoId(Arc<str>);

impl DataInfoId {
    #[inline]
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// Build a fully qualified id from its parts.
    pub fn compose(data_id: &str, instance_id: &str, group: &str) -> Self {
        Self::from(format!(
            "{data_id}{DATA_INFO_SEPARATOR}{instance_id}{DATA_INFO_SEPARATOR}{group}"
        ))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The leading `dataId` part (the whole id when it is not qualified).
    pub fn data_id(&self) -> &str {
        self.parts().next().unwrap_or_default()
    }

    pub fn instance_id(&self) -> Option<&str> {
        self.parts().nth(1)
    }

    pub fn group(&self) -> Option<&str> {
        self.parts().nth(2)
    }

    fn parts(&self) -> std::str::Split<'_, &'static str> {
        self.0.split(DATA_INFO_SEPARATOR)
    }
}

impl Deref for DataInfoId {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for DataInfoId {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for DataInfoId {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DataInfoId {
    #[inline]
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for DataInfoId {
    #[inline]
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for DataInfoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DataInfoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataInfoId({:?})", self.0)
    }
}

impl PartialEq for DataInfoId {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for DataInfoId {}

impl PartialEq<str> for DataInfoId {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0.as_ref() == other
    }
}

impl PartialEq<&str> for DataInfoId {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0.as_ref() == *other
    }
}

// Must hash exactly like `str` so maps keyed by DataInfoId accept `&str` lookups.
impl Hash for DataInfoId {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl Serialize for DataInfoId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DataInfoId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_unqualified_id() {
        let id = DataInfoId::from("svc://foo");
        assert_eq!(id.data_id(), "svc://foo");
        assert_eq!(id.instance_id(), None);
        assert_eq!(id.group(), None);
    }

    #[test]
    fn test_map_lookup_by_str() {
        let mut map: HashMap<DataInfoId, u64> = HashMap::new();
        map.insert(DataInfoId::compose("a", "i", "g"), 1);
        assert_eq!(map.get("a#@#i#@#g"), Some(&1));
        assert_eq!(map.get("a"), None);
    }

    #[test]
    fn test_serde_as_plain_string() {
        let id: DataInfoId = "svc://bar".into();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"svc://bar\"");
        let parsed: DataInfoId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
