//! Datum - immutable snapshot of a publisher group
//!
//! Also holds the version type shared by the store and the push pipeline,
//! the digest used for diff-based sync, and the change notification.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{DataInfoId, Publisher, PublisherVersion};

/// Monotonic per-group change counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatumVersion(pub u64);

impl DatumVersion {
    #[inline]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for DatumVersion {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl fmt::Display for DatumVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Point-in-time snapshot of one publisher group.
///
/// Never mutated after creation; publishers are shared by `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datum {
    pub data_info_id: DataInfoId,
    pub data_center: String,
    pub version: DatumVersion,
    /// register_id -> publisher
    pub publishers: HashMap<String, Arc<Publisher>>,
}

impl Datum {
    /// Empty datum, used when a group exists without any live publisher.
    pub fn empty(data_info_id: DataInfoId, data_center: impl Into<String>, version: DatumVersion) -> Self {
        Self {
            data_info_id,
            data_center: data_center.into(),
            version,
            publishers: HashMap::new(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }

    #[inline]
    pub fn publisher_count(&self) -> usize {
        self.publishers.len()
    }
}

/// Compact digest of one group (ids and versions, no payload)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatumSummary {
    pub data_info_id: DataInfoId,
    /// register_id -> publisher version
    pub publisher_versions: HashMap<String, PublisherVersion>,
}

impl DatumSummary {
    pub fn new(data_info_id: DataInfoId) -> Self {
        Self {
            data_info_id,
            publisher_versions: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.publisher_versions.is_empty()
    }
}

/// Change notification sent by a data node to session nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataChange {
    pub data_info_id: DataInfoId,
    /// Data center the change originated in
    pub data_center: String,
    pub version: DatumVersion,
}

impl DataChange {
    pub fn new(
        data_info_id: impl Into<DataInfoId>,
        data_center: impl Into<String>,
        version: impl Into<DatumVersion>,
    ) -> Self {
        Self {
            data_info_id: data_info_id.into(),
            data_center: data_center.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for DataChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/v{}", self.data_info_id, self.data_center, self.version)
    }
}
