//! Publisher - one registration of data under a dataInfoId
//!
//! Publishers are owned by the slot store holding their group; the types
//! here are the immutable registration records shared with readers.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::net::SocketAddr;

use crate::DataInfoId;

/// Identity of one client connection: the client socket and the session
/// server socket it is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectId {
    pub client_addr: SocketAddr,
    pub session_addr: SocketAddr,
}

impl ConnectId {
    pub fn new(client_addr: SocketAddr, session_addr: SocketAddr) -> Self {
        Self {
            client_addr,
            session_addr,
        }
    }
}

impl fmt::Display for ConnectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.client_addr, self.session_addr)
    }
}

/// Identity of one session server process incarnation.
///
/// A restarted session process gets a new start timestamp, so publishers
/// from the previous incarnation can be cleaned without touching new ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessId {
    pub host: String,
    pub start_timestamp: i64,
    pub pid: u32,
}

impl ProcessId {
    pub fn new(host: impl Into<String>, start_timestamp: i64, pid: u32) -> Self {
        Self {
            host: host.into(),
            start_timestamp,
            pid,
        }
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.host, self.pid, self.start_timestamp)
    }
}

/// Per-publisher version: client supplied counter plus register timestamp.
///
/// Ordered by `version` first, then by `register_timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PublisherVersion {
    pub version: u64,
    pub register_timestamp: i64,
}

impl PublisherVersion {
    pub fn new(version: u64, register_timestamp: i64) -> Self {
        Self {
            version,
            register_timestamp,
        }
    }

    /// True when `self` is strictly older than `other`.
    #[inline]
    pub fn order_than(&self, other: &PublisherVersion) -> bool {
        self < other
    }
}

impl PartialOrd for PublisherVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublisherVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version
            .cmp(&other.version)
            .then(self.register_timestamp.cmp(&other.register_timestamp))
    }
}

impl fmt::Display for PublisherVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.version, self.register_timestamp)
    }
}

/// A single publisher registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publisher {
    /// Key of the group this publisher belongs to
    pub data_info_id: DataInfoId,

    /// Unique within its group
    pub register_id: String,

    /// Connection the registration arrived on
    pub connect_id: ConnectId,

    /// Session process that owns the connection
    pub session_process_id: ProcessId,

    pub version: PublisherVersion,

    /// Opaque published data
    #[serde(default)]
    pub payload: Bytes,
}

impl Publisher {
    /// Register timestamp shortcut, used by connection-loss cleanup.
    #[inline]
    pub fn register_timestamp(&self) -> i64 {
        self.version.register_timestamp
    }
}
