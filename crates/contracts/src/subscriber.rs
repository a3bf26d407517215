//! Subscriber - interest registration owned by the session's interest store
//!
//! The push pipeline only reads subscribers and advances their per-data-center
//! acknowledged version.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use crate::{DataInfoId, DatumVersion};

/// Push delivery breadth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Zone,
    DataCenter,
    Global,
}

impl Scope {
    /// Every scope, in the order a change notification visits them
    pub const ALL: [Scope; 3] = [Scope::Zone, Scope::DataCenter, Scope::Global];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zone => "zone",
            Self::DataCenter => "data_center",
            Self::Global => "global",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload-shaping variant requested by a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssembleType {
    AppAndInterface,
    Interface,
    App,
}

impl AssembleType {
    pub const ALL: [AssembleType; 3] = [
        AssembleType::AppAndInterface,
        AssembleType::Interface,
        AssembleType::App,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AppAndInterface => "app_and_interface",
            Self::Interface => "interface",
            Self::App => "app",
        }
    }
}

impl fmt::Display for AssembleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire protocol generation of the subscribing client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolVersion {
    /// Pre-consolidation clients: one push per subscriber element
    Legacy,
    /// Clients that accept one push for many register ids
    #[default]
    StoreData,
}

/// A subscriber registration.
///
/// Acknowledged versions sit behind a per-subscriber lock so concurrent
/// closures for overlapping notifications serialize per subscriber.
#[derive(Debug)]
pub struct Subscriber {
    pub register_id: String,
    pub data_info_id: DataInfoId,
    pub scope: Scope,
    pub assemble_type: AssembleType,
    pub protocol: ProtocolVersion,
    /// Client address the subscription arrived from
    pub source_address: SocketAddr,
    /// data center -> last acknowledged version
    acked: RwLock<HashMap<String, DatumVersion>>,
}

impl Subscriber {
    pub fn new(
        register_id: impl Into<String>,
        data_info_id: impl Into<DataInfoId>,
        scope: Scope,
        assemble_type: AssembleType,
        protocol: ProtocolVersion,
        source_address: SocketAddr,
    ) -> Self {
        Self {
            register_id: register_id.into(),
            data_info_id: data_info_id.into(),
            scope,
            assemble_type,
            protocol,
            source_address,
            acked: RwLock::new(HashMap::new()),
        }
    }

    /// Last acknowledged version for a data center
    pub fn acked_version(&self, data_center: &str) -> Option<DatumVersion> {
        self.acked.read().get(data_center).copied()
    }

    /// True when this subscriber has not yet acknowledged `version`.
    pub fn needs_push(&self, data_center: &str, version: DatumVersion) -> bool {
        self.acked_version(data_center)
            .map_or(true, |acked| acked < version)
    }

    /// Advance the acknowledged version if `version` is newer.
    ///
    /// Returns true when the recorded value changed. Never regresses.
    pub fn advance_ack(&self, data_center: &str, version: DatumVersion) -> bool {
        let mut acked = self.acked.write();
        match acked.get_mut(data_center) {
            Some(current) if *current >= version => false,
            Some(current) => {
                *current = version;
                true
            }
            None => {
                acked.insert(data_center.to_string(), version);
                true
            }
        }
    }

    #[inline]
    pub fn is_legacy(&self) -> bool {
        self.protocol == ProtocolVersion::Legacy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber() -> Subscriber {
        Subscriber::new(
            "sub-1",
            "svc://foo",
            Scope::DataCenter,
            AssembleType::Interface,
            ProtocolVersion::StoreData,
            "127.0.0.1:34000".parse().unwrap(),
        )
    }

    #[test]
    fn test_needs_push_without_ack() {
        let s = subscriber();
        assert!(s.needs_push("DC1", DatumVersion(1)));
    }

    #[test]
    fn test_advance_never_regresses() {
        let s = subscriber();
        assert!(s.advance_ack("DC1", DatumVersion(7)));
        assert!(!s.advance_ack("DC1", DatumVersion(5)));
        assert!(!s.advance_ack("DC1", DatumVersion(7)));
        assert_eq!(s.acked_version("DC1"), Some(DatumVersion(7)));
        assert!(!s.needs_push("DC1", DatumVersion(7)));
        assert!(s.needs_push("DC1", DatumVersion(8)));
    }

    #[test]
    fn test_overlapping_acks_never_lower_the_record() {
        let s = subscriber();
        std::thread::scope(|scope| {
            for t in 0..8u64 {
                let s = &s;
                scope.spawn(move || {
                    // interleaved, out of order across threads
                    let mine: Vec<u64> = (t..800).step_by(8).collect();
                    for &v in mine.iter().rev().chain(mine.iter()) {
                        s.advance_ack("DC1", DatumVersion(v));
                        assert!(s.acked_version("DC1").unwrap() >= DatumVersion(v));
                    }
                });
            }
            scope.spawn(|| {
                let mut last = DatumVersion(0);
                for _ in 0..5_000 {
                    if let Some(acked) = s.acked_version("DC1") {
                        assert!(acked >= last);
                        last = acked;
                    }
                }
            });
        });
        assert_eq!(s.acked_version("DC1"), Some(DatumVersion(799)));
        assert_eq!(s.acked_version("DC2"), None);
    }

    #[test]
    fn test_acks_are_per_data_center() {
        let s = subscriber();
        s.advance_ack("DC1", DatumVersion(9));
        assert!(s.needs_push("DC2", DatumVersion(1)));
    }
}
