//! Publisher group: all publishers of one dataInfoId
//!
//! The group keeps removed publishers as tombstones so that a late,
//! out-of-order put of an already removed registration is rejected.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use contracts::{
    ConnectId, DataInfoId, Datum, DatumSummary, DatumVersion, ProcessId, Publisher,
    PublisherVersion,
};

/// Store-wide source of datum versions
#[derive(Debug, Default)]
pub struct VersionSource {
    last: AtomicU64,
}

impl VersionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next version; strictly greater than every value returned before.
    pub fn next(&self) -> DatumVersion {
        DatumVersion(self.last.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn current(&self) -> DatumVersion {
        DatumVersion(self.last.load(Ordering::Acquire))
    }
}

#[derive(Debug, Clone)]
struct Tombstone {
    version: PublisherVersion,
    session_process_id: ProcessId,
    removed_at: i64,
}

#[derive(Debug, Clone)]
enum Entry {
    Live(Arc<Publisher>),
    Removed(Tombstone),
}

impl Entry {
    fn version(&self) -> PublisherVersion {
        match self {
            Entry::Live(p) => p.version,
            Entry::Removed(t) => t.version,
        }
    }

    fn live(&self) -> Option<&Arc<Publisher>> {
        match self {
            Entry::Live(p) => Some(p),
            Entry::Removed(_) => None,
        }
    }
}

#[derive(Debug)]
struct GroupState {
    version: DatumVersion,
    entries: HashMap<String, Entry>,
}

impl GroupState {
    fn tombstone(&mut self, register_id: &str, now: i64) -> bool {
        let Some(entry) = self.entries.get_mut(register_id) else {
            return false;
        };
        let Entry::Live(publisher) = &*entry else {
            return false;
        };
        let tombstone = Tombstone {
            version: publisher.version,
            session_process_id: publisher.session_process_id.clone(),
            removed_at: now,
        };
        *entry = Entry::Removed(tombstone);
        true
    }
}

/// All publishers registered under one dataInfoId, plus the group version.
///
/// Mutations take the write lock and bump the version inside it, so a reader
/// always sees a version that matches the publisher set it reads.
#[derive(Debug)]
pub struct PublisherGroup {
    data_info_id: DataInfoId,
    data_center: Arc<str>,
    versions: Arc<VersionSource>,
    state: RwLock<GroupState>,
}

impl PublisherGroup {
    pub fn new(data_info_id: DataInfoId, data_center: Arc<str>, versions: Arc<VersionSource>) -> Self {
        let version = versions.next();
        Self {
            data_info_id,
            data_center,
            versions,
            state: RwLock::new(GroupState {
                version,
                entries: HashMap::new(),
            }),
        }
    }

    #[inline]
    pub fn data_info_id(&self) -> &DataInfoId {
        &self.data_info_id
    }

    pub fn version(&self) -> DatumVersion {
        self.state.read().version
    }

    /// Immutable snapshot of the live publishers
    pub fn snapshot(&self) -> Datum {
        let state = self.state.read();
        Datum {
            data_info_id: self.data_info_id.clone(),
            data_center: self.data_center.to_string(),
            version: state.version,
            publishers: state
                .entries
                .iter()
                .filter_map(|(id, e)| e.live().map(|p| (id.clone(), Arc::clone(p))))
                .collect(),
        }
    }

    /// Insert or replace a publisher by register id.
    ///
    /// A publisher whose version is not newer than the stored entry, live or
    /// tombstoned, is ignored and the current version returned.
    pub fn put(&self, publisher: Publisher) -> DatumVersion {
        let mut state = self.state.write();
        if let Some(existing) = state.entries.get(&publisher.register_id) {
            if !existing.version().order_than(&publisher.version) {
                tracing::debug!(
                    data_info_id = %self.data_info_id,
                    register_id = %publisher.register_id,
                    stored = %existing.version(),
                    incoming = %publisher.version,
                    "Ignoring stale publisher"
                );
                return state.version;
            }
        }
        state
            .entries
            .insert(publisher.register_id.clone(), Entry::Live(Arc::new(publisher)));
        self.bump(&mut state)
    }

    /// Replace the whole live set. Publishers not in `publishers` become
    /// tombstones.
    pub fn update(&self, publishers: Vec<Publisher>, now: i64) -> DatumVersion {
        let mut state = self.state.write();
        let incoming: HashSet<&str> = publishers.iter().map(|p| p.register_id.as_str()).collect();
        let dropped: Vec<String> = state
            .entries
            .iter()
            .filter(|(id, e)| e.live().is_some() && !incoming.contains(id.as_str()))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &dropped {
            state.tombstone(id, now);
        }
        for publisher in publishers {
            state
                .entries
                .insert(publisher.register_id.clone(), Entry::Live(Arc::new(publisher)));
        }
        self.bump(&mut state)
    }

    /// Tombstone every live publisher of `connect_id` owned by `process_id`
    /// and registered at or before `register_timestamp`.
    ///
    /// Returns the new version when something was removed.
    pub fn remove_by_connect_id(
        &self,
        connect_id: &ConnectId,
        process_id: &ProcessId,
        register_timestamp: i64,
        now: i64,
    ) -> Option<DatumVersion> {
        self.remove_where(now, |p| {
            p.connect_id == *connect_id
                && p.session_process_id == *process_id
                && p.register_timestamp() <= register_timestamp
        })
    }

    /// Tombstone every live publisher of `process_id`, or all of them when
    /// `process_id` is `None`.
    ///
    /// Returns the new version when something was removed.
    pub fn remove_by_process(&self, process_id: Option<&ProcessId>, now: i64) -> Option<DatumVersion> {
        self.remove_where(now, |p| {
            process_id.map_or(true, |pid| p.session_process_id == *pid)
        })
    }

    /// Tombstone publishers whose stored version equals the expected one.
    ///
    /// Mismatched or unknown register ids are skipped. Returns the group
    /// version, bumped only if something was removed.
    pub fn remove_publishers(
        &self,
        process_id: Option<&ProcessId>,
        expected: &HashMap<String, PublisherVersion>,
        now: i64,
    ) -> DatumVersion {
        let mut state = self.state.write();
        let matched: Vec<String> = expected
            .iter()
            .filter(|(id, version)| {
                state.entries.get(id.as_str()).and_then(Entry::live).is_some_and(|p| {
                    p.version == **version
                        && process_id.map_or(true, |pid| p.session_process_id == *pid)
                })
            })
            .map(|(id, _)| id.clone())
            .collect();
        if matched.is_empty() {
            return state.version;
        }
        for id in &matched {
            state.tombstone(id, now);
        }
        self.bump(&mut state)
    }

    /// Bump the version without changing the publisher set
    pub fn update_version(&self) -> DatumVersion {
        let mut state = self.state.write();
        self.bump(&mut state)
    }

    /// Live publishers bound to `connect_id`
    pub fn by_connect_id(&self, connect_id: &ConnectId) -> Vec<Arc<Publisher>> {
        self.state
            .read()
            .entries
            .values()
            .filter_map(Entry::live)
            .filter(|p| p.connect_id == *connect_id)
            .cloned()
            .collect()
    }

    /// Live publisher versions, optionally restricted to one session ip
    pub fn summary(&self, session_ip: Option<&str>) -> DatumSummary {
        let state = self.state.read();
        let mut summary = DatumSummary::new(self.data_info_id.clone());
        summary.publisher_versions = state
            .entries
            .iter()
            .filter_map(|(id, e)| e.live().map(|p| (id, p)))
            .filter(|(_, p)| {
                session_ip.map_or(true, |ip| p.connect_id.session_addr.ip().to_string() == ip)
            })
            .map(|(id, p)| (id.clone(), p.version))
            .collect();
        summary
    }

    /// Session processes owning at least one live publisher
    pub fn session_process_ids(&self) -> HashSet<ProcessId> {
        self.state
            .read()
            .entries
            .values()
            .filter_map(Entry::live)
            .map(|p| p.session_process_id.clone())
            .collect()
    }

    /// Drop tombstones removed before `tombstone_timestamp`; returns how many.
    pub fn compact(&self, tombstone_timestamp: i64) -> usize {
        let mut state = self.state.write();
        let before = state.entries.len();
        state.entries.retain(|_, e| match e {
            Entry::Live(_) => true,
            Entry::Removed(t) => t.removed_at >= tombstone_timestamp,
        });
        before - state.entries.len()
    }

    pub fn live_count(&self) -> usize {
        self.state
            .read()
            .entries
            .values()
            .filter(|e| e.live().is_some())
            .count()
    }

    pub fn tombstone_count(&self) -> usize {
        self.state
            .read()
            .entries
            .values()
            .filter(|e| matches!(e, Entry::Removed(_)))
            .count()
    }

    /// Session process recorded on a tombstone, if `register_id` is one
    pub fn tombstone_owner(&self, register_id: &str) -> Option<ProcessId> {
        match self.state.read().entries.get(register_id) {
            Some(Entry::Removed(t)) => Some(t.session_process_id.clone()),
            _ => None,
        }
    }

    fn remove_where(&self, now: i64, pred: impl Fn(&Publisher) -> bool) -> Option<DatumVersion> {
        let mut state = self.state.write();
        let matched: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, e)| e.live().is_some_and(|p| pred(p.as_ref())))
            .map(|(id, _)| id.clone())
            .collect();
        if matched.is_empty() {
            return None;
        }
        for id in &matched {
            state.tombstone(id, now);
        }
        Some(self.bump(&mut state))
    }

    fn bump(&self, state: &mut GroupState) -> DatumVersion {
        state.version = self.versions.next();
        state.version
    }
}
