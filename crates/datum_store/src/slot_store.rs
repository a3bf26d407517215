//! Slot store: the publisher groups of one owned slot

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use contracts::{
    ConnectId, DataInfoId, Datum, DatumSummary, DatumVersion, ProcessId, Publisher,
    PublisherVersion, SlotId,
};

use crate::group::{PublisherGroup, VersionSource};

/// Groups of one slot keyed by dataInfoId.
///
/// Per-key mutations are serialized by the group lock; different keys of the
/// same slot proceed in parallel.
#[derive(Debug)]
pub struct SlotStore {
    slot_id: SlotId,
    data_center: Arc<str>,
    versions: Arc<VersionSource>,
    groups: DashMap<DataInfoId, Arc<PublisherGroup>>,
}

impl SlotStore {
    pub fn new(slot_id: SlotId, data_center: Arc<str>, versions: Arc<VersionSource>) -> Self {
        Self {
            slot_id,
            data_center,
            versions,
            groups: DashMap::new(),
        }
    }

    #[inline]
    pub fn slot_id(&self) -> SlotId {
        self.slot_id
    }

    pub fn group(&self, data_info_id: &str) -> Option<Arc<PublisherGroup>> {
        self.groups.get(data_info_id).map(|g| Arc::clone(g.value()))
    }

    pub fn group_or_create(&self, data_info_id: &DataInfoId) -> Arc<PublisherGroup> {
        if let Some(group) = self.group(data_info_id) {
            return group;
        }
        let entry = self.groups.entry(data_info_id.clone()).or_insert_with(|| {
            Arc::new(PublisherGroup::new(
                data_info_id.clone(),
                Arc::clone(&self.data_center),
                Arc::clone(&self.versions),
            ))
        });
        Arc::clone(entry.value())
    }

    /// Groups cloned out of the map so no shard lock is held while they are
    /// read or mutated.
    fn all_groups(&self) -> Vec<Arc<PublisherGroup>> {
        self.groups.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn get(&self, data_info_id: &str) -> Option<Datum> {
        self.group(data_info_id).map(|g| g.snapshot())
    }

    pub fn get_version(&self, data_info_id: &str) -> Option<DatumVersion> {
        self.group(data_info_id).map(|g| g.version())
    }

    pub fn get_versions(&self) -> HashMap<DataInfoId, DatumVersion> {
        self.all_groups()
            .into_iter()
            .map(|g| (g.data_info_id().clone(), g.version()))
            .collect()
    }

    pub fn get_all(&self) -> HashMap<DataInfoId, Datum> {
        self.all_groups()
            .into_iter()
            .map(|g| (g.data_info_id().clone(), g.snapshot()))
            .collect()
    }

    pub fn get_publishers(&self) -> HashMap<DataInfoId, HashMap<String, Arc<Publisher>>> {
        self.all_groups()
            .into_iter()
            .map(|g| {
                let datum = g.snapshot();
                (datum.data_info_id, datum.publishers)
            })
            .collect()
    }

    pub fn get_by_connect_id(&self, connect_id: &ConnectId) -> HashMap<String, Arc<Publisher>> {
        self.all_groups()
            .iter()
            .flat_map(|g| g.by_connect_id(connect_id))
            .map(|p| (p.register_id.clone(), p))
            .collect()
    }

    pub fn put_publisher(&self, publisher: Publisher) -> DatumVersion {
        self.group_or_create(&publisher.data_info_id).put(publisher)
    }

    pub fn create_group_if_absent(&self, data_info_id: &DataInfoId) -> DatumVersion {
        self.group_or_create(data_info_id).version()
    }

    pub fn update(&self, data_info_id: &str, publishers: Vec<Publisher>, now: i64) -> DatumVersion {
        self.group_or_create(&DataInfoId::new(data_info_id))
            .update(publishers, now)
    }

    pub fn remove_by_connect_id(
        &self,
        connect_id: &ConnectId,
        process_id: &ProcessId,
        register_timestamp: i64,
        now: i64,
    ) -> HashMap<DataInfoId, DatumVersion> {
        self.all_groups()
            .into_iter()
            .filter_map(|g| {
                g.remove_by_connect_id(connect_id, process_id, register_timestamp, now)
                    .map(|v| (g.data_info_id().clone(), v))
            })
            .collect()
    }

    /// Remove the publishers of one key. `None` when the key has no group.
    pub fn remove(&self, data_info_id: &str, process_id: Option<&ProcessId>, now: i64) -> Option<DatumVersion> {
        let group = self.group(data_info_id)?;
        Some(
            group
                .remove_by_process(process_id, now)
                .unwrap_or_else(|| group.version()),
        )
    }

    pub fn remove_publishers(
        &self,
        data_info_id: &str,
        process_id: Option<&ProcessId>,
        expected: &HashMap<String, PublisherVersion>,
        now: i64,
    ) -> Option<DatumVersion> {
        self.group(data_info_id)
            .map(|g| g.remove_publishers(process_id, expected, now))
    }

    pub fn clean(&self, process_id: &ProcessId, now: i64) -> HashMap<DataInfoId, DatumVersion> {
        self.all_groups()
            .into_iter()
            .filter_map(|g| {
                g.remove_by_process(Some(process_id), now)
                    .map(|v| (g.data_info_id().clone(), v))
            })
            .collect()
    }

    pub fn get_summary(&self, session_ip: Option<&str>) -> HashMap<DataInfoId, DatumSummary> {
        self.all_groups()
            .into_iter()
            .map(|g| (g.data_info_id().clone(), g.summary(session_ip)))
            .collect()
    }

    pub fn session_process_ids(&self) -> HashSet<ProcessId> {
        self.all_groups()
            .iter()
            .flat_map(|g| g.session_process_ids())
            .collect()
    }

    pub fn compact(&self, tombstone_timestamp: i64) -> HashMap<DataInfoId, usize> {
        self.all_groups()
            .into_iter()
            .filter_map(|g| {
                let n = g.compact(tombstone_timestamp);
                (n > 0).then(|| (g.data_info_id().clone(), n))
            })
            .collect()
    }

    pub fn update_version(&self) {
        for group in self.all_groups() {
            group.update_version();
        }
    }

    pub fn datum_count(&self) -> usize {
        self.groups.len()
    }

    pub fn publisher_count(&self) -> usize {
        self.all_groups().iter().map(|g| g.live_count()).sum()
    }
}
