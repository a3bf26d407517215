//! Datum store: slot id -> slot store, with slot lifecycle handling

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use contracts::{
    ConnectId, DataInfoId, Datum, DatumSummary, DatumVersion, ProcessId, Publisher,
    PublisherVersion, SlotChangeListener, SlotId, SlotRole,
};

use crate::error::{Result, StoreError};
use crate::group::VersionSource;
use crate::slot_function::{Fnv1aSlotFunction, SlotFunction};
use crate::slot_store::SlotStore;

/// Slot-sharded datum store of one data node.
///
/// Holds a [`SlotStore`] for every slot this node currently owns. Lookups
/// clone the slot's `Arc`, so an operation racing a slot removal sees the
/// slot either completely or not at all.
pub struct DatumStore {
    data_center: Arc<str>,
    slot_function: Box<dyn SlotFunction>,
    versions: Arc<VersionSource>,
    slots: DashMap<SlotId, Arc<SlotStore>>,
}

impl DatumStore {
    pub fn new(data_center: impl Into<String>, slot_count: u32) -> Self {
        Self::with_slot_function(data_center, Box::new(Fnv1aSlotFunction::new(slot_count)))
    }

    pub fn with_slot_function(data_center: impl Into<String>, slot_function: Box<dyn SlotFunction>) -> Self {
        Self {
            data_center: Arc::from(data_center.into()),
            slot_function,
            versions: Arc::new(VersionSource::new()),
            slots: DashMap::new(),
        }
    }

    pub fn data_center(&self) -> &str {
        &self.data_center
    }

    pub fn slot_function(&self) -> &dyn SlotFunction {
        self.slot_function.as_ref()
    }

    #[inline]
    pub fn slot_of(&self, data_info_id: &str) -> SlotId {
        self.slot_function.slot_of(data_info_id)
    }

    fn slot(&self, slot_id: SlotId) -> Option<Arc<SlotStore>> {
        self.slots.get(&slot_id).map(|s| Arc::clone(s.value()))
    }

    fn slot_for(&self, data_info_id: &str) -> Option<Arc<SlotStore>> {
        self.slot(self.slot_of(data_info_id))
    }

    fn all_slots(&self) -> Vec<Arc<SlotStore>> {
        self.slots.iter().map(|e| Arc::clone(e.value())).collect()
    }

    fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    // ===== Ownership =====

    /// True when the slot of `data_info_id` is owned by this node
    pub fn owns(&self, data_info_id: &str) -> bool {
        self.slot_for(data_info_id).is_some()
    }

    pub fn is_slot_owned(&self, slot_id: SlotId) -> bool {
        self.slots.contains_key(&slot_id)
    }

    /// Owned slot ids, ascending
    pub fn owned_slots(&self) -> Vec<SlotId> {
        let mut ids: Vec<SlotId> = self.slots.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    // ===== Reads =====

    /// Current datum, or `None` when the slot is not owned or the key absent.
    pub fn get(&self, data_info_id: &str) -> Option<Datum> {
        self.slot_for(data_info_id)?.get(data_info_id)
    }

    pub fn get_version(&self, data_info_id: &str) -> Option<DatumVersion> {
        self.slot_for(data_info_id)?.get_version(data_info_id)
    }

    pub fn get_versions(&self, slot_id: SlotId) -> HashMap<DataInfoId, DatumVersion> {
        self.slot(slot_id)
            .map(|s| s.get_versions())
            .unwrap_or_default()
    }

    pub fn get_all(&self) -> HashMap<DataInfoId, Datum> {
        let mut all = HashMap::with_capacity(64);
        for slot in self.all_slots() {
            all.extend(slot.get_all());
        }
        all
    }

    /// Live publishers of one connection across all slots, by register id
    pub fn get_by_connect_id(&self, connect_id: &ConnectId) -> HashMap<String, Arc<Publisher>> {
        let mut found = HashMap::with_capacity(64);
        for slot in self.all_slots() {
            found.extend(slot.get_by_connect_id(connect_id));
        }
        found
    }

    pub fn get_publishers(&self, slot_id: SlotId) -> HashMap<DataInfoId, HashMap<String, Arc<Publisher>>> {
        self.slot(slot_id)
            .map(|s| s.get_publishers())
            .unwrap_or_default()
    }

    /// Digest of one slot for diff sync, optionally restricted to the
    /// publishers attached through one session ip.
    pub fn get_datum_summary(&self, slot_id: SlotId, session_ip: Option<&str>) -> HashMap<DataInfoId, DatumSummary> {
        self.slot(slot_id)
            .map(|s| s.get_summary(session_ip))
            .unwrap_or_default()
    }

    pub fn get_session_process_ids(&self) -> HashSet<ProcessId> {
        self.all_slots()
            .iter()
            .flat_map(|s| s.session_process_ids())
            .collect()
    }

    // ===== Mutations =====

    /// Insert or replace a publisher; `None` when its slot is not owned.
    ///
    /// A publisher not newer than the stored registration (live or removed)
    /// is ignored and the current version returned.
    pub fn put_publisher(&self, publisher: Publisher) -> Option<DatumVersion> {
        let slot = self.slot_for(&publisher.data_info_id)?;
        Some(slot.put_publisher(publisher))
    }

    pub fn create_empty_datum_if_absent(&self, publisher: &Publisher) -> Option<DatumVersion> {
        let slot = self.slot_for(&publisher.data_info_id)?;
        Some(slot.create_group_if_absent(&publisher.data_info_id))
    }

    /// Replace the whole live set of one key
    pub fn update(&self, data_info_id: &str, publishers: Vec<Publisher>) -> Option<DatumVersion> {
        let slot = self.slot_for(data_info_id)?;
        Some(slot.update(data_info_id, publishers, Self::now_millis()))
    }

    /// Remove every publisher of a lost client connection registered at or
    /// before `register_timestamp`, across all slots.
    ///
    /// # Errors
    /// `MissingArgument` when either identifier is absent; nothing is touched.
    pub fn remove_by_connect_id(
        &self,
        connect_id: Option<&ConnectId>,
        process_id: Option<&ProcessId>,
        register_timestamp: i64,
    ) -> Result<HashMap<DataInfoId, DatumVersion>> {
        let process_id = process_id.ok_or(StoreError::MissingArgument { name: "session_process_id" })?;
        let connect_id = connect_id.ok_or(StoreError::MissingArgument { name: "connect_id" })?;
        let now = Self::now_millis();
        let mut versions = HashMap::with_capacity(32);
        for slot in self.all_slots() {
            versions.extend(slot.remove_by_connect_id(connect_id, process_id, register_timestamp, now));
        }
        debug!(%connect_id, %process_id, removed = versions.len(), "Removed publishers of connection");
        Ok(versions)
    }

    /// Administrative removal of one key.
    ///
    /// `None` as process id removes every publisher (sync leader path).
    pub fn remove(&self, data_info_id: &str, process_id: Option<&ProcessId>) -> Option<DatumVersion> {
        self.slot_for(data_info_id)?
            .remove(data_info_id, process_id, Self::now_millis())
    }

    /// Remove the listed publishers whose stored version equals the expected
    /// one; mismatches are skipped silently.
    pub fn remove_publishers(
        &self,
        data_info_id: &str,
        process_id: Option<&ProcessId>,
        expected: &HashMap<String, PublisherVersion>,
    ) -> Option<DatumVersion> {
        self.slot_for(data_info_id)?
            .remove_publishers(data_info_id, process_id, expected, Self::now_millis())
    }

    /// Remove every publisher of a session process, all slots.
    ///
    /// # Errors
    /// `MissingArgument` when the process id is absent.
    pub fn clean(&self, process_id: Option<&ProcessId>) -> Result<HashMap<DataInfoId, DatumVersion>> {
        let process_id = process_id.ok_or(StoreError::MissingArgument { name: "session_process_id" })?;
        let now = Self::now_millis();
        let mut versions = HashMap::with_capacity(32);
        for slot in self.all_slots() {
            versions.extend(slot.clean(process_id, now));
        }
        info!(%process_id, cleaned = versions.len(), "Cleaned publishers of session process");
        Ok(versions)
    }

    /// Drop tombstones removed before `tombstone_timestamp` (epoch millis).
    ///
    /// Only keys that lost at least one tombstone are reported.
    pub fn compact(&self, tombstone_timestamp: i64) -> HashMap<DataInfoId, usize> {
        let mut compacted = HashMap::new();
        for slot in self.all_slots() {
            compacted.extend(slot.compact(tombstone_timestamp));
        }
        compacted
    }

    /// Bump the version of every group in the slot
    pub fn update_version(&self, slot_id: SlotId) {
        if let Some(slot) = self.slot(slot_id) {
            slot.update_version();
        }
    }

    // ===== Statistics =====

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn datum_count(&self) -> usize {
        self.all_slots().iter().map(|s| s.datum_count()).sum()
    }

    pub fn publisher_count(&self) -> usize {
        self.all_slots().iter().map(|s| s.publisher_count()).sum()
    }

    /// Highest version handed out so far
    pub fn last_version(&self) -> DatumVersion {
        self.versions.current()
    }
}

impl SlotChangeListener for DatumStore {
    fn on_slot_add(&self, slot_id: SlotId, role: SlotRole) {
        let mut created = false;
        self.slots.entry(slot_id).or_insert_with(|| {
            created = true;
            Arc::new(SlotStore::new(
                slot_id,
                Arc::clone(&self.data_center),
                Arc::clone(&self.versions),
            ))
        });
        info!(
            data_center = %self.data_center,
            slot_id,
            %role,
            created,
            "Slot added"
        );
    }

    fn on_slot_remove(&self, slot_id: SlotId, role: SlotRole) {
        let removed = self.slots.remove(&slot_id).is_some();
        info!(
            data_center = %self.data_center,
            slot_id,
            %role,
            removed,
            "Slot removed"
        );
    }
}

impl std::fmt::Debug for DatumStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatumStore")
            .field("data_center", &self.data_center)
            .field("slot_count", &self.slot_function.slot_count())
            .field("owned_slots", &self.slots.len())
            .finish()
    }
}
