//! StoreAssembly - assembles push payloads straight from the local store

use std::sync::Arc;
use tracing::debug;

use contracts::{AssembleType, AssemblyStrategy, Datum, Subscriber};

use crate::store::DatumStore;

/// Assembly strategy reading the subscriber's key from a [`DatumStore`].
///
/// Every assemble type receives the interface-level datum; the store keeps
/// no application-level metadata. A key owned by the store but without any
/// group assembles as an empty datum at version 0.
pub struct StoreAssembly {
    store: Arc<DatumStore>,
}

impl StoreAssembly {
    pub fn new(store: Arc<DatumStore>) -> Self {
        Self { store }
    }
}

impl AssemblyStrategy for StoreAssembly {
    fn assemble(
        &self,
        assemble_type: AssembleType,
        data_center: &str,
        subscriber: &Subscriber,
    ) -> Option<Datum> {
        if data_center != self.store.data_center() {
            debug!(%data_center, "No store for data center");
            return None;
        }
        let data_info_id = &subscriber.data_info_id;
        if !self.store.owns(data_info_id) {
            debug!(%data_info_id, %assemble_type, "Slot not owned, nothing to assemble");
            return None;
        }
        Some(self.store.get(data_info_id).unwrap_or_else(|| {
            Datum::empty(data_info_id.clone(), data_center, Default::default())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::{
        ConnectId, DatumVersion, ProcessId, ProtocolVersion, Publisher, PublisherVersion, Scope,
        SlotChangeListener, SlotRole,
    };

    fn subscriber(data_info_id: &str) -> Subscriber {
        Subscriber::new(
            "s1",
            data_info_id,
            Scope::Global,
            AssembleType::Interface,
            ProtocolVersion::StoreData,
            "10.0.0.1:1".parse().unwrap(),
        )
    }

    fn publisher(data_info_id: &str) -> Publisher {
        Publisher {
            data_info_id: data_info_id.into(),
            register_id: "p1".into(),
            connect_id: ConnectId::new("10.0.0.9:1".parse().unwrap(), "10.0.0.2:9600".parse().unwrap()),
            session_process_id: ProcessId::new("session-1", 1, 1),
            version: PublisherVersion::new(1, 1),
            payload: Bytes::from_static(b"x"),
        }
    }

    #[test]
    fn test_assembles_owned_key() {
        let store = Arc::new(DatumStore::new("DC1", 4));
        let slot = store.slot_of("foo");
        store.on_slot_add(slot, SlotRole::Leader);
        let assembly = StoreAssembly::new(Arc::clone(&store));

        let empty = assembly
            .assemble(AssembleType::App, "DC1", &subscriber("foo"))
            .unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.version, DatumVersion(0));

        let version = store.put_publisher(publisher("foo")).unwrap();
        let datum = assembly
            .assemble(AssembleType::Interface, "DC1", &subscriber("foo"))
            .unwrap();
        assert_eq!(datum.version, version);
        assert_eq!(datum.publisher_count(), 1);
    }

    #[test]
    fn test_unowned_or_foreign_yields_none() {
        let store = Arc::new(DatumStore::new("DC1", 4));
        let assembly = StoreAssembly::new(Arc::clone(&store));
        assert!(assembly
            .assemble(AssembleType::Interface, "DC1", &subscriber("foo"))
            .is_none());

        store.on_slot_add(store.slot_of("foo"), SlotRole::Leader);
        assert!(assembly
            .assemble(AssembleType::Interface, "DC2", &subscriber("foo"))
            .is_none());
    }
}
