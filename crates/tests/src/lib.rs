//! # Integration Tests
//!
//! Cross-crate and end-to-end tests.
//!
//! Covers:
//! - contract snapshot tests
//! - store -> assembly -> dispatcher -> acknowledgement flows
//! - lane backpressure and node lifecycle

#[cfg(test)]
mod contract_tests {
    use contracts::{LaneKind, LanesConfig, RegistryConfig};

    #[test]
    fn test_contracts_compile() {
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_default_config_is_valid() {
        config_loader::ConfigLoader::validate(&RegistryConfig::default()).unwrap();
        assert_eq!(LanesConfig::default().iter().count(), LaneKind::ALL.len());
    }
}

#[cfg(test)]
mod store_tests {
    use std::collections::HashMap;

    use bytes::Bytes;
    use contracts::{
        ConnectId, DataInfoId, Datum, ProcessId, Publisher, PublisherVersion, SlotChangeListener,
        SlotId, SlotRole,
    };
    use datum_store::{DatumStore, SlotFunction};

    /// Routes every key to slot 3
    struct FixedSlot;

    impl SlotFunction for FixedSlot {
        fn slot_count(&self) -> u32 {
            16
        }

        fn slot_of(&self, _data_info_id: &str) -> SlotId {
            3
        }
    }

    fn process() -> ProcessId {
        ProcessId::new("10.0.0.2", 1_700_000_000_000, 42)
    }

    fn connect(port: u16) -> ConnectId {
        ConnectId::new(
            format!("10.0.0.1:{port}").parse().unwrap(),
            "10.0.0.2:9600".parse().unwrap(),
        )
    }

    fn publisher(id: &str, port: u16, version: u64) -> Publisher {
        Publisher {
            data_info_id: DataInfoId::new("svc://foo"),
            register_id: id.to_string(),
            connect_id: connect(port),
            session_process_id: process(),
            version: PublisherVersion::new(version, 100),
            payload: Bytes::from_static(b"10.0.0.1:12200"),
        }
    }

    fn register_ids(datum: &Datum) -> Vec<String> {
        let mut ids: Vec<_> = datum.publishers.keys().cloned().collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_unowned_reads_are_absent() {
        let store = DatumStore::new("DC1", 16);
        for key in ["svc://a", "svc://b", "svc://c"] {
            assert!(store.get(key).is_none());
            assert!(store.get_version(key).is_none());
        }
    }

    #[test]
    fn test_slot_three_lifecycle() {
        let store = DatumStore::with_slot_function("DC1", Box::new(FixedSlot));
        store.on_slot_add(3, SlotRole::Leader);

        let v1 = store.put_publisher(publisher("p1", 5001, 1)).unwrap();
        let v2 = store.put_publisher(publisher("p2", 5002, 1)).unwrap();
        let v3 = store.put_publisher(publisher("p3", 5003, 1)).unwrap();
        assert!(v1 < v2 && v2 < v3);

        let v4 = store
            .update(
                "svc://foo",
                vec![publisher("p1", 5001, 1), publisher("p3", 5003, 1)],
            )
            .unwrap();
        assert!(v4 > v3);

        let by_connect = store.get_by_connect_id(&connect(5002));
        assert!(by_connect.is_empty());
        let datum = store.get("svc://foo").unwrap();
        assert_eq!(register_ids(&datum), vec!["p1", "p3"]);
        assert_eq!(datum.version, v4);
    }

    #[test]
    fn test_versions_survive_recreate() {
        let store = DatumStore::with_slot_function("DC1", Box::new(FixedSlot));
        store.on_slot_add(3, SlotRole::Leader);
        let mut last = store.put_publisher(publisher("p1", 5001, 1)).unwrap();

        let removed = store.remove("svc://foo", None).unwrap();
        assert!(removed > last);
        last = removed;

        store.on_slot_remove(3, SlotRole::Leader);
        assert!(store.get_version("svc://foo").is_none());
        store.on_slot_add(3, SlotRole::Leader);

        let recreated = store.put_publisher(publisher("p1", 5001, 2)).unwrap();
        assert!(recreated > last);
    }

    #[test]
    fn test_conditional_remove() {
        let store = DatumStore::with_slot_function("DC1", Box::new(FixedSlot));
        store.on_slot_add(3, SlotRole::Leader);
        let v = store.put_publisher(publisher("p1", 5001, 5)).unwrap();

        let stale = HashMap::from([("p1".to_string(), PublisherVersion::new(4, 100))]);
        let unchanged = store
            .remove_publishers("svc://foo", Some(&process()), &stale)
            .unwrap();
        assert_eq!(unchanged, v);
        assert!(store.get("svc://foo").unwrap().publishers.contains_key("p1"));

        let current = HashMap::from([("p1".to_string(), PublisherVersion::new(5, 100))]);
        let removed = store
            .remove_publishers("svc://foo", Some(&process()), &current)
            .unwrap();
        assert!(removed > v);
        assert!(store.get("svc://foo").unwrap().publishers.is_empty());
    }

    #[test]
    fn test_idempotent_slot_add() {
        let store = DatumStore::with_slot_function("DC1", Box::new(FixedSlot));
        store.on_slot_add(5, SlotRole::Leader);
        store.on_slot_add(3, SlotRole::Leader);
        store.put_publisher(publisher("p1", 5001, 1)).unwrap();

        store.on_slot_add(3, SlotRole::Leader);
        assert_eq!(store.owned_slots(), vec![3, 5]);
        assert_eq!(store.publisher_count(), 1);
    }

    #[test]
    fn test_missing_identifiers_fail_fast() {
        let store = DatumStore::with_slot_function("DC1", Box::new(FixedSlot));
        store.on_slot_add(3, SlotRole::Leader);
        store.put_publisher(publisher("p1", 5001, 1)).unwrap();

        assert!(store.remove_by_connect_id(Some(&connect(5001)), None, i64::MAX).is_err());
        assert!(store.clean(None).is_err());
        assert_eq!(store.publisher_count(), 1);
    }
}

#[cfg(test)]
mod push_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use contracts::{
        AssembleType, ConnectId, DataChange, DataInfoId, Datum, DatumVersion, ProcessId,
        ProtocolVersion, Publisher, PublisherVersion, RegistryConfig, Scope, SlotChangeListener, SlotRole,
        Subscriber,
    };
    use datum_store::{DatumStore, StoreAssembly};
    use dispatcher::mock::{RecordingTransport, StaticAssembly};
    use dispatcher::{InMemorySubscriberIndex, PushDispatcher};
    use executor::ExecutionFabric;
    use tokio::time::sleep;

    struct Harness {
        store: Arc<DatumStore>,
        fabric: Arc<ExecutionFabric>,
        index: Arc<InMemorySubscriberIndex>,
        transport: Arc<RecordingTransport>,
        dispatcher: Arc<PushDispatcher>,
    }

    impl Harness {
        fn new(assembly: Option<Arc<StaticAssembly>>) -> Self {
            let mut config = RegistryConfig::default();
            config.push.wheel_tick_ms = 10;
            config.push.wheel_size = 64;
            config.push.confirm_timeout_ms = 500;

            let store = Arc::new(DatumStore::new("DC1", 16));
            for slot in 0..16 {
                store.on_slot_add(slot, SlotRole::Leader);
            }
            let fabric = Arc::new(ExecutionFabric::start(&config.lanes, &config.push).unwrap());
            let index = Arc::new(InMemorySubscriberIndex::new());
            let transport = Arc::new(RecordingTransport::new());
            let builder = PushDispatcher::builder("DC1", Arc::clone(&fabric))
                .config(config.push.clone())
                .subscriber_index(index.clone())
                .transport(transport.clone());
            let builder = match assembly {
                Some(assembly) => builder.assembly(assembly),
                None => builder.assembly(Arc::new(StoreAssembly::new(Arc::clone(&store)))),
            };
            Self {
                store,
                fabric,
                index,
                transport,
                dispatcher: builder.build().unwrap(),
            }
        }

        fn subscribe(&self, id: &str, key: &str, scope: Scope, acked: Option<u64>) -> Arc<Subscriber> {
            let subscriber = Arc::new(Subscriber::new(
                id,
                key,
                scope,
                AssembleType::Interface,
                ProtocolVersion::StoreData,
                "10.0.0.9:7000".parse().unwrap(),
            ));
            if let Some(v) = acked {
                subscriber.advance_ack("DC1", DatumVersion(v));
            }
            self.index.add(Arc::clone(&subscriber));
            subscriber
        }
    }

    fn publisher(key: &str, id: &str) -> Publisher {
        Publisher {
            data_info_id: DataInfoId::new(key),
            register_id: id.to_string(),
            connect_id: ConnectId::new(
                "10.0.0.1:5000".parse().unwrap(),
                "10.0.0.2:9600".parse().unwrap(),
            ),
            session_process_id: ProcessId::new("10.0.0.2", 1, 7),
            version: PublisherVersion::new(1, 100),
            payload: Bytes::from_static(b"endpoint"),
        }
    }

    #[tokio::test]
    async fn test_only_stale_subscriber_is_pushed() {
        let datum = Datum::empty(DataInfoId::new("foo"), "DC1", DatumVersion(7));
        let h = Harness::new(Some(Arc::new(StaticAssembly::new(datum))));
        let s1 = h.subscribe("s1", "foo", Scope::DataCenter, Some(5));
        let s2 = h.subscribe("s2", "foo", Scope::DataCenter, Some(7));

        let pushed = h
            .dispatcher
            .handle_change(&DataChange::new("foo", "DC1", 7u64))
            .await;
        assert_eq!(pushed, 1);
        sleep(Duration::from_millis(50)).await;

        let pushes = h.transport.pushes();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].subscribers(), ["s1".to_string()]);
        assert_eq!(s1.acked_version("DC1"), Some(DatumVersion(7)));
        assert_eq!(s2.acked_version("DC1"), Some(DatumVersion(7)));

        h.fabric.shutdown().await;
    }

    #[tokio::test]
    async fn test_ack_gates_next_version() {
        let datum = Datum::empty(DataInfoId::new("svc://x"), "DC1", DatumVersion(8));
        let h = Harness::new(Some(Arc::new(StaticAssembly::new(datum))));
        let s = h.subscribe("s", "svc://x", Scope::DataCenter, Some(7));

        let change = |v: u64| DataChange::new("svc://x", "DC1", v);
        assert_eq!(h.dispatcher.handle_change(&change(7)).await, 0);
        assert_eq!(h.dispatcher.handle_change(&change(8)).await, 1);
        sleep(Duration::from_millis(50)).await;
        assert_eq!(s.acked_version("DC1"), Some(DatumVersion(8)));

        h.fabric.shutdown().await;
    }

    #[tokio::test]
    async fn test_store_change_reaches_subscriber() {
        let h = Harness::new(None);
        let s = h.subscribe("s", "svc://foo", Scope::Zone, None);

        let version = h.store.put_publisher(publisher("svc://foo", "p1")).unwrap();
        h.dispatcher
            .on_data_change(DataChange::new("svc://foo", "DC1", version))
            .await
            .unwrap();
        sleep(Duration::from_millis(200)).await;

        let pushes = h.transport.pushes();
        assert_eq!(pushes.len(), 1);
        assert_eq!(s.acked_version("DC1"), Some(version));
        assert_eq!(h.dispatcher.metrics().acks_advanced, 1);

        h.fabric.shutdown().await;
    }

    #[tokio::test]
    async fn test_remote_change_only_reaches_global_scope() {
        let h = Harness::new(None);
        let zone = h.subscribe("zone", "svc://foo", Scope::Zone, None);
        let global = h.subscribe("global", "svc://foo", Scope::Global, None);

        h.store.put_publisher(publisher("svc://foo", "p1")).unwrap();
        let pushed = h
            .dispatcher
            .handle_change(&DataChange::new("svc://foo", "DC2", 3u64))
            .await;
        sleep(Duration::from_millis(50)).await;

        // zone and data-center scopes only follow local changes
        assert_eq!(pushed, 1);
        assert_eq!(zone.acked_version("DC2"), None);
        assert_eq!(global.acked_version("DC2"), Some(DatumVersion(3)));
        let pushes = h.transport.pushes();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].subscribers(), ["global".to_string()]);

        h.fabric.shutdown().await;
    }
}

#[cfg(test)]
mod lane_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{LaneConfig, LaneKind, SaturationPolicy};
    use executor::{Lane, LaneError};
    use tokio::sync::oneshot;

    async fn saturated(policy: SaturationPolicy) -> (Arc<Lane>, Vec<oneshot::Sender<()>>) {
        let lane = Arc::new(Lane::new(
            LaneKind::PushTask,
            LaneConfig::new(1, 2, 0, policy),
        ));
        let mut releases = Vec::new();
        for _ in 0..2 {
            let (tx, rx) = oneshot::channel::<()>();
            lane.submit(async move {
                let _ = rx.await;
            })
            .await
            .unwrap();
            releases.push(tx);
        }
        (lane, releases)
    }

    #[tokio::test]
    async fn test_third_task_rejected_and_counted() {
        let (lane, releases) = saturated(SaturationPolicy::Reject).await;
        let err = lane.submit(async {}).await.unwrap_err();
        assert_eq!(err, LaneError::Rejected { lane: LaneKind::PushTask });
        assert_eq!(lane.snapshot().rejected, 1);

        drop(releases);
        lane.wait_idle().await;
        assert_eq!(lane.snapshot().completed, 2);
    }

    #[tokio::test]
    async fn test_third_task_blocks_until_room() {
        let (lane, mut releases) = saturated(SaturationPolicy::Block).await;
        let ran = Arc::new(AtomicUsize::new(0));

        let submitter = {
            let lane = Arc::clone(&lane);
            let ran = Arc::clone(&ran);
            tokio::spawn(async move {
                lane.submit(async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!submitter.is_finished());

        let _ = releases.remove(0).send(());
        submitter.await.unwrap().unwrap();
        drop(releases);
        lane.wait_idle().await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(lane.snapshot().rejected, 0);
    }
}

#[cfg(test)]
mod node_tests {
    use std::io::Write;

    use contracts::{DataChange, RegistryConfig};
    use registry_node::{NodeOptions, RegistryNode};

    #[tokio::test]
    async fn test_node_from_config_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(
            br#"
[node]
data_center = "DC7"
slot_count = 8

[push]
wheel_tick_ms = 10
wheel_size = 64
"#,
        )
        .unwrap();
        let config = config_loader::ConfigLoader::load_from_path(file.path()).unwrap();
        let node = RegistryNode::start(
            config,
            NodeOptions {
                initial_slots: Some(vec![0, 1]),
            },
        )
        .unwrap();
        assert_eq!(node.store().data_center(), "DC7");
        assert_eq!(node.dispatcher().local_data_center(), "DC7");

        node.dispatcher()
            .on_data_change(DataChange::new("svc://none", "DC7", 1u64))
            .await
            .unwrap();

        let stats = node.shutdown().await;
        assert_eq!(stats.slots, 2);
        assert!(stats.shutdown.is_clean());
        assert_eq!(stats.push_metrics.latest.notifications, 1);
    }

    #[tokio::test]
    async fn test_default_config_node() {
        let node = RegistryNode::start(RegistryConfig::default(), NodeOptions::default()).unwrap();
        assert_eq!(node.store().slot_count(), 256);
        let stats = node.shutdown().await;
        assert_eq!(stats.jobs.len(), 3);
    }
}
