//! RegistryNode - wires store, fabric and dispatcher together.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{info, warn};

use contracts::{LaneKind, RegistryConfig, SlotChangeListener, SlotId, SlotRole};
use datum_store::{DatumStore, StoreAssembly};
use dispatcher::{InMemorySubscriberIndex, LogPushTransport, PushDispatcher};
use executor::ExecutionFabric;
use observability::{metrics, PushMetricsAggregator};

use super::jobs::{ChangeDetectionJob, StatsRefreshJob, TombstoneCompactionJob};
use super::NodeStats;

/// Start-up options not carried by the configuration file
#[derive(Debug, Clone, Default)]
pub struct NodeOptions {
    /// Slots owned from the start, as leader. `None` owns every slot.
    pub initial_slots: Option<Vec<SlotId>>,
}

/// One running registry data node
pub struct RegistryNode {
    config: RegistryConfig,
    store: Arc<DatumStore>,
    fabric: Arc<ExecutionFabric>,
    dispatcher: Arc<PushDispatcher>,
    index: Arc<InMemorySubscriberIndex>,
    push_metrics: Arc<Mutex<PushMetricsAggregator>>,
    stats_job: Arc<StatsRefreshJob>,
    started_at: Instant,
}

impl RegistryNode {
    /// Build every component and schedule the maintenance jobs.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(config: RegistryConfig, options: NodeOptions) -> Result<Self> {
        let node = &config.node;
        let store = Arc::new(DatumStore::new(node.data_center.clone(), node.slot_count));
        let slots = options
            .initial_slots
            .unwrap_or_else(|| (0..node.slot_count).collect());
        for slot_id in slots {
            if slot_id >= node.slot_count {
                warn!(slot_id, slot_count = node.slot_count, "Ignoring slot outside the key space");
                continue;
            }
            store.on_slot_add(slot_id, SlotRole::Leader);
            metrics::record_slot_change(slot_id, SlotRole::Leader, true);
        }

        let fabric = Arc::new(
            ExecutionFabric::start(&config.lanes, &config.push)
                .context("Failed to start execution fabric")?,
        );

        let index = Arc::new(InMemorySubscriberIndex::new());
        let dispatcher = PushDispatcher::builder(node.data_center.clone(), Arc::clone(&fabric))
            .config(config.push.clone())
            .subscriber_index(index.clone())
            .assembly(Arc::new(StoreAssembly::new(Arc::clone(&store))))
            .transport(Arc::new(LogPushTransport::new("log")))
            .build()
            .context("Failed to build push dispatcher")?;

        let push_metrics = Arc::new(Mutex::new(PushMetricsAggregator::new()));
        let stats_job = Arc::new(StatsRefreshJob::new(
            Arc::clone(&store),
            Arc::clone(&fabric),
            Arc::clone(&dispatcher),
            Arc::clone(&push_metrics),
        ));

        let supervisor = fabric.supervisor();
        let scheduler = &config.scheduler;
        supervisor
            .spawn(
                Arc::new(ChangeDetectionJob::new(
                    Arc::clone(&store),
                    Arc::clone(&dispatcher),
                )),
                scheduler.fetch_data,
                Arc::clone(fabric.lane(LaneKind::DataFetch)),
            )
            .context("Failed to schedule change detection")?;
        supervisor
            .spawn(
                Arc::new(TombstoneCompactionJob::new(
                    Arc::clone(&store),
                    Duration::from_secs(config.store.tombstone_retention_secs),
                )),
                scheduler.clean_invalid_client,
                Arc::clone(fabric.lane(LaneKind::CleanInvalidClient)),
            )
            .context("Failed to schedule tombstone compaction")?;
        supervisor
            .spawn(
                Arc::clone(&stats_job),
                scheduler.refresh_cache,
                Arc::clone(fabric.lane(LaneKind::RefreshCache)),
            )
            .context("Failed to schedule stats refresh")?;

        info!(
            data_center = %node.data_center,
            zone = %node.zone,
            slots = store.slot_count(),
            "Registry node started"
        );

        Ok(Self {
            config,
            store,
            fabric,
            dispatcher,
            index,
            push_metrics,
            stats_job,
            started_at: Instant::now(),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<DatumStore> {
        &self.store
    }

    pub fn fabric(&self) -> &Arc<ExecutionFabric> {
        &self.fabric
    }

    pub fn dispatcher(&self) -> &Arc<PushDispatcher> {
        &self.dispatcher
    }

    pub fn subscriber_index(&self) -> &Arc<InMemorySubscriberIndex> {
        &self.index
    }

    /// Stop the jobs and the fabric, then report.
    pub async fn shutdown(self) -> NodeStats {
        // one last sample so the summary covers the whole run
        self.stats_job.refresh();
        let jobs = self.fabric.supervisor().snapshot();
        let shutdown = self.fabric.shutdown().await;
        let push_metrics = self.push_metrics.lock().clone();

        info!(clean = shutdown.is_clean(), "Registry node stopped");
        NodeStats {
            duration: self.started_at.elapsed(),
            slots: self.store.slot_count(),
            datums: self.store.datum_count(),
            publishers: self.store.publisher_count(),
            last_version: self.store.last_version().value(),
            jobs,
            push_metrics,
            shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        AssembleType, ConnectId, DataChange, DataInfoId, ProcessId, ProtocolVersion, Publisher,
        PublisherVersion, Scope, Subscriber,
    };
    use tokio::time::sleep;

    fn config() -> RegistryConfig {
        let mut config = RegistryConfig::default();
        config.node.data_center = "DC1".to_string();
        config.node.slot_count = 16;
        config.push.wheel_tick_ms = 10;
        config.push.wheel_size = 64;
        config
    }

    fn publisher(key: &str) -> Publisher {
        Publisher {
            data_info_id: DataInfoId::new(key),
            register_id: "p1".to_string(),
            connect_id: ConnectId::new(
                "10.0.0.1:5000".parse().unwrap(),
                "10.0.0.2:9600".parse().unwrap(),
            ),
            session_process_id: ProcessId::new("10.0.0.2", 1, 7),
            version: PublisherVersion::new(1, 100),
            payload: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_start_owns_requested_slots() {
        let node = RegistryNode::start(
            config(),
            NodeOptions {
                initial_slots: Some(vec![1, 3, 99]),
            },
        )
        .unwrap();
        assert_eq!(node.store().owned_slots(), vec![1, 3]);
        assert_eq!(node.fabric().supervisor().snapshot().len(), 3);

        let stats = node.shutdown().await;
        assert_eq!(stats.slots, 2);
        assert_eq!(stats.jobs.len(), 3);
        assert!(stats.shutdown.is_clean());
    }

    #[tokio::test]
    async fn test_change_reaches_subscriber() {
        let node = RegistryNode::start(config(), NodeOptions::default()).unwrap();
        assert_eq!(node.store().slot_count(), 16);

        let subscriber = Arc::new(Subscriber::new(
            "s1",
            "svc://foo",
            Scope::Zone,
            AssembleType::Interface,
            ProtocolVersion::StoreData,
            "10.0.0.9:7000".parse().unwrap(),
        ));
        node.subscriber_index().add(Arc::clone(&subscriber));

        let version = node.store().put_publisher(publisher("svc://foo")).unwrap();
        node.dispatcher()
            .on_data_change(DataChange::new("svc://foo", "DC1", version))
            .await
            .unwrap();
        sleep(Duration::from_millis(200)).await;
        assert_eq!(subscriber.acked_version("DC1"), Some(version));

        let stats = node.shutdown().await;
        assert_eq!(stats.publishers, 1);
        assert_eq!(stats.push_metrics.latest.acks_advanced, 1);
    }
}
