//! Supervised maintenance jobs of a registry node.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use contracts::{DataChange, DataInfoId, DatumVersion, PeriodicJob};
use datum_store::DatumStore;
use dispatcher::PushDispatcher;
use executor::ExecutionFabric;
use observability::{metrics, PushMetricsAggregator};

pub const CHANGE_DETECTION: &str = "change_detection";
pub const TOMBSTONE_COMPACTION: &str = "tombstone_compaction";
pub const STATS_REFRESH: &str = "stats_refresh";

/// Notifies the dispatcher of every datum whose version moved since the
/// previous run.
pub struct ChangeDetectionJob {
    store: Arc<DatumStore>,
    dispatcher: Arc<PushDispatcher>,
    notified: Mutex<HashMap<DataInfoId, DatumVersion>>,
}

impl ChangeDetectionJob {
    pub fn new(store: Arc<DatumStore>, dispatcher: Arc<PushDispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            notified: Mutex::new(HashMap::new()),
        }
    }

    /// Changes not yet handed to the dispatcher, in key order.
    ///
    /// Keys no longer held locally are forgotten.
    fn pending_changes(&self) -> Vec<DataChange> {
        let current: HashMap<DataInfoId, DatumVersion> = self
            .store
            .owned_slots()
            .into_iter()
            .flat_map(|slot| self.store.get_versions(slot))
            .collect();
        let mut notified = self.notified.lock();
        notified.retain(|id, _| current.contains_key(id));
        let mut changes: Vec<DataChange> = current
            .into_iter()
            .filter(|(id, version)| notified.get(id).map_or(true, |seen| seen < version))
            .map(|(id, version)| DataChange::new(id, self.store.data_center(), version))
            .collect();
        changes.sort_by(|a, b| a.data_info_id.as_str().cmp(b.data_info_id.as_str()));
        changes
    }
}

impl PeriodicJob for ChangeDetectionJob {
    fn name(&self) -> &str {
        CHANGE_DETECTION
    }

    async fn run(&self) -> Result<()> {
        let changes = self.pending_changes();
        if changes.is_empty() {
            return Ok(());
        }

        let total = changes.len();
        let mut failed = 0usize;
        for change in changes {
            let (id, version) = (change.data_info_id.clone(), change.version);
            match self.dispatcher.on_data_change(change).await {
                Ok(()) => {
                    self.notified.lock().insert(id, version);
                }
                Err(e) => {
                    failed += 1;
                    warn!(data_info_id = %id, %version, error = %e, "Change notification not accepted");
                }
            }
        }

        debug!(total, failed, "Change detection pass finished");
        if failed > 0 {
            bail!("{failed} of {total} change notifications not accepted");
        }
        Ok(())
    }
}

/// Drops tombstones older than the retention window.
pub struct TombstoneCompactionJob {
    store: Arc<DatumStore>,
    retention: Duration,
}

impl TombstoneCompactionJob {
    pub fn new(store: Arc<DatumStore>, retention: Duration) -> Self {
        Self { store, retention }
    }

    fn cutoff(&self) -> i64 {
        let retention = i64::try_from(self.retention.as_millis()).unwrap_or(i64::MAX);
        chrono::Utc::now().timestamp_millis().saturating_sub(retention)
    }
}

impl PeriodicJob for TombstoneCompactionJob {
    fn name(&self) -> &str {
        TOMBSTONE_COMPACTION
    }

    async fn run(&self) -> Result<()> {
        let compacted = self.store.compact(self.cutoff());
        let removed: usize = compacted.values().sum();
        if removed > 0 {
            metrics::record_datum_mutation(self.store.data_center(), "compact", removed as u64);
            info!(keys = compacted.len(), removed, "Tombstones compacted");
        }
        Ok(())
    }
}

/// Publishes store, lane, job and push gauges.
pub struct StatsRefreshJob {
    store: Arc<DatumStore>,
    fabric: Arc<ExecutionFabric>,
    dispatcher: Arc<PushDispatcher>,
    aggregator: Arc<Mutex<PushMetricsAggregator>>,
}

impl StatsRefreshJob {
    pub fn new(
        store: Arc<DatumStore>,
        fabric: Arc<ExecutionFabric>,
        dispatcher: Arc<PushDispatcher>,
        aggregator: Arc<Mutex<PushMetricsAggregator>>,
    ) -> Self {
        Self {
            store,
            fabric,
            dispatcher,
            aggregator,
        }
    }

    pub fn refresh(&self) {
        metrics::record_store_stats(
            self.store.data_center(),
            self.store.slot_count(),
            self.store.datum_count(),
            self.store.publisher_count(),
            self.store.last_version().value(),
        );

        let dispatch = self.dispatcher.metrics();
        metrics::record_dispatch_snapshot(&dispatch);

        let mut aggregator = self.aggregator.lock();
        aggregator.update(&dispatch);
        for lane in self.fabric.lanes().snapshot() {
            metrics::record_lane_snapshot(&lane);
            aggregator.update_lane(&lane);
        }
        drop(aggregator);

        for job in self.fabric.supervisor().snapshot() {
            metrics::record_job_snapshot(&job);
        }
    }
}

impl PeriodicJob for StatsRefreshJob {
    fn name(&self) -> &str {
        STATS_REFRESH
    }

    async fn run(&self) -> Result<()> {
        self.refresh();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        ConnectId, LaneKind, ProcessId, PushConfig, Publisher, PublisherVersion, RegistryConfig,
        SlotChangeListener, SlotRole,
    };
    use dispatcher::mock::{RecordingTransport, StaticAssembly};
    use dispatcher::InMemorySubscriberIndex;

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
            payload: Default::default(),
        }
    }

    struct Fixture {
        store: Arc<DatumStore>,
        fabric: Arc<ExecutionFabric>,
        dispatcher: Arc<PushDispatcher>,
    }

    fn fixture() -> Fixture {
        let config = RegistryConfig::default();
        let push = PushConfig {
            retry_delay_ms: 1,
            ..PushConfig::default()
        };
        let store = Arc::new(DatumStore::new("DC1", 8));
        for slot in 0..8 {
            store.on_slot_add(slot, SlotRole::Leader);
        }
        let fabric = Arc::new(ExecutionFabric::start(&config.lanes, &push).unwrap());
        let dispatcher = PushDispatcher::builder("DC1", Arc::clone(&fabric))
            .config(push)
            .subscriber_index(Arc::new(InMemorySubscriberIndex::new()))
            .assembly(Arc::new(StaticAssembly::empty()))
            .transport(Arc::new(RecordingTransport::new()))
            .build()
            .unwrap();
        Fixture {
            store,
            fabric,
            dispatcher,
        }
    }

    #[tokio::test]
    async fn test_change_detection_notifies_once_per_version() {
        let f = fixture();
        let job = ChangeDetectionJob::new(Arc::clone(&f.store), Arc::clone(&f.dispatcher));
        f.store.put_publisher(publisher("svc://a", "p1")).unwrap();
        f.store.put_publisher(publisher("svc://b", "p1")).unwrap();

        assert_eq!(job.pending_changes().len(), 2);
        job.run().await.unwrap();
        assert!(job.pending_changes().is_empty());

        f.store.put_publisher(publisher("svc://a", "p2")).unwrap();
        let pending = job.pending_changes();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].data_info_id.as_str(), "svc://a");
        assert_eq!(pending[0].data_center, "DC1");

        f.fabric.shutdown().await;
    }

    #[tokio::test]
    async fn test_change_detection_forgets_removed_slots() {
        let f = fixture();
        let job = ChangeDetectionJob::new(Arc::clone(&f.store), Arc::clone(&f.dispatcher));
        f.store.put_publisher(publisher("svc://a", "p1")).unwrap();
        job.run().await.unwrap();
        assert_eq!(job.notified.lock().len(), 1);

        f.store.on_slot_remove(f.store.slot_of("svc://a"), SlotRole::Leader);
        assert!(job.pending_changes().is_empty());
        assert!(job.notified.lock().is_empty());

        f.fabric.shutdown().await;
    }

    #[tokio::test]
    async fn test_compaction_respects_retention() {
        let f = fixture();
        f.store.put_publisher(publisher("svc://a", "p1")).unwrap();
        f.store.remove("svc://a", None).unwrap();

        let keep = TombstoneCompactionJob::new(Arc::clone(&f.store), Duration::from_secs(600));
        keep.run().await.unwrap();
        assert_eq!(f.store.compact(i64::MAX).len(), 1);

        f.store.put_publisher(publisher("svc://b", "p1")).unwrap();
        f.store.remove("svc://b", None).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let drop_all = TombstoneCompactionJob::new(Arc::clone(&f.store), Duration::ZERO);
        drop_all.run().await.unwrap();
        assert!(f.store.compact(i64::MAX).is_empty());

        f.fabric.shutdown().await;
    }

    #[tokio::test]
    async fn test_stats_refresh_feeds_aggregator() {
        let f = fixture();
        let aggregator = Arc::new(Mutex::new(PushMetricsAggregator::new()));
        let job = StatsRefreshJob::new(
            Arc::clone(&f.store),
            Arc::clone(&f.fabric),
            Arc::clone(&f.dispatcher),
            Arc::clone(&aggregator),
        );
        job.run().await.unwrap();
        job.run().await.unwrap();

        let aggregator = aggregator.lock();
        assert_eq!(aggregator.samples, 2);
        assert_eq!(aggregator.lane_peaks.len(), LaneKind::ALL.len());
        drop(aggregator);

        f.fabric.shutdown().await;
    }
}
