//! PushDispatcher - turns data-change notifications into subscriber pushes

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use contracts::{
    AssembleType, AssemblyStrategy, DataChange, Datum, LaneKind, PushConfig, PushFailure,
    PushTransport, Scope, Subscriber, SubscriberIndex,
};
use executor::{ExecutionFabric, LaneError};

use crate::closure::PushClosure;
use crate::error::DispatchError;
use crate::metrics::{DispatchMetrics, DispatchSnapshot};

/// How one partition reaches its client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushRoute {
    /// Legacy client, one push to the address
    Single(SocketAddr),
    /// One push for every register id of the address group
    Multi,
}

/// Builder for creating a PushDispatcher
pub struct PushDispatcherBuilder {
    local_data_center: String,
    fabric: Arc<ExecutionFabric>,
    config: PushConfig,
    index: Option<Arc<dyn SubscriberIndex>>,
    assembly: Option<Arc<dyn AssemblyStrategy>>,
    transport: Option<Arc<dyn PushTransport>>,
}

impl PushDispatcherBuilder {
    pub fn new(local_data_center: impl Into<String>, fabric: Arc<ExecutionFabric>) -> Self {
        Self {
            local_data_center: local_data_center.into(),
            fabric,
            config: PushConfig::default(),
            index: None,
            assembly: None,
            transport: None,
        }
    }

    pub fn config(mut self, config: PushConfig) -> Self {
        self.config = config;
        self
    }

    pub fn subscriber_index(mut self, index: Arc<dyn SubscriberIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn assembly(mut self, assembly: Arc<dyn AssemblyStrategy>) -> Self {
        self.assembly = Some(assembly);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn PushTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// # Errors
    /// `MissingCollaborator` when the index, assembly or transport is unset.
    pub fn build(self) -> Result<Arc<PushDispatcher>, DispatchError> {
        let index = self
            .index
            .ok_or(DispatchError::MissingCollaborator("subscriber_index"))?;
        let assembly = self
            .assembly
            .ok_or(DispatchError::MissingCollaborator("assembly"))?;
        let transport = self
            .transport
            .ok_or(DispatchError::MissingCollaborator("transport"))?;

        info!(
            data_center = %self.local_data_center,
            stop_push = self.config.stop_push,
            confirm_timeout_ms = self.config.confirm_timeout_ms,
            "Push dispatcher ready"
        );

        Ok(Arc::new(PushDispatcher {
            stop_push: Arc::new(AtomicBool::new(self.config.stop_push)),
            local_data_center: self.local_data_center,
            index,
            assembly,
            transport,
            fabric: self.fabric,
            config: self.config,
            metrics: Arc::new(DispatchMetrics::new()),
        }))
    }
}

/// Change-driven push dispatcher of one session node
pub struct PushDispatcher {
    local_data_center: String,
    index: Arc<dyn SubscriberIndex>,
    assembly: Arc<dyn AssemblyStrategy>,
    transport: Arc<dyn PushTransport>,
    fabric: Arc<ExecutionFabric>,
    config: PushConfig,
    stop_push: Arc<AtomicBool>,
    metrics: Arc<DispatchMetrics>,
}

impl PushDispatcher {
    pub fn builder(
        local_data_center: impl Into<String>,
        fabric: Arc<ExecutionFabric>,
    ) -> PushDispatcherBuilder {
        PushDispatcherBuilder::new(local_data_center, fabric)
    }

    pub fn local_data_center(&self) -> &str {
        &self.local_data_center
    }

    /// Engage or release the global push-suppression switch
    pub fn set_stop_push(&self, stop: bool) {
        let previous = self.stop_push.swap(stop, Ordering::Relaxed);
        if previous != stop {
            info!(stop_push = stop, "Stop push switch changed");
        }
    }

    pub fn is_push_stopped(&self) -> bool {
        self.stop_push.load(Ordering::Relaxed)
    }

    pub fn metrics(&self) -> DispatchSnapshot {
        self.metrics.snapshot()
    }

    /// Schedule a change notification on the data-change lane.
    ///
    /// A rejected submission is retried up to `data_change_retry_times`
    /// attempts, `retry_delay_ms` apart.
    ///
    /// # Errors
    /// `RetriesExhausted` when every attempt was rejected, `Lane` when the
    /// lane is shut down.
    #[instrument(name = "dispatch_data_change", skip(self, change), fields(change = %change))]
    pub async fn on_data_change(self: &Arc<Self>, change: DataChange) -> Result<(), DispatchError> {
        self.metrics.add_notifications(1);
        let lane = self.fabric.lane(LaneKind::DataChange);
        let attempts = self.config.data_change_retry_times.max(1);

        for attempt in 1..=attempts {
            let this = Arc::clone(self);
            let task_change = change.clone();
            let submitted = lane
                .submit(async move {
                    this.handle_change(&task_change).await;
                })
                .await;
            match submitted {
                Ok(()) => return Ok(()),
                Err(LaneError::Rejected { .. }) if attempt < attempts => {
                    warn!(attempt, attempts, "Change task rejected, retrying");
                    sleep(self.config.retry_delay()).await;
                }
                Err(LaneError::Rejected { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.metrics.add_retries_exhausted(1);
        error!(attempts, "Change task dropped, retries exhausted");
        Err(DispatchError::RetriesExhausted {
            change: change.to_string(),
            attempts,
        })
    }

    /// Process one notification in place. Returns the closures started.
    #[instrument(name = "dispatch_handle_change", skip(self, change), fields(change = %change))]
    pub async fn handle_change(&self, change: &DataChange) -> usize {
        let is_local = change.data_center == self.local_data_center;
        let mut started = 0;

        for scope in Scope::ALL {
            let groups = self.index.query(&change.data_info_id, scope);
            if groups.is_empty() {
                self.metrics.add_scopes_skipped(1);
                continue;
            }
            if scope != Scope::Global && !is_local {
                debug!(%scope, "Origin is another data center, scope skipped");
                self.metrics.add_scopes_skipped(1);
                continue;
            }
            info!(%scope, addresses = groups.len(), "Subscribers to notify");

            let mut groups: Vec<_> = groups.into_iter().collect();
            groups.sort_by_key(|(address, _)| *address);
            for (address, group) in groups {
                let mut register_ids: Vec<String> = group.keys().cloned().collect();
                register_ids.sort();
                let mut subscribers: Vec<Arc<Subscriber>> = group.into_values().collect();
                subscribers.sort_by(|a, b| a.register_id.cmp(&b.register_id));

                let subscribers = self.filter_subscribers(change, subscribers);
                if subscribers.is_empty() {
                    continue;
                }
                started += self
                    .dispatch_group(change, scope, address, &register_ids, &subscribers)
                    .await;
            }
        }
        started
    }

    /// Drop subscribers already at the notified version or pending
    /// re-subscription.
    fn filter_subscribers(&self, change: &DataChange, mut subscribers: Vec<Arc<Subscriber>>) -> Vec<Arc<Subscriber>> {
        let before = subscribers.len();
        subscribers.retain(|s| s.needs_push(&change.data_center, change.version));
        self.metrics
            .add_filtered_current((before - subscribers.len()) as u64);

        if let Some(tracker) = self.index.resubscribe_tracker() {
            let before = subscribers.len();
            subscribers.retain(|s| !tracker.is_pending_resubscribe(s));
            self.metrics
                .add_filtered_resubscribe((before - subscribers.len()) as u64);
        }
        subscribers
    }

    async fn dispatch_group(
        &self,
        change: &DataChange,
        scope: Scope,
        address: SocketAddr,
        register_ids: &[String],
        subscribers: &[Arc<Subscriber>],
    ) -> usize {
        let mut started = 0;
        for assemble_type in AssembleType::ALL {
            let partition: Vec<Arc<Subscriber>> = subscribers
                .iter()
                .filter(|s| s.assemble_type == assemble_type)
                .cloned()
                .collect();
            let Some(representative) = partition.first().cloned() else {
                continue;
            };

            let Some(datum) =
                self.assembly
                    .assemble(assemble_type, &self.local_data_center, &representative)
            else {
                self.metrics.add_assembly_failures(1);
                error!(
                    data_info_id = %change.data_info_id,
                    data_center = %change.data_center,
                    %assemble_type,
                    "Publisher data assembly failed"
                );
                continue;
            };

            let route = match scope {
                Scope::Zone | Scope::DataCenter if representative.is_legacy() => {
                    PushRoute::Single(address)
                }
                _ => PushRoute::Multi,
            };

            let closure = PushClosure::new(
                change.clone(),
                partition.clone(),
                Arc::clone(&self.stop_push),
                Arc::clone(&self.metrics),
            );
            self.submit_push(
                &closure,
                route,
                Arc::new(datum),
                register_ids.to_vec(),
                partition,
                scope,
                representative,
            )
            .await;
            closure.start(self.fabric.timer(), self.config.confirm_timeout());
            started += 1;
        }
        started
    }

    #[allow(clippy::too_many_arguments)]
    async fn submit_push(
        &self,
        closure: &Arc<PushClosure>,
        route: PushRoute,
        datum: Arc<Datum>,
        register_ids: Vec<String>,
        subscribers: Vec<Arc<Subscriber>>,
        scope: Scope,
        representative: Arc<Subscriber>,
    ) {
        let completion = Arc::new(Mutex::new(Some(closure.register())));
        let task_completion = Arc::clone(&completion);
        let transport = Arc::clone(&self.transport);

        let task = async move {
            let Some(completion) = task_completion.lock().take() else {
                return;
            };
            match route {
                PushRoute::Single(address) => {
                    transport.push_single(address, datum, subscribers, completion, scope)
                }
                PushRoute::Multi => transport.push_multi(
                    datum,
                    register_ids,
                    subscribers,
                    scope,
                    representative,
                    completion,
                ),
            }
        };

        match self.fabric.lane(LaneKind::PushTask).submit(task).await {
            Ok(()) => self.metrics.add_pushes_submitted(1),
            Err(e) => {
                self.metrics.add_pushes_rejected(1);
                warn!(error = %e, ?route, "Push task not scheduled");
                if let Some(completion) = completion.lock().take() {
                    completion.fail(PushFailure::Rejected);
                }
            }
        }
    }
}

impl std::fmt::Debug for PushDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushDispatcher")
            .field("local_data_center", &self.local_data_center)
            .field("stop_push", &self.is_push_stopped())
            .field("config", &self.config)
            .finish()
    }
}
