//! Lane - bounded task lane with isolated workers and queue
//!
//! Admission is bounded by `max_workers + queue_capacity` permits, execution
//! by `max_workers` permits. A task holds its admission permit from submit
//! until it finishes, so at most `queue_capacity` admitted tasks wait for a
//! worker at any time.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, error, instrument};

use contracts::{LaneConfig, LaneKind, SaturationPolicy};

use crate::error::LaneError;

/// Counters shared between the lane and its running tasks
#[derive(Debug, Default)]
struct LaneMetrics {
    active: AtomicUsize,
    queued: AtomicUsize,
    completed: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time view of one lane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneSnapshot {
    pub lane: LaneKind,
    pub active: usize,
    pub queued: usize,
    pub completed: u64,
    pub rejected: u64,
    pub max_workers: usize,
    pub queue_capacity: usize,
}

impl LaneMetrics {
    fn pending(&self) -> usize {
        self.active.load(Ordering::Relaxed) + self.queued.load(Ordering::Relaxed)
    }
}

/// Decrements `queued` once the task got a worker, or on drop if it never did
struct QueuedGuard {
    metrics: Arc<LaneMetrics>,
    idle: Arc<Notify>,
    armed: bool,
}

impl QueuedGuard {
    fn started(mut self) -> RunningGuard {
        self.armed = false;
        self.metrics.active.fetch_add(1, Ordering::Relaxed);
        self.metrics.queued.fetch_sub(1, Ordering::Relaxed);
        RunningGuard {
            metrics: Arc::clone(&self.metrics),
            idle: Arc::clone(&self.idle),
        }
    }
}

impl Drop for QueuedGuard {
    fn drop(&mut self) {
        if self.armed {
            self.metrics.queued.fetch_sub(1, Ordering::Relaxed);
            if self.metrics.pending() == 0 {
                self.idle.notify_waiters();
            }
        }
    }
}

/// Marks the task finished even when it panics
struct RunningGuard {
    metrics: Arc<LaneMetrics>,
    idle: Arc<Notify>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.metrics.completed.fetch_add(1, Ordering::Relaxed);
        self.metrics.active.fetch_sub(1, Ordering::Relaxed);
        if self.metrics.pending() == 0 {
            self.idle.notify_waiters();
        }
    }
}

/// A named execution lane.
///
/// `min_workers` is carried for configuration parity only; workers are
/// tokio tasks and nothing is kept warm.
pub struct Lane {
    kind: LaneKind,
    config: LaneConfig,
    admission: Arc<Semaphore>,
    workers: Arc<Semaphore>,
    metrics: Arc<LaneMetrics>,
    idle: Arc<Notify>,
}

impl Lane {
    pub fn new(kind: LaneKind, config: LaneConfig) -> Self {
        let max_workers = config.max_workers.max(1);
        Self {
            kind,
            config: LaneConfig {
                max_workers,
                ..config
            },
            admission: Arc::new(Semaphore::new(max_workers + config.queue_capacity)),
            workers: Arc::new(Semaphore::new(max_workers)),
            metrics: Arc::new(LaneMetrics::default()),
            idle: Arc::new(Notify::new()),
        }
    }

    #[inline]
    pub fn kind(&self) -> LaneKind {
        self.kind
    }

    #[inline]
    pub fn config(&self) -> &LaneConfig {
        &self.config
    }

    pub fn is_shut_down(&self) -> bool {
        self.admission.is_closed()
    }

    /// Submit a task according to the lane's saturation policy.
    ///
    /// Under `Reject` this never waits. Under `Block` it waits for room.
    pub async fn submit<F>(&self, task: F) -> Result<(), LaneError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.config.policy {
            SaturationPolicy::Reject => self.try_submit(task),
            SaturationPolicy::Block => {
                let permit = Arc::clone(&self.admission)
                    .acquire_owned()
                    .await
                    .map_err(|_| LaneError::ShutDown { lane: self.kind })?;
                self.spawn(permit, task);
                Ok(())
            }
        }
    }

    /// Submit without waiting, regardless of policy.
    ///
    /// # Errors
    /// `Rejected` when workers and queue are full, `ShutDown` after
    /// [`shutdown`](Self::shutdown).
    pub fn try_submit<F>(&self, task: F) -> Result<(), LaneError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match Arc::clone(&self.admission).try_acquire_owned() {
            Ok(permit) => {
                self.spawn(permit, task);
                Ok(())
            }
            Err(TryAcquireError::NoPermits) => {
                let rejected = self.metrics.rejected.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::counter!("registry_lane_rejected_total", "lane" => self.kind.as_str())
                    .increment(1);
                error!(
                    lane = %self.kind,
                    max_workers = self.config.max_workers,
                    queue_capacity = self.config.queue_capacity,
                    rejected,
                    "Task rejected, lane saturated"
                );
                Err(LaneError::Rejected { lane: self.kind })
            }
            Err(TryAcquireError::Closed) => Err(LaneError::ShutDown { lane: self.kind }),
        }
    }

    fn spawn<F>(&self, admission: OwnedSemaphorePermit, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.metrics.queued.fetch_add(1, Ordering::Relaxed);
        let queued = QueuedGuard {
            metrics: Arc::clone(&self.metrics),
            idle: Arc::clone(&self.idle),
            armed: true,
        };
        let workers = Arc::clone(&self.workers);

        tokio::spawn(async move {
            let _admission = admission;
            // the worker semaphore is never closed
            let Ok(_worker) = workers.acquire_owned().await else {
                return;
            };
            let _running = queued.started();
            task.await;
        });
    }

    pub fn snapshot(&self) -> LaneSnapshot {
        LaneSnapshot {
            lane: self.kind,
            active: self.metrics.active.load(Ordering::Relaxed),
            queued: self.metrics.queued.load(Ordering::Relaxed),
            completed: self.metrics.completed.load(Ordering::Relaxed),
            rejected: self.metrics.rejected.load(Ordering::Relaxed),
            max_workers: self.config.max_workers,
            queue_capacity: self.config.queue_capacity,
        }
    }

    /// Stop admitting tasks. Already admitted tasks still run.
    ///
    /// # Errors
    /// `ShutDown` when called twice.
    #[instrument(name = "lane_shutdown", skip(self), fields(lane = %self.kind))]
    pub fn shutdown(&self) -> Result<(), LaneError> {
        if self.admission.is_closed() {
            return Err(LaneError::ShutDown { lane: self.kind });
        }
        self.admission.close();
        debug!(lane = %self.kind, pending = self.pending(), "Lane closed");
        Ok(())
    }

    /// Wait until no task is running or queued
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn pending(&self) -> usize {
        self.metrics.pending()
    }
}

impl std::fmt::Debug for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lane")
            .field("kind", &self.kind)
            .field("config", &self.config)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
