//! Supervisor - periodic jobs with timeout and exponential backoff
//!
//! Each job gets its own scheduling loop. An execution runs on the job's
//! lane; the loop waits for it at most `timeout`. A timed out, failed or
//! rejected execution doubles the delay up to `timeout * backoff_bound`, a
//! successful one resets it to `timeout`. Nothing a job does stops its loop.
//!
//! A timed out execution keeps running on its lane. Until it finishes, every
//! tick of that job is skipped and counted as timed out, so executions of
//! one job never overlap.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use contracts::{PeriodicJob, SupervisedJobConfig};

use crate::error::FabricError;
use crate::lane::Lane;

/// Result of one supervised execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failed,
    TimedOut,
    Rejected,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Rejected => "rejected",
        }
    }
}

/// Delay before the next execution.
///
/// `baseline` is the job timeout; failures double `current`, capped at
/// `baseline * bound`.
pub fn next_delay(current: Duration, baseline: Duration, bound: u32, outcome: RunOutcome) -> Duration {
    match outcome {
        RunOutcome::Success => baseline,
        _ => {
            let cap = baseline.saturating_mul(bound.max(1));
            current.saturating_mul(2).min(cap)
        }
    }
}

#[derive(Debug, Default)]
struct JobStats {
    runs: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    rejections: AtomicU64,
    delay_ms: AtomicU64,
}

impl JobStats {
    fn record(&self, outcome: RunOutcome, delay: Duration) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            RunOutcome::Success => &self.successes,
            RunOutcome::Failed => &self.failures,
            RunOutcome::TimedOut => &self.timeouts,
            RunOutcome::Rejected => &self.rejections,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
    }
}

/// Point-in-time view of one supervised job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub name: String,
    pub runs: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub rejections: u64,
    pub current_delay: Duration,
}

struct SupervisedJob {
    name: String,
    stats: Arc<JobStats>,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Periodic job scheduler
#[derive(Default)]
pub struct Supervisor {
    jobs: Mutex<Vec<SupervisedJob>>,
    stopped: std::sync::atomic::AtomicBool,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start supervising `job`, executing it on `lane`.
    ///
    /// # Errors
    /// `AlreadyStopped` after [`shutdown`](Self::shutdown).
    #[instrument(name = "supervisor_spawn", skip(self, job, lane), fields(job = job.name()))]
    pub fn spawn<J>(&self, job: Arc<J>, config: SupervisedJobConfig, lane: Arc<Lane>) -> Result<(), FabricError>
    where
        J: PeriodicJob + Sync + 'static,
    {
        if self.stopped.load(Ordering::Acquire) {
            return Err(FabricError::already_stopped("supervisor"));
        }
        let name = job.name().to_string();
        let stats = Arc::new(JobStats::default());
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(supervise(job, config, lane, Arc::clone(&stats), stop_rx));
        info!(
            job = %name,
            initial_delay_secs = config.initial_delay_secs,
            timeout_secs = config.timeout_secs,
            backoff_bound = config.backoff_bound,
            "Supervised job scheduled"
        );
        self.jobs.lock().push(SupervisedJob {
            name,
            stats,
            stop_tx,
            handle,
        });
        Ok(())
    }

    /// Stop scheduling one job. A running execution finishes.
    pub fn cancel(&self, name: &str) -> bool {
        let jobs = self.jobs.lock();
        match jobs.iter().find(|j| j.name == name) {
            Some(job) => job.stop_tx.send(true).is_ok(),
            None => false,
        }
    }

    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        self.jobs
            .lock()
            .iter()
            .map(|j| JobSnapshot {
                name: j.name.clone(),
                runs: j.stats.runs.load(Ordering::Relaxed),
                successes: j.stats.successes.load(Ordering::Relaxed),
                failures: j.stats.failures.load(Ordering::Relaxed),
                timeouts: j.stats.timeouts.load(Ordering::Relaxed),
                rejections: j.stats.rejections.load(Ordering::Relaxed),
                current_delay: Duration::from_millis(j.stats.delay_ms.load(Ordering::Relaxed)),
            })
            .collect()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stop every scheduling loop and wait for them to exit.
    ///
    /// # Errors
    /// `AlreadyStopped` when called twice.
    #[instrument(name = "supervisor_shutdown", skip(self))]
    pub async fn shutdown(&self) -> Result<(), FabricError> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Err(FabricError::already_stopped("supervisor"));
        }
        let jobs: Vec<SupervisedJob> = std::mem::take(&mut *self.jobs.lock());
        for job in &jobs {
            let _ = job.stop_tx.send(true);
        }
        let mut failed = Vec::new();
        for job in jobs {
            if let Err(e) = job.handle.await {
                error!(job = %job.name, error = ?e, "Supervisor loop panicked");
                failed.push(job.name);
            }
        }
        if failed.is_empty() {
            debug!("Supervisor shutdown complete");
            Ok(())
        } else {
            Err(FabricError::Shutdown {
                component: "supervisor".to_string(),
                message: format!("loops panicked: {}", failed.join(", ")),
            })
        }
    }
}

/// Sleep for `delay` unless stopped first. Returns false when stopped.
async fn pause(delay: Duration, stop_rx: &mut watch::Receiver<bool>) -> bool {
    if *stop_rx.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = stop_rx.changed() => false,
    }
}

async fn supervise<J>(
    job: Arc<J>,
    config: SupervisedJobConfig,
    lane: Arc<Lane>,
    stats: Arc<JobStats>,
    mut stop_rx: watch::Receiver<bool>,
) where
    J: PeriodicJob + Sync + 'static,
{
    let baseline = config.timeout();
    let mut delay = baseline;

    if !pause(config.initial_delay(), &mut stop_rx).await {
        return;
    }
    let mut in_flight = None;
    loop {
        let outcome = run_once(&job, &lane, baseline, &mut in_flight).await;
        delay = next_delay(delay, baseline, config.backoff_bound, outcome);
        stats.record(outcome, delay);
        metrics::counter!(
            "registry_supervisor_runs_total",
            "job" => job.name().to_string(),
            "outcome" => outcome.as_str()
        )
        .increment(1);

        if outcome != RunOutcome::Success {
            warn!(
                job = job.name(),
                outcome = outcome.as_str(),
                next_delay_ms = delay.as_millis() as u64,
                "Supervised job backing off"
            );
        }
        if !pause(delay, &mut stop_rx).await {
            break;
        }
    }
    debug!(job = job.name(), "Supervised job stopped");
}

type Completion = oneshot::Receiver<anyhow::Result<()>>;

async fn run_once<J>(
    job: &Arc<J>,
    lane: &Lane,
    timeout: Duration,
    in_flight: &mut Option<Completion>,
) -> RunOutcome
where
    J: PeriodicJob + Sync + 'static,
{
    if let Some(previous) = in_flight.as_mut() {
        if let Err(oneshot::error::TryRecvError::Empty) = previous.try_recv() {
            warn!(job = job.name(), "Previous execution still running, skipping tick");
            return RunOutcome::TimedOut;
        }
        *in_flight = None;
    }

    let (tx, mut rx) = oneshot::channel();
    let task_job = Arc::clone(job);
    let submitted = lane.try_submit(async move {
        let result = task_job.run().await;
        let _ = tx.send(result);
    });
    if submitted.is_err() {
        return RunOutcome::Rejected;
    }

    match tokio::time::timeout(timeout, &mut rx).await {
        Ok(Ok(Ok(()))) => RunOutcome::Success,
        Ok(Ok(Err(e))) => {
            error!(job = job.name(), error = %e, "Supervised job failed");
            RunOutcome::Failed
        }
        Ok(Err(_)) => {
            error!(job = job.name(), "Supervised job aborted without result");
            RunOutcome::Failed
        }
        Err(_) => {
            warn!(job = job.name(), timeout_ms = timeout.as_millis() as u64, "Supervised job timed out");
            *in_flight = Some(rx);
            RunOutcome::TimedOut
        }
    }
}
