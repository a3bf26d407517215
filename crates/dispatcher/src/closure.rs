//! PushClosure - reconciles subscriber acks from asynchronous push results
//!
//! One closure covers one (dataInfoId, version, subscriber partition). Every
//! push registered with it reports through a [`PushCompletion`]; the closure
//! finishes once, with success when every registration succeeded, failure
//! on the first failed one, or timeout when the confirmation timer fires
//! first.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use contracts::{DataChange, PushCompletion, PushResult, Subscriber};
use executor::{TimeoutHandle, WheelTimer};

use crate::metrics::DispatchMetrics;

/// Final state of a closure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Success,
    Failed,
    TimedOut,
}

pub struct PushClosure {
    change: DataChange,
    subscribers: Vec<Arc<Subscriber>>,
    stop_push: Arc<AtomicBool>,
    metrics: Arc<DispatchMetrics>,
    expected: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicBool,
    started: AtomicBool,
    finished: AtomicBool,
    outcome: Mutex<Option<PushOutcome>>,
    timeout: Mutex<Option<TimeoutHandle>>,
}

impl PushClosure {
    pub fn new(
        change: DataChange,
        subscribers: Vec<Arc<Subscriber>>,
        stop_push: Arc<AtomicBool>,
        metrics: Arc<DispatchMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            change,
            subscribers,
            stop_push,
            metrics,
            expected: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            failed: AtomicBool::new(false),
            started: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            outcome: Mutex::new(None),
            timeout: Mutex::new(None),
        })
    }

    /// Register one push; the returned handle must be given to the transport.
    pub fn register(self: &Arc<Self>) -> PushCompletion {
        self.expected.fetch_add(1, Ordering::SeqCst);
        let closure = Arc::clone(self);
        PushCompletion::new(move |result| closure.on_result(result))
    }

    /// Arm the confirmation timeout. Results arriving before `start` are
    /// kept and evaluated here.
    pub fn start(self: &Arc<Self>, timer: &WheelTimer, confirm_timeout: Duration) {
        let closure = Arc::clone(self);
        match timer.new_timeout(confirm_timeout, move || closure.finish(PushOutcome::TimedOut)) {
            Ok(handle) => *self.timeout.lock() = Some(handle),
            Err(e) => warn!(
                change = %self.change,
                error = %e,
                "Confirmation timer unavailable, closure relies on push results only"
            ),
        }
        self.started.store(true, Ordering::SeqCst);
        self.try_finish();
    }

    pub fn outcome(&self) -> Option<PushOutcome> {
        *self.outcome.lock()
    }

    pub fn subscribers(&self) -> &[Arc<Subscriber>] {
        &self.subscribers
    }

    fn on_result(&self, result: PushResult) {
        if let Err(failure) = &result {
            self.failed.store(true, Ordering::SeqCst);
            debug!(change = %self.change, %failure, "Push failed");
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.try_finish();
    }

    fn try_finish(&self) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }
        if self.failed.load(Ordering::SeqCst) {
            self.finish(PushOutcome::Failed);
        } else if self.completed.load(Ordering::SeqCst) >= self.expected.load(Ordering::SeqCst) {
            self.finish(PushOutcome::Success);
        }
    }

    fn finish(&self, outcome: PushOutcome) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.timeout.lock().take() {
            handle.cancel();
        }
        *self.outcome.lock() = Some(outcome);
        self.reconcile(outcome);
    }

    fn reconcile(&self, outcome: PushOutcome) {
        let DataChange {
            data_info_id,
            data_center,
            version,
        } = &self.change;
        match outcome {
            PushOutcome::Success if self.stop_push.load(Ordering::Relaxed) => {
                self.metrics.add_closures_succeeded(1);
                self.metrics.add_closures_suppressed(1);
                info!(
                    %data_info_id,
                    %data_center,
                    %version,
                    "Stop push switch on, subscriber versions not updated"
                );
            }
            PushOutcome::Success => {
                let advanced = self
                    .subscribers
                    .iter()
                    .filter(|s| s.advance_ack(data_center, *version))
                    .count();
                self.metrics.add_closures_succeeded(1);
                self.metrics.add_acks_advanced(advanced as u64);
                info!(
                    %data_info_id,
                    %data_center,
                    %version,
                    subscribers = self.subscribers.len(),
                    advanced,
                    "Push succeeded"
                );
            }
            PushOutcome::Failed | PushOutcome::TimedOut => {
                if outcome == PushOutcome::Failed {
                    self.metrics.add_closures_failed(1);
                } else {
                    self.metrics.add_closures_timed_out(1);
                }
                warn!(
                    %data_info_id,
                    %data_center,
                    %version,
                    ?outcome,
                    "Push not confirmed, subscriber versions not updated"
                );
            }
        }
    }
}

impl std::fmt::Debug for PushClosure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushClosure")
            .field("change", &self.change)
            .field("expected", &self.expected.load(Ordering::Relaxed))
            .field("completed", &self.completed.load(Ordering::Relaxed))
            .field("outcome", &self.outcome())
            .finish()
    }
}
