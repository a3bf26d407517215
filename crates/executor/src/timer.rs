//! WheelTimer - hashed wheel timer for coarse delayed callbacks
//!
//! New timeouts go through an unbounded channel and are placed in their
//! bucket by the worker at the next tick, so registration never blocks and
//! the wheel itself is owned by a single task. Expired callbacks are handed
//! to the push-confirm lane. A rejected hand-off is logged and the callback
//! runs on the wheel task instead; a panicking callback is logged and
//! otherwise ignored.

use async_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, instrument};

use crate::error::FabricError;
use crate::lane::Lane;

const PENDING: u8 = 0;
const CANCELLED: u8 = 1;
const EXPIRED: u8 = 2;

type Callback = Box<dyn FnOnce() + Send>;

struct TimeoutEntry {
    deadline_tick: u64,
    state: AtomicU8,
    callback: Mutex<Option<Callback>>,
}

/// Handle to one scheduled callback
#[derive(Clone)]
pub struct TimeoutHandle {
    entry: Arc<TimeoutEntry>,
    pending: Arc<AtomicUsize>,
}

impl TimeoutHandle {
    /// Cancel the callback. Returns false if it already expired or was
    /// cancelled.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .entry
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if cancelled {
            self.entry.callback.lock().take();
            // stop() may have zeroed the counter already
            let _ = self
                .pending
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        }
        cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        self.entry.state.load(Ordering::Acquire) == CANCELLED
    }

    pub fn is_expired(&self) -> bool {
        self.entry.state.load(Ordering::Acquire) == EXPIRED
    }
}

impl std::fmt::Debug for TimeoutHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutHandle")
            .field("deadline_tick", &self.entry.deadline_tick)
            .field("state", &self.entry.state.load(Ordering::Relaxed))
            .finish()
    }
}

struct Bucketed {
    entry: Arc<TimeoutEntry>,
    rounds: u64,
}

/// Coarse delayed-callback timer
pub struct WheelTimer {
    tick: Duration,
    started_at: Instant,
    queue_tx: Sender<Arc<TimeoutEntry>>,
    pending: Arc<AtomicUsize>,
    stopped: AtomicBool,
    stop_tx: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WheelTimer {
    /// Start the timer worker. Must be called inside a tokio runtime.
    ///
    /// `wheel_size` is rounded up to a power of two.
    ///
    /// # Errors
    /// `InvalidConfig` for a zero tick.
    pub fn start(tick: Duration, wheel_size: usize, lane: Arc<Lane>) -> Result<Self, FabricError> {
        if tick.is_zero() {
            return Err(FabricError::invalid_config("timer", "tick must be positive"));
        }
        let wheel_size = wheel_size.max(1).next_power_of_two();
        let started_at = Instant::now();
        let (queue_tx, queue_rx) = unbounded();
        let (stop_tx, stop_rx) = watch::channel(false);
        let pending = Arc::new(AtomicUsize::new(0));

        let worker = tokio::spawn(run_wheel(
            tick,
            wheel_size,
            started_at,
            queue_rx,
            stop_rx,
            lane,
            Arc::clone(&pending),
        ));
        debug!(tick_ms = tick.as_millis() as u64, wheel_size, "Wheel timer started");

        Ok(Self {
            tick,
            started_at,
            queue_tx,
            pending,
            stopped: AtomicBool::new(false),
            stop_tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    #[inline]
    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Callbacks scheduled and neither expired nor cancelled
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Run `callback` once `delay` has elapsed, rounded up to the tick.
    ///
    /// # Errors
    /// `AlreadyStopped` after [`stop`](Self::stop).
    pub fn new_timeout(
        &self,
        delay: Duration,
        callback: impl FnOnce() + Send + 'static,
    ) -> Result<TimeoutHandle, FabricError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(FabricError::already_stopped("timer"));
        }
        let due = self.started_at.elapsed() + delay;
        let deadline_tick = due.as_nanos().div_ceil(self.tick.as_nanos()).max(1) as u64;
        let entry = Arc::new(TimeoutEntry {
            deadline_tick,
            state: AtomicU8::new(PENDING),
            callback: Mutex::new(Some(Box::new(callback))),
        });
        self.pending.fetch_add(1, Ordering::Relaxed);
        if self.queue_tx.try_send(Arc::clone(&entry)).is_err() {
            self.pending.fetch_sub(1, Ordering::Relaxed);
            return Err(FabricError::already_stopped("timer"));
        }
        Ok(TimeoutHandle {
            entry,
            pending: Arc::clone(&self.pending),
        })
    }

    /// Stop the worker. Unexpired callbacks never run and their handles
    /// report cancelled.
    ///
    /// # Errors
    /// `AlreadyStopped` when called twice.
    #[instrument(name = "timer_stop", skip(self))]
    pub async fn stop(&self) -> Result<usize, FabricError> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Err(FabricError::already_stopped("timer"));
        }
        let _ = self.stop_tx.send(true);
        self.queue_tx.close();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.await.map_err(|e| FabricError::Shutdown {
                component: "timer".to_string(),
                message: e.to_string(),
            })?;
        }
        let unexpired = self.pending.swap(0, Ordering::AcqRel);
        debug!(unexpired, "Wheel timer stopped");
        Ok(unexpired)
    }
}

async fn run_wheel(
    tick: Duration,
    wheel_size: usize,
    started_at: Instant,
    queue_rx: Receiver<Arc<TimeoutEntry>>,
    mut stop_rx: watch::Receiver<bool>,
    lane: Arc<Lane>,
    pending: Arc<AtomicUsize>,
) {
    let mask = (wheel_size - 1) as u64;
    let mut wheel: Vec<Vec<Bucketed>> = (0..wheel_size).map(|_| Vec::new()).collect();
    let mut ticker = interval_at(started_at + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
    let mut current: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop_rx.changed() => break,
        }
        current += 1;

        while let Ok(entry) = queue_rx.try_recv() {
            if entry.state.load(Ordering::Acquire) != PENDING {
                continue;
            }
            let target = entry.deadline_tick.max(current);
            let rounds = (target - current) / wheel_size as u64;
            wheel[(target & mask) as usize].push(Bucketed { entry, rounds });
        }

        let bucket = &mut wheel[(current & mask) as usize];
        let mut due = Vec::new();
        bucket.retain_mut(|b| {
            if b.entry.state.load(Ordering::Acquire) != PENDING {
                return false;
            }
            if b.rounds == 0 {
                due.push(Arc::clone(&b.entry));
                false
            } else {
                b.rounds -= 1;
                true
            }
        });

        for entry in due {
            expire(&entry, &lane, &pending);
        }
    }

    let unexpired = wheel
        .into_iter()
        .flatten()
        .map(|b| b.entry)
        .chain(std::iter::from_fn(|| queue_rx.try_recv().ok()));
    for entry in unexpired {
        if entry
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            entry.callback.lock().take();
        }
    }
}

fn run_callback(callback: Callback) {
    if catch_unwind(AssertUnwindSafe(callback)).is_err() {
        error!("Timer callback panicked");
    }
}

fn expire(entry: &TimeoutEntry, lane: &Lane, pending: &AtomicUsize) {
    if entry
        .state
        .compare_exchange(PENDING, EXPIRED, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return;
    }
    pending.fetch_sub(1, Ordering::Relaxed);
    let Some(callback) = entry.callback.lock().take() else {
        return;
    };
    let slot = Arc::new(Mutex::new(Some(callback)));
    let task_slot = Arc::clone(&slot);
    let submitted = lane.try_submit(async move {
        let callback = task_slot.lock().take();
        if let Some(callback) = callback {
            run_callback(callback);
        }
    });
    if let Err(e) = submitted {
        error!(error = %e, deadline_tick = entry.deadline_tick, "Timer callback not handed off, running inline");
        let callback = slot.lock().take();
        if let Some(callback) = callback {
            run_callback(callback);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{LaneConfig, LaneKind, SaturationPolicy};
    use std::sync::atomic::AtomicU32;
    use tokio::time::sleep;

    fn lane() -> Arc<Lane> {
        Arc::new(Lane::new(
            LaneKind::PushConfirmCheck,
            LaneConfig::new(2, 2, 16, SaturationPolicy::Reject),
        ))
    }

    fn timer() -> WheelTimer {
        WheelTimer::start(Duration::from_millis(10), 8, lane()).unwrap()
    }

    #[tokio::test]
    async fn test_callback_fires_after_delay() {
        let timer = timer();
        let fired = Arc::new(AtomicU32::new(0));
        let f = Arc::clone(&fired);
        let handle = timer
            .new_timeout(Duration::from_millis(30), move || {
                f.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();

        sleep(Duration::from_millis(5)).await;
        assert_eq!(fired.load(Ordering::Relaxed), 0);

        sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::Relaxed), 1);
        assert!(handle.is_expired());
        assert!(!handle.cancel());
        assert_eq!(timer.pending(), 0);
    }

    #[tokio::test]
    async fn test_delay_longer_than_one_rotation() {
        // 8 buckets * 10ms = 80ms per rotation
        let timer = timer();
        let fired = Arc::new(AtomicU32::new(0));
        let f = Arc::clone(&fired);
        timer
            .new_timeout(Duration::from_millis(200), move || {
                f.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();

        sleep(Duration::from_millis(120)).await;
        assert_eq!(fired.load(Ordering::Relaxed), 0);
        sleep(Duration::from_millis(250)).await;
        assert_eq!(fired.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_cancelled_callback_never_runs() {
        let timer = timer();
        let fired = Arc::new(AtomicU32::new(0));
        let f = Arc::clone(&fired);
        let handle = timer
            .new_timeout(Duration::from_millis(40), move || {
                f.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        assert!(handle.cancel());
        assert!(!handle.cancel());

        sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::Relaxed), 0);
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_panicking_callback_is_contained() {
        let timer = timer();
        let fired = Arc::new(AtomicU32::new(0));
        timer
            .new_timeout(Duration::from_millis(10), || panic!("callback failure"))
            .unwrap();
        let f = Arc::clone(&fired);
        timer
            .new_timeout(Duration::from_millis(30), move || {
                f.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();

        sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_stop_is_single_shot() {
        let timer = timer();
        timer
            .new_timeout(Duration::from_secs(60), || {})
            .unwrap();
        assert_eq!(timer.stop().await.unwrap(), 1);
        assert!(timer.stop().await.is_err());
        assert!(timer.new_timeout(Duration::from_millis(1), || {}).is_err());
    }

    #[tokio::test]
    async fn test_cancel_after_stop_keeps_counter() {
        let timer = timer();
        let handle = timer
            .new_timeout(Duration::from_secs(60), || {})
            .unwrap();
        // let the worker place the entry in its bucket
        sleep(Duration::from_millis(30)).await;
        assert_eq!(timer.stop().await.unwrap(), 1);

        assert!(handle.is_cancelled());
        assert!(!handle.cancel());
        assert_eq!(timer.pending(), 0);
    }

    #[tokio::test]
    async fn test_rejected_callback_runs_inline() {
        let busy = Arc::new(Lane::new(
            LaneKind::PushConfirmCheck,
            LaneConfig::new(1, 1, 0, SaturationPolicy::Reject),
        ));
        busy.try_submit(sleep(Duration::from_secs(5))).unwrap();
        let timer = WheelTimer::start(Duration::from_millis(10), 8, Arc::clone(&busy)).unwrap();

        let fired = Arc::new(AtomicU32::new(0));
        let f = Arc::clone(&fired);
        timer
            .new_timeout(Duration::from_millis(20), move || {
                f.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();

        sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::Relaxed), 1);
        assert!(busy.snapshot().rejected >= 1);
        timer.stop().await.unwrap();
    }
}
