//! Dispatch metrics for observability

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of one push dispatcher
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Change notifications received
    notifications: AtomicU64,
    /// Scopes with no interested subscriber
    scopes_skipped: AtomicU64,
    /// Subscribers already holding the notified version
    filtered_current: AtomicU64,
    /// Subscribers left out while a re-subscription is pending
    filtered_resubscribe: AtomicU64,
    /// Partitions skipped because assembly produced nothing
    assembly_failures: AtomicU64,
    pushes_submitted: AtomicU64,
    pushes_rejected: AtomicU64,
    closures_succeeded: AtomicU64,
    closures_failed: AtomicU64,
    closures_timed_out: AtomicU64,
    /// Successful closures that left acks untouched (stop-push switch)
    closures_suppressed: AtomicU64,
    acks_advanced: AtomicU64,
    retries_exhausted: AtomicU64,
}

macro_rules! counter_ops {
    ($($field:ident => $inc:ident),* $(,)?) => {
        $(
            #[inline]
            pub fn $inc(&self, n: u64) {
                self.$field.fetch_add(n, Ordering::Relaxed);
            }
        )*
    };
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    counter_ops! {
        notifications => add_notifications,
        scopes_skipped => add_scopes_skipped,
        filtered_current => add_filtered_current,
        filtered_resubscribe => add_filtered_resubscribe,
        assembly_failures => add_assembly_failures,
        pushes_submitted => add_pushes_submitted,
        pushes_rejected => add_pushes_rejected,
        closures_succeeded => add_closures_succeeded,
        closures_failed => add_closures_failed,
        closures_timed_out => add_closures_timed_out,
        closures_suppressed => add_closures_suppressed,
        acks_advanced => add_acks_advanced,
        retries_exhausted => add_retries_exhausted,
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> DispatchSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        DispatchSnapshot {
            notifications: get(&self.notifications),
            scopes_skipped: get(&self.scopes_skipped),
            filtered_current: get(&self.filtered_current),
            filtered_resubscribe: get(&self.filtered_resubscribe),
            assembly_failures: get(&self.assembly_failures),
            pushes_submitted: get(&self.pushes_submitted),
            pushes_rejected: get(&self.pushes_rejected),
            closures_succeeded: get(&self.closures_succeeded),
            closures_failed: get(&self.closures_failed),
            closures_timed_out: get(&self.closures_timed_out),
            closures_suppressed: get(&self.closures_suppressed),
            acks_advanced: get(&self.acks_advanced),
            retries_exhausted: get(&self.retries_exhausted),
        }
    }
}

/// Snapshot of dispatch metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSnapshot {
    pub notifications: u64,
    pub scopes_skipped: u64,
    pub filtered_current: u64,
    pub filtered_resubscribe: u64,
    pub assembly_failures: u64,
    pub pushes_submitted: u64,
    pub pushes_rejected: u64,
    pub closures_succeeded: u64,
    pub closures_failed: u64,
    pub closures_timed_out: u64,
    pub closures_suppressed: u64,
    pub acks_advanced: u64,
    pub retries_exhausted: u64,
}

impl DispatchSnapshot {
    /// Closures that reached any final state
    pub fn closures_finished(&self) -> u64 {
        self.closures_succeeded + self.closures_failed + self.closures_timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_increments() {
        let m = DispatchMetrics::new();
        m.add_notifications(2);
        m.add_closures_succeeded(1);
        m.add_closures_timed_out(1);
        let s = m.snapshot();
        assert_eq!(s.notifications, 2);
        assert_eq!(s.closures_finished(), 2);
        assert_eq!(s.acks_advanced, 0);
    }
}
