//! Registry metrics recording
//!
//! Recorder functions over the `metrics` facade, plus an in-memory
//! aggregator for push outcome summaries.

use std::collections::HashMap;

use contracts::{SlotId, SlotRole};
use dispatcher::DispatchSnapshot;
use executor::{JobSnapshot, LaneSnapshot};
use metrics::{counter, gauge};

/// Record one publisher-group mutation
///
/// `op` is one of `put`, `update`, `remove`, `clean`, `compact`.
pub fn record_datum_mutation(data_center: &str, op: &'static str, changed: u64) {
    counter!(
        "registry_datum_mutations_total",
        "data_center" => data_center.to_string(),
        "op" => op
    )
    .increment(1);
    if changed > 0 {
        counter!(
            "registry_publishers_changed_total",
            "data_center" => data_center.to_string(),
            "op" => op
        )
        .increment(changed);
    }
}

/// Record a store-wide summary
pub fn record_store_stats(
    data_center: &str,
    slots: usize,
    datums: usize,
    publishers: usize,
    last_version: u64,
) {
    let dc = data_center.to_string();
    gauge!("registry_slots_owned", "data_center" => dc.clone()).set(slots as f64);
    gauge!("registry_datums", "data_center" => dc.clone()).set(datums as f64);
    gauge!("registry_publishers", "data_center" => dc.clone()).set(publishers as f64);
    gauge!("registry_last_datum_version", "data_center" => dc).set(last_version as f64);
}

/// Record a slot ownership change
pub fn record_slot_change(slot_id: SlotId, role: SlotRole, added: bool) {
    let action = if added { "add" } else { "remove" };
    counter!(
        "registry_slot_changes_total",
        "role" => role.to_string(),
        "action" => action
    )
    .increment(1);
    gauge!("registry_last_slot_change").set(slot_id as f64);
}

/// Record lane depth and throughput
pub fn record_lane_snapshot(snapshot: &LaneSnapshot) {
    let lane = snapshot.lane.as_str();
    gauge!("registry_lane_active", "lane" => lane).set(snapshot.active as f64);
    gauge!("registry_lane_queued", "lane" => lane).set(snapshot.queued as f64);
    counter!("registry_lane_completed", "lane" => lane).absolute(snapshot.completed);
    let utilisation = snapshot.active as f64 / snapshot.max_workers.max(1) as f64;
    gauge!("registry_lane_utilisation", "lane" => lane).set(utilisation);
}

/// Record supervisor counters for one job
pub fn record_job_snapshot(snapshot: &JobSnapshot) {
    let job = snapshot.name.clone();
    counter!("registry_job_runs", "job" => job.clone()).absolute(snapshot.runs);
    counter!("registry_job_failures", "job" => job.clone()).absolute(snapshot.failures);
    counter!("registry_job_timeouts", "job" => job.clone()).absolute(snapshot.timeouts);
    gauge!("registry_job_delay_ms", "job" => job).set(snapshot.current_delay.as_millis() as f64);
}

/// Record dispatcher counters
pub fn record_dispatch_snapshot(snapshot: &DispatchSnapshot) {
    counter!("registry_push_notifications").absolute(snapshot.notifications);
    counter!("registry_push_submitted").absolute(snapshot.pushes_submitted);
    counter!("registry_push_rejected").absolute(snapshot.pushes_rejected);
    counter!("registry_push_assembly_failures").absolute(snapshot.assembly_failures);
    counter!("registry_push_filtered", "reason" => "current").absolute(snapshot.filtered_current);
    counter!("registry_push_filtered", "reason" => "resubscribe")
        .absolute(snapshot.filtered_resubscribe);
    counter!("registry_push_closures", "outcome" => "success").absolute(snapshot.closures_succeeded);
    counter!("registry_push_closures", "outcome" => "failed").absolute(snapshot.closures_failed);
    counter!("registry_push_closures", "outcome" => "timed_out")
        .absolute(snapshot.closures_timed_out);
    counter!("registry_push_closures_suppressed").absolute(snapshot.closures_suppressed);
    counter!("registry_push_acks_advanced").absolute(snapshot.acks_advanced);
}

/// Push metrics aggregator
///
/// Aggregates dispatcher snapshots in memory, for summaries at shutdown.
#[derive(Debug, Clone, Default)]
pub struct PushMetricsAggregator {
    /// Snapshots folded in
    pub samples: u64,
    /// Latest cumulative dispatcher counters
    pub latest: DispatchSnapshot,
    /// Pushes submitted between two samples
    pub push_rate: RunningStats,
    /// Peak queued tasks per lane
    pub lane_peaks: HashMap<&'static str, usize>,
}

impl PushMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one dispatcher snapshot
    pub fn update(&mut self, snapshot: &DispatchSnapshot) {
        if self.samples > 0 {
            let delta = snapshot
                .pushes_submitted
                .saturating_sub(self.latest.pushes_submitted);
            self.push_rate.push(delta as f64);
        }
        self.samples += 1;
        self.latest = *snapshot;
    }

    pub fn update_lane(&mut self, snapshot: &LaneSnapshot) {
        let peak = self.lane_peaks.entry(snapshot.lane.as_str()).or_insert(0);
        *peak = (*peak).max(snapshot.queued);
    }

    pub fn summary(&self) -> PushSummary {
        let s = &self.latest;
        let finished = s.closures_finished();
        PushSummary {
            notifications: s.notifications,
            pushes_submitted: s.pushes_submitted,
            pushes_rejected: s.pushes_rejected,
            closures_finished: finished,
            success_rate: if finished > 0 {
                s.closures_succeeded as f64 / finished as f64 * 100.0
            } else {
                0.0
            },
            acks_advanced: s.acks_advanced,
            push_rate: StatsSummary::from(&self.push_rate),
            lane_peaks: self.lane_peaks.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Push summary
#[derive(Debug, Clone, Default)]
pub struct PushSummary {
    pub notifications: u64,
    pub pushes_submitted: u64,
    pub pushes_rejected: u64,
    pub closures_finished: u64,
    pub success_rate: f64,
    pub acks_advanced: u64,
    pub push_rate: StatsSummary,
    pub lane_peaks: HashMap<&'static str, usize>,
}

impl std::fmt::Display for PushSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Push Summary ===")?;
        writeln!(f, "Notifications: {}", self.notifications)?;
        writeln!(
            f,
            "Pushes: {} submitted, {} rejected",
            self.pushes_submitted, self.pushes_rejected
        )?;
        writeln!(
            f,
            "Closures finished: {} ({:.2}% success)",
            self.closures_finished, self.success_rate
        )?;
        writeln!(f, "Acks advanced: {}", self.acks_advanced)?;
        writeln!(f, "Pushes per sample: {}", self.push_rate)?;

        if !self.lane_peaks.is_empty() {
            writeln!(f, "Peak lane queue:")?;
            let mut peaks: Vec<_> = self.lane_peaks.iter().collect();
            peaks.sort();
            for (lane, peak) in peaks {
                writeln!(f, "  {}: {}", lane, peak)?;
            }
        }

        Ok(())
    }
}

/// Summary statistics
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
