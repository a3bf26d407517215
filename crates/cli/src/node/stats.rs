//! Node run statistics.

use std::time::Duration;

use executor::{JobSnapshot, ShutdownReport};
use observability::PushMetricsAggregator;

/// Statistics of one node run, collected at shutdown
#[derive(Debug, Default)]
pub struct NodeStats {
    /// Total run time
    pub duration: Duration,

    /// Slots owned when the node stopped
    pub slots: usize,

    /// Datums held when the node stopped
    pub datums: usize,

    /// Live publishers when the node stopped
    pub publishers: usize,

    /// Highest datum version handed out
    pub last_version: u64,

    /// Supervisor counters per job
    pub jobs: Vec<JobSnapshot>,

    /// Push counters folded over the run
    pub push_metrics: PushMetricsAggregator,

    /// Outcome of the fabric shutdown
    pub shutdown: ShutdownReport,
}

impl NodeStats {
    /// Notifications per second over the run
    pub fn notification_rate(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.push_metrics.latest.notifications as f64 / secs
        } else {
            0.0
        }
    }

    pub fn print_summary(&self) {
        println!("\n=== Registry Node Statistics ===\n");

        println!("Store");
        println!("   Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   Slots owned: {}", self.slots);
        println!("   Datums: {}", self.datums);
        println!("   Publishers: {}", self.publishers);
        println!("   Last version: {}", self.last_version);
        println!("   Notifications/s: {:.2}", self.notification_rate());

        if !self.jobs.is_empty() {
            println!("\nSupervised jobs");
            for job in &self.jobs {
                println!(
                    "   {}: {} runs ({} ok, {} failed, {} timed out, {} rejected), delay {}ms",
                    job.name,
                    job.runs,
                    job.successes,
                    job.failures,
                    job.timeouts,
                    job.rejections,
                    job.current_delay.as_millis()
                );
            }
        }

        println!("\n{}", self.push_metrics.summary());

        if !self.shutdown.is_clean() {
            println!("Shutdown failures:");
            for (component, error) in self.shutdown.failures() {
                println!("   {component}: {error}");
            }
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatcher::DispatchSnapshot;

    #[test]
    fn test_notification_rate() {
        let mut stats = NodeStats {
            duration: Duration::from_secs(4),
            ..NodeStats::default()
        };
        stats.push_metrics.update(&DispatchSnapshot {
            notifications: 10,
            ..DispatchSnapshot::default()
        });
        assert!((stats.notification_rate() - 2.5).abs() < 1e-10);

        stats.duration = Duration::ZERO;
        assert_eq!(stats.notification_rate(), 0.0);
    }
}
