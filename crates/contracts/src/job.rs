//! PeriodicJob trait - supervised maintenance work
//!
//! Defines the interface for jobs run by the periodic supervisor.

/// Recurring maintenance job
///
/// Every job is run repeatedly by the supervisor, one execution at a time.
#[trait_variant::make(PeriodicJob: Send)]
pub trait LocalPeriodicJob {
    /// Job name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Run one execution
    ///
    /// # Errors
    /// Any error is caught by the supervisor and triggers backoff; it never
    /// stops the schedule.
    async fn run(&self) -> anyhow::Result<()>;
}
