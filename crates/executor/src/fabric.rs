//! ExecutionFabric - owns every lane, the supervisor and the timer

use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use contracts::{LaneKind, LanesConfig, PushConfig};

use crate::error::FabricError;
use crate::lane::{Lane, LaneSnapshot};
use crate::supervisor::Supervisor;
use crate::timer::WheelTimer;

/// One lane per [`LaneKind`], indexed by kind
#[derive(Debug)]
pub struct Lanes {
    lanes: Vec<Arc<Lane>>,
}

impl Lanes {
    pub fn new(config: &LanesConfig) -> Self {
        Self {
            lanes: config
                .iter()
                .map(|(kind, cfg)| Arc::new(Lane::new(kind, *cfg)))
                .collect(),
        }
    }

    #[inline]
    pub fn get(&self, kind: LaneKind) -> &Arc<Lane> {
        &self.lanes[kind as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Lane>> {
        self.lanes.iter()
    }

    pub fn snapshot(&self) -> Vec<LaneSnapshot> {
        self.lanes.iter().map(|l| l.snapshot()).collect()
    }
}

/// Per-component outcome of a fabric shutdown
#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub outcomes: Vec<(String, Result<(), String>)>,
}

impl ShutdownReport {
    fn record(&mut self, component: impl Into<String>, result: Result<(), String>) {
        self.outcomes.push((component.into(), result));
    }

    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(|(_, r)| r.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|(c, r)| r.as_ref().err().map(|e| (c.as_str(), e.as_str())))
    }
}

impl fmt::Display for ShutdownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (component, result) in &self.outcomes {
            match result {
                Ok(()) => writeln!(f, "{component}: ok")?,
                Err(e) => writeln!(f, "{component}: {e}")?,
            }
        }
        Ok(())
    }
}

/// Lanes, periodic supervisor and delayed-callback timer of one node
pub struct ExecutionFabric {
    lanes: Lanes,
    supervisor: Supervisor,
    timer: WheelTimer,
}

impl ExecutionFabric {
    /// Build every lane and start the timer. Must be called inside a tokio
    /// runtime.
    #[instrument(name = "fabric_start", skip(lanes, push))]
    pub fn start(lanes: &LanesConfig, push: &PushConfig) -> Result<Self, FabricError> {
        let lanes = Lanes::new(lanes);
        let timer = WheelTimer::start(
            push.wheel_tick(),
            push.wheel_size,
            Arc::clone(lanes.get(LaneKind::PushConfirmCheck)),
        )?;
        info!(
            lanes = lanes.lanes.len(),
            wheel_tick_ms = push.wheel_tick_ms,
            "Execution fabric started"
        );
        Ok(Self {
            lanes,
            supervisor: Supervisor::new(),
            timer,
        })
    }

    #[inline]
    pub fn lane(&self, kind: LaneKind) -> &Arc<Lane> {
        self.lanes.get(kind)
    }

    pub fn lanes(&self) -> &Lanes {
        &self.lanes
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn timer(&self) -> &WheelTimer {
        &self.timer
    }

    /// Shut every component down independently.
    ///
    /// A failing or already stopped component is reported and never keeps
    /// the others running.
    #[instrument(name = "fabric_shutdown", skip(self))]
    pub async fn shutdown(&self) -> ShutdownReport {
        let mut report = ShutdownReport::default();

        let supervisor = self.supervisor.shutdown().await.map_err(|e| e.to_string());
        report.record("supervisor", supervisor);

        let timer = self.timer.stop().await.map(|_| ()).map_err(|e| e.to_string());
        report.record("timer", timer);

        for lane in self.lanes.iter() {
            report.record(
                format!("lane:{}", lane.kind()),
                lane.shutdown().map_err(|e| e.to_string()),
            );
        }

        if report.is_clean() {
            info!("Execution fabric shut down");
        } else {
            for (component, error) in report.failures() {
                warn!(component, error, "Component shutdown failed");
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::RegistryConfig;

    #[tokio::test]
    async fn test_lanes_indexed_by_kind() {
        let config = RegistryConfig::default();
        let fabric = ExecutionFabric::start(&config.lanes, &config.push).unwrap();
        for kind in LaneKind::ALL {
            assert_eq!(fabric.lane(kind).kind(), kind);
        }
        assert_eq!(
            fabric.lane(LaneKind::DataFetch).config().queue_capacity,
            0
        );
        fabric.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_reports_each_component() {
        let config = RegistryConfig::default();
        let fabric = ExecutionFabric::start(&config.lanes, &config.push).unwrap();

        // stop one lane early; the rest must still shut down
        fabric.lane(LaneKind::PushTask).shutdown().unwrap();
        let report = fabric.shutdown().await;
        assert_eq!(report.outcomes.len(), 2 + LaneKind::ALL.len());
        let failures: Vec<_> = report.failures().map(|(c, _)| c.to_string()).collect();
        assert_eq!(failures, vec!["lane:push_task".to_string()]);
        assert!(LaneKind::ALL
            .iter()
            .all(|k| fabric.lane(*k).is_shut_down()));

        let again = fabric.shutdown().await;
        assert!(again.outcomes.iter().all(|(_, r)| r.is_err()));
    }
}
