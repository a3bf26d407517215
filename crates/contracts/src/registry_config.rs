//! RegistryConfig - Config Loader output
//!
//! Describes one registry node: its data center, the execution lanes, the
//! supervised periodic jobs, push tuning and store retention.
//! Every section has defaults, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub version: ConfigVersion,

    #[serde(default)]
    pub node: NodeConfig,

    #[serde(default)]
    pub lanes: LanesConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub push: PushConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

/// Node identity and sharding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Local data center name
    #[serde(default = "default_data_center")]
    pub data_center: String,

    /// Local zone name
    #[serde(default = "default_zone")]
    pub zone: String,

    /// Number of slots the key space is hashed into
    #[serde(default = "default_slot_count")]
    pub slot_count: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_center: default_data_center(),
            zone: default_zone(),
            slot_count: default_slot_count(),
        }
    }
}

fn default_data_center() -> String {
    "DefaultDataCenter".to_string()
}

fn default_zone() -> String {
    "DefaultZone".to_string()
}

fn default_slot_count() -> u32 {
    256
}

/// What a lane does when both its workers and its queue are full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaturationPolicy {
    /// Refuse the task and log it; the upstream request times out
    #[default]
    Reject,
    /// Make the submitter wait for room
    Block,
}

/// One bounded execution lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    /// Admitted-but-waiting tasks; 0 means synchronous hand-off
    #[serde(default)]
    pub queue_capacity: usize,
    #[serde(default)]
    pub policy: SaturationPolicy,
}

impl LaneConfig {
    pub const fn new(
        min_workers: usize,
        max_workers: usize,
        queue_capacity: usize,
        policy: SaturationPolicy,
    ) -> Self {
        Self {
            min_workers,
            max_workers,
            queue_capacity,
            policy,
        }
    }

    /// Low-volume control-plane lane: 1..2 workers, no queue, reject
    pub const fn control_plane() -> Self {
        Self::new(1, 2, 0, SaturationPolicy::Reject)
    }
}

/// Lane category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneKind {
    DataFetch,
    SlotSync,
    ConnectMeta,
    ConnectData,
    ConnectClient,
    AccessData,
    DataChange,
    PublishData,
    PushTask,
    PushConfirmCheck,
    CleanInvalidClient,
    RefreshCache,
}

impl LaneKind {
    pub const ALL: [LaneKind; 12] = [
        LaneKind::DataFetch,
        LaneKind::SlotSync,
        LaneKind::ConnectMeta,
        LaneKind::ConnectData,
        LaneKind::ConnectClient,
        LaneKind::AccessData,
        LaneKind::DataChange,
        LaneKind::PublishData,
        LaneKind::PushTask,
        LaneKind::PushConfirmCheck,
        LaneKind::CleanInvalidClient,
        LaneKind::RefreshCache,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataFetch => "data_fetch",
            Self::SlotSync => "slot_sync",
            Self::ConnectMeta => "connect_meta",
            Self::ConnectData => "connect_data",
            Self::ConnectClient => "connect_client",
            Self::AccessData => "access_data",
            Self::DataChange => "data_change",
            Self::PublishData => "publish_data",
            Self::PushTask => "push_task",
            Self::PushConfirmCheck => "push_confirm_check",
            Self::CleanInvalidClient => "clean_invalid_client",
            Self::RefreshCache => "refresh_cache",
        }
    }
}

impl std::fmt::Display for LaneKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sizing of every lane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanesConfig {
    pub data_fetch: LaneConfig,
    pub slot_sync: LaneConfig,
    pub connect_meta: LaneConfig,
    pub connect_data: LaneConfig,
    pub connect_client: LaneConfig,
    pub access_data: LaneConfig,
    pub data_change: LaneConfig,
    pub publish_data: LaneConfig,
    pub push_task: LaneConfig,
    pub push_confirm_check: LaneConfig,
    pub clean_invalid_client: LaneConfig,
    pub refresh_cache: LaneConfig,
}

impl LanesConfig {
    pub fn get(&self, kind: LaneKind) -> &LaneConfig {
        match kind {
            LaneKind::DataFetch => &self.data_fetch,
            LaneKind::SlotSync => &self.slot_sync,
            LaneKind::ConnectMeta => &self.connect_meta,
            LaneKind::ConnectData => &self.connect_data,
            LaneKind::ConnectClient => &self.connect_client,
            LaneKind::AccessData => &self.access_data,
            LaneKind::DataChange => &self.data_change,
            LaneKind::PublishData => &self.publish_data,
            LaneKind::PushTask => &self.push_task,
            LaneKind::PushConfirmCheck => &self.push_confirm_check,
            LaneKind::CleanInvalidClient => &self.clean_invalid_client,
            LaneKind::RefreshCache => &self.refresh_cache,
        }
    }

    /// Iterate `(kind, config)` pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (LaneKind, &LaneConfig)> {
        LaneKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }
}

impl Default for LanesConfig {
    fn default() -> Self {
        use SaturationPolicy::{Block, Reject};
        Self {
            data_fetch: LaneConfig::control_plane(),
            slot_sync: LaneConfig::new(12, 24, 10_000, Reject),
            connect_meta: LaneConfig::control_plane(),
            connect_data: LaneConfig::control_plane(),
            connect_client: LaneConfig::new(60, 400, 100_000, Block),
            access_data: LaneConfig::new(100, 400, 10_000, Reject),
            data_change: LaneConfig::new(8, 16, 100_000, Reject),
            publish_data: LaneConfig::new(100, 400, 10_000, Block),
            push_task: LaneConfig::new(40, 400, 100_000, Reject),
            push_confirm_check: LaneConfig::new(10, 10, 10_000, Reject),
            clean_invalid_client: LaneConfig::control_plane(),
            refresh_cache: LaneConfig::control_plane(),
        }
    }
}

/// One supervised periodic job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisedJobConfig {
    /// Delay before the first run
    pub initial_delay_secs: u64,
    /// Per-run timeout; also the baseline delay between runs
    pub timeout_secs: u64,
    /// Upper bound of the delay, as a multiple of the timeout
    pub backoff_bound: u32,
}

impl SupervisedJobConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Periodic supervisor jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Data refresh
    pub fetch_data: SupervisedJobConfig,
    /// Stale client / tombstone cleanup
    pub clean_invalid_client: SupervisedJobConfig,
    /// Auxiliary cache refresh
    pub refresh_cache: SupervisedJobConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fetch_data: SupervisedJobConfig {
                initial_delay_secs: 30,
                timeout_secs: 60,
                backoff_bound: 10,
            },
            clean_invalid_client: SupervisedJobConfig {
                initial_delay_secs: 60,
                timeout_secs: 180,
                backoff_bound: 3,
            },
            refresh_cache: SupervisedJobConfig {
                initial_delay_secs: 1,
                timeout_secs: 2,
                backoff_bound: 1,
            },
        }
    }
}

/// Push pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Global push-suppression switch
    pub stop_push: bool,
    /// How long a push closure waits for all its pushes
    pub confirm_timeout_ms: u64,
    /// Delayed-callback timer tick
    pub wheel_tick_ms: u64,
    /// Buckets in the timer wheel (power of two)
    pub wheel_size: usize,
    /// Attempts to hand a change notification to the data-change lane
    pub data_change_retry_times: u32,
    /// Pause between those attempts
    pub retry_delay_ms: u64,
}

impl PushConfig {
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }

    pub fn wheel_tick(&self) -> Duration {
        Duration::from_millis(self.wheel_tick_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            stop_push: false,
            confirm_timeout_ms: 3_000,
            wheel_tick_ms: 100,
            wheel_size: 1024,
            data_change_retry_times: 3,
            retry_delay_ms: 100,
        }
    }
}

/// Datum store retention
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Tombstones older than this are compacted by the cleanup job
    pub tombstone_retention_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            tombstone_retention_secs: 600,
        }
    }
}
