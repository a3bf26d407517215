//! # Executor
//!
//! Execution fabric of a registry node:
//! - [`Lane`]: named, bounded task lane with a reject or block saturation policy
//! - [`Supervisor`]: periodic job scheduler with exponential backoff
//! - [`WheelTimer`]: coarse hashed-wheel timer for delayed callbacks
//! - [`ExecutionFabric`]: owns all of the above and shuts them down together

mod error;
mod fabric;
mod lane;
mod supervisor;
mod timer;

pub use error::{FabricError, LaneError};
pub use fabric::{ExecutionFabric, Lanes, ShutdownReport};
pub use lane::{Lane, LaneSnapshot};
pub use supervisor::{next_delay, JobSnapshot, RunOutcome, Supervisor};
pub use timer::{TimeoutHandle, WheelTimer};
