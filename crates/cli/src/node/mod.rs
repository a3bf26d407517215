//! Registry node composition and its maintenance jobs.

pub mod jobs;
mod registry_node;
mod stats;

pub use registry_node::{NodeOptions, RegistryNode};
pub use stats::NodeStats;
