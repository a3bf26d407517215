//! Executor error types

use contracts::LaneKind;
use thiserror::Error;

/// Task submission errors
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LaneError {
    /// Workers and queue are full under the reject policy
    #[error("lane '{lane}' saturated, task rejected")]
    Rejected { lane: LaneKind },

    /// The lane no longer admits tasks
    #[error("lane '{lane}' is shut down")]
    ShutDown { lane: LaneKind },
}

impl LaneError {
    pub fn lane(&self) -> LaneKind {
        match self {
            Self::Rejected { lane } | Self::ShutDown { lane } => *lane,
        }
    }
}

/// Fabric lifecycle errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FabricError {
    #[error("{component} already stopped")]
    AlreadyStopped { component: String },

    #[error("invalid {component} configuration: {message}")]
    InvalidConfig { component: String, message: String },

    #[error("{component} shutdown failed: {message}")]
    Shutdown { component: String, message: String },
}

impl FabricError {
    pub fn already_stopped(component: impl Into<String>) -> Self {
        Self::AlreadyStopped {
            component: component.into(),
        }
    }

    pub fn invalid_config(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            component: component.into(),
            message: message.into(),
        }
    }
}
