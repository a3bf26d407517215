//! Dispatcher error types

use thiserror::Error;

use executor::LaneError;

/// Push dispatch errors
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The data-change lane kept rejecting the change task
    #[error("change '{change}' not scheduled after {attempts} attempts")]
    RetriesExhausted { change: String, attempts: u32 },

    /// Lane refused the task for good
    #[error("lane error: {0}")]
    Lane(#[from] LaneError),

    /// Builder was missing a collaborator
    #[error("dispatcher is missing '{0}'")]
    MissingCollaborator(&'static str),
}
