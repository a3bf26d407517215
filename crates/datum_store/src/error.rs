//! Datum store error types

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An identifying argument was absent; nothing was mutated
    #[error("missing required argument '{name}'")]
    MissingArgument { name: &'static str },
}

pub type Result<T> = std::result::Result<T, StoreError>;
