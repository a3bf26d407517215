//! Configuration errors
//!
//! Raised while reading, parsing or validating a `RegistryConfig`. Runtime
//! components carry their own error enums.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContractError {
    /// Config text could not be parsed or serialized
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A field holds a value the node cannot run with
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// The file extension names no known format
    #[error("unsupported config format: {}", extension.as_deref().unwrap_or("<none>"))]
    UnsupportedFormat { extension: Option<String> },

    #[error("cannot read config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ContractError {
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether the error came from the file system rather than the content
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}
