//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Produce a `RegistryConfig`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("registry.toml")).unwrap();
//! println!("Data center: {}", config.node.data_center);
//! ```

mod parser;
mod validator;

pub use contracts::RegistryConfig;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;
use tracing::debug;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<RegistryConfig, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        let config = Self::load_from_str(&content, format)?;
        debug!(path = %path.display(), ?format, "Configuration loaded");
        Ok(config)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<RegistryConfig, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Validate an already built configuration
    pub fn validate(config: &RegistryConfig) -> Result<(), ContractError> {
        validator::validate(config)
    }

    /// Serialize RegistryConfig to TOML string
    pub fn to_toml(config: &RegistryConfig) -> Result<String, ContractError> {
        toml::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize RegistryConfig to JSON string
    pub fn to_json(config: &RegistryConfig) -> Result<String, ContractError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str());
        ext.and_then(ConfigFormat::from_extension)
            .ok_or_else(|| ContractError::UnsupportedFormat {
                extension: ext.map(str::to_string),
            })
    }

    fn read_file(path: &Path) -> Result<String, ContractError> {
        std::fs::read_to_string(path).map_err(|source| ContractError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<RegistryConfig, ContractError> {
        let config = parser::parse(content, format)?;
        validator::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const NODE_TOML: &str = r#"
[node]
data_center = "DC1"
zone = "ZoneA"
slot_count = 64

[lanes.data_change]
min_workers = 2
max_workers = 4
queue_capacity = 50

[push]
confirm_timeout_ms = 1500
wheel_size = 512

[store]
tombstone_retention_secs = 120
"#;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_from_path_toml() {
        let file = write_temp(".toml", NODE_TOML);
        let config = ConfigLoader::load_from_path(file.path()).unwrap();
        assert_eq!(config.node.data_center, "DC1");
        assert_eq!(config.node.slot_count, 64);
        assert_eq!(config.lanes.data_change.queue_capacity, 50);
        assert_eq!(config.push.wheel_size, 512);
        assert_eq!(config.store.tombstone_retention_secs, 120);
    }

    #[test]
    fn test_load_from_path_json() {
        let file = write_temp(".json", r#"{ "node": { "data_center": "DC9" } }"#);
        let config = ConfigLoader::load_from_path(file.path()).unwrap();
        assert_eq!(config.node.data_center, "DC9");
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_temp(".yaml", "node: {}");
        let err = ConfigLoader::load_from_path(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ContractError::UnsupportedFormat { extension: Some(ref ext) } if ext == "yaml"
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::load_from_path(Path::new("/nonexistent/registry.toml"))
            .unwrap_err();
        assert!(err.is_io());
        assert!(err.to_string().contains("/nonexistent/registry.toml"));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = ConfigLoader::load_from_str("", ConfigFormat::Toml).unwrap();
        assert_eq!(config.node.data_center, "DefaultDataCenter");
        assert_eq!(config.lanes.push_task.max_workers, 400);
    }

    #[test]
    fn test_round_trip_toml() {
        let config = ConfigLoader::load_from_str(NODE_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&config).unwrap();
        let again = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(config.node.zone, again.node.zone);
        assert_eq!(config.lanes, again.lanes);
        assert_eq!(config.push.confirm_timeout_ms, again.push.confirm_timeout_ms);
    }

    #[test]
    fn test_round_trip_json() {
        let config = ConfigLoader::load_from_str(NODE_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&config).unwrap();
        let again = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(config.node.data_center, again.node.data_center);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[push]
wheel_size = 100
"#;
        let err = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap_err();
        assert!(err.to_string().contains("power of two"));
    }
}
