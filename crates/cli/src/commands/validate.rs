//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{LaneKind, RegistryConfig, SaturationPolicy};

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    data_center: String,
    zone: String,
    slot_count: u32,
    total_max_workers: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", config.version),
                    data_center: config.node.data_center.clone(),
                    zone: config.node.zone.clone(),
                    slot_count: config.node.slot_count,
                    total_max_workers: config.lanes.iter().map(|(_, l)| l.max_workers).sum(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &RegistryConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.push.stop_push {
        warnings.push("push.stop_push is on - subscriber versions will not advance".to_string());
    }

    let confirm = config.lanes.get(LaneKind::PushConfirmCheck);
    if confirm.policy == SaturationPolicy::Block {
        warnings.push("lanes.push_confirm_check blocks when full - timer ticks may stall".to_string());
    }

    if config.push.confirm_timeout_ms < config.push.wheel_tick_ms {
        warnings.push(format!(
            "push.confirm_timeout_ms ({}) is below one timer tick ({}ms)",
            config.push.confirm_timeout_ms, config.push.wheel_tick_ms
        ));
    }

    let retention_ms = config.store.tombstone_retention_secs.saturating_mul(1000);
    if retention_ms < config.push.confirm_timeout_ms {
        warnings.push("store.tombstone_retention_secs is shorter than a push confirmation".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Data center: {}", summary.data_center);
            println!("  Zone: {}", summary.zone);
            println!("  Slots: {}", summary.slot_count);
            println!("  Lane workers (max): {}", summary.total_max_workers);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn args_for(content: &str) -> (tempfile::NamedTempFile, ValidateArgs) {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let args = ValidateArgs {
            config: file.path().to_path_buf(),
            json: true,
        };
        (file, args)
    }

    #[test]
    fn test_valid_config_with_warnings() {
        let (_file, args) = args_for("[push]\nstop_push = true\n");
        let result = validate_config(&args);
        assert!(result.valid);
        let warnings = result.warnings.unwrap();
        assert!(warnings.iter().any(|w| w.contains("stop_push")));
        assert_eq!(result.summary.unwrap().slot_count, 256);
    }

    #[test]
    fn test_invalid_config() {
        let (_file, args) = args_for("[node]\nslot_count = 0\n");
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_missing_file() {
        let args = ValidateArgs {
            config: PathBuf::from("/nonexistent/registry.toml"),
            json: false,
        };
        let result = validate_config(&args);
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
    }
}
