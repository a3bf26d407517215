//! Configuration validation
//!
//! Rules:
//! - data_center is not empty, slot_count > 0
//! - every lane has max_workers > 0 and min_workers <= max_workers
//! - every supervised job has timeout_secs > 0 and backoff_bound >= 1
//! - wheel tick > 0, wheel size a power of two, confirm timeout > 0
//! - data_change_retry_times >= 1

use contracts::{ContractError, LanesConfig, PushConfig, RegistryConfig, SchedulerConfig};

/// Validate a RegistryConfig
///
/// Returns the first error found.
pub fn validate(config: &RegistryConfig) -> Result<(), ContractError> {
    validate_node(config)?;
    validate_lanes(&config.lanes)?;
    validate_scheduler(&config.scheduler)?;
    validate_push(&config.push)?;
    Ok(())
}

fn validate_node(config: &RegistryConfig) -> Result<(), ContractError> {
    if config.node.data_center.trim().is_empty() {
        return Err(ContractError::config_validation(
            "node.data_center",
            "data_center cannot be empty",
        ));
    }
    if config.node.slot_count == 0 {
        return Err(ContractError::config_validation(
            "node.slot_count",
            "slot_count must be > 0",
        ));
    }
    Ok(())
}

fn validate_lanes(lanes: &LanesConfig) -> Result<(), ContractError> {
    for (kind, lane) in lanes.iter() {
        if lane.max_workers == 0 {
            return Err(ContractError::config_validation(
                format!("lanes.{kind}.max_workers"),
                "max_workers must be > 0",
            ));
        }
        if lane.min_workers > lane.max_workers {
            return Err(ContractError::config_validation(
                format!("lanes.{kind}"),
                format!(
                    "min_workers ({}) must be <= max_workers ({})",
                    lane.min_workers, lane.max_workers
                ),
            ));
        }
    }
    Ok(())
}

fn validate_scheduler(scheduler: &SchedulerConfig) -> Result<(), ContractError> {
    let jobs = [
        ("fetch_data", &scheduler.fetch_data),
        ("clean_invalid_client", &scheduler.clean_invalid_client),
        ("refresh_cache", &scheduler.refresh_cache),
    ];
    for (name, job) in jobs {
        if job.timeout_secs == 0 {
            return Err(ContractError::config_validation(
                format!("scheduler.{name}.timeout_secs"),
                "timeout_secs must be > 0",
            ));
        }
        if job.backoff_bound == 0 {
            return Err(ContractError::config_validation(
                format!("scheduler.{name}.backoff_bound"),
                "backoff_bound must be >= 1",
            ));
        }
    }
    Ok(())
}

fn validate_push(push: &PushConfig) -> Result<(), ContractError> {
    if push.wheel_tick_ms == 0 {
        return Err(ContractError::config_validation(
            "push.wheel_tick_ms",
            "wheel_tick_ms must be > 0",
        ));
    }
    if !push.wheel_size.is_power_of_two() {
        return Err(ContractError::config_validation(
            "push.wheel_size",
            format!("wheel_size must be a power of two, got {}", push.wheel_size),
        ));
    }
    if push.confirm_timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "push.confirm_timeout_ms",
            "confirm_timeout_ms must be > 0",
        ));
    }
    if push.data_change_retry_times == 0 {
        return Err(ContractError::config_validation(
            "push.data_change_retry_times",
            "data_change_retry_times must be >= 1",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: ContractError) -> String {
        match err {
            ContractError::ConfigValidation { field, .. } => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&RegistryConfig::default()).is_ok());
    }

    #[test]
    fn test_empty_data_center() {
        let mut config = RegistryConfig::default();
        config.node.data_center = "  ".into();
        assert_eq!(field_of(validate(&config).unwrap_err()), "node.data_center");
    }

    #[test]
    fn test_zero_slot_count() {
        let mut config = RegistryConfig::default();
        config.node.slot_count = 0;
        assert_eq!(field_of(validate(&config).unwrap_err()), "node.slot_count");
    }

    #[test]
    fn test_lane_worker_bounds() {
        let mut config = RegistryConfig::default();
        config.lanes.push_task.max_workers = 0;
        config.lanes.push_task.min_workers = 0;
        assert_eq!(
            field_of(validate(&config).unwrap_err()),
            "lanes.push_task.max_workers"
        );

        let mut config = RegistryConfig::default();
        config.lanes.slot_sync.min_workers = 100;
        assert_eq!(field_of(validate(&config).unwrap_err()), "lanes.slot_sync");
    }

    #[test]
    fn test_scheduler_rules() {
        let mut config = RegistryConfig::default();
        config.scheduler.refresh_cache.timeout_secs = 0;
        assert_eq!(
            field_of(validate(&config).unwrap_err()),
            "scheduler.refresh_cache.timeout_secs"
        );

        let mut config = RegistryConfig::default();
        config.scheduler.fetch_data.backoff_bound = 0;
        assert_eq!(
            field_of(validate(&config).unwrap_err()),
            "scheduler.fetch_data.backoff_bound"
        );
    }

    #[test]
    fn test_push_rules() {
        let mut config = RegistryConfig::default();
        config.push.wheel_size = 1000;
        assert_eq!(field_of(validate(&config).unwrap_err()), "push.wheel_size");

        let mut config = RegistryConfig::default();
        config.push.wheel_tick_ms = 0;
        assert_eq!(field_of(validate(&config).unwrap_err()), "push.wheel_tick_ms");

        let mut config = RegistryConfig::default();
        config.push.confirm_timeout_ms = 0;
        assert_eq!(
            field_of(validate(&config).unwrap_err()),
            "push.confirm_timeout_ms"
        );

        let mut config = RegistryConfig::default();
        config.push.data_change_retry_times = 0;
        assert_eq!(
            field_of(validate(&config).unwrap_err()),
            "push.data_change_retry_times"
        );
    }
}
