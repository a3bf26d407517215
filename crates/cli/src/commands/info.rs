//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{LaneConfig, RegistryConfig, SupervisedJobConfig};

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    node: NodeInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    lanes: Vec<LaneInfo>,
    jobs: Vec<JobInfo>,
    push: PushInfo,
}

#[derive(Serialize)]
struct NodeInfo {
    data_center: String,
    zone: String,
    slot_count: u32,
    tombstone_retention_secs: u64,
}

#[derive(Serialize)]
struct LaneInfo {
    name: &'static str,
    #[serde(flatten)]
    config: LaneConfig,
}

#[derive(Serialize)]
struct JobInfo {
    name: &'static str,
    #[serde(flatten)]
    config: SupervisedJobConfig,
}

#[derive(Serialize)]
struct PushInfo {
    stop_push: bool,
    confirm_timeout_ms: u64,
    wheel_tick_ms: u64,
    wheel_size: usize,
    data_change_retry_times: u32,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&config, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config, args);
    }

    Ok(())
}

fn jobs(config: &RegistryConfig) -> Vec<JobInfo> {
    let s = &config.scheduler;
    vec![
        JobInfo {
            name: "fetch_data",
            config: s.fetch_data,
        },
        JobInfo {
            name: "clean_invalid_client",
            config: s.clean_invalid_client,
        },
        JobInfo {
            name: "refresh_cache",
            config: s.refresh_cache,
        },
    ]
}

fn build_config_info(config: &RegistryConfig, args: &InfoArgs) -> ConfigInfo {
    let lanes = if args.lanes {
        config
            .lanes
            .iter()
            .map(|(kind, lane)| LaneInfo {
                name: kind.as_str(),
                config: *lane,
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", config.version),
        node: NodeInfo {
            data_center: config.node.data_center.clone(),
            zone: config.node.zone.clone(),
            slot_count: config.node.slot_count,
            tombstone_retention_secs: config.store.tombstone_retention_secs,
        },
        lanes,
        jobs: jobs(config),
        push: PushInfo {
            stop_push: config.push.stop_push,
            confirm_timeout_ms: config.push.confirm_timeout_ms,
            wheel_tick_ms: config.push.wheel_tick_ms,
            wheel_size: config.push.wheel_size,
            data_change_retry_times: config.push.data_change_retry_times,
        },
    }
}

fn print_config_info(config: &RegistryConfig, args: &InfoArgs) {
    println!("=== Registry Node Configuration ===\n");

    println!("Node");
    println!("   ├─ Version: {:?}", config.version);
    println!("   ├─ Data center: {}", config.node.data_center);
    println!("   ├─ Zone: {}", config.node.zone);
    println!("   ├─ Slots: {}", config.node.slot_count);
    println!(
        "   └─ Tombstone retention: {}s",
        config.store.tombstone_retention_secs
    );

    let jobs = jobs(config);
    println!("\nSupervised jobs ({})", jobs.len());
    for (i, job) in jobs.iter().enumerate() {
        let prefix = if i == jobs.len() - 1 { "└─" } else { "├─" };
        println!(
            "   {} {}: first after {}s, timeout {}s, backoff x{}",
            prefix,
            job.name,
            job.config.initial_delay_secs,
            job.config.timeout_secs,
            job.config.backoff_bound
        );
    }

    if args.lanes {
        println!("\nLanes");
        let lanes: Vec<_> = config.lanes.iter().collect();
        for (i, (kind, lane)) in lanes.iter().enumerate() {
            let prefix = if i == lanes.len() - 1 { "└─" } else { "├─" };
            println!(
                "   {} {}: {}..{} workers, queue {}, {:?}",
                prefix, kind, lane.min_workers, lane.max_workers, lane.queue_capacity, lane.policy
            );
        }
    }

    let push = &config.push;
    println!("\nPush");
    println!("   ├─ Stop push: {}", push.stop_push);
    println!("   ├─ Confirm timeout: {}ms", push.confirm_timeout_ms);
    println!(
        "   ├─ Timer: {} buckets x {}ms",
        push.wheel_size, push.wheel_tick_ms
    );
    println!(
        "   └─ Change retries: {} ({}ms apart)",
        push.data_change_retry_times, push.retry_delay_ms
    );

    println!();
}
