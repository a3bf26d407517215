//! `run` command implementation.

use anyhow::{Context, Result};
use tracing::{info, warn};

use registry_node::{NodeOptions, RegistryNode};

use crate::cli::RunArgs;

/// Execute the `run` command
pub async fn run_node(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let mut config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if let Some(ref data_center) = args.data_center {
        info!(data_center = %data_center, "Overriding data center from CLI");
        config.node.data_center = data_center.clone();
        config_loader::ConfigLoader::validate(&config).context("Invalid data center override")?;
    }

    info!(
        data_center = %config.node.data_center,
        zone = %config.node.zone,
        slot_count = config.node.slot_count,
        stop_push = config.push.stop_push,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config, args);
        return Ok(());
    }

    let node = RegistryNode::start(
        config,
        NodeOptions {
            initial_slots: args.slots.clone(),
        },
    )?;

    info!("Registry node running, press Ctrl+C to stop");
    if let Err(e) = shutdown_signal().await {
        warn!(error = %e, "Signal handler unavailable, stopping now");
    } else {
        warn!("Received shutdown signal, stopping node...");
    }

    let stats = node.shutdown().await;
    info!(
        duration_secs = stats.duration.as_secs_f64(),
        datums = stats.datums,
        publishers = stats.publishers,
        clean = stats.shutdown.is_clean(),
        "Registry node finished"
    );
    stats.print_summary();

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &contracts::RegistryConfig, args: &RunArgs) {
    println!("\n=== Configuration Summary ===\n");
    println!("Node:");
    println!("  Data center: {}", config.node.data_center);
    println!("  Zone: {}", config.node.zone);
    println!("  Slot count: {}", config.node.slot_count);
    match &args.slots {
        Some(slots) => println!("  Initial slots: {slots:?}"),
        None => println!("  Initial slots: all"),
    }

    println!("\nPush:");
    println!("  Stop push: {}", config.push.stop_push);
    println!("  Confirm timeout: {}ms", config.push.confirm_timeout_ms);
    println!(
        "  Timer: {} buckets x {}ms",
        config.push.wheel_size, config.push.wheel_tick_ms
    );

    println!("\nStore:");
    println!(
        "  Tombstone retention: {}s",
        config.store.tombstone_retention_secs
    );

    println!();
}
