use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracker_core::{
    MemoryRouteTable, MetricsObserver, RouteTable, RouteTracker, Synchronizer, TableKind,
    TracingObserver,
};
use tracker_tables::{KernelRouteTable, SystemCommandRunner, VpcRouteTable};

mod config;
mod ranges;

use config::TrackerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting route-tracker...");

    let config = TrackerConfig::load()?;
    let metrics = MetricsObserver::new()?;
    let (cloud, host) = build_tables(&config);

    let synchronizer = Synchronizer::new(cloud, host)
        .with_policy(config.failure_policy)
        .validate_input(config.validate_input)
        .with_observer(TracingObserver)
        .with_observer(metrics.clone());
    let tracker = RouteTracker::new(synchronizer);

    if config.dry_run {
        warn!("Dry run: routes are kept in memory only");
    }
    info!(
        "{} tracker initialized for instance {:?}, route table {:?}, bridge {}",
        tracker, config.instance_id, config.route_table_id, config.bridge
    );
    info!("  - Ranges file: {}", config.ranges_file.display());
    info!("  - Poll interval: {:?}", config.poll_interval());
    info!("  - Command timeout: {:?}", config.command_timeout());
    info!("  - Failure policy: {:?}", config.failure_policy);

    let mut interval = poll_timer(config.poll_interval());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = run_cycle(&config, &tracker, &metrics).await {
                    error!("Error reconciling route tables: {:#}", e);
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received, exiting...");
                break;
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if std::env::var("TRACKER_LOG_FORMAT").is_ok_and(|format| format == "json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_tables(config: &TrackerConfig) -> (Arc<dyn RouteTable>, Arc<dyn RouteTable>) {
    if config.dry_run {
        let target = if config.instance_id.is_empty() {
            "dry-run"
        } else {
            config.instance_id.as_str()
        };
        return (
            Arc::new(MemoryRouteTable::new(TableKind::Cloud, target)),
            Arc::new(MemoryRouteTable::new(TableKind::Host, config.bridge.as_str())),
        );
    }

    let runner = Arc::new(SystemCommandRunner::new().with_timeout(config.command_timeout()));

    let mut vpc = VpcRouteTable::new(
        runner.clone(),
        config.route_table_id.as_str(),
        config.instance_id.as_str(),
    )
    .with_aws_bin(config.aws_bin.as_str());
    if let Some(region) = &config.region {
        vpc = vpc.with_region(region.as_str());
    }

    let kernel =
        KernelRouteTable::new(runner, config.bridge.as_str()).with_ip_bin(config.ip_bin.as_str());

    (Arc::new(vpc), Arc::new(kernel))
}

/// Timer for reconciliation cycles. A slow cycle delays the next one
/// instead of being followed by a burst of catch-up ticks.
fn poll_timer(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Read the owned ranges and bring both tables in line with them
async fn run_cycle(
    config: &TrackerConfig,
    tracker: &RouteTracker,
    metrics: &MetricsObserver,
) -> Result<()> {
    let owned = match ranges::read_range_set(&config.ranges_file).await? {
        Some(owned) => owned,
        None if config.teardown_on_missing => Vec::new(),
        None => {
            warn!(
                "Ranges file {} not found, skipping cycle",
                config.ranges_file.display()
            );
            return Ok(());
        }
    };

    let result = tracker.update(&owned).await;
    metrics.set_owned_ranges(tracker.applied().await.len());
    if let Some(path) = &config.metrics_file {
        if let Err(e) = write_metrics(metrics, path).await {
            warn!("Failed to write metrics: {:#}", e);
        }
    }

    let report = result?;
    if !report.is_noop() {
        info!(
            "Reconciled {} owned ranges: {} added, {} removed",
            owned.len(),
            report.added.len(),
            report.removed.len()
        );
    }
    Ok(())
}

/// Write metrics atomically for a textfile collector
async fn write_metrics(metrics: &MetricsObserver, path: &Path) -> Result<()> {
    let tmp = path.with_extension("prom.tmp");
    tokio::fs::write(&tmp, metrics.encode()?)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to rename {} to {}", tmp.display(), path.display()))?;
    Ok(())
}
