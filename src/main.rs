// src/main.rs
use anyhow::Context;
use clap::Parser;
use ct_monitor::cli::Cli;
use ct_monitor::config::Config;
use ct_monitor::ct_log::{LogListFetcher, MonitorCoordinator, MonitoredLog, resolve_logs};
use ct_monitor::metrics::{self, MetricsConfig, MetricsReporter};
use ct_monitor::report::{Reporters, TracingReporter};
use ct_monitor::stats::StatsCollector;
use ct_monitor::storage;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.validate()?;

    let mut config = Config::from_file(Path::new(&cli.config))
        .with_context(|| format!("Failed to load config from {}", cli.config))?;

    if let Some(ref backend) = cli.storage {
        config.storage.backend = backend.clone();
    }

    // Initialize logging; RUST_LOG wins over flags and config
    let log_level = cli.log_level().unwrap_or(config.logging.level.as_str());
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .init();

    tracing::info!("Starting ct-monitor...");

    let stats = StatsCollector::new();

    let mut reporters = Reporters::new();
    reporters.add(Arc::new(TracingReporter));
    reporters.add(Arc::new(stats.clone()));

    let mut metrics_handle = None;
    if config.metrics.enabled {
        metrics::init_metrics().context("Failed to register metrics")?;
        reporters.add(Arc::new(MetricsReporter));

        let metrics_config = MetricsConfig::from(&config.metrics);
        tracing::info!(
            "Metrics enabled, exporting every {:?} to {}",
            metrics_config.export_interval,
            metrics_config.export_path.as_deref().unwrap_or("stdout")
        );
        metrics_handle = Some(tokio::spawn(metrics::metrics_exporter_task(metrics_config)));
    }

    // Resolve the set of logs
    let logs = if config.log_list.enabled {
        let fetcher = LogListFetcher::new(config.monitor.request_timeout())?;
        let listed = fetcher
            .fetch_logs(&config.log_list.url, config.log_list.include_readonly)
            .await?;
        resolve_logs(&config.logs, &listed)?
    } else {
        config.logs.clone()
    };

    let monitored: Vec<MonitoredLog> = logs
        .iter()
        .filter_map(|log| match MonitoredLog::from_config(log, &config) {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::error!("Skipping {}: {:#}", log.url, e);
                None
            }
        })
        .collect();

    if monitored.is_empty() {
        anyhow::bail!("No usable logs to monitor");
    }
    tracing::info!("Monitoring {} CT logs", monitored.len());

    let storage = storage::open(&config.storage)
        .await
        .with_context(|| format!("Failed to open '{}' storage", config.storage.backend))?;
    tracing::info!("Using '{}' storage backend", config.storage.backend);

    let reporter = Arc::new(reporters);

    if cli.once {
        let outcomes = MonitorCoordinator::run_once(monitored, storage, reporter).await;
        let stored = outcomes.iter().filter(|(_, o)| o.stored()).count();
        tracing::info!("Single pass complete: {}/{} logs stored an STH", stored, outcomes.len());
    } else {
        if cli.stats {
            let stats_clone = stats.clone();
            let interval = cli.stats_interval;

            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_secs(interval)).await;
                    eprintln!("{}", stats_clone.format_stats());
                }
            });
        }

        let coordinator = MonitorCoordinator::start(monitored, storage, reporter);

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        tracing::info!("Received Ctrl-C, shutting down...");

        coordinator.shutdown();
        coordinator.wait().await;
    }

    if let Some(handle) = metrics_handle {
        handle.abort();
        // Final export, so a short run still leaves its metrics behind
        metrics::write_metrics(config.metrics.export_path.as_deref());
    }

    if cli.stats {
        let snapshot = stats.snapshot();
        println!("\nFinal Statistics:");
        println!("  Cycles: {}", snapshot.cycles);
        println!("  Stored: {}", snapshot.stored);
        println!("  Rejected: {}", snapshot.rejected);
        println!("  Failed: {}", snapshot.failed);
        println!("  API calls not recorded: {}", snapshot.audit_failures);
        println!("  Uptime: {}", StatsCollector::format_uptime(snapshot.uptime_secs));
    }

    Ok(())
}
