//! Prometheus metrics for ct-monitor
//!
//! Per-log counters and gauges fed from monitor events, exported periodically
//! in the Prometheus text format.

use lazy_static::lazy_static;
use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry};
use std::io::Write;
use std::time::Duration;
use tracing::warn;

use crate::report::{MonitorEvent, Reporter};

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Finished cycles
    /// Labels: log, result="stored|transport_error|unusable_response|rejected|store_failed"
    pub static ref CYCLES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ctmon_cycles_total", "Total number of STH getter cycles"),
        &["log", "result"]
    ).expect("metric cannot be created");

    /// Rejected STHs by reason
    pub static ref REJECTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ctmon_sth_rejections_total", "Total number of rejected STHs"),
        &["log", "reason"]
    ).expect("metric cannot be created");

    /// API call records that could not be written
    pub static ref API_CALL_WRITE_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "ctmon_api_call_write_failures_total",
            "Total number of API call records that failed to persist"
        ),
        &["log"]
    ).expect("metric cannot be created");

    /// Tree size of the most recently stored STH
    pub static ref LATEST_TREE_SIZE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("ctmon_latest_tree_size", "Tree size of the latest stored STH"),
        &["log"]
    ).expect("metric cannot be created");

    /// Timestamp (ms) of the most recently stored STH
    pub static ref LATEST_STH_TIMESTAMP: IntGaugeVec = IntGaugeVec::new(
        Opts::new("ctmon_latest_sth_timestamp", "Timestamp of the latest stored STH"),
        &["log"]
    ).expect("metric cannot be created");
}

/// Initialize metrics registry
pub fn init_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(CYCLES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REJECTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(API_CALL_WRITE_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(LATEST_TREE_SIZE.clone()))?;
    REGISTRY.register(Box::new(LATEST_STH_TIMESTAMP.clone()))?;

    Ok(())
}

/// Export metrics in Prometheus text format
pub fn export_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}

/// Metrics export settings
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub export_path: Option<String>, // None = stdout
    pub export_interval: Duration,
}

impl From<&crate::config::MetricsSettings> for MetricsConfig {
    fn from(settings: &crate::config::MetricsSettings) -> Self {
        Self {
            export_path: settings.export_path.clone(),
            export_interval: Duration::from_secs(settings.export_interval_secs.max(1)),
        }
    }
}

/// Write the current metrics to a file, or stdout when no path is set
pub fn write_metrics(export_path: Option<&str>) {
    let metrics_text = export_metrics();

    match export_path {
        None => {
            println!("\n# Prometheus Metrics");
            println!("{}", metrics_text);
        }
        Some(path) => match std::fs::File::create(path) {
            Ok(mut file) => {
                if let Err(e) = file.write_all(metrics_text.as_bytes()) {
                    warn!("Failed to write metrics to file {}: {}", path, e);
                }
            }
            Err(e) => {
                warn!("Failed to create metrics file {}: {}", path, e);
            }
        },
    }
}

/// Background task for periodic metrics export
pub async fn metrics_exporter_task(config: MetricsConfig) {
    let mut ticker = tokio::time::interval(config.export_interval);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        write_metrics(config.export_path.as_deref());
    }
}

/// Feeds the global metrics from monitor events
pub struct MetricsReporter;

impl Reporter for MetricsReporter {
    fn report(&self, log_url: &str, event: &MonitorEvent<'_>) {
        let MonitorEvent::CycleFinished(outcome) = event else {
            return;
        };

        if outcome.audit_error.is_some() {
            API_CALL_WRITE_FAILURES_TOTAL.with_label_values(&[log_url]).inc();
        }

        let result = match &outcome.result {
            Ok(sth) => {
                LATEST_TREE_SIZE.with_label_values(&[log_url]).set(sth.tree_size);
                LATEST_STH_TIMESTAMP
                    .with_label_values(&[log_url])
                    .set(i64::try_from(sth.timestamp).unwrap_or(i64::MAX));
                "stored"
            }
            Err(err) => err.label(),
        };
        CYCLES_TOTAL.with_label_values(&[log_url, result]).inc();

        if let Some(reason) = outcome.reject_reason() {
            REJECTIONS_TOTAL.with_label_values(&[log_url, reason.label()]).inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ct_log::client::FetchError;
    use crate::sth::test_support::{NOW_MS, TestLog};
    use crate::sth::{CycleError, CycleOutcome, RejectReason};

    #[test]
    fn test_metrics_initialization() {
        // A second registration in the same process fails with AlreadyReg
        let _ = init_metrics();
        assert!(init_metrics().is_err());
    }

    #[test]
    fn test_reporter_counts_stored_cycle() {
        let log = "https://metrics.example/stored";
        let sth = TestLog::new().sign(1234, NOW_MS);
        let outcome = CycleOutcome {
            audit_error: Some("disk full".to_string()),
            result: Ok(sth),
        };

        MetricsReporter.report(log, &MonitorEvent::CycleFinished(&outcome));

        assert_eq!(CYCLES_TOTAL.with_label_values(&[log, "stored"]).get(), 1);
        assert_eq!(API_CALL_WRITE_FAILURES_TOTAL.with_label_values(&[log]).get(), 1);
        assert_eq!(LATEST_TREE_SIZE.with_label_values(&[log]).get(), 1234);
        assert_eq!(LATEST_STH_TIMESTAMP.with_label_values(&[log]).get(), NOW_MS as i64);
    }

    #[test]
    fn test_reporter_counts_failures() {
        let log = "https://metrics.example/failing";
        let rejected = CycleOutcome {
            audit_error: None,
            result: Err(CycleError::Rejected(RejectReason::SignatureMismatch)),
        };
        let unreachable = CycleOutcome {
            audit_error: None,
            result: Err(CycleError::Transport(FetchError::Transport("refused".to_string()))),
        };

        MetricsReporter.report(log, &MonitorEvent::CycleFinished(&rejected));
        MetricsReporter.report(log, &MonitorEvent::CycleFinished(&unreachable));
        MetricsReporter.report(log, &MonitorEvent::Stopped);

        assert_eq!(CYCLES_TOTAL.with_label_values(&[log, "rejected"]).get(), 1);
        assert_eq!(CYCLES_TOTAL.with_label_values(&[log, "transport_error"]).get(), 1);
        assert_eq!(
            REJECTIONS_TOTAL
                .with_label_values(&[log, RejectReason::SignatureMismatch.label()])
                .get(),
            1
        );
        assert_eq!(API_CALL_WRITE_FAILURES_TOTAL.with_label_values(&[log]).get(), 0);
    }

    #[test]
    fn test_write_metrics_to_file() {
        let _ = init_metrics();
        CYCLES_TOTAL.with_label_values(&["https://metrics.example/file", "stored"]).inc();

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("metrics.prom");
        write_metrics(path.to_str());

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("https://metrics.example/file"));
    }

    #[test]
    fn test_export_contains_registered_metrics() {
        let _ = init_metrics();
        CYCLES_TOTAL.with_label_values(&["https://metrics.example/export", "stored"]).inc();

        let output = export_metrics();
        assert!(output.contains("ctmon_cycles_total"));
    }
}
