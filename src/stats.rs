// src/stats.rs
//! Statistics tracking for ct-monitor

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::report::{MonitorEvent, Reporter};
use crate::sth::CycleError;

/// Thread-safe statistics collector
#[derive(Clone)]
pub struct StatsCollector {
    cycles: Arc<AtomicU64>,
    stored: Arc<AtomicU64>,
    rejected: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
    audit_failures: Arc<AtomicU64>,
    start_time: Instant,
}

/// Snapshot of statistics at a point in time
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub stored: u64,
    pub rejected: u64,
    /// Cycles that ended on a transport, parse or store error
    pub failed: u64,
    pub audit_failures: u64,
    pub cycles_per_minute: f64,
    pub uptime_secs: u64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            cycles: Arc::new(AtomicU64::new(0)),
            stored: Arc::new(AtomicU64::new(0)),
            rejected: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
            audit_failures: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> StatsSnapshot {
        let elapsed = self.start_time.elapsed();
        let cycles = self.cycles.load(Ordering::Relaxed);

        let rate = if elapsed.as_secs() > 0 {
            (cycles as f64 / elapsed.as_secs() as f64) * 60.0
        } else {
            0.0
        };

        StatsSnapshot {
            cycles,
            stored: self.stored.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            audit_failures: self.audit_failures.load(Ordering::Relaxed),
            cycles_per_minute: rate,
            uptime_secs: elapsed.as_secs(),
        }
    }

    /// Format statistics as a human-readable string
    pub fn format_stats(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            "{} cycles | {} stored | {} rejected | {} failed | {} unrecorded | {:.1} cycles/min | uptime: {}",
            snapshot.cycles,
            snapshot.stored,
            snapshot.rejected,
            snapshot.failed,
            snapshot.audit_failures,
            snapshot.cycles_per_minute,
            Self::format_uptime(snapshot.uptime_secs)
        )
    }

    /// Format uptime duration
    pub fn format_uptime(secs: u64) -> String {
        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        let seconds = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for StatsCollector {
    fn report(&self, _log_url: &str, event: &MonitorEvent<'_>) {
        let MonitorEvent::CycleFinished(outcome) = event else {
            return;
        };

        self.cycles.fetch_add(1, Ordering::Relaxed);
        if outcome.audit_error.is_some() {
            self.audit_failures.fetch_add(1, Ordering::Relaxed);
        }

        let counter = match &outcome.result {
            Ok(_) => &self.stored,
            Err(CycleError::Rejected(_)) => &self.rejected,
            Err(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sth::test_support::{NOW_MS, TestLog};
    use crate::sth::{CycleOutcome, RejectReason};

    fn finish(stats: &StatsCollector, outcome: CycleOutcome) {
        stats.report("log-a", &MonitorEvent::CycleFinished(&outcome));
    }

    #[test]
    fn test_stats_collector_new() {
        let snapshot = StatsCollector::new().snapshot();

        assert_eq!(snapshot.cycles, 0);
        assert_eq!(snapshot.stored, 0);
    }

    #[test]
    fn test_counts_by_outcome() {
        let stats = StatsCollector::new();

        finish(&stats, CycleOutcome {
            audit_error: None,
            result: Ok(TestLog::new().sign(1, NOW_MS)),
        });
        finish(&stats, CycleOutcome {
            audit_error: Some("disk full".to_string()),
            result: Err(CycleError::Rejected(RejectReason::NegativeTreeSize(-1))),
        });
        finish(&stats, CycleOutcome {
            audit_error: None,
            result: Err(CycleError::UnusableResponse("empty body".to_string())),
        });
        stats.report("log-a", &MonitorEvent::Stopped);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.cycles, 3);
        assert_eq!(snapshot.stored, 1);
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.audit_failures, 1);
    }

    #[test]
    fn test_clone_shares_state() {
        let stats1 = StatsCollector::new();
        let stats2 = stats1.clone();

        finish(&stats1, CycleOutcome {
            audit_error: None,
            result: Ok(TestLog::new().sign(1, NOW_MS)),
        });

        assert_eq!(stats2.snapshot().stored, 1);
    }

    #[test]
    fn test_format_stats() {
        let text = StatsCollector::new().format_stats();
        assert!(text.starts_with("0 cycles | 0 stored"));
        assert!(text.ends_with("uptime: 0s"));
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(StatsCollector::format_uptime(30), "30s");
        assert_eq!(StatsCollector::format_uptime(90), "1m 30s");
        assert_eq!(StatsCollector::format_uptime(3661), "1h 1m 1s");
    }
}
