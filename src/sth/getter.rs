// src/sth/getter.rs
//! Periodic driver of the STH pipeline for one log

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use super::pipeline::{CycleOutcome, SthPipeline};
use crate::report::{MonitorEvent, Reporter};

/// Periodically gets an STH from a log, checks it and stores it
pub struct SthGetter {
    pipeline: SthPipeline,
    period: Duration,
    reporter: Arc<dyn Reporter>,
}

impl SthGetter {
    pub fn new(
        pipeline: SthPipeline,
        period: Duration,
        reporter: Arc<dyn Reporter>,
    ) -> anyhow::Result<Self> {
        if period.is_zero() {
            anyhow::bail!("STH getter period for {} must be greater than 0", pipeline.log_url());
        }

        Ok(Self {
            pipeline,
            period,
            reporter,
        })
    }

    pub fn log_url(&self) -> &str {
        self.pipeline.log_url()
    }

    /// Run until shutdown is signalled (or the shutdown sender is dropped).
    ///
    /// Cycles run one at a time. Ticks that fall due while a cycle is still
    /// running collapse into at most one late tick; they are never queued.
    /// Shutdown wins over a pending tick, and a cycle that has started always
    /// runs to completion.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let log_url = self.pipeline.log_url().to_string();
        self.reporter
            .report(&log_url, &MonitorEvent::Started { period: self.period });

        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            self.run_once().await;
        }

        self.reporter.report(&log_url, &MonitorEvent::Stopped);
    }

    /// Run a single cycle immediately and report it
    pub async fn run_once(&mut self) -> CycleOutcome {
        let outcome = self.pipeline.run_cycle().await;
        self.reporter
            .report(self.pipeline.log_url(), &MonitorEvent::CycleFinished(&outcome));
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ct_log::client::{FetchError, SthFetcher};
    use crate::ct_log::types::RawResponse;
    use crate::report::test_support::{RecordingReporter, Seen};
    use crate::sth::test_support::TestLog;
    use crate::sth::validator::{SthValidator, ValidatorConfig};
    use crate::storage::memory::MemoryStorage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fetcher that takes `delay` per call and tracks overlapping calls
    struct SlowFetcher {
        delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl SlowFetcher {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SthFetcher for SlowFetcher {
        async fn get_sth(&self) -> Result<RawResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Err(FetchError::Transport("log unreachable".to_string()))
        }
    }

    fn getter(
        fetcher: Arc<SlowFetcher>,
        storage: &Arc<MemoryStorage>,
        reporter: &Arc<RecordingReporter>,
        period: Duration,
    ) -> SthGetter {
        let pipeline = SthPipeline::new(
            "log-a".to_string(),
            fetcher,
            storage.clone(),
            storage.clone(),
            SthValidator::new(TestLog::new().key(), ValidatorConfig::default()),
        );
        SthGetter::new(pipeline, period, reporter.clone()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting_starts_no_cycle() {
        let fetcher = Arc::new(SlowFetcher::new(Duration::ZERO));
        let storage = Arc::new(MemoryStorage::new());
        let reporter = Arc::new(RecordingReporter::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let g = getter(fetcher.clone(), &storage, &reporter, Duration::from_secs(60));
        let handle = tokio::spawn(g.run(shutdown_rx));

        tokio::time::sleep(Duration::from_secs(30)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            reporter.events(),
            vec![Seen::Started(Duration::from_secs(60)), Seen::Stopped]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_cycle_per_period() {
        let fetcher = Arc::new(SlowFetcher::new(Duration::ZERO));
        let storage = Arc::new(MemoryStorage::new());
        let reporter = Arc::new(RecordingReporter::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let g = getter(fetcher.clone(), &storage, &reporter, Duration::from_secs(10));
        let handle = tokio::spawn(g.run(shutdown_rx));

        // Ticks at 10, 20 and 30 seconds
        tokio::time::sleep(Duration::from_secs(35)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(reporter.cycles().len(), 3);
        // Every attempt is audited even though every fetch failed
        assert_eq!(storage.api_calls().await.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycles_never_overlap() {
        let fetcher = Arc::new(SlowFetcher::new(Duration::from_secs(25)));
        let storage = Arc::new(MemoryStorage::new());
        let reporter = Arc::new(RecordingReporter::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let g = getter(fetcher.clone(), &storage, &reporter, Duration::from_secs(10));
        let handle = tokio::spawn(g.run(shutdown_rx));

        // Cycles start at 10s, 35s and 60s: each overrun absorbs one late
        // tick and drops the rest
        tokio::time::sleep(Duration::from_secs(80)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(fetcher.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        // The cycle in progress at shutdown was completed and reported
        assert_eq!(reporter.cycles().len(), 3);
        assert_eq!(reporter.events().last(), Some(&Seen::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_sender_stops_getter() {
        let fetcher = Arc::new(SlowFetcher::new(Duration::ZERO));
        let storage = Arc::new(MemoryStorage::new());
        let reporter = Arc::new(RecordingReporter::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let g = getter(fetcher.clone(), &storage, &reporter, Duration::from_secs(10));
        let handle = tokio::spawn(g.run(shutdown_rx));

        drop(shutdown_tx);
        handle.await.unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(reporter.events().last(), Some(&Seen::Stopped));
    }

    #[test]
    fn test_zero_period_is_an_error() {
        let pipeline = SthPipeline::new(
            "log-a".to_string(),
            Arc::new(SlowFetcher::new(Duration::ZERO)),
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryStorage::new()),
            SthValidator::new(TestLog::new().key(), ValidatorConfig::default()),
        );

        let result = SthGetter::new(pipeline, Duration::ZERO, Arc::new(RecordingReporter::default()));
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_never_ticks() {
        let fetcher = Arc::new(SlowFetcher::new(Duration::ZERO));
        let storage = Arc::new(MemoryStorage::new());
        let reporter = Arc::new(RecordingReporter::default());
        let (_shutdown_tx, shutdown_rx) = watch::channel(true);

        getter(fetcher.clone(), &storage, &reporter, Duration::from_secs(1))
            .run(shutdown_rx)
            .await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }
}
