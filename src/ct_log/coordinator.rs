// src/ct_log/coordinator.rs
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::client::{CtLogClient, SthFetcher};
use crate::config::{Config, LogConfig};
use crate::report::Reporter;
use crate::sth::{CycleOutcome, LogKey, SthGetter, SthPipeline, SthValidator, ValidatorConfig};
use crate::storage::StorageHandles;

/// Everything needed to monitor one log
pub struct MonitoredLog {
    pub url: String,
    pub period: Duration,
    pub fetcher: Arc<dyn SthFetcher>,
    pub validator: SthValidator,
}

impl MonitoredLog {
    /// Build a log monitored over HTTP from its configuration
    pub fn from_config(log: &LogConfig, config: &Config) -> Result<Self> {
        let encoded_key = log
            .key
            .as_deref()
            .with_context(|| format!("No public key for {}", log.url))?;
        let key = LogKey::from_base64_der(encoded_key)
            .with_context(|| format!("Invalid public key for {}", log.url))?;

        let validator = SthValidator::new(
            key,
            ValidatorConfig {
                max_clock_skew: config.monitor.max_clock_skew(),
                ..ValidatorConfig::default()
            },
        );
        let client = CtLogClient::new(log.url.clone(), config.monitor.request_timeout())?;

        Ok(Self {
            url: log.url.clone(),
            period: config.period_for(log),
            fetcher: Arc::new(client),
            validator,
        })
    }

    fn into_getter(self, storage: &StorageHandles, reporter: Arc<dyn Reporter>) -> Result<SthGetter> {
        let pipeline = SthPipeline::new(
            self.url,
            self.fetcher,
            Arc::clone(&storage.api_calls),
            Arc::clone(&storage.sths),
            self.validator,
        );
        SthGetter::new(pipeline, self.period, reporter)
    }
}

/// Runs one independent STH getter task per log
pub struct MonitorCoordinator {
    monitors: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl MonitorCoordinator {
    /// Spawn a getter for every log
    pub fn start(
        logs: Vec<MonitoredLog>,
        storage: StorageHandles,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        info!("Starting {} STH getters", logs.len());

        let monitors = logs
            .into_iter()
            .filter_map(|log| match log.into_getter(&storage, Arc::clone(&reporter)) {
                Ok(getter) => Some(tokio::spawn(getter.run(shutdown_tx.subscribe()))),
                Err(e) => {
                    error!("Failed to create STH getter: {:#}", e);
                    None
                }
            })
            .collect();

        Self {
            monitors,
            shutdown_tx,
        }
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// Signal shutdown to all getters
    pub fn shutdown(&self) {
        info!("Signaling shutdown to all STH getters");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for every getter to stop
    pub async fn wait(self) {
        for handle in self.monitors {
            if let Err(e) = handle.await {
                error!("STH getter task failed: {}", e);
            }
        }

        info!("All STH getters stopped");
    }

    /// Run exactly one cycle per log, concurrently across logs
    pub async fn run_once(
        logs: Vec<MonitoredLog>,
        storage: StorageHandles,
        reporter: Arc<dyn Reporter>,
    ) -> Vec<(String, CycleOutcome)> {
        let handles: Vec<_> = logs
            .into_iter()
            .filter_map(|log| match log.into_getter(&storage, Arc::clone(&reporter)) {
                Ok(mut getter) => Some(tokio::spawn(async move {
                    let outcome = getter.run_once().await;
                    (getter.log_url().to_string(), outcome)
                })),
                Err(e) => {
                    error!("Failed to create STH getter: {:#}", e);
                    None
                }
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => outcomes.push(result),
                Err(e) => error!("STH getter task failed: {}", e),
            }
        }
        outcomes
    }
}
