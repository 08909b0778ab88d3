// src/report.rs
//! Structured reporting of monitor activity
//!
//! The pipeline and scheduler never log outcomes through globals; they emit
//! [`MonitorEvent`]s to a [`Reporter`] handed to them at construction.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::sth::pipeline::{CycleError, CycleOutcome};

#[derive(Debug)]
pub enum MonitorEvent<'a> {
    Started { period: Duration },
    CycleFinished(&'a CycleOutcome),
    Stopped,
}

/// Receiver of monitor events for operator visibility
pub trait Reporter: Send + Sync {
    fn report(&self, log_url: &str, event: &MonitorEvent<'_>);
}

/// Reports events as tracing log lines
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, log_url: &str, event: &MonitorEvent<'_>) {
        match event {
            MonitorEvent::Started { period } => {
                info!("{}: STH getter started with period {:?}", log_url, period);
            }
            MonitorEvent::Stopped => {
                info!("{}: STH getter stopped", log_url);
            }
            MonitorEvent::CycleFinished(outcome) => {
                if let Some(err) = &outcome.audit_error {
                    warn!(log = log_url, stage = "record", "{}: failed to write API call: {}", log_url, err);
                }

                match &outcome.result {
                    Ok(sth) => info!(
                        log = log_url,
                        tree_size = sth.tree_size,
                        timestamp = sth.timestamp,
                        "{}: stored {}",
                        log_url,
                        sth
                    ),
                    Err(err @ CycleError::Rejected(reason)) => error!(
                        log = log_url,
                        stage = %err.stage(),
                        reason = reason.label(),
                        "{}: {}",
                        log_url,
                        err
                    ),
                    Err(err) => warn!(
                        log = log_url,
                        stage = %err.stage(),
                        "{}: {}",
                        log_url,
                        err
                    ),
                }
            }
        }
    }
}

/// Dispatches events to several reporters
#[derive(Clone, Default)]
pub struct Reporters {
    reporters: Vec<Arc<dyn Reporter>>,
}

impl Reporters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, reporter: Arc<dyn Reporter>) {
        self.reporters.push(reporter);
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl Reporter for Reporters {
    fn report(&self, log_url: &str, event: &MonitorEvent<'_>) {
        for reporter in &self.reporters {
            reporter.report(log_url, event);
        }
    }
}
