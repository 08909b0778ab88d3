// src/sth/pipeline.rs
//! One fetch, record, validate, store cycle for a single log

use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::validator::{RejectReason, SthValidator, ValidationResult};
use crate::apicall::ApiCallRecorder;
use crate::ct_log::client::{FetchError, SthFetcher};
use crate::ct_log::types::{GET_STH_ENDPOINT, RawResponse, SignedTreeHead};
use crate::storage::{ApiCallWriter, SthWriter};

/// Pipeline stage at which a cycle ended early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Parse,
    Validate,
    Store,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Parse => "parse",
            Stage::Validate => "validate",
            Stage::Store => "store",
        };
        f.write_str(name)
    }
}

/// Why a cycle did not end with a stored STH
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CycleError {
    #[error("error getting STH: {0}")]
    Transport(#[from] FetchError),

    #[error("unusable get-sth response: {0}")]
    UnusableResponse(String),

    #[error("STH rejected: {0}")]
    Rejected(RejectReason),

    #[error("error writing {sth}: {error}")]
    StoreFailed { sth: SignedTreeHead, error: String },
}

impl CycleError {
    pub fn stage(&self) -> Stage {
        match self {
            CycleError::Transport(_) => Stage::Fetch,
            CycleError::UnusableResponse(_) => Stage::Parse,
            CycleError::Rejected(_) => Stage::Validate,
            CycleError::StoreFailed { .. } => Stage::Store,
        }
    }

    /// Short stable label, used for metrics
    pub fn label(&self) -> &'static str {
        match self {
            CycleError::Transport(_) => "transport_error",
            CycleError::UnusableResponse(_) => "unusable_response",
            CycleError::Rejected(_) => "rejected",
            CycleError::StoreFailed { .. } => "store_failed",
        }
    }
}

/// Summary of one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    /// Set when the API call record could not be written
    pub audit_error: Option<String>,
    /// The stored STH, or the stage the cycle stopped at
    pub result: Result<SignedTreeHead, CycleError>,
}

impl CycleOutcome {
    pub fn fetched(&self) -> bool {
        !matches!(self.result, Err(CycleError::Transport(_)))
    }

    pub fn recorded(&self) -> bool {
        self.audit_error.is_none()
    }

    pub fn validated(&self) -> bool {
        matches!(self.result, Ok(_) | Err(CycleError::StoreFailed { .. }))
    }

    pub fn stored(&self) -> bool {
        self.result.is_ok()
    }

    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match &self.result {
            Err(CycleError::Rejected(reason)) => Some(reason),
            _ => None,
        }
    }
}

/// Runs cycles for one log and owns its "last accepted STH"
pub struct SthPipeline {
    log_url: String,
    fetcher: Arc<dyn SthFetcher>,
    recorder: ApiCallRecorder,
    validator: SthValidator,
    sth_sink: Arc<dyn SthWriter>,
    last_accepted: Option<SignedTreeHead>,
    seeded: bool,
}

impl SthPipeline {
    pub fn new(
        log_url: String,
        fetcher: Arc<dyn SthFetcher>,
        api_call_sink: Arc<dyn ApiCallWriter>,
        sth_sink: Arc<dyn SthWriter>,
        validator: SthValidator,
    ) -> Self {
        let recorder = ApiCallRecorder::new(log_url.clone(), api_call_sink);

        Self {
            log_url,
            fetcher,
            recorder,
            validator,
            sth_sink,
            last_accepted: None,
            seeded: false,
        }
    }

    pub fn log_url(&self) -> &str {
        &self.log_url
    }

    pub fn last_accepted(&self) -> Option<&SignedTreeHead> {
        self.last_accepted.as_ref()
    }

    /// Execute one cycle. Never fails; every stage error ends up in the outcome.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        debug!("{}: getting STH...", self.log_url);
        let fetched = self.fetcher.get_sth().await;

        // Exactly one record per fetch attempt, whatever happened
        let call = self.recorder.record(GET_STH_ENDPOINT, &fetched);
        let audit_error = match self.recorder.persist(&call).await {
            Ok(()) => None,
            Err(e) => Some(format!("{:#}", e)),
        };

        let result = self.check_and_store(fetched).await;

        CycleOutcome {
            audit_error,
            result,
        }
    }

    async fn check_and_store(
        &mut self,
        fetched: Result<RawResponse, FetchError>,
    ) -> Result<SignedTreeHead, CycleError> {
        let response = fetched?;

        if response.body.is_empty() {
            return Err(CycleError::UnusableResponse("empty response body".to_string()));
        }
        debug!(
            "{}: response: {}",
            self.log_url,
            String::from_utf8_lossy(&response.body)
        );

        let sth = SignedTreeHead::from_json(&response.body)
            .map_err(|e| CycleError::UnusableResponse(format!("{:#}", e)))?;

        self.seed_last_accepted().await;

        let now_ms = Utc::now().timestamp_millis().max(0) as u64;
        if let ValidationResult::Reject(reason) =
            self.validator.validate(&sth, self.last_accepted.as_ref(), now_ms)
        {
            return Err(CycleError::Rejected(reason));
        }

        if let Err(e) = self.sth_sink.write_sth(&self.log_url, &sth).await {
            return Err(CycleError::StoreFailed {
                sth,
                error: format!("{:#}", e),
            });
        }

        self.last_accepted = Some(sth.clone());
        Ok(sth)
    }

    /// Load the last stored STH once, so the timestamp check survives restarts
    async fn seed_last_accepted(&mut self) {
        if self.seeded {
            return;
        }

        match self.sth_sink.latest_sth(&self.log_url).await {
            Ok(latest) => {
                if let Some(sth) = &latest {
                    debug!("{}: resuming from stored {}", self.log_url, sth);
                }
                if self.last_accepted.is_none() {
                    self.last_accepted = latest;
                }
                self.seeded = true;
            }
            Err(e) => {
                // Retried on the next cycle that reaches validation
                warn!("{}: failed to load last stored STH: {:#}", self.log_url, e);
            }
        }
    }
}
