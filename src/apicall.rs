// src/apicall.rs
//! Audit records of CT log API calls

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::ct_log::client::FetchError;
use crate::ct_log::types::RawResponse;
use crate::storage::ApiCallWriter;

/// One attempted call to a log endpoint, successful or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCall {
    pub log_url: String,
    pub endpoint: String,
    pub response: Option<RawResponse>,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ApiCall {
    pub fn new(
        log_url: &str,
        endpoint: &str,
        response: Option<RawResponse>,
        error: Option<&FetchError>,
    ) -> Self {
        Self {
            log_url: log_url.to_string(),
            endpoint: endpoint.to_string(),
            response,
            error: error.map(|e| e.to_string()),
            recorded_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for ApiCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: ", self.log_url, self.endpoint)?;
        match &self.response {
            Some(r) => write!(f, "HTTP {} ({} bytes, {}ms)", r.status, r.body.len(), r.elapsed_ms)?,
            None => write!(f, "no response")?,
        }
        if let Some(err) = &self.error {
            write!(f, ", error: {}", err)?;
        }
        Ok(())
    }
}

/// Turns fetch attempts of one log into audit records and hands them to the audit sink
#[derive(Clone)]
pub struct ApiCallRecorder {
    log_url: String,
    sink: Arc<dyn ApiCallWriter>,
}

impl ApiCallRecorder {
    pub fn new(log_url: String, sink: Arc<dyn ApiCallWriter>) -> Self {
        Self { log_url, sink }
    }

    /// Build the record for a fetch attempt
    pub fn record(&self, endpoint: &str, result: &Result<RawResponse, FetchError>) -> ApiCall {
        match result {
            Ok(response) => ApiCall::new(&self.log_url, endpoint, Some(response.clone()), None),
            Err(err) => ApiCall::new(&self.log_url, endpoint, err.response().cloned(), Some(err)),
        }
    }

    /// Write the record to the audit sink, once
    pub async fn persist(&self, call: &ApiCall) -> Result<()> {
        debug!("{}: writing API call {}", self.log_url, call);
        self.sink.write_api_call(call).await
    }
}
