// src/ct_log/client.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use super::types::RawResponse;

/// A get-sth call that did not produce a usable reply
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request never completed (connect, timeout, TLS, reading the body)
    #[error("transport error: {0}")]
    Transport(String),

    /// The log answered with a non-success status
    #[error("get-sth returned HTTP {status}")]
    Status { status: u16, response: RawResponse },
}

impl FetchError {
    /// The reply received before the failure, if any
    pub fn response(&self) -> Option<&RawResponse> {
        match self {
            FetchError::Transport(_) => None,
            FetchError::Status { response, .. } => Some(response),
        }
    }
}

/// Source of STHs for a single log
#[async_trait]
pub trait SthFetcher: Send + Sync {
    async fn get_sth(&self) -> Result<RawResponse, FetchError>;
}

/// HTTP client for Certificate Transparency log RFC 6962 API
pub struct CtLogClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl CtLogClient {
    /// Create a new CT log client
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl SthFetcher for CtLogClient {
    /// Get Signed Tree Head
    /// Endpoint: GET {base_url}/ct/v1/get-sth
    async fn get_sth(&self) -> Result<RawResponse, FetchError> {
        let url = format!("{}/ct/v1/get-sth", self.base_url);

        debug!("Fetching STH from {}", url);

        let started = Instant::now();
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(format!("failed to read body: {}", e)))?;

        let raw = RawResponse::new(
            status.as_u16(),
            body.to_vec(),
            started.elapsed().as_millis() as u64,
        );

        debug!(
            "{}: get-sth answered {} in {}ms ({} bytes)",
            self.base_url,
            raw.status,
            raw.elapsed_ms,
            raw.body.len()
        );

        if !status.is_success() {
            return Err(FetchError::Status {
                status: raw.status,
                response: raw,
            });
        }

        Ok(raw)
    }
}
