// src/ct_log/log_list.rs
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, info};

use super::types::LogListV3;
use crate::config::LogConfig;

/// Fetches Google's CT log list to learn log URLs and public keys
pub struct LogListFetcher {
    http_client: reqwest::Client,
}

impl LogListFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http_client })
    }

    /// Fetch usable (and optionally readonly) logs that publish a key
    pub async fn fetch_logs(&self, list_url: &str, include_readonly: bool) -> Result<Vec<LogConfig>> {
        info!("Fetching CT log list from {}", list_url);

        let response = self
            .http_client
            .get(list_url)
            .send()
            .await
            .context("Failed to fetch CT log list")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to fetch log list: HTTP {}", response.status());
        }

        let log_list: LogListV3 = response
            .json()
            .await
            .context("Failed to parse log list JSON")?;

        let mut logs = Vec::new();

        for operator in &log_list.operators {
            for log in &operator.logs {
                let acceptable = log
                    .state
                    .as_ref()
                    .map(|s| s.is_acceptable(include_readonly))
                    .unwrap_or(false);

                let Some(key) = log.key.as_ref().filter(|k| !k.is_empty()) else {
                    continue;
                };

                if acceptable && !log.url.is_empty() {
                    debug!("Found log: {} ({}) run by {}", log.description, log.url, operator.name);
                    logs.push(LogConfig {
                        url: log.url.clone(),
                        key: Some(key.clone()),
                        description: log.description.clone(),
                        poll_interval_secs: None,
                    });
                }
            }
        }

        info!("Found {} acceptable CT logs (readonly={})", logs.len(), include_readonly);

        Ok(logs)
    }
}

fn same_log(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

/// Fill in missing keys of configured logs from a log list.
///
/// With no configured logs, every listed log is monitored.
pub fn resolve_logs(configured: &[LogConfig], listed: &[LogConfig]) -> Result<Vec<LogConfig>> {
    if configured.is_empty() {
        return Ok(listed.to_vec());
    }

    configured
        .iter()
        .map(|log| {
            if log.key.is_some() {
                return Ok(log.clone());
            }

            let found = listed
                .iter()
                .find(|l| same_log(&l.url, &log.url))
                .and_then(|l| l.key.clone())
                .with_context(|| format!("No key for {} in config or log list", log.url))?;

            let mut resolved = log.clone();
            resolved.key = Some(found);
            Ok(resolved)
        })
        .collect()
}
