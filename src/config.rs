// src/config.rs

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_clock_skew")]
    pub max_clock_skew_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_poll_interval() -> u64 { 60 }
fn default_max_clock_skew() -> u64 { 10 }
fn default_request_timeout() -> u64 { 30 }

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            max_clock_skew_secs: default_max_clock_skew(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl MonitorConfig {
    pub fn max_clock_skew(&self) -> Duration {
        Duration::from_secs(self.max_clock_skew_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// A log to monitor
#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub url: String,
    /// Base64 DER SubjectPublicKeyInfo
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Overrides `monitor.poll_interval_secs` for this log
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogListConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_log_list_url")]
    pub url: String,
    #[serde(default)]
    pub include_readonly: bool,
}

fn default_log_list_url() -> String {
    "https://www.gstatic.com/ct/log_list/v3/all_logs_list.json".to_string()
}

impl Default for LogListConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_log_list_url(),
            include_readonly: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    #[serde(default = "default_storage_directory")]
    pub directory: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_storage_backend() -> String { "print".to_string() }
fn default_storage_directory() -> String { "ct-monitor-data".to_string() }
fn default_database_url() -> String {
    "postgresql://localhost/ctmonitor".to_string()
}
fn default_max_connections() -> u32 { 5 }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            directory: default_storage_directory(),
            database_url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MetricsSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub export_path: Option<String>,
    #[serde(default = "default_metrics_interval")]
    pub export_interval_secs: u64,
}

fn default_metrics_interval() -> u64 { 60 }

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub logs: Vec<LogConfig>,
    #[serde(default)]
    pub log_list: LogListConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsSettings,
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks that do not need the log list
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.monitor.poll_interval_secs == 0 {
            anyhow::bail!("monitor.poll_interval_secs must be greater than 0");
        }

        for log in &self.logs {
            if log.url.is_empty() {
                anyhow::bail!("Every [[logs]] entry needs a url");
            }
            if log.poll_interval_secs == Some(0) {
                anyhow::bail!("poll_interval_secs for {} must be greater than 0", log.url);
            }
            if log.key.is_none() && !self.log_list.enabled {
                anyhow::bail!(
                    "Log {} has no key; set `key` or enable [log_list] to look it up",
                    log.url
                );
            }
        }

        if self.logs.is_empty() && !self.log_list.enabled {
            anyhow::bail!("No logs configured: add [[logs]] entries or enable [log_list]");
        }

        Ok(())
    }

    /// Poll period for a log
    pub fn period_for(&self, log: &LogConfig) -> Duration {
        Duration::from_secs(log.poll_interval_secs.unwrap_or(self.monitor.poll_interval_secs))
    }
}
