// src/cli.rs
use clap::Parser;

/// ct-monitor: Certificate Transparency log monitor
///
/// Periodically fetches Signed Tree Heads from CT logs, checks their
/// signatures and consistency, and stores every accepted STH.
#[derive(Parser, Debug, Clone)]
#[command(name = "ct-monitor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to TOML config file
    #[arg(short = 'c', long = "config", default_value = "config.toml")]
    pub config: String,

    /// Run one cycle per log, then exit
    #[arg(long = "once")]
    pub once: bool,

    /// Override the storage backend from config (print, memory, jsonl, postgres)
    #[arg(long = "storage")]
    pub storage: Option<String>,

    /// Display statistics (cycles, stored, rejected, failed)
    #[arg(long = "stats")]
    pub stats: bool,

    /// Stats update interval in seconds
    #[arg(long = "stats-interval", default_value = "60")]
    pub stats_interval: u64,

    /// Verbose logging (set log level to debug)
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Quiet logging (set log level to warn)
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

impl Cli {
    /// Validate flag combinations and return errors for invalid usage
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stats && self.stats_interval == 0 {
            anyhow::bail!("--stats-interval must be greater than 0");
        }

        if self.verbose && self.quiet {
            anyhow::bail!("Cannot specify both --verbose and --quiet");
        }

        Ok(())
    }

    /// Log level forced by flags, if any
    pub fn log_level(&self) -> Option<&str> {
        if self.verbose {
            Some("debug")
        } else if self.quiet {
            Some("warn")
        } else {
            None
        }
    }
}
