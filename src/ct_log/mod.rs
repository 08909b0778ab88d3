// src/ct_log/mod.rs
pub mod client;
pub mod coordinator;
pub mod log_list;
pub mod types;

pub use client::{CtLogClient, FetchError, SthFetcher};
pub use coordinator::{MonitorCoordinator, MonitoredLog};
pub use log_list::{LogListFetcher, resolve_logs};
pub use types::{LogInfo, LogListV3, RawResponse, SignedTreeHead};
