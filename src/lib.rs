// src/lib.rs
// Library interface for ct-monitor
pub mod apicall;
pub mod cli;
pub mod config;
pub mod ct_log;
pub mod metrics;
pub mod report;
pub mod stats;
pub mod sth;
pub mod storage;
