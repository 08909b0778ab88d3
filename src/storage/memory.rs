// src/storage/memory.rs
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use super::{ApiCallWriter, SthWriter};
use crate::apicall::ApiCall;
use crate::ct_log::types::SignedTreeHead;

/// In-process storage, mostly for tests and dry runs
#[derive(Default)]
pub struct MemoryStorage {
    api_calls: Arc<Mutex<Vec<ApiCall>>>,
    sths: Arc<Mutex<Vec<(String, SignedTreeHead)>>>,
    fail_api_calls: AtomicBool,
    fail_sths: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent API call writes fail
    pub fn fail_api_call_writes(&self, fail: bool) {
        self.fail_api_calls.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent STH writes fail
    pub fn fail_sth_writes(&self, fail: bool) {
        self.fail_sths.store(fail, Ordering::SeqCst);
    }

    pub async fn api_calls(&self) -> Vec<ApiCall> {
        self.api_calls.lock().await.clone()
    }

    /// Stored STHs for a log, in acceptance order
    pub async fn sths(&self, log_url: &str) -> Vec<SignedTreeHead> {
        self.sths
            .lock()
            .await
            .iter()
            .filter(|(url, _)| url == log_url)
            .map(|(_, sth)| sth.clone())
            .collect()
    }
}

#[async_trait]
impl ApiCallWriter for MemoryStorage {
    async fn write_api_call(&self, call: &ApiCall) -> Result<()> {
        if self.fail_api_calls.load(Ordering::SeqCst) {
            anyhow::bail!("audit sink unavailable");
        }
        self.api_calls.lock().await.push(call.clone());
        Ok(())
    }
}

#[async_trait]
impl SthWriter for MemoryStorage {
    async fn write_sth(&self, log_url: &str, sth: &SignedTreeHead) -> Result<()> {
        if self.fail_sths.load(Ordering::SeqCst) {
            anyhow::bail!("STH sink unavailable");
        }

        let mut sths = self.sths.lock().await;
        if !sths.iter().any(|(url, stored)| url == log_url && stored == sth) {
            sths.push((log_url.to_string(), sth.clone()));
        }
        Ok(())
    }

    async fn latest_sth(&self, log_url: &str) -> Result<Option<SignedTreeHead>> {
        let sths = self.sths.lock().await;
        Ok(sths
            .iter()
            .rev()
            .find(|(url, _)| url == log_url)
            .map(|(_, sth)| sth.clone()))
    }
}
