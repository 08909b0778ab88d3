// src/storage/print.rs
//! Development backend that only logs what it is asked to store.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use super::{ApiCallWriter, SthWriter};
use crate::apicall::ApiCall;
use crate::ct_log::types::SignedTreeHead;

pub struct PrintStorage;

#[async_trait]
impl ApiCallWriter for PrintStorage {
    async fn write_api_call(&self, call: &ApiCall) -> Result<()> {
        info!("API call: {}", call);
        Ok(())
    }
}

#[async_trait]
impl SthWriter for PrintStorage {
    async fn write_sth(&self, log_url: &str, sth: &SignedTreeHead) -> Result<()> {
        info!("{}: STH: {}", log_url, sth);
        Ok(())
    }

    async fn latest_sth(&self, _log_url: &str) -> Result<Option<SignedTreeHead>> {
        Ok(None)
    }
}
