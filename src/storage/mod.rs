// src/storage/mod.rs
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::apicall::ApiCall;
use crate::config::StorageConfig;
use crate::ct_log::types::SignedTreeHead;

pub mod jsonl;
pub mod memory;
pub mod postgres;
pub mod print;

pub use jsonl::JsonlStorage;
pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use print::PrintStorage;

/// Append-only audit log of every API call made to a log
#[async_trait]
pub trait ApiCallWriter: Send + Sync {
    async fn write_api_call(&self, call: &ApiCall) -> Result<()>;
}

/// Append-only store of accepted STHs.
///
/// Writing an STH that is already stored for the same log must be a no-op.
#[async_trait]
pub trait SthWriter: Send + Sync {
    async fn write_sth(&self, log_url: &str, sth: &SignedTreeHead) -> Result<()>;

    /// Most recently accepted STH for a log, if any
    async fn latest_sth(&self, log_url: &str) -> Result<Option<SignedTreeHead>>;
}

/// Storage handles shared by all monitored logs
#[derive(Clone)]
pub struct StorageHandles {
    pub api_calls: Arc<dyn ApiCallWriter>,
    pub sths: Arc<dyn SthWriter>,
}

impl StorageHandles {
    /// Use the same backend for both sinks
    pub fn from_backend<T>(backend: Arc<T>) -> Self
    where
        T: ApiCallWriter + SthWriter + 'static,
    {
        Self {
            api_calls: backend.clone(),
            sths: backend,
        }
    }
}

/// Open the backend selected in the configuration
pub async fn open(config: &StorageConfig) -> Result<StorageHandles> {
    match config.backend.as_str() {
        "print" => Ok(StorageHandles::from_backend(Arc::new(PrintStorage))),
        "memory" => Ok(StorageHandles::from_backend(Arc::new(MemoryStorage::new()))),
        "jsonl" => {
            let storage = JsonlStorage::open(config.directory.clone().into()).await?;
            Ok(StorageHandles::from_backend(Arc::new(storage)))
        }
        "postgres" => {
            let storage = PostgresStorage::new(&config.database_url, config.max_connections).await?;
            storage.migrate().await?;
            Ok(StorageHandles::from_backend(Arc::new(storage)))
        }
        other => anyhow::bail!(
            "Invalid storage backend '{}'. Must be one of: print, memory, jsonl, postgres",
            other
        ),
    }
}
