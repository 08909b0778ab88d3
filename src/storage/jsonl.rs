// src/storage/jsonl.rs
//! Append-only JSON Lines backend
//!
//! Writes `api_calls.jsonl` and `sths.jsonl` under one directory.
//! Existing STHs are loaded on open so that repeated writes stay idempotent
//! and the latest STH per log survives restarts.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ApiCallWriter, SthWriter};
use crate::apicall::ApiCall;
use crate::ct_log::types::SignedTreeHead;

const API_CALLS_FILE: &str = "api_calls.jsonl";
const STHS_FILE: &str = "sths.jsonl";

#[derive(Debug, Serialize, Deserialize)]
struct StoredSth {
    log_url: String,
    #[serde(flatten)]
    sth: SignedTreeHead,
}

#[derive(Default)]
struct SthIndex {
    seen: HashSet<(String, SignedTreeHead)>,
    latest: HashMap<String, SignedTreeHead>,
}

impl SthIndex {
    fn insert(&mut self, log_url: &str, sth: SignedTreeHead) -> bool {
        if !self.seen.insert((log_url.to_string(), sth.clone())) {
            return false;
        }
        self.latest.insert(log_url.to_string(), sth);
        true
    }
}

pub struct JsonlStorage {
    directory: PathBuf,
    api_call_lock: Mutex<()>,
    sths: Mutex<SthIndex>,
}

impl JsonlStorage {
    /// Open (or create) the storage directory and index existing STHs
    pub async fn open(directory: PathBuf) -> Result<Self> {
        fs::create_dir_all(&directory)
            .await
            .with_context(|| format!("Failed to create storage directory {:?}", directory))?;

        for file in [API_CALLS_FILE, STHS_FILE] {
            drop_partial_tail(&directory.join(file)).await?;
        }

        let mut index = SthIndex::default();
        let sths_path = directory.join(STHS_FILE);

        if fs::try_exists(&sths_path).await.unwrap_or(false) {
            let contents = fs::read_to_string(&sths_path)
                .await
                .context("Failed to read STH file")?;

            for (line_no, line) in contents.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<StoredSth>(line) {
                    Ok(stored) => {
                        index.insert(&stored.log_url, stored.sth);
                    }
                    Err(e) => warn!("{:?}:{}: skipping unreadable STH: {}", sths_path, line_no + 1, e),
                }
            }

            info!("Loaded {} stored STHs for {} logs", index.seen.len(), index.latest.len());
        }

        Ok(Self {
            directory,
            api_call_lock: Mutex::new(()),
            sths: Mutex::new(index),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    async fn append_line(&self, file: &str, line: String) -> Result<()> {
        let path = self.directory.join(file);
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open {:?}", path))?;

        f.write_all(format!("{}\n", line).as_bytes())
            .await
            .with_context(|| format!("Failed to append to {:?}", path))?;
        f.flush().await?;

        Ok(())
    }
}

/// Cut a trailing line left unfinished by an interrupted append, so the next
/// write starts on a line of its own
async fn drop_partial_tail(path: &Path) -> Result<()> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        return Ok(());
    }

    let contents = fs::read(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;
    if contents.is_empty() || contents.ends_with(b"\n") {
        return Ok(());
    }

    let keep = contents
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos + 1);
    warn!(
        "{:?}: dropping {} bytes of an incomplete trailing line",
        path,
        contents.len() - keep
    );

    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open {:?}", path))?;
    file.set_len(keep as u64)
        .await
        .with_context(|| format!("Failed to truncate {:?}", path))?;

    Ok(())
}

#[async_trait]
impl ApiCallWriter for JsonlStorage {
    async fn write_api_call(&self, call: &ApiCall) -> Result<()> {
        let line = serde_json::to_string(call).context("Failed to serialize API call")?;
        let _guard = self.api_call_lock.lock().await;
        self.append_line(API_CALLS_FILE, line).await
    }
}

#[async_trait]
impl SthWriter for JsonlStorage {
    async fn write_sth(&self, log_url: &str, sth: &SignedTreeHead) -> Result<()> {
        let mut index = self.sths.lock().await;
        if index.seen.contains(&(log_url.to_string(), sth.clone())) {
            debug!("{}: STH already stored, skipping: {}", log_url, sth);
            return Ok(());
        }

        let stored = StoredSth {
            log_url: log_url.to_string(),
            sth: sth.clone(),
        };
        let line = serde_json::to_string(&stored).context("Failed to serialize STH")?;
        self.append_line(STHS_FILE, line).await?;

        // Only index once the line is durable
        index.insert(log_url, sth.clone());
        Ok(())
    }

    async fn latest_sth(&self, log_url: &str) -> Result<Option<SignedTreeHead>> {
        Ok(self.sths.lock().await.latest.get(log_url).cloned())
    }
}
