// src/storage/postgres.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use super::{ApiCallWriter, SthWriter};
use crate::apicall::ApiCall;
use crate::ct_log::types::SignedTreeHead;

/// PostgreSQL storage backend
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        info!("Connecting to PostgreSQL database");

        let cleaned_url = Self::clean_connection_string(database_url);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(&cleaned_url)
            .await
            .context("Failed to connect to PostgreSQL database")?;

        info!("Connected to PostgreSQL successfully");

        Ok(Self { pool })
    }

    /// Drop query parameters sqlx does not understand (e.g. Neon's channel_binding)
    fn clean_connection_string(url_str: &str) -> String {
        use url::Url;

        let Ok(mut url) = Url::parse(url_str) else {
            return url_str.to_string();
        };

        let unsupported_params = ["channel_binding"];
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !unsupported_params.contains(&key.as_ref()))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }

        url.to_string()
    }

    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS api_calls (
                id BIGSERIAL PRIMARY KEY,
                log_url TEXT NOT NULL,
                endpoint TEXT NOT NULL,
                status INTEGER,
                body BYTEA,
                elapsed_ms BIGINT,
                error TEXT,
                recorded_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create api_calls table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sths (
                id BIGSERIAL PRIMARY KEY,
                log_url TEXT NOT NULL,
                tree_size BIGINT NOT NULL,
                timestamp BIGINT NOT NULL,
                root_hash BYTEA NOT NULL,
                signature BYTEA NOT NULL,
                stored_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (log_url, tree_size, timestamp, root_hash, signature)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create sths table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_sths_log_timestamp
            ON sths(log_url, timestamp DESC)
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create index on sths(log_url, timestamp)")?;

        info!("Database migrations completed successfully");

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ApiCallWriter for PostgresStorage {
    async fn write_api_call(&self, call: &ApiCall) -> Result<()> {
        let response = call.response.as_ref();

        sqlx::query(
            r#"
            INSERT INTO api_calls (
                log_url, endpoint, status, body, elapsed_ms, error, recorded_at
            ) VALUES ($1, $2, $3, $4, $5, $6, to_timestamp($7::double precision / 1000))
            "#,
        )
        .bind(&call.log_url)
        .bind(&call.endpoint)
        .bind(response.map(|r| r.status as i32))
        .bind(response.map(|r| r.body.clone()))
        .bind(response.map(|r| i64::try_from(r.elapsed_ms).unwrap_or(i64::MAX)))
        .bind(&call.error)
        .bind(call.recorded_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to insert API call into database")?;

        Ok(())
    }
}

#[async_trait]
impl SthWriter for PostgresStorage {
    async fn write_sth(&self, log_url: &str, sth: &SignedTreeHead) -> Result<()> {
        let timestamp = timestamp_to_db(sth.timestamp)?;

        let result = sqlx::query(
            r#"
            INSERT INTO sths (log_url, tree_size, timestamp, root_hash, signature)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (log_url, tree_size, timestamp, root_hash, signature) DO NOTHING
            "#,
        )
        .bind(log_url)
        .bind(sth.tree_size)
        .bind(timestamp)
        .bind(&sth.root_hash)
        .bind(&sth.signature)
        .execute(&self.pool)
        .await
        .context("Failed to insert STH into database")?;

        if result.rows_affected() == 0 {
            debug!("{}: STH already stored: {}", log_url, sth);
        }

        Ok(())
    }

    async fn latest_sth(&self, log_url: &str) -> Result<Option<SignedTreeHead>> {
        let row = sqlx::query(
            r#"
            SELECT tree_size, timestamp, root_hash, signature FROM sths
            WHERE log_url = $1
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(log_url)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch latest STH")?;

        row.map(|r| {
            Ok(SignedTreeHead {
                tree_size: r.get("tree_size"),
                timestamp: timestamp_from_db(r.get("timestamp"))?,
                root_hash: r.get("root_hash"),
                signature: r.get("signature"),
            })
        })
        .transpose()
    }
}

/// STH timestamps are u64 but stored in a BIGINT column
fn timestamp_to_db(timestamp: u64) -> Result<i64> {
    i64::try_from(timestamp)
        .with_context(|| format!("STH timestamp {} does not fit in a BIGINT column", timestamp))
}

fn timestamp_from_db(timestamp: i64) -> Result<u64> {
    u64::try_from(timestamp)
        .with_context(|| format!("Stored STH timestamp {} is negative", timestamp))
}
