use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use tracing::{info, instrument};

use crate::error::{EnrichError, Result};

/// Thin handle around a Postgres pool sized for one-shot batch work.
#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let mut connect_options = PgConnectOptions::from_str(database_url)?;

        // Be explicit about TLS when the DSN asks for it.
        if database_url.contains("sslmode=require") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }

        // PgBouncer txn mode safe
        connect_options = connect_options.statement_cache_capacity(0);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await?;
        info!("connected to db");
        Ok(Self { pool })
    }

    /// Release every connection. The transform phase runs after this so slow
    /// CPU-bound work never holds a server-side session open.
    pub async fn close(self) {
        self.pool.close().await;
        info!("released db connections");
    }

    /// Whether `table` resolves on the current search path.
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let visible: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .persistent(false)
            .bind(table)
            .fetch_one(&self.pool)
            .await?;
        Ok(visible)
    }

    /// Column names of `table` in ordinal order. Errors with `Schema` when
    /// the table itself is missing so callers fail before extraction.
    pub async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        if !self.table_exists(table).await? {
            return Err(EnrichError::Schema(format!("table {table} not found")));
        }
        let columns: Vec<String> = sqlx::query_scalar(
            "SELECT column_name FROM information_schema.columns
             WHERE table_name = $1
             ORDER BY ordinal_position",
        )
        .persistent(false)
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        Ok(columns)
    }
}
