//! Postgres pool construction and audit-table bootstrap.

use crate::config::DatabaseConfig;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

/// Create the connection pool.
#[instrument(skip(config), fields(service = "gateway-service"))]
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, AppError> {
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Connecting to PostgreSQL"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(&config.url)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

    info!("PostgreSQL connection pool established");

    Ok(pool)
}

/// Idempotent schema bootstrap for the append-only audit table.
#[instrument(skip(pool))]
pub async fn ensure_schema(pool: &PgPool) -> Result<(), AppError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_records (
            id            UUID PRIMARY KEY,
            user_id       TEXT,
            tenant_id     TEXT,
            action        TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id   TEXT,
            outcome       TEXT NOT NULL,
            reason        TEXT,
            risk_score    SMALLINT,
            source_ip     TEXT,
            user_agent    TEXT,
            metadata      JSONB NOT NULL DEFAULT '{}'::jsonb,
            created_utc   TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create audit table: {}", e)))?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_audit_user_outcome_time
        ON audit_records (user_id, outcome, created_utc)
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create audit index: {}", e)))?;

    info!("Audit schema ready");
    Ok(())
}
