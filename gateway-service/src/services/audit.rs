//! Audit trail: append-only store plus the non-blocking recorder.
//!
//! The store doubles as the risk scorer's history source (velocity and
//! failed-attempt counts). The recorder spawns each write so a slow or
//! failing store never adds latency to the request that produced the record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use std::sync::{Arc, RwLock};

use crate::models::audit::{AuditOutcome, AuditRecord};
use crate::models::event::{DebugEvent, DebugEventType};
use crate::services::error::GatewayError;
use crate::services::events::DebugEventBus;
use crate::services::metrics::AUDIT_WRITE_FAILURES;

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, record: AuditRecord) -> Result<(), GatewayError>;
    /// Most recent records first.
    async fn recent(&self, limit: i64) -> Result<Vec<AuditRecord>, GatewayError>;
    async fn count_for_user_since(
        &self,
        user_id: &str,
        outcome: AuditOutcome,
        since: DateTime<Utc>,
    ) -> Result<u32, GatewayError>;
    /// Administrative reset only; there is no other deletion path.
    async fn reset(&self) -> Result<(), GatewayError>;
    async fn health_check(&self) -> Result<(), GatewayError>;
}

// ----------------------------------------------------------------------------
// Postgres store
// ----------------------------------------------------------------------------

pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<AuditRecord, sqlx::Error> {
        let outcome: String = row.try_get("outcome")?;
        let risk_score: Option<i16> = row.try_get("risk_score")?;
        Ok(AuditRecord {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            tenant_id: row.try_get("tenant_id")?,
            action: row.try_get("action")?,
            resource_type: row.try_get("resource_type")?,
            resource_id: row.try_get("resource_id")?,
            outcome: AuditOutcome::parse(&outcome).unwrap_or(AuditOutcome::Error),
            reason: row.try_get("reason")?,
            risk_score: risk_score.map(|v| v.clamp(0, 100) as u8),
            source_ip: row.try_get("source_ip")?,
            user_agent: row.try_get("user_agent")?,
            metadata: row.try_get("metadata")?,
            created_utc: row.try_get("created_utc")?,
        })
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    #[tracing::instrument(skip(self, record), fields(action = %record.action, outcome = record.outcome.as_str()))]
    async fn append(&self, record: AuditRecord) -> Result<(), GatewayError> {
        sqlx::query(
            r#"
            INSERT INTO audit_records
                (id, user_id, tenant_id, action, resource_type, resource_id,
                 outcome, reason, risk_score, source_ip, user_agent, metadata, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(record.id)
        .bind(&record.user_id)
        .bind(&record.tenant_id)
        .bind(&record.action)
        .bind(&record.resource_type)
        .bind(&record.resource_id)
        .bind(record.outcome.as_str())
        .bind(&record.reason)
        .bind(record.risk_score.map(|v| v as i16))
        .bind(&record.source_ip)
        .bind(&record.user_agent)
        .bind(&record.metadata)
        .bind(record.created_utc)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<AuditRecord>, GatewayError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, tenant_id, action, resource_type, resource_id,
                   outcome, reason, risk_score, source_ip, user_agent, metadata, created_utc
            FROM audit_records
            ORDER BY created_utc DESC
            LIMIT $1
            "#,
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Self::record_from_row(row).map_err(GatewayError::from))
            .collect()
    }

    async fn count_for_user_since(
        &self,
        user_id: &str,
        outcome: AuditOutcome,
        since: DateTime<Utc>,
    ) -> Result<u32, GatewayError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM audit_records
            WHERE user_id = $1 AND outcome = $2 AND created_utc >= $3
            "#,
        )
        .bind(user_id)
        .bind(outcome.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u32)
    }

    async fn reset(&self) -> Result<(), GatewayError> {
        sqlx::query("DELETE FROM audit_records")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), GatewayError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// In-memory store (tests and store-less demo runs)
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryAuditStore {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_read(&self) -> std::sync::RwLockReadGuard<'_, Vec<AuditRecord>> {
        match self.records.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<AuditRecord>> {
        match self.records.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, record: AuditRecord) -> Result<(), GatewayError> {
        self.lock_write().push(record);
        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<AuditRecord>, GatewayError> {
        let records = self.lock_read();
        Ok(records
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_for_user_since(
        &self,
        user_id: &str,
        outcome: AuditOutcome,
        since: DateTime<Utc>,
    ) -> Result<u32, GatewayError> {
        let records = self.lock_read();
        Ok(records
            .iter()
            .filter(|r| {
                r.user_id.as_deref() == Some(user_id)
                    && r.outcome == outcome
                    && r.created_utc >= since
            })
            .count() as u32)
    }

    async fn reset(&self) -> Result<(), GatewayError> {
        self.lock_write().clear();
        Ok(())
    }

    async fn health_check(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Recorder
// ----------------------------------------------------------------------------

/// Fire-and-continue audit writes. A failed write is logged, counted and
/// emitted as an error event; the original request is never failed or rolled
/// back by it.
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
    events: DebugEventBus,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>, events: DebugEventBus) -> Self {
        Self { store, events }
    }

    pub fn record_async(&self, record: AuditRecord) {
        let store = self.store.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let action = record.action.clone();
            let outcome = record.outcome;
            if let Err(e) = store.append(record).await {
                AUDIT_WRITE_FAILURES.inc();
                tracing::error!(error = %e, action = %action, "Failed to write audit record");
                events.emit(
                    DebugEvent::new(DebugEventType::Error, "audit_write_failed").with_detail(
                        serde_json::json!({
                            "action": action,
                            "outcome": outcome.as_str(),
                        }),
                    ),
                );
            }
        });
    }
}
