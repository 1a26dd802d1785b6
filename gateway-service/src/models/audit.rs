use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Outcome of one authorization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Denied,
    Error,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Denied => "denied",
            AuditOutcome::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(AuditOutcome::Success),
            "denied" => Some(AuditOutcome::Denied),
            "error" => Some(AuditOutcome::Error),
            _ => None,
        }
    }
}

/// Append-only record of one authorization outcome. Never mutated or deleted
/// outside the administrative reset.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditRecord {
    pub id: Uuid,
    #[schema(example = "usr_9f2c")]
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    #[schema(example = "wire_transfer")]
    pub action: String,
    #[schema(example = "account")]
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub outcome: AuditOutcome,
    pub reason: Option<String>,
    pub risk_score: Option<u8>,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub created_utc: DateTime<Utc>,
}

/// Actor/resource/network context shared by the outcome constructors.
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditRecord {
    fn base(action: &str, outcome: AuditOutcome, ctx: AuditContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: ctx.user_id,
            tenant_id: ctx.tenant_id,
            action: action.to_string(),
            resource_type: ctx.resource_type,
            resource_id: ctx.resource_id,
            outcome,
            reason: None,
            risk_score: None,
            source_ip: ctx.source_ip,
            user_agent: ctx.user_agent,
            metadata: serde_json::Value::Object(Default::default()),
            created_utc: Utc::now(),
        }
    }

    pub fn success(action: &str, risk_score: Option<u8>, ctx: AuditContext) -> Self {
        let mut record = Self::base(action, AuditOutcome::Success, ctx);
        record.risk_score = risk_score;
        record
    }

    pub fn denied(action: &str, reason: &str, risk_score: Option<u8>, ctx: AuditContext) -> Self {
        let mut record = Self::base(action, AuditOutcome::Denied, ctx);
        record.reason = Some(reason.to_string());
        record.risk_score = risk_score;
        record
    }

    pub fn error(action: &str, detail: &str, ctx: AuditContext) -> Self {
        let mut record = Self::base(action, AuditOutcome::Error, ctx);
        record.reason = Some(detail.to_string());
        record
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
