use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Discriminator for debug events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DebugEventType {
    Authentication,
    Token,
    Policy,
    Risk,
    Audit,
    Request,
    Response,
    Error,
}

impl DebugEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebugEventType::Authentication => "authentication",
            DebugEventType::Token => "token",
            DebugEventType::Policy => "policy",
            DebugEventType::Risk => "risk",
            DebugEventType::Audit => "audit",
            DebugEventType::Request => "request",
            DebugEventType::Response => "response",
            DebugEventType::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventDirection {
    Inbound,
    Outbound,
}

/// One observability event. Ephemeral: ring-buffered and fanned out to live
/// subscribers, never written to durable storage.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DebugEvent {
    pub event_type: DebugEventType,
    #[schema(example = "policy_check")]
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<EventDirection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[schema(value_type = Object)]
    pub detail: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl DebugEvent {
    pub fn new(event_type: DebugEventType, action: impl Into<String>) -> Self {
        Self {
            event_type,
            action: action.into(),
            session_id: None,
            actor: None,
            correlation_id: None,
            direction: None,
            source: None,
            destination: None,
            duration_ms: None,
            detail: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// A paired request/response hop between two components, used to
    /// reconstruct full request lineage.
    pub fn hop(
        event_type: DebugEventType,
        action: impl Into<String>,
        direction: EventDirection,
        source: &str,
        destination: &str,
    ) -> Self {
        let mut event = Self::new(event_type, action);
        event.direction = Some(direction);
        event.source = Some(source.to_string());
        event.destination = Some(destination.to_string());
        event
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}
