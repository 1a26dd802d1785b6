use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::models::event::DebugEventType;

/// Filters for the polling event feed.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventQuery {
    pub event_type: Option<DebugEventType>,
    pub session_id: Option<String>,
    pub correlation_id: Option<String>,
    /// Defaults to 100, capped at 500.
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TimelineQuery {
    pub session_id: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditQuery {
    /// Defaults to 50.
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RiskOverrideRequest {
    #[validate(range(min = 0, max = 100))]
    #[schema(example = 77)]
    pub value: u8,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TimeOverrideRequest {
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OverrideStateResponse {
    pub risk_override: Option<u8>,
    pub time_override: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResetResponse {
    pub overrides_cleared: bool,
    pub sessions_cleared: bool,
    pub audit_cleared: bool,
    pub events_cleared: bool,
}
