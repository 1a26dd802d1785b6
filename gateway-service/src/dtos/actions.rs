use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// One sensitive banking action submitted for authorization.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ActionSubmission {
    #[validate(length(min = 1, max = 128))]
    #[schema(example = "wire_transfer")]
    pub action: String,
    #[validate(length(min = 1, max = 128))]
    #[schema(example = "account")]
    pub resource_type: String,
    pub resource_id: Option<String>,
    /// Defaults to "web".
    pub channel: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    pub allowed: bool,
    pub action: String,
    pub user_id: String,
    pub tenant_id: Option<String>,
    pub risk_score: u8,
    pub risk_override_active: bool,
    pub policy_latency_ms: u64,
    pub correlation_id: String,
}
