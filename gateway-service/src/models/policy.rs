use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Identity of the requesting user as seen by the policy engine.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PolicyUser {
    pub id: String,
    #[schema(example = "CUSTOMER")]
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PolicyTenant {
    pub id: String,
    #[serde(rename = "type")]
    pub tenant_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PolicyResource {
    #[serde(rename = "type")]
    #[schema(example = "account")]
    pub resource_type: String,
    pub id: Option<String>,
}

/// Request context block evaluated alongside the identity fields.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PolicyContext {
    #[schema(example = "web")]
    pub channel: String,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub risk_score: u8,
    pub new_device: bool,
}

/// Canonical decision request. Immutable once built; serialized under a
/// single `input` envelope for the policy engine.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PolicyDecisionInput {
    pub user: PolicyUser,
    pub tenant: Option<PolicyTenant>,
    #[schema(example = "wire_transfer")]
    pub action: String,
    pub resource: PolicyResource,
    pub context: PolicyContext,
}

/// Normalized result of one policy call.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PolicyDecision {
    pub allow: bool,
    pub reason: Option<String>,
    pub latency_ms: u64,
    /// Set when the engine was unreachable or returned a malformed result;
    /// such a decision is always a deny.
    pub error: Option<String>,
}
