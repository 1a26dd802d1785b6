//! Demo sensitive-action endpoint.
//!
//! The integration seam the banking UI calls for anything that needs an
//! authorization decision; it drives the full gateway pipeline and returns
//! the decision summary.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    Extension, Json,
};

use crate::dtos::actions::{ActionResponse, ActionSubmission};
use crate::middleware::SessionId;
use crate::services::gateway::ActionRequest;
use crate::utils::ValidatedJson;
use crate::AppState;
use service_core::error::AppError;
use service_core::middleware::tracing::RequestId;

/// Submit a sensitive banking action for authorization.
#[utoipa::path(
    post,
    path = "/api/actions",
    request_body = ActionSubmission,
    responses(
        (status = 200, description = "Action allowed", body = ActionResponse),
        (status = 401, description = "No session or not authenticated", body = ErrorResponse),
        (status = 403, description = "Denied by policy; body carries reason and risk score", body = ErrorResponse)
    ),
    tag = "Authorization"
)]
pub async fn submit_action(
    State(state): State<AppState>,
    SessionId(session_id): SessionId,
    request_id: Option<Extension<RequestId>>,
    headers: HeaderMap,
    ValidatedJson(submission): ValidatedJson<ActionSubmission>,
) -> Result<Json<ActionResponse>, AppError> {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let forwarded_for = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let source_ip = forwarded_for
        .as_deref()
        .and_then(|chain| chain.split(',').next())
        .map(|hop| hop.trim().to_string());

    let action = submission.action.clone();
    let authorized = state
        .gateway
        .authorize(ActionRequest {
            session_id,
            action: submission.action,
            resource_type: submission.resource_type,
            resource_id: submission.resource_id,
            channel: submission.channel.unwrap_or_else(|| "web".to_string()),
            source_ip,
            user_agent,
            forwarded_for,
            correlation_id: request_id.map(|Extension(RequestId(id))| id),
        })
        .await?;

    Ok(Json(ActionResponse {
        allowed: true,
        action,
        user_id: authorized.user_id,
        tenant_id: authorized.tenant_id,
        risk_score: authorized.risk.score,
        risk_override_active: authorized.risk.override_active,
        policy_latency_ms: authorized.decision.latency_ms,
        correlation_id: authorized.correlation_id,
    }))
}
