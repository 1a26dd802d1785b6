//! The per-request authorization pipeline.
//!
//! resolve session -> compute risk -> query policy -> enforce -> audit.
//! Exactly one audit record per invocation regardless of outcome, written
//! fire-and-continue. Every stage emits paired request/response events so a
//! request's full lineage can be reconstructed from the debug feed alone.

use chrono::Duration;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::models::audit::{AuditContext, AuditRecord};
use crate::models::event::{DebugEvent, DebugEventType, EventDirection};
use crate::models::policy::{
    PolicyContext, PolicyDecision, PolicyDecisionInput, PolicyResource, PolicyTenant, PolicyUser,
};
use crate::models::risk::RiskAssessment;
use crate::services::audit::{AuditRecorder, AuditStore};
use crate::services::error::GatewayError;
use crate::services::events::DebugEventBus;
use crate::services::metrics::{AUTHZ_DECISIONS_TOTAL, RISK_SCORE_DISTRIBUTION};
use crate::services::overrides::OverrideControl;
use crate::services::policy::PolicyClient;
use crate::services::risk::{self, RiskSignals};
use crate::services::session_store::SessionStore;
use crate::utils::decode_access_claims;

const VELOCITY_WINDOW_SECONDS: i64 = 60;
const FAILED_ATTEMPT_WINDOW_MINUTES: i64 = 15;

const SELF_LABEL: &str = "gateway";
const POLICY_LABEL: &str = "policy-engine";
const CALLER_LABEL: &str = "caller";

/// One inbound sensitive-action request.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub session_id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub channel: String,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub forwarded_for: Option<String>,
    /// Correlation id carried across events; generated when absent.
    pub correlation_id: Option<String>,
}

/// Successful authorization, handed back to the calling action handler.
#[derive(Debug, Clone)]
pub struct AuthorizedAction {
    pub user_id: String,
    pub tenant_id: Option<String>,
    pub risk: RiskAssessment,
    pub decision: PolicyDecision,
    pub correlation_id: String,
}

/// Context accumulated while the pipeline runs, used to shape the single
/// audit record whatever the exit path.
#[derive(Debug, Default)]
struct PipelineTrace {
    user_id: Option<String>,
    tenant_id: Option<String>,
    risk: Option<RiskAssessment>,
}

#[derive(Clone)]
pub struct AuthorizationGateway {
    sessions: Arc<dyn SessionStore>,
    policy: Arc<PolicyClient>,
    audit_store: Arc<dyn AuditStore>,
    recorder: AuditRecorder,
    events: DebugEventBus,
    overrides: OverrideControl,
}

impl AuthorizationGateway {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        policy: Arc<PolicyClient>,
        audit_store: Arc<dyn AuditStore>,
        recorder: AuditRecorder,
        events: DebugEventBus,
        overrides: OverrideControl,
    ) -> Self {
        Self {
            sessions,
            policy,
            audit_store,
            recorder,
            events,
            overrides,
        }
    }

    #[tracing::instrument(skip(self, request), fields(action = %request.action, session_id = %request.session_id))]
    pub async fn authorize(
        &self,
        request: ActionRequest,
    ) -> Result<AuthorizedAction, GatewayError> {
        let correlation_id = request
            .correlation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let started = Instant::now();

        self.events.emit(
            DebugEvent::hop(
                DebugEventType::Request,
                format!("action:{}", request.action),
                EventDirection::Inbound,
                CALLER_LABEL,
                SELF_LABEL,
            )
            .with_session(&request.session_id)
            .with_correlation(&correlation_id)
            .with_detail(serde_json::json!({
                "resource_type": request.resource_type,
                "resource_id": request.resource_id,
                "channel": request.channel,
            })),
        );

        let mut trace = PipelineTrace::default();
        let result = self.run(&request, &correlation_id, &mut trace).await;

        let ctx = AuditContext {
            user_id: trace.user_id.clone(),
            tenant_id: trace.tenant_id.clone(),
            resource_type: request.resource_type.clone(),
            resource_id: request.resource_id.clone(),
            source_ip: request.source_ip.clone(),
            user_agent: request.user_agent.clone(),
        };
        let risk_score = trace.risk.as_ref().map(|r| r.score);

        // Exactly one audit record per invocation, shaped by the exit path.
        let (record, outcome_label) = match &result {
            Ok(_) => (
                AuditRecord::success(&request.action, risk_score, ctx),
                "success",
            ),
            Err(GatewayError::PolicyDenied { reason, .. }) => (
                AuditRecord::denied(&request.action, reason, risk_score, ctx),
                "denied",
            ),
            Err(other) => (
                AuditRecord::error(&request.action, &other.to_string(), ctx),
                "error",
            ),
        };
        self.recorder.record_async(record);
        AUTHZ_DECISIONS_TOTAL
            .with_label_values(&[outcome_label])
            .inc();

        self.events.emit(
            DebugEvent::hop(
                DebugEventType::Response,
                format!("action:{}", request.action),
                EventDirection::Outbound,
                SELF_LABEL,
                CALLER_LABEL,
            )
            .with_session(&request.session_id)
            .with_correlation(&correlation_id)
            .with_duration_ms(started.elapsed().as_millis() as u64)
            .with_detail(serde_json::json!({ "outcome": outcome_label })),
        );

        // Fail closed: an unanswerable policy question surfaces as a denial,
        // while the audit trail above already recorded it as an error.
        match result {
            Err(GatewayError::PolicyEvaluation(detail)) => {
                tracing::warn!(detail = %detail, action = %request.action, "Policy engine unavailable; denying");
                Err(GatewayError::PolicyDenied {
                    action: request.action.clone(),
                    reason: "Policy decision unavailable; request denied".to_string(),
                    risk_score: risk_score.unwrap_or(0),
                })
            }
            other => other,
        }
    }

    async fn run(
        &self,
        request: &ActionRequest,
        correlation_id: &str,
        trace: &mut PipelineTrace,
    ) -> Result<AuthorizedAction, GatewayError> {
        // Session -> identity/tenant.
        let session = self
            .sessions
            .load(&request.session_id)
            .await
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("Session lookup: {}", e)))?
            .ok_or(GatewayError::MissingSession)?;
        let tokens = session.tokens.as_ref().ok_or(GatewayError::Unauthenticated)?;

        let claims = decode_access_claims(&tokens.access_token).map_err(|e| {
            tracing::warn!(error = %e, "Stored access token is unreadable");
            GatewayError::Unauthenticated
        })?;
        trace.user_id = Some(claims.sub.clone());
        trace.tenant_id = session.tenant.as_ref().map(|t| t.tenant_id.clone());

        // Risk, override-aware, fed by audit history.
        let now = self.overrides.effective_now();
        let signals = RiskSignals {
            user_agent: request.user_agent.clone(),
            forwarded_for: request.forwarded_for.clone(),
            recent_success_count: self
                .history_count(
                    &claims.sub,
                    crate::models::audit::AuditOutcome::Success,
                    now - Duration::seconds(VELOCITY_WINDOW_SECONDS),
                )
                .await,
            recent_failed_count: self
                .history_count(
                    &claims.sub,
                    crate::models::audit::AuditOutcome::Denied,
                    now - Duration::minutes(FAILED_ATTEMPT_WINDOW_MINUTES),
                )
                .await,
        };
        let assessment = risk::assess(&signals, now, self.overrides.risk_override());
        trace.risk = Some(assessment.clone());
        RISK_SCORE_DISTRIBUTION.observe(f64::from(assessment.score));

        self.events.emit(
            DebugEvent::new(DebugEventType::Risk, "risk_assessed")
                .with_session(&request.session_id)
                .with_actor(&claims.sub)
                .with_correlation(correlation_id)
                .with_detail(serde_json::json!({
                    "score": assessment.score,
                    "factors": assessment.factors,
                    "override_active": assessment.override_active,
                })),
        );

        // Policy input, immutable once built.
        let new_device = signals
            .user_agent
            .as_deref()
            .map_or(true, |ua| ua.trim().is_empty());
        let input = PolicyDecisionInput {
            user: PolicyUser {
                id: claims.sub.clone(),
                role: claims.role.clone().unwrap_or_else(|| "CUSTOMER".to_string()),
            },
            tenant: session.tenant.as_ref().map(|t| PolicyTenant {
                id: t.tenant_id.clone(),
                tenant_type: t.tenant_type.clone(),
            }),
            action: request.action.clone(),
            resource: PolicyResource {
                resource_type: request.resource_type.clone(),
                id: request.resource_id.clone(),
            },
            context: PolicyContext {
                channel: request.channel.clone(),
                source_ip: request.source_ip.clone(),
                user_agent: request.user_agent.clone(),
                risk_score: assessment.score,
                new_device,
            },
        };

        self.events.emit(
            DebugEvent::hop(
                DebugEventType::Request,
                "policy_check",
                EventDirection::Outbound,
                SELF_LABEL,
                POLICY_LABEL,
            )
            .with_session(&request.session_id)
            .with_actor(&claims.sub)
            .with_correlation(correlation_id)
            .with_detail(serde_json::json!({
                "action": input.action,
                "risk_score": input.context.risk_score,
            })),
        );

        let enforced = self.policy.enforce(&input).await;

        let (decision_label, latency_ms, detail) = match &enforced {
            Ok(decision) => ("allow", decision.latency_ms, serde_json::Value::Null),
            Err(GatewayError::PolicyDenied { reason, .. }) => {
                ("deny", 0, serde_json::json!({ "reason": reason }))
            }
            Err(e) => ("error", 0, serde_json::json!({ "detail": e.to_string() })),
        };
        self.events.emit(
            DebugEvent::hop(
                DebugEventType::Response,
                "policy_check",
                EventDirection::Inbound,
                POLICY_LABEL,
                SELF_LABEL,
            )
            .with_session(&request.session_id)
            .with_actor(&claims.sub)
            .with_correlation(correlation_id)
            .with_duration_ms(latency_ms)
            .with_detail(serde_json::json!({
                "result": decision_label,
                "detail": detail,
            })),
        );

        let decision = enforced?;

        Ok(AuthorizedAction {
            user_id: claims.sub,
            tenant_id: trace.tenant_id.clone(),
            risk: assessment,
            decision,
            correlation_id: correlation_id.to_string(),
        })
    }

    /// History lookup used by the risk signals. Unavailable history degrades
    /// to zero rather than failing the request.
    async fn history_count(
        &self,
        user_id: &str,
        outcome: crate::models::audit::AuditOutcome,
        since: chrono::DateTime<chrono::Utc>,
    ) -> u32 {
        match self
            .audit_store
            .count_for_user_since(user_id, outcome, since)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, user_id, "Audit history unavailable for risk scoring");
                0
            }
        }
    }
}
