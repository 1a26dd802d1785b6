//! Policy engine client.
//!
//! Ships the canonical decision input under an `input` envelope and
//! normalizes whatever comes back into allow/deny. Anything other than an
//! explicit allow - transport failure, non-2xx, malformed body - is a deny.

use reqwest::Client;
use serde_json::Value;
use std::time::Instant;

use crate::config::PolicyEngineConfig;
use crate::models::policy::{PolicyDecision, PolicyDecisionInput};
use crate::services::error::GatewayError;
use crate::services::metrics::POLICY_EVAL_DURATION;
use service_core::observability::TracedClientExt;

/// Risk at or above this level takes precedence in the denial reason.
pub const HIGH_RISK_THRESHOLD: u8 = 50;

const READ_ONLY_ROLES: &[&str] = &["viewer", "auditor"];

pub struct PolicyClient {
    http: Client,
    url: String,
}

impl PolicyClient {
    pub fn new(config: &PolicyEngineConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("HTTP client: {}", e)))?;
        Ok(Self {
            http,
            url: config.url.clone(),
        })
    }

    /// One decision call. Never errors: failures come back as a deny with
    /// the `error` field set so audit can distinguish "denied" from
    /// "unreachable".
    #[tracing::instrument(skip(self, input), fields(action = %input.action, risk = input.context.risk_score))]
    pub async fn check(&self, input: &PolicyDecisionInput) -> PolicyDecision {
        let started = Instant::now();
        let body = serde_json::json!({ "input": input });

        let outcome = self.http.traced_post(&self.url).json(&body).send().await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let decision = match outcome {
            Ok(response) if response.status().is_success() => {
                match response.json::<Value>().await {
                    Ok(value) => match parse_allow(&value) {
                        Some(allow) => PolicyDecision {
                            allow,
                            reason: None,
                            latency_ms,
                            error: None,
                        },
                        None => deny_with_error(latency_ms, "Malformed policy response"),
                    },
                    Err(e) => {
                        deny_with_error(latency_ms, &format!("Unreadable policy response: {}", e))
                    }
                }
            }
            Ok(response) => deny_with_error(
                latency_ms,
                &format!("Policy engine returned status {}", response.status()),
            ),
            Err(e) => deny_with_error(latency_ms, &format!("Policy engine unreachable: {}", e)),
        };

        let result_label = if decision.error.is_some() {
            "error"
        } else if decision.allow {
            "allow"
        } else {
            "deny"
        };
        POLICY_EVAL_DURATION
            .with_label_values(&[result_label])
            .observe(started.elapsed().as_secs_f64());

        decision
    }

    /// Check and enforce. A deny becomes a typed `PolicyDenied` carrying the
    /// synthesized reason and risk score; an engine failure becomes
    /// `PolicyEvaluation` for the gateway to fail closed on.
    pub async fn enforce(
        &self,
        input: &PolicyDecisionInput,
    ) -> Result<PolicyDecision, GatewayError> {
        let decision = self.check(input).await;

        if let Some(detail) = &decision.error {
            return Err(GatewayError::PolicyEvaluation(detail.clone()));
        }

        if decision.allow {
            Ok(decision)
        } else {
            Err(GatewayError::PolicyDenied {
                action: input.action.clone(),
                reason: denial_reason(input),
                risk_score: input.context.risk_score,
            })
        }
    }
}

/// Interpret the engine's result shape: either a bare boolean `result` or an
/// object containing `allow` (top-level `allow` also accepted).
fn parse_allow(value: &Value) -> Option<bool> {
    match value.get("result") {
        Some(Value::Bool(allow)) => Some(*allow),
        Some(Value::Object(map)) => map.get("allow").and_then(Value::as_bool),
        _ => value.get("allow").and_then(Value::as_bool),
    }
}

fn deny_with_error(latency_ms: u64, detail: &str) -> PolicyDecision {
    PolicyDecision {
        allow: false,
        reason: None,
        latency_ms,
        error: Some(detail.to_string()),
    }
}

/// Human-readable denial reason. The high-risk message takes precedence over
/// the role-based one.
pub fn denial_reason(input: &PolicyDecisionInput) -> String {
    if input.context.risk_score >= HIGH_RISK_THRESHOLD {
        return format!(
            "Request risk score {} is too high for '{}'",
            input.context.risk_score, input.action
        );
    }

    let role = input.user.role.to_lowercase();
    if READ_ONLY_ROLES.contains(&role.as_str()) {
        return format!("Role '{}' has read-only access", input.user.role);
    }

    format!("Action '{}' is not permitted by policy", input.action)
}
