//! Integration tests for the authorization gateway pipeline: risk, policy
//! enforcement, fail-closed behavior and the one-record-per-invocation audit
//! contract.

mod common;

use axum::http::StatusCode;
use chrono::{TimeZone, Utc};
use common::{body_json, PolicyMode, TestApp, TEST_USER_ID};
use gateway_service::models::AuditOutcome;
use gateway_service::services::gateway::ActionRequest;

fn daytime() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 12, 10, 0, 0).unwrap()
}

fn action_body() -> serde_json::Value {
    serde_json::json!({
        "action": "wire_transfer",
        "resource_type": "account",
        "resource_id": "acc_001",
    })
}

#[tokio::test]
async fn test_allowed_action_returns_decision_summary() {
    let app = TestApp::spawn().await;
    let cookie = app.login().await;
    app.state.overrides.set_time_override(Some(daytime()));

    let response = app
        .post_json("/api/actions", Some(&cookie), action_body())
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["allowed"], true);
    assert_eq!(body["user_id"], TEST_USER_ID);
    // Daytime, known user agent, clean history: nothing scores.
    assert_eq!(body["risk_score"], 0);
    assert_eq!(body["risk_override_active"], false);
    assert!(body["correlation_id"].as_str().is_some());

    // Exactly one audit record for the action (plus one for the login).
    let records = app.wait_for_audit_count(2).await;
    let action = records
        .iter()
        .find(|r| r.action == "wire_transfer")
        .expect("action must be audited");
    assert_eq!(action.outcome, AuditOutcome::Success);
    assert_eq!(action.user_id.as_deref(), Some(TEST_USER_ID));
    assert_eq!(action.risk_score, Some(0));
}

#[tokio::test]
async fn test_denied_action_returns_403_with_reason() {
    let app = TestApp::spawn().await;
    let cookie = app.login().await;
    app.state.overrides.set_time_override(Some(daytime()));
    app.policy.set_mode(PolicyMode::Deny);

    let response = app
        .post_json("/api/actions", Some(&cookie), action_body())
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = body_json(response).await;
    assert!(body["reason"]
        .as_str()
        .unwrap()
        .contains("not permitted by policy"));
    assert_eq!(body["risk_score"], 0);

    let records = app.wait_for_audit_count(2).await;
    let action = records.iter().find(|r| r.action == "wire_transfer").unwrap();
    assert_eq!(action.outcome, AuditOutcome::Denied);
    assert!(action.reason.is_some());
}

#[tokio::test]
async fn test_high_risk_denial_reason_takes_precedence_over_role() {
    let app = TestApp::spawn().await;
    // VIEWER role in the minted token, risk pinned to 60.
    app.provider.set_role("VIEWER");
    let cookie = app.login().await;
    app.state.overrides.set_risk_override(Some(60));
    app.policy.set_mode(PolicyMode::Deny);

    let response = app
        .post_json("/api/actions", Some(&cookie), action_body())
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = body_json(response).await;
    let reason = body["reason"].as_str().unwrap();
    assert!(reason.contains("risk score 60"), "reason was: {}", reason);
    assert!(reason.contains("too high"));
    assert_eq!(body["risk_score"], 60);
}

#[tokio::test]
async fn test_read_only_role_denial_reason() {
    let app = TestApp::spawn().await;
    app.provider.set_role("VIEWER");
    let cookie = app.login().await;
    app.state.overrides.set_time_override(Some(daytime()));
    app.policy.set_mode(PolicyMode::Deny);

    let response = app
        .post_json("/api/actions", Some(&cookie), action_body())
        .await;
    let body = body_json(response).await;
    assert!(body["reason"].as_str().unwrap().contains("read-only"));
}

#[tokio::test]
async fn test_malformed_policy_response_fails_closed() {
    let app = TestApp::spawn().await;
    let cookie = app.login().await;
    app.state.overrides.set_time_override(Some(daytime()));
    app.policy.set_mode(PolicyMode::Malformed);

    let response = app
        .post_json("/api/actions", Some(&cookie), action_body())
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = body_json(response).await;
    assert!(body["reason"]
        .as_str()
        .unwrap()
        .contains("Policy decision unavailable"));

    // Audited as an error, not a denial, so operators can tell them apart.
    let records = app.wait_for_audit_count(2).await;
    let action = records.iter().find(|r| r.action == "wire_transfer").unwrap();
    assert_eq!(action.outcome, AuditOutcome::Error);
}

#[tokio::test]
async fn test_policy_engine_5xx_fails_closed() {
    let app = TestApp::spawn().await;
    let cookie = app.login().await;
    app.policy.set_mode(PolicyMode::ServerError);

    let response = app
        .post_json("/api/actions", Some(&cookie), action_body())
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unreachable_policy_engine_fails_closed() {
    // Point the policy client at a port nothing listens on.
    let app = TestApp::spawn_with(|config| {
        config.policy.url = "http://127.0.0.1:9/decide".to_string();
        config.policy.timeout_seconds = 1;
    })
    .await;
    let cookie = app.login().await;

    let response = app
        .post_json("/api/actions", Some(&cookie), action_body())
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let records = app.wait_for_audit_count(2).await;
    let action = records.iter().find(|r| r.action == "wire_transfer").unwrap();
    assert_eq!(action.outcome, AuditOutcome::Error);
}

#[tokio::test]
async fn test_risk_override_pins_the_score() {
    let app = TestApp::spawn().await;
    let cookie = app.login().await;
    app.state.overrides.set_risk_override(Some(77));

    let response = app
        .post_json("/api/actions", Some(&cookie), action_body())
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["risk_score"], 77);
    assert_eq!(body["risk_override_active"], true);
}

#[tokio::test]
async fn test_time_override_drives_off_hours_risk() {
    let app = TestApp::spawn().await;
    let cookie = app.login().await;
    let late = Utc.with_ymd_and_hms(2024, 6, 12, 23, 0, 0).unwrap();
    app.state.overrides.set_time_override(Some(late));

    let response = app
        .post_json("/api/actions", Some(&cookie), action_body())
        .await;
    let body = body_json(response).await;
    // User agent present, so only the off-hours factor fires.
    assert_eq!(body["risk_score"], 15);
}

#[tokio::test]
async fn test_action_without_session_is_unauthorized() {
    let app = TestApp::spawn().await;
    let response = app.post_json("/api/actions", None, action_body()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_every_invocation_audits_exactly_once() {
    let app = TestApp::spawn().await;
    let cookie = app.login().await;
    app.state.overrides.set_time_override(Some(daytime()));

    // Success, denial, error: one record each, plus the login record.
    app.post_json("/api/actions", Some(&cookie), action_body())
        .await;
    app.policy.set_mode(PolicyMode::Deny);
    app.post_json("/api/actions", Some(&cookie), action_body())
        .await;
    app.policy.set_mode(PolicyMode::Malformed);
    app.post_json("/api/actions", Some(&cookie), action_body())
        .await;

    let records = app.wait_for_audit_count(4).await;
    assert_eq!(records.len(), 4);

    let outcomes: Vec<AuditOutcome> = records
        .iter()
        .filter(|r| r.action == "wire_transfer")
        .map(|r| r.outcome)
        .collect();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.contains(&AuditOutcome::Success));
    assert!(outcomes.contains(&AuditOutcome::Denied));
    assert!(outcomes.contains(&AuditOutcome::Error));
}

#[tokio::test]
async fn test_gateway_call_with_unknown_session_audits_an_error() {
    let app = TestApp::spawn().await;

    let result = app
        .state
        .gateway
        .authorize(ActionRequest {
            session_id: "no-such-session".to_string(),
            action: "wire_transfer".to_string(),
            resource_type: "account".to_string(),
            resource_id: None,
            channel: "web".to_string(),
            source_ip: None,
            user_agent: Some("Mozilla/5.0".to_string()),
            forwarded_for: None,
            correlation_id: None,
        })
        .await;
    assert!(result.is_err());

    let records = app.wait_for_audit_count(1).await;
    assert_eq!(records[0].outcome, AuditOutcome::Error);
    assert_eq!(records[0].action, "wire_transfer");
    assert!(records[0].user_id.is_none());
}

#[tokio::test]
async fn test_failed_logins_raise_the_risk_score() {
    let app = TestApp::spawn().await;
    let cookie = app.login().await;
    app.state.overrides.set_time_override(Some(daytime()));

    // Two denied records for this user inside the window: +20.
    app.policy.set_mode(PolicyMode::Deny);
    app.post_json("/api/actions", Some(&cookie), action_body())
        .await;
    app.post_json("/api/actions", Some(&cookie), action_body())
        .await;
    app.wait_for_audit_count(3).await;

    app.policy.set_mode(PolicyMode::Allow);
    let response = app
        .post_json("/api/actions", Some(&cookie), action_body())
        .await;
    let body = body_json(response).await;
    assert_eq!(body["risk_score"], 20);
}
