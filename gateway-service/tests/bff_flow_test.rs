//! Integration tests for the BFF session flow: login initiation, callback
//! validation, current-user reads, tenant token exchange and logout.

mod common;

use axum::http::{header, StatusCode};
use common::{body_json, extract_cookie, header_value, TestApp, COOKIE_NAME, TEST_USER_ID};
use std::sync::atomic::Ordering;

#[tokio::test]
async fn test_login_redirect_carries_state_and_pkce_challenge() {
    let app = TestApp::spawn().await;

    let response = app.get("/bff/login", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let location = header_value(&response, header::LOCATION);
    assert!(location.contains("/authorize?"));
    assert!(location.contains("client_id=bank-web"));
    assert!(location.contains("response_type=code"));
    assert!(location.contains("state="));
    assert!(location.contains("code_challenge="));
    assert!(location.contains("code_challenge_method=S256"));

    let cookie = extract_cookie(&response).expect("session cookie must be set");
    assert!(!cookie.is_empty());

    let set_cookie = header_value(&response, header::SET_COOKIE);
    assert!(set_cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn test_full_login_flow_keeps_tokens_server_side() {
    let app = TestApp::spawn().await;
    let cookie = app.login().await;

    // Tokens live in the session store, never in the browser-visible response.
    let session = app
        .state
        .sessions
        .load(&cookie)
        .await
        .unwrap()
        .expect("session must exist");
    assert!(session.is_authenticated());
    // Both single-use artifacts are spent.
    assert!(session.csrf_state.is_none());
    assert!(session.pkce_verifier.is_none());

    let response = app.get("/bff/me", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user_id"], TEST_USER_ID);
    assert_eq!(body["role"], "CUSTOMER");
    assert!(body.get("access_token").is_none());
}

#[tokio::test]
async fn test_callback_with_mismatched_state_is_rejected() {
    let app = TestApp::spawn().await;
    let (cookie, _state, _) = app.begin_login().await;

    let response = app
        .get("/bff/callback?code=test-code&state=wrong", Some(&cookie))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(header_value(&response, header::LOCATION).starts_with("/login-error"));

    // No token request was made and the verifier is spent either way.
    assert_eq!(app.provider.token_calls.load(Ordering::SeqCst), 0);
    let session = app.state.sessions.load(&cookie).await.unwrap().unwrap();
    assert!(session.pkce_verifier.is_none());
    assert!(session.csrf_state.is_none());
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn test_callback_without_prior_login_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app.get("/bff/callback?code=x&state=y", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(header_value(&response, header::LOCATION).starts_with("/login-error"));
    assert_eq!(app.provider.token_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_replayed_callback_fails_after_success() {
    let app = TestApp::spawn().await;
    let (cookie, state, _) = app.begin_login().await;

    let uri = format!("/bff/callback?code=test-code&state={}", state);
    let first = app.get(&uri, Some(&cookie)).await;
    assert_eq!(header_value(&first, header::LOCATION), "/");

    // Same state again: the saved state was consumed, so this is a mismatch.
    let replay = app.get(&uri, Some(&cookie)).await;
    assert!(header_value(&replay, header::LOCATION).starts_with("/login-error"));
    assert_eq!(app.provider.token_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_provider_error_short_circuits_without_token_request() {
    let app = TestApp::spawn().await;
    let (cookie, _state, _) = app.begin_login().await;

    let response = app
        .get("/bff/callback?error=access_denied", Some(&cookie))
        .await;
    assert!(header_value(&response, header::LOCATION).starts_with("/login-error"));
    assert_eq!(app.provider.token_calls.load(Ordering::SeqCst), 0);

    let session = app.state.sessions.load(&cookie).await.unwrap().unwrap();
    assert!(session.pkce_verifier.is_none());
}

#[tokio::test]
async fn test_me_without_session_is_unauthorized() {
    let app = TestApp::spawn().await;

    let response = app.get("/bff/me", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // A session that never finished the flow is equally unauthenticated.
    let (cookie, _, _) = app.begin_login().await;
    let response = app.get("/bff/me", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_without_session_goes_straight_to_logged_out_page() {
    let app = TestApp::spawn().await;

    let response = app.get("/bff/logout", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(header_value(&response, header::LOCATION), "/logged-out");
    assert_eq!(app.provider.revoke_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_logout_revokes_and_clears_the_session() {
    let app = TestApp::spawn().await;
    let cookie = app.login().await;

    let response = app.get("/bff/logout", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let location = header_value(&response, header::LOCATION);
    assert!(location.contains("/logout?"));
    assert!(location.contains("id_token_hint=mock-id-token"));
    assert!(location.contains("post_logout_redirect_uri="));

    assert_eq!(app.provider.revoke_calls.load(Ordering::SeqCst), 1);

    // Session destroyed; the old cookie no longer authenticates.
    let response = app.get("/bff/me", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let app = TestApp::spawn().await;
    let cookie = app.login().await;

    app.get("/bff/logout", Some(&cookie)).await;
    let again = app.get("/bff/logout", Some(&cookie)).await;
    assert_eq!(header_value(&again, header::LOCATION), "/logged-out");
    assert_eq!(app.provider.revoke_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_token_exchange_scopes_session_to_tenant() {
    let app = TestApp::spawn().await;
    let cookie = app.login().await;

    let response = app
        .post_json(
            "/bff/token-exchange",
            Some(&cookie),
            serde_json::json!({ "tenant_id": "tenant_retail_01", "tenant_type": "retail" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["tenant_id"], "tenant_retail_01");
    assert_eq!(body["downscoped"], true);

    let me = body_json(app.get("/bff/me", Some(&cookie)).await).await;
    assert_eq!(me["tenant_id"], "tenant_retail_01");
}

#[tokio::test]
async fn test_token_exchange_falls_back_to_original_token() {
    let app = TestApp::spawn().await;
    let cookie = app.login().await;
    app.provider.fail_token_exchange.store(true, Ordering::SeqCst);

    let response = app
        .post_json(
            "/bff/token-exchange",
            Some(&cookie),
            serde_json::json!({ "tenant_id": "tenant_retail_01", "tenant_type": "retail" }),
        )
        .await;

    // Availability over strictness: the call succeeds on the original token.
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["downscoped"], false);

    let session = app.state.sessions.load(&cookie).await.unwrap().unwrap();
    assert_eq!(
        session.tenant.as_ref().map(|t| t.tenant_id.as_str()),
        Some("tenant_retail_01")
    );
}

#[tokio::test]
async fn test_token_exchange_strict_mode_surfaces_provider_failure() {
    let app = TestApp::spawn_with(|config| {
        config.security.strict_token_exchange = true;
    })
    .await;
    let cookie = app.login().await;
    app.provider.fail_token_exchange.store(true, Ordering::SeqCst);

    let response = app
        .post_json(
            "/bff/token-exchange",
            Some(&cookie),
            serde_json::json!({ "tenant_id": "tenant_retail_01", "tenant_type": "retail" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    // No tenant was attached.
    let session = app.state.sessions.load(&cookie).await.unwrap().unwrap();
    assert!(session.tenant.is_none());
}

#[tokio::test]
async fn test_login_audits_success_with_actor() {
    let app = TestApp::spawn().await;
    app.login().await;

    let records = app.wait_for_audit_count(1).await;
    let login = records
        .iter()
        .find(|r| r.action == "login")
        .expect("login must be audited");
    assert_eq!(login.user_id.as_deref(), Some(TEST_USER_ID));
    assert_eq!(login.outcome, gateway_service::models::AuditOutcome::Success);
}

#[tokio::test]
async fn test_cookie_name_matches_config() {
    let app = TestApp::spawn().await;
    let response = app.get("/bff/login", None).await;
    let set_cookie = header_value(&response, header::SET_COOKIE);
    assert!(set_cookie.starts_with(COOKIE_NAME));
}
