//! Test helpers for gateway-service integration tests.
//!
//! Spawns stub identity-provider and policy-engine servers on ephemeral
//! ports and builds the gateway router over in-memory stores, so the whole
//! pipeline can be driven without external services.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, Response, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Form, Json, Router};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use secrecy::Secret;
use tower::util::ServiceExt;

use gateway_service::config::{
    DatabaseConfig, Environment, EventBusConfig, GatewayConfig, PolicyEngineConfig, ProviderConfig,
    RateLimitConfig, SecurityConfig, SessionConfig, SwaggerConfig, SwaggerMode,
};
use gateway_service::services::{InMemorySessionStore, MemoryAuditStore};
use gateway_service::{build_router, AppState};

pub const TEST_ADMIN_API_KEY: &str = "test-admin-key-12345";
pub const TEST_USER_ID: &str = "usr_demo";
pub const COOKIE_NAME: &str = "bank_session";

/// Build an unsigned JWT whose payload carries the given claims. The gateway
/// only ever reads the payload locally, so the signature is a placeholder.
pub fn make_access_token(sub: &str, role: &str) -> String {
    let payload = serde_json::json!({
        "sub": sub,
        "email": format!("{}@example.com", sub),
        "name": "Demo User",
        "role": role,
        "exp": 9_999_999_999i64,
    });
    let encoded = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("eyJhbGciOiJSUzI1NiJ9.{}.sig", encoded)
}

// ----------------------------------------------------------------------------
// Stub identity provider
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct ProviderState {
    pub token_calls: AtomicUsize,
    pub revoke_calls: AtomicUsize,
    /// Fail the token-exchange grant only (authorization_code keeps working).
    pub fail_token_exchange: AtomicBool,
    /// Role claim minted into issued access tokens.
    pub role: Mutex<String>,
}

impl ProviderState {
    fn new() -> Self {
        Self {
            role: Mutex::new("CUSTOMER".to_string()),
            ..Default::default()
        }
    }

    pub fn set_role(&self, role: &str) {
        *self.role.lock().unwrap() = role.to_string();
    }
}

async fn provider_token(
    State(state): State<Arc<ProviderState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response<Body> {
    state.token_calls.fetch_add(1, Ordering::SeqCst);

    let grant_type = form.get("grant_type").map(String::as_str).unwrap_or("");
    if grant_type.contains("token-exchange") && state.fail_token_exchange.load(Ordering::SeqCst) {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "invalid_grant" })),
        )
            .into_response();
    }

    let role = state.role.lock().unwrap().clone();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "access_token": make_access_token(TEST_USER_ID, &role),
            "refresh_token": "mock-refresh-token",
            "id_token": "mock-id-token",
            "token_type": "Bearer",
            "expires_in": 300,
        })),
    )
        .into_response()
}

async fn provider_revoke(State(state): State<Arc<ProviderState>>) -> StatusCode {
    state.revoke_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

// ----------------------------------------------------------------------------
// Stub policy engine
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyMode {
    Allow,
    Deny,
    Malformed,
    ServerError,
}

pub struct PolicyState {
    pub mode: Mutex<PolicyMode>,
    pub calls: AtomicUsize,
}

impl PolicyState {
    pub fn set_mode(&self, mode: PolicyMode) {
        *self.mode.lock().unwrap() = mode;
    }
}

async fn policy_decide(State(state): State<Arc<PolicyState>>) -> Response<Body> {
    state.calls.fetch_add(1, Ordering::SeqCst);
    let mode = *state.mode.lock().unwrap();
    match mode {
        PolicyMode::Allow => {
            Json(serde_json::json!({ "result": { "allow": true } })).into_response()
        }
        PolicyMode::Deny => {
            Json(serde_json::json!({ "result": { "allow": false } })).into_response()
        }
        PolicyMode::Malformed => Json(serde_json::json!({ "result": "yes" })).into_response(),
        PolicyMode::ServerError => {
            (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
        }
    }
}

async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub server");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

// ----------------------------------------------------------------------------
// Test application
// ----------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub provider: Arc<ProviderState>,
    pub policy: Arc<PolicyState>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawn with a config customizer (strict mode, prod environment, ...).
    pub async fn spawn_with<F>(customize: F) -> Self
    where
        F: FnOnce(&mut GatewayConfig),
    {
        let provider = Arc::new(ProviderState::new());
        let provider_router = Router::new()
            .route("/token", post(provider_token))
            .route("/revoke", post(provider_revoke))
            .with_state(provider.clone());
        let provider_addr = spawn_server(provider_router).await;

        let policy = Arc::new(PolicyState {
            mode: Mutex::new(PolicyMode::Allow),
            calls: AtomicUsize::new(0),
        });
        let policy_router = Router::new()
            .route("/v1/data/banking/authz", post(policy_decide))
            .with_state(policy.clone());
        let policy_addr = spawn_server(policy_router).await;

        let mut config = test_config(provider_addr, policy_addr);
        customize(&mut config);

        let sessions = Arc::new(InMemorySessionStore::new(config.session.ttl_minutes));
        let audit = Arc::new(MemoryAuditStore::new());
        let state =
            AppState::build(config, sessions, audit).expect("Failed to build test app state");
        let router = build_router(state.clone())
            .await
            .expect("Failed to build test router");

        TestApp {
            router,
            state,
            provider,
            policy,
        }
    }

    /// Drive GET /bff/login; returns (session cookie value, provider state
    /// param, full authorize URL).
    pub async fn begin_login(&self) -> (String, String, String) {
        let response = self.get("/bff/login", None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let cookie = extract_cookie(&response).expect("login must set the session cookie");
        let location = header_value(&response, header::LOCATION);
        let query = location
            .split_once('?')
            .map(|(_, q)| q)
            .expect("authorize URL must carry a query");
        let params: HashMap<String, String> =
            serde_urlencoded::from_str(query).expect("authorize query must parse");

        (cookie, params["state"].clone(), location)
    }

    /// Full login: initiation plus callback. Returns the session cookie.
    pub async fn login(&self) -> String {
        let (cookie, state, _) = self.begin_login().await;
        let uri = format!("/bff/callback?code=test-code&state={}", state);
        let response = self.get(&uri, Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(header_value(&response, header::LOCATION), "/");
        cookie
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, format!("{}={}", COOKIE_NAME, cookie));
        }
        self.router
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    pub async fn post_json(
        &self,
        uri: &str,
        cookie: Option<&str>,
        body: serde_json::Value,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, "Mozilla/5.0 (test)");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, format!("{}={}", COOKIE_NAME, cookie));
        }
        self.router
            .clone()
            .oneshot(builder.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap()
    }

    pub async fn put_json(
        &self,
        uri: &str,
        body: serde_json::Value,
    ) -> Response<Body> {
        let request = Request::builder()
            .method("PUT")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Wait until at least `count` audit records exist (writes are spawned).
    pub async fn wait_for_audit_count(&self, count: usize) -> Vec<gateway_service::models::AuditRecord> {
        for _ in 0..50 {
            let records = self.state.audit.recent(1000).await.unwrap();
            if records.len() >= count {
                return records;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        let records = self.state.audit.recent(1000).await.unwrap();
        panic!(
            "Timed out waiting for {} audit records (have {})",
            count,
            records.len()
        );
    }
}

fn test_config(provider_addr: SocketAddr, policy_addr: SocketAddr) -> GatewayConfig {
    let provider_base = format!("http://{}", provider_addr);
    GatewayConfig {
        common: service_core::config::Config { port: 0 },
        environment: Environment::Dev,
        service_name: "gateway-service-test".to_string(),
        service_version: "0.1.0".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        provider: ProviderConfig {
            authorize_url: format!("{}/authorize", provider_base),
            token_url: format!("{}/token", provider_base),
            revoke_url: format!("{}/revoke", provider_base),
            logout_url: format!("{}/logout", provider_base),
            client_id: "bank-web".to_string(),
            client_secret: Some(Secret::new("test-secret".to_string())),
            redirect_uri: "http://localhost:8080/bff/callback".to_string(),
            scope: "openid profile email".to_string(),
            timeout_seconds: 5,
            post_login_url: "/".to_string(),
            login_error_url: "/login-error".to_string(),
            logged_out_url: "/logged-out".to_string(),
        },
        policy: PolicyEngineConfig {
            url: format!("http://{}/v1/data/banking/authz", policy_addr),
            timeout_seconds: 5,
        },
        session: SessionConfig {
            cookie_name: COOKIE_NAME.to_string(),
            cookie_secure: false,
            ttl_minutes: 60,
        },
        events: EventBusConfig {
            buffer_capacity: 1000,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            admin_api_key: Secret::new(TEST_ADMIN_API_KEY.to_string()),
            strict_token_exchange: false,
            debug_surface_enabled: true,
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
        rate_limit: RateLimitConfig {
            login_attempts: 1000,
            login_window_seconds: 60,
            global_ip_limit: 10_000,
            global_ip_window_seconds: 60,
        },
    }
}

pub fn header_value(response: &Response<Body>, name: header::HeaderName) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Pull the session cookie value out of a Set-Cookie header.
pub fn extract_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(COOKIE_NAME))
        .and_then(|v| {
            v.split(';')
                .next()
                .and_then(|pair| pair.split_once('='))
                .map(|(_, value)| value.to_string())
        })
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = http_body_util::BodyExt::collect(response.into_body())
        .await
        .unwrap()
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
}
