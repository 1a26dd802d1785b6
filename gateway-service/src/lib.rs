pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use service_core::middleware::{
    metrics::metrics_middleware, rate_limit::ip_rate_limit_middleware,
    security_headers::security_headers_middleware, tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::GatewayConfig;
use crate::services::{
    AuditRecorder, AuditStore, AuthorizationGateway, BffService, DebugEventBus, OidcClient,
    OverrideControl, PolicyClient, SessionStore,
};
use service_core::error::AppError;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::bff::login,
        handlers::bff::callback,
        handlers::bff::me,
        handlers::bff::token_exchange,
        handlers::bff::logout,
        handlers::actions::submit_action,
        handlers::debug::list_events,
        handlers::debug::event_timeline,
        handlers::debug::stream_events,
        handlers::debug::list_audit,
        handlers::debug::get_overrides,
        handlers::debug::set_risk_override,
        handlers::debug::clear_risk_override,
        handlers::debug::set_time_override,
        handlers::debug::clear_time_override,
        handlers::debug::reset_state,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::auth::CurrentUserResponse,
            dtos::auth::TenantExchangeRequest,
            dtos::auth::TenantExchangeResponse,
            dtos::actions::ActionSubmission,
            dtos::actions::ActionResponse,
            dtos::debug::RiskOverrideRequest,
            dtos::debug::TimeOverrideRequest,
            dtos::debug::OverrideStateResponse,
            dtos::debug::ResetResponse,
            models::AuditRecord,
            models::AuditOutcome,
            models::DebugEvent,
            models::DebugEventType,
            models::EventDirection,
            models::RiskAssessment,
            models::PolicyDecision,
            models::PolicyDecisionInput,
            models::PolicyUser,
            models::PolicyTenant,
            models::PolicyResource,
            models::PolicyContext,
        )
    ),
    tags(
        (name = "BFF Session", description = "Browser-facing login, callback, logout and session queries"),
        (name = "Authorization", description = "Risk-adaptive authorization of sensitive actions"),
        (name = "Debug", description = "Demo observability and override surface"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    pub sessions: Arc<dyn SessionStore>,
    pub audit: Arc<dyn AuditStore>,
    pub recorder: AuditRecorder,
    pub events: DebugEventBus,
    pub overrides: OverrideControl,
    pub oidc: Arc<OidcClient>,
    pub policy: Arc<PolicyClient>,
    pub gateway: Arc<AuthorizationGateway>,
    pub bff: Arc<BffService>,
    pub login_rate_limiter: service_core::middleware::rate_limit::IpRateLimiter,
    pub ip_rate_limiter: service_core::middleware::rate_limit::IpRateLimiter,
}

impl AppState {
    /// Wire the full pipeline over the given stores.
    pub fn build(
        config: GatewayConfig,
        sessions: Arc<dyn SessionStore>,
        audit: Arc<dyn AuditStore>,
    ) -> Result<Self, AppError> {
        let events = DebugEventBus::new(config.events.buffer_capacity);
        let overrides = OverrideControl::new();
        let recorder = AuditRecorder::new(audit.clone(), events.clone());

        let oidc = Arc::new(OidcClient::new(config.provider.clone()).map_err(AppError::from)?);
        let policy = Arc::new(PolicyClient::new(&config.policy).map_err(AppError::from)?);

        let gateway = Arc::new(AuthorizationGateway::new(
            sessions.clone(),
            policy.clone(),
            audit.clone(),
            recorder.clone(),
            events.clone(),
            overrides.clone(),
        ));
        let bff = Arc::new(BffService::new(
            sessions.clone(),
            oidc.clone(),
            events.clone(),
            recorder.clone(),
            config.clone(),
        ));

        let login_rate_limiter = service_core::middleware::rate_limit::create_ip_rate_limiter(
            config.rate_limit.login_attempts,
            config.rate_limit.login_window_seconds,
        );
        let ip_rate_limiter = service_core::middleware::rate_limit::create_ip_rate_limiter(
            config.rate_limit.global_ip_limit,
            config.rate_limit.global_ip_window_seconds,
        );

        Ok(Self {
            config,
            sessions,
            audit,
            recorder,
            events,
            overrides,
            oidc,
            policy,
            gateway,
            bff,
            login_rate_limiter,
            ip_rate_limiter,
        })
    }
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Login initiation gets its own, tighter limiter.
    let login_limiter = state.login_rate_limiter.clone();
    let login_route = Router::new()
        .route("/bff/login", get(handlers::bff::login))
        .layer(from_fn_with_state(login_limiter, ip_rate_limit_middleware));

    // Debug surface: demo tooling, admin-key guarded outside dev.
    let debug_routes = Router::new()
        .route("/debug/events", get(handlers::debug::list_events))
        .route(
            "/debug/events/timeline",
            get(handlers::debug::event_timeline),
        )
        .route("/debug/events/stream", get(handlers::debug::stream_events))
        .route("/debug/audit", get(handlers::debug::list_audit))
        .route("/debug/overrides", get(handlers::debug::get_overrides))
        .route(
            "/debug/overrides/risk",
            put(handlers::debug::set_risk_override).delete(handlers::debug::clear_risk_override),
        )
        .route(
            "/debug/overrides/time",
            put(handlers::debug::set_time_override).delete(handlers::debug::clear_time_override),
        )
        .route("/debug/reset", post(handlers::debug::reset_state))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::debug_guard_middleware,
        ));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics));

    let swagger_enabled = match state.config.environment {
        config::Environment::Dev => true,
        config::Environment::Prod => state.config.swagger.enabled == config::SwaggerMode::Public,
    };

    if swagger_enabled {
        app =
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { service_core::axum::Json(ApiDoc::openapi()) }),
        );
    }

    let mut app = app
        .route("/bff/callback", get(handlers::bff::callback))
        .route("/bff/logout", get(handlers::bff::logout))
        .route("/bff/me", get(handlers::bff::me))
        .route("/bff/token-exchange", post(handlers::bff::token_exchange))
        .route("/api/actions", post(handlers::actions::submit_action))
        .merge(login_route);

    if state.config.security.debug_surface_enabled {
        app = app.merge(debug_routes);
    }

    let ip_limiter = state.ip_rate_limiter.clone();
    let app = app
        .with_state(state.clone())
        // Global IP rate limiting
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        // Request metrics
        .layer(from_fn(metrics_middleware))
        // Tracing span per request
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        // Correlation id propagation
        .layer(from_fn(request_id_middleware))
        // Security headers
        .layer(from_fn(security_headers_middleware))
        // CORS from config
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .map(|o| {
                            o.parse::<service_core::axum::http::HeaderValue>()
                                .unwrap_or_else(|e| {
                                    tracing::error!(
                                        "Invalid CORS origin '{}': {}. Using fallback.",
                                        o,
                                        e
                                    );
                                    service_core::axum::http::HeaderValue::from_static("*")
                                })
                        })
                        .collect::<Vec<service_core::axum::http::HeaderValue>>(),
                )
                .allow_credentials(true)
                .allow_methods([
                    service_core::axum::http::Method::GET,
                    service_core::axum::http::Method::POST,
                    service_core::axum::http::Method::PUT,
                    service_core::axum::http::Method::DELETE,
                    service_core::axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    service_core::axum::http::header::CONTENT_TYPE,
                    service_core::axum::http::header::HeaderName::from_static("x-admin-api-key"),
                    service_core::axum::http::header::HeaderName::from_static("x-request-id"),
                ]),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 500, description = "Audit store is unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    service_core::axum::extract::State(state): service_core::axum::extract::State<AppState>,
) -> Result<service_core::axum::Json<serde_json::Value>, AppError> {
    state.audit.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Audit store health check failed");
        AppError::from(e)
    })?;

    Ok(service_core::axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "audit_store": "up",
            "active_sessions": state.sessions.active_count().await,
            "buffered_events": state.events.len(),
        }
    })))
}
