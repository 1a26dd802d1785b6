use crate::config::Environment;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use secrecy::ExposeSecret;
use serde_json::json;

/// Guards the /debug surface. Open in dev; outside dev every call must carry
/// the admin API key. None of these endpoints sit on the production
/// authorization path.
pub async fn debug_guard_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if state.config.environment == Environment::Dev {
        return next.run(request).await;
    }

    let api_key = headers
        .get("x-admin-api-key")
        .and_then(|value| value.to_str().ok());

    match api_key {
        Some(key) if key == state.config.security.admin_api_key.expose_secret() => {
            next.run(request).await
        }
        _ => {
            tracing::warn!("Rejected debug-surface call without a valid admin API key");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Unauthorized: Invalid or missing admin API key" })),
            )
                .into_response()
        }
    }
}
