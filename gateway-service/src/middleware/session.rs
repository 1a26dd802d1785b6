use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::CookieJar;

use crate::AppState;
use service_core::error::AppError;

/// Session identity extractor: reads the opaque session id from the
/// HTTP-managed cookie. Browser-facing calls never carry bearer tokens.
pub struct SessionId(pub String);

#[axum::async_trait]
impl FromRequestParts<AppState> for SessionId {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        jar.get(&state.config.session.cookie_name)
            .map(|cookie| SessionId(cookie.value().to_string()))
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("No active session")))
    }
}
