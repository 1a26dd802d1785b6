//! Browser-facing BFF endpoints.
//!
//! Thin wrappers over `BffService`: cookie management and redirects happen
//! here, the state machine lives in the service. All responses are either
//! 303 redirects or JSON; tokens never appear in either.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::dtos::auth::{CallbackParams, TenantExchangeRequest};
use crate::middleware::SessionId;
use crate::utils::ValidatedJson;
use crate::AppState;
use service_core::error::AppError;

fn session_cookie(state: &AppState, session_id: &str) -> Cookie<'static> {
    Cookie::build((state.config.session.cookie_name.clone(), session_id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.session.cookie_secure)
        .build()
}

fn expired_session_cookie(state: &AppState) -> Cookie<'static> {
    Cookie::build((state.config.session.cookie_name.clone(), String::new()))
        .path("/")
        .build()
}

/// Start the login flow: redirect to the identity provider.
#[utoipa::path(
    get,
    path = "/bff/login",
    responses(
        (status = 303, description = "Redirect to the identity provider's authorization endpoint"),
        (status = 429, description = "Too many login attempts", body = ErrorResponse)
    ),
    tag = "BFF Session"
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let existing = jar
        .get(&state.config.session.cookie_name)
        .map(|cookie| cookie.value().to_string());

    let redirect = state.bff.begin_login(existing).await?;
    let jar = jar.add(session_cookie(&state, &redirect.session_id));

    Ok((jar, Redirect::to(&redirect.authorize_url)))
}

/// Provider callback: complete the code-for-token exchange.
#[utoipa::path(
    get,
    path = "/bff/callback",
    responses(
        (status = 303, description = "Redirect to the post-login page, or to the login-error page on any terminal failure")
    ),
    tag = "BFF Session"
)]
pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    let session_id = jar
        .get(&state.config.session.cookie_name)
        .map(|cookie| cookie.value().to_string());

    match state
        .bff
        .complete_callback(session_id.as_deref(), params)
        .await
    {
        Ok(redirect_url) => Redirect::to(&redirect_url),
        Err(e) => {
            // Terminal for the in-flight flow; the browser gets a generic
            // error page, never the provider's error text.
            tracing::warn!(error = %e, "Login callback failed");
            let target = format!("{}?error=login_failed", state.config.provider.login_error_url);
            Redirect::to(&target)
        }
    }
}

/// Current user, read locally from the stored access token.
#[utoipa::path(
    get,
    path = "/bff/me",
    responses(
        (status = 200, description = "Current user claims", body = CurrentUserResponse),
        (status = 401, description = "No session or no tokens", body = ErrorResponse)
    ),
    tag = "BFF Session"
)]
pub async fn me(
    State(state): State<AppState>,
    SessionId(session_id): SessionId,
) -> Result<impl IntoResponse, AppError> {
    let user = state.bff.current_user(&session_id).await?;
    Ok(Json(user))
}

/// Scope the session to a tenant via the provider's token-exchange grant.
#[utoipa::path(
    post,
    path = "/bff/token-exchange",
    request_body = TenantExchangeRequest,
    responses(
        (status = 200, description = "Session scoped to the tenant", body = TenantExchangeResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 502, description = "Provider failure in strict mode", body = ErrorResponse)
    ),
    tag = "BFF Session"
)]
pub async fn token_exchange(
    State(state): State<AppState>,
    SessionId(session_id): SessionId,
    ValidatedJson(request): ValidatedJson<TenantExchangeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.bff.exchange_tenant(&session_id, request).await?;
    Ok(Json(response))
}

/// Log out: best-effort token revocation, then clear the session.
#[utoipa::path(
    get,
    path = "/bff/logout",
    responses(
        (status = 303, description = "Redirect to the provider logout endpoint, or straight to the logged-out page when no session exists")
    ),
    tag = "BFF Session"
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let session_id = jar
        .get(&state.config.session.cookie_name)
        .map(|cookie| cookie.value().to_string());

    let redirect_url = state.bff.logout(session_id.as_deref()).await?;
    let jar = jar.remove(expired_session_cookie(&state));

    Ok((jar, Redirect::to(&redirect_url)))
}
