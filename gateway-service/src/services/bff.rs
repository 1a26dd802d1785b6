//! Backend-for-frontend session flow.
//!
//! Runs the authorization-code-with-PKCE dance on the browser's behalf and
//! keeps every issued token server-side. State machine:
//! anonymous -> pending(state, verifier) -> authenticated(tokens)
//! -> tenant-scoped(tokens, tenant) -> anonymous (logout), with an error
//! exit at every transition.

use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::dtos::auth::{CallbackParams, CurrentUserResponse, TenantExchangeRequest, TenantExchangeResponse};
use crate::models::audit::{AuditContext, AuditRecord};
use crate::models::event::{DebugEvent, DebugEventType, EventDirection};
use crate::models::session::{BrowserSession, TenantContext};
use crate::services::audit::AuditRecorder;
use crate::services::error::GatewayError;
use crate::services::events::DebugEventBus;
use crate::services::metrics::LOGIN_FLOWS_TOTAL;
use crate::services::oidc::OidcClient;
use crate::services::session_store::SessionStore;
use crate::utils::{challenge_s256, decode_access_claims, generate_state, generate_verifier};

const LOGIN_ACTION: &str = "login";
const LOGOUT_ACTION: &str = "logout";
const TOKEN_EXCHANGE_ACTION: &str = "token_exchange";
const SESSION_RESOURCE: &str = "session";

const SELF_LABEL: &str = "gateway";
const PROVIDER_LABEL: &str = "identity-provider";

/// Outcome of login initiation, consumed by the cookie-setting handler.
#[derive(Debug)]
pub struct LoginRedirect {
    pub session_id: String,
    pub authorize_url: String,
}

#[derive(Clone)]
pub struct BffService {
    sessions: Arc<dyn SessionStore>,
    oidc: Arc<OidcClient>,
    events: DebugEventBus,
    recorder: AuditRecorder,
    config: GatewayConfig,
}

impl BffService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        oidc: Arc<OidcClient>,
        events: DebugEventBus,
        recorder: AuditRecorder,
        config: GatewayConfig,
    ) -> Self {
        Self {
            sessions,
            oidc,
            events,
            recorder,
            config,
        }
    }

    /// Start a login: mint state and PKCE verifier, persist both, hand back
    /// the provider authorization URL. Reuses the caller's session when one
    /// exists so a re-login replaces the pending artifacts.
    #[tracing::instrument(skip_all)]
    pub async fn begin_login(
        &self,
        existing_session_id: Option<String>,
    ) -> Result<LoginRedirect, GatewayError> {
        let mut session = match &existing_session_id {
            Some(id) => self
                .sessions
                .load(id)
                .await
                .map_err(internal)?
                .unwrap_or_else(|| BrowserSession::new(Uuid::new_v4().to_string())),
            None => BrowserSession::new(Uuid::new_v4().to_string()),
        };
        let session_id = session.session_id.clone();

        let state = generate_state();
        let verifier = generate_verifier();
        let challenge = challenge_s256(&verifier);
        session.begin_authorization(state.clone(), verifier);
        self.sessions.save(session).await.map_err(internal)?;

        let authorize_url = self.oidc.authorization_url(&state, &challenge)?;

        LOGIN_FLOWS_TOTAL.with_label_values(&["initiated"]).inc();
        self.events.emit(
            DebugEvent::new(DebugEventType::Authentication, "login_initiated")
                .with_session(&session_id),
        );
        self.events.emit(
            DebugEvent::hop(
                DebugEventType::Request,
                "redirect_to_provider",
                EventDirection::Outbound,
                SELF_LABEL,
                PROVIDER_LABEL,
            )
            .with_session(&session_id)
            .with_detail(serde_json::json!({ "challenge_method": "S256" })),
        );

        Ok(LoginRedirect {
            session_id,
            authorize_url,
        })
    }

    /// Complete the provider callback. Returns the post-login redirect on
    /// success; every failure is terminal for the in-flight flow and maps to
    /// the login-error page at the handler.
    ///
    /// State is validated strictly and all state failures look identical;
    /// the PKCE verifier is consumed exactly once whatever the outcome.
    #[tracing::instrument(skip_all)]
    pub async fn complete_callback(
        &self,
        session_id: Option<&str>,
        params: CallbackParams,
    ) -> Result<String, GatewayError> {
        self.events.emit(
            DebugEvent::hop(
                DebugEventType::Response,
                "provider_callback",
                EventDirection::Inbound,
                PROVIDER_LABEL,
                SELF_LABEL,
            )
            .with_session(session_id.unwrap_or("-")),
        );

        // Provider-reported error: no token request is made. The raw error
        // text stays out of the event/audit stream.
        if let Some(error_code) = &params.error {
            tracing::warn!(error = %error_code, "Provider returned an authorization error");
            if let Some(id) = session_id {
                self.discard_pending_artifacts(id).await;
            }
            self.record_login_failure(
                session_id,
                &format!("Provider returned '{}'", error_code),
                true,
            );
            return Err(GatewayError::Provider(format!(
                "Provider returned '{}'",
                error_code
            )));
        }

        // Resolve the session; consume state and verifier immediately so
        // neither survives this callback, success or failure.
        let mut session = match session_id {
            Some(id) => self.sessions.load(id).await.map_err(internal)?,
            None => None,
        };
        let (saved_state, verifier) = match session.as_mut() {
            Some(session) => {
                let taken = (session.take_state(), session.take_verifier());
                self.sessions
                    .save(session.clone())
                    .await
                    .map_err(internal)?;
                taken
            }
            None => (None, None),
        };

        // Absent session, absent saved state and mismatch all fail the same
        // way; the comparison is constant-time.
        let state_ok = match (&saved_state, &params.state) {
            (Some(saved), Some(received)) => {
                saved.as_bytes().ct_eq(received.as_bytes()).into()
            }
            _ => false,
        };
        if !state_ok {
            self.record_login_failure(session_id, "State mismatch", false);
            return Err(GatewayError::StateMismatch);
        }

        let code = match &params.code {
            Some(code) => code.as_str(),
            None => {
                self.record_login_failure(session_id, "Missing authorization code", true);
                return Err(GatewayError::Provider(
                    "Missing authorization code".to_string(),
                ));
            }
        };
        let verifier = match verifier {
            Some(verifier) => verifier,
            None => {
                self.record_login_failure(session_id, "State mismatch", false);
                return Err(GatewayError::StateMismatch);
            }
        };

        let mut session = session.unwrap_or_else(|| {
            // Unreachable in practice: state matching required a session.
            BrowserSession::new(Uuid::new_v4().to_string())
        });

        // Code-for-token exchange; the verifier went along and is now spent.
        let tokens = match self.oidc.exchange_code(code, &verifier).await {
            Ok(tokens) => tokens,
            Err(e) => {
                self.record_login_failure(
                    Some(session.session_id.as_str()),
                    "Token exchange failed",
                    true,
                );
                return Err(e);
            }
        };

        let actor = decode_access_claims(&tokens.access_token)
            .ok()
            .map(|claims| claims.sub);

        session.attach_tokens(tokens);
        self.sessions.save(session.clone()).await.map_err(internal)?;

        LOGIN_FLOWS_TOTAL.with_label_values(&["completed"]).inc();
        self.events.emit(
            DebugEvent::new(DebugEventType::Token, "tokens_stored")
                .with_session(&session.session_id)
                .with_actor(actor.clone().unwrap_or_else(|| "-".to_string()))
                .with_detail(serde_json::json!({ "forwarded_to_browser": false })),
        );

        self.recorder.record_async(AuditRecord::success(
            LOGIN_ACTION,
            None,
            AuditContext {
                user_id: actor,
                resource_type: SESSION_RESOURCE.to_string(),
                ..Default::default()
            },
        ));

        Ok(self.config.provider.post_login_url.clone())
    }

    /// Local read of the stored access-token claims; no signature check, the
    /// provider verified the token at exchange time.
    #[tracing::instrument(skip_all)]
    pub async fn current_user(
        &self,
        session_id: &str,
    ) -> Result<CurrentUserResponse, GatewayError> {
        let session = self
            .sessions
            .load(session_id)
            .await
            .map_err(internal)?
            .ok_or(GatewayError::Unauthenticated)?;
        let tokens = session.tokens.as_ref().ok_or(GatewayError::Unauthenticated)?;

        let claims =
            decode_access_claims(&tokens.access_token).map_err(|_| GatewayError::Unauthenticated)?;

        Ok(CurrentUserResponse {
            user_id: claims.sub,
            email: claims.email,
            name: claims.name,
            role: claims.role.unwrap_or_else(|| "CUSTOMER".to_string()),
            tenant_id: session.tenant.as_ref().map(|t| t.tenant_id.clone()),
            token_expires_utc: tokens.expires_utc(),
        })
    }

    /// Scope the session to a tenant via the token-exchange grant.
    ///
    /// On provider failure the original token is kept and the call succeeds,
    /// unless strict mode is configured - then the failure surfaces and no
    /// fallback happens.
    #[tracing::instrument(skip(self, request), fields(tenant_id = %request.tenant_id))]
    pub async fn exchange_tenant(
        &self,
        session_id: &str,
        request: TenantExchangeRequest,
    ) -> Result<TenantExchangeResponse, GatewayError> {
        let mut session = self
            .sessions
            .load(session_id)
            .await
            .map_err(internal)?
            .ok_or(GatewayError::Unauthenticated)?;
        let tokens = session
            .tokens
            .clone()
            .ok_or(GatewayError::Unauthenticated)?;

        let actor = decode_access_claims(&tokens.access_token)
            .ok()
            .map(|claims| claims.sub);

        self.events.emit(
            DebugEvent::hop(
                DebugEventType::Request,
                TOKEN_EXCHANGE_ACTION,
                EventDirection::Outbound,
                SELF_LABEL,
                PROVIDER_LABEL,
            )
            .with_session(session_id)
            .with_detail(serde_json::json!({ "tenant_id": request.tenant_id })),
        );

        let downscoped = match self
            .oidc
            .exchange_for_tenant(&tokens.access_token, &request.tenant_id)
            .await
        {
            Ok(scoped) => {
                session.tokens = Some(scoped);
                true
            }
            Err(e) if !self.config.security.strict_token_exchange => {
                tracing::warn!(
                    error = %e,
                    tenant_id = %request.tenant_id,
                    "Token exchange failed; keeping original token"
                );
                self.events.emit(
                    DebugEvent::new(DebugEventType::Token, "token_exchange_fallback")
                        .with_session(session_id)
                        .with_detail(serde_json::json!({ "tenant_id": request.tenant_id })),
                );
                false
            }
            Err(e) => return Err(e),
        };

        session.tenant = Some(TenantContext {
            tenant_id: request.tenant_id.clone(),
            tenant_type: request.tenant_type.clone(),
        });
        self.sessions.save(session).await.map_err(internal)?;

        self.events.emit(
            DebugEvent::new(DebugEventType::Token, "tenant_scoped")
                .with_session(session_id)
                .with_detail(serde_json::json!({
                    "tenant_id": request.tenant_id,
                    "downscoped": downscoped,
                })),
        );

        self.recorder.record_async(AuditRecord::success(
            TOKEN_EXCHANGE_ACTION,
            None,
            AuditContext {
                user_id: actor,
                tenant_id: Some(request.tenant_id.clone()),
                resource_type: SESSION_RESOURCE.to_string(),
                ..Default::default()
            },
        ));

        Ok(TenantExchangeResponse {
            tenant_id: request.tenant_id,
            tenant_type: request.tenant_type,
            downscoped,
        })
    }

    /// Idempotent logout. Without a session or tokens the browser goes
    /// straight to the logged-out page; otherwise the refresh token is
    /// revoked best-effort and the provider-side session is cleared too.
    #[tracing::instrument(skip_all)]
    pub async fn logout(&self, session_id: Option<&str>) -> Result<String, GatewayError> {
        let session = match session_id {
            Some(id) => self.sessions.load(id).await.map_err(internal)?,
            None => None,
        };

        let mut session = match session {
            Some(session) if session.is_authenticated() => session,
            Some(session) => {
                self.sessions
                    .delete(&session.session_id)
                    .await
                    .map_err(internal)?;
                return Ok(self.config.provider.logged_out_url.clone());
            }
            None => return Ok(self.config.provider.logged_out_url.clone()),
        };

        let tokens = session.tokens.clone();
        let actor = tokens
            .as_ref()
            .and_then(|t| decode_access_claims(&t.access_token).ok())
            .map(|claims| claims.sub);

        // Best-effort revocation; failure is logged, never fatal.
        if let Some(refresh_token) = tokens.as_ref().and_then(|t| t.refresh_token.as_deref()) {
            if let Err(e) = self.oidc.revoke(refresh_token).await {
                tracing::warn!(error = %e, "Refresh token revocation failed during logout");
            }
        }

        let logout_url = self
            .oidc
            .logout_url(tokens.as_ref().and_then(|t| t.id_token.as_deref()))?;

        session.clear_tokens();
        self.sessions
            .delete(&session.session_id)
            .await
            .map_err(internal)?;

        self.events.emit(
            DebugEvent::new(DebugEventType::Authentication, "logged_out")
                .with_session(&session.session_id)
                .with_actor(actor.clone().unwrap_or_else(|| "-".to_string())),
        );
        self.recorder.record_async(AuditRecord::success(
            LOGOUT_ACTION,
            None,
            AuditContext {
                user_id: actor,
                resource_type: SESSION_RESOURCE.to_string(),
                ..Default::default()
            },
        ));

        Ok(logout_url)
    }

    /// Terminal callback outcome with no state validation performed: make
    /// sure no pending artifacts survive.
    async fn discard_pending_artifacts(&self, session_id: &str) {
        if let Ok(Some(mut session)) = self.sessions.load(session_id).await {
            session.clear_authorization_artifacts();
            if let Err(e) = self.sessions.save(session).await {
                tracing::warn!(error = %e, "Failed to clear authorization artifacts");
            }
        }
    }

    fn record_login_failure(&self, session_id: Option<&str>, reason: &str, provider_error: bool) {
        LOGIN_FLOWS_TOTAL.with_label_values(&["failed"]).inc();
        self.events.emit(
            DebugEvent::new(DebugEventType::Error, "login_failed")
                .with_session(session_id.unwrap_or("-"))
                .with_detail(serde_json::json!({ "reason": reason })),
        );

        let ctx = AuditContext {
            resource_type: SESSION_RESOURCE.to_string(),
            ..Default::default()
        };
        let record = if provider_error {
            AuditRecord::error(LOGIN_ACTION, reason, ctx)
        } else {
            AuditRecord::denied(LOGIN_ACTION, reason, None, ctx)
        };
        self.recorder.record_async(record);
    }
}

fn internal(err: service_core::error::AppError) -> GatewayError {
    GatewayError::Internal(anyhow::anyhow!("Session store: {}", err))
}
