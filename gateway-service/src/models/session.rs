use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tokens issued by the identity provider. Held server-side only; they are
/// never forwarded to the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    /// Provider-reported lifetime in seconds, relative to `obtained_utc`.
    pub expires_in: i64,
    pub obtained_utc: DateTime<Utc>,
}

impl TokenSet {
    pub fn expires_utc(&self) -> DateTime<Utc> {
        self.obtained_utc + Duration::seconds(self.expires_in)
    }
}

/// Tenant selected via the token-exchange grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: String,
    pub tenant_type: String,
}

/// Per-browser-session OAuth artifacts.
///
/// The CSRF state and PKCE verifier exist only between login initiation and
/// the callback; both are single-use and cleared on any terminal callback
/// outcome. A session either holds tokens or is pending authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSession {
    pub session_id: String,
    pub csrf_state: Option<String>,
    pub pkce_verifier: Option<String>,
    pub tokens: Option<TokenSet>,
    pub tenant: Option<TenantContext>,
    pub created_utc: DateTime<Utc>,
    pub last_seen_utc: DateTime<Utc>,
}

impl BrowserSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            csrf_state: None,
            pkce_verifier: None,
            tokens: None,
            tenant: None,
            created_utc: now,
            last_seen_utc: now,
        }
    }

    /// Enter the pending state. A re-login replaces any previous pending
    /// artifacts and drops issued tokens, so the session is never both
    /// pending and authenticated and only the most recent redirect can
    /// complete.
    pub fn begin_authorization(&mut self, state: String, verifier: String) {
        self.tokens = None;
        self.tenant = None;
        self.csrf_state = Some(state);
        self.pkce_verifier = Some(verifier);
    }

    /// Consume the saved CSRF state. Subsequent calls return `None`.
    pub fn take_state(&mut self) -> Option<String> {
        self.csrf_state.take()
    }

    /// Consume the PKCE verifier. Subsequent calls return `None`.
    pub fn take_verifier(&mut self) -> Option<String> {
        self.pkce_verifier.take()
    }

    /// Drop any in-flight authorization artifacts (terminal callback outcome).
    pub fn clear_authorization_artifacts(&mut self) {
        self.csrf_state = None;
        self.pkce_verifier = None;
    }

    /// Attach issued tokens; the authorization artifacts are spent.
    pub fn attach_tokens(&mut self, tokens: TokenSet) {
        self.tokens = Some(tokens);
        self.clear_authorization_artifacts();
    }

    pub fn clear_tokens(&mut self) {
        self.tokens = None;
        self.tenant = None;
        self.clear_authorization_artifacts();
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.tokens.is_none() && (self.csrf_state.is_some() || self.pkce_verifier.is_some())
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.last_seen_utc > ttl
    }

    pub fn touch(&mut self) {
        self.last_seen_utc = Utc::now();
    }
}
