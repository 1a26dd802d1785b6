//! Identity-provider client for the BFF flow.
//!
//! Performs the authorization-code-with-PKCE exchange, the tenant
//! token-exchange grant and best-effort revocation on the browser's behalf.
//! Provider error bodies are summarized before they reach logs or events.

use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::config::ProviderConfig;
use crate::models::session::TokenSet;
use crate::services::error::GatewayError;
use service_core::observability::TracedClientExt;

const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
const GRANT_TOKEN_EXCHANGE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const SUBJECT_TOKEN_TYPE_ACCESS: &str = "urn:ietf:params:oauth:token-type:access_token";

/// Response from the provider's token endpoint.
#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    refresh_token: Option<String>,
    id_token: Option<String>,
    expires_in: Option<i64>,
}

impl TokenEndpointResponse {
    fn into_token_set(self) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            id_token: self.id_token,
            expires_in: self.expires_in.unwrap_or(3600),
            obtained_utc: chrono::Utc::now(),
        }
    }
}

pub struct OidcClient {
    http: Client,
    config: ProviderConfig,
}

impl OidcClient {
    pub fn new(config: ProviderConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    /// Authorization URL the browser is redirected to, embedding the CSRF
    /// state and the S256 PKCE challenge.
    pub fn authorization_url(&self, state: &str, challenge: &str) -> Result<String, GatewayError> {
        let query = serde_urlencoded::to_string([
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", self.config.scope.as_str()),
            ("state", state),
            ("code_challenge", challenge),
            ("code_challenge_method", "S256"),
        ])
        .map_err(|e| GatewayError::Internal(anyhow::anyhow!("Encode authorize query: {}", e)))?;

        Ok(format!("{}?{}", self.config.authorize_url, query))
    }

    /// Exchange an authorization code for tokens. The PKCE verifier always
    /// goes along; the client secret only when one is configured.
    #[tracing::instrument(skip_all)]
    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenSet, GatewayError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", GRANT_AUTHORIZATION_CODE),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", verifier),
        ];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.expose_secret()));
        }

        self.post_token_endpoint(&form, "token exchange").await
    }

    /// Token-exchange grant scoping the session to one tenant.
    #[tracing::instrument(skip_all, fields(tenant_id = %tenant_id))]
    pub async fn exchange_for_tenant(
        &self,
        access_token: &str,
        tenant_id: &str,
    ) -> Result<TokenSet, GatewayError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", GRANT_TOKEN_EXCHANGE),
            ("subject_token", access_token),
            ("subject_token_type", SUBJECT_TOKEN_TYPE_ACCESS),
            ("client_id", self.config.client_id.as_str()),
            ("audience", tenant_id),
        ];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.expose_secret()));
        }

        self.post_token_endpoint(&form, "tenant token exchange").await
    }

    async fn post_token_endpoint(
        &self,
        form: &[(&str, &str)],
        operation: &str,
    ) -> Result<TokenSet, GatewayError> {
        let response = self
            .http
            .traced_post(&self.config.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, operation, "Failed to contact identity provider");
                GatewayError::Provider(format!("Failed to contact identity provider: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, operation, "Provider token endpoint rejected request");
            return Err(GatewayError::Provider(format!(
                "Provider {} failed with status {}",
                operation, status
            )));
        }

        let tokens = response.json::<TokenEndpointResponse>().await.map_err(|e| {
            tracing::error!(error = %e, operation, "Failed to parse provider token response");
            GatewayError::Provider("Failed to parse provider token response".to_string())
        })?;

        Ok(tokens.into_token_set())
    }

    /// Best-effort refresh-token revocation; the caller treats failure as
    /// non-fatal.
    #[tracing::instrument(skip_all)]
    pub async fn revoke(&self, refresh_token: &str) -> Result<(), GatewayError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("token", refresh_token),
            ("token_type_hint", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.expose_secret()));
        }

        let response = self
            .http
            .traced_post(&self.config.revoke_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| GatewayError::Provider(format!("Revocation call failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(GatewayError::Provider(format!(
                "Revocation returned status {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Provider logout URL, clearing the provider-side browser session too.
    pub fn logout_url(&self, id_token_hint: Option<&str>) -> Result<String, GatewayError> {
        let mut params: Vec<(&str, &str)> = vec![
            ("client_id", self.config.client_id.as_str()),
            (
                "post_logout_redirect_uri",
                self.config.logged_out_url.as_str(),
            ),
        ];
        if let Some(hint) = id_token_hint {
            params.push(("id_token_hint", hint));
        }

        let query = serde_urlencoded::to_string(params)
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("Encode logout query: {}", e)))?;

        Ok(format!("{}?{}", self.config.logout_url, query))
    }
}
