use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Query params from the provider callback redirect.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Identity read locally from the stored access token.
#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentUserResponse {
    #[schema(example = "usr_9f2c")]
    pub user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    #[schema(example = "CUSTOMER")]
    pub role: String,
    pub tenant_id: Option<String>,
    /// Instant the access token stops being usable.
    pub token_expires_utc: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TenantExchangeRequest {
    #[validate(length(min = 1, max = 128))]
    #[schema(example = "tenant_retail_01")]
    pub tenant_id: String,
    #[validate(length(min = 1, max = 64))]
    #[schema(example = "retail")]
    pub tenant_type: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TenantExchangeResponse {
    pub tenant_id: String,
    pub tenant_type: String,
    /// False when the provider exchange failed and the original token was
    /// kept (non-strict mode).
    pub downscoped: bool,
}
