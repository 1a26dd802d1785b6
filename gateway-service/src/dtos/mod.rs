pub mod actions;
pub mod auth;
pub mod debug;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "Action 'wire_transfer' denied")]
    pub error: String,
}
