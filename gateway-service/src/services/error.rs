use service_core::error::AppError;
use thiserror::Error;

/// Gateway-domain failures, mapped to HTTP-facing `AppError` at the edge.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("No active session")]
    MissingSession,

    #[error("Not authenticated")]
    Unauthenticated,

    /// Covers absent session, absent saved state and state mismatch alike;
    /// the message never reveals which check failed.
    #[error("State mismatch")]
    StateMismatch,

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Action '{action}' denied: {reason}")]
    PolicyDenied {
        action: String,
        reason: String,
        risk_score: u8,
    },

    #[error("Policy evaluation failed: {0}")]
    PolicyEvaluation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::MissingSession => {
                AppError::Unauthorized(anyhow::anyhow!("No active session"))
            }
            GatewayError::Unauthenticated => {
                AppError::Unauthorized(anyhow::anyhow!("Not authenticated"))
            }
            GatewayError::StateMismatch => AppError::AuthError(anyhow::anyhow!("State mismatch")),
            GatewayError::Provider(summary) => AppError::BadGateway(summary),
            GatewayError::PolicyDenied {
                action,
                reason,
                risk_score,
            } => AppError::PolicyDenied {
                action,
                reason,
                risk_score: Some(risk_score),
            },
            GatewayError::PolicyEvaluation(detail) => AppError::BadGateway(detail),
            GatewayError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            GatewayError::Internal(e) => AppError::InternalError(e),
        }
    }
}
