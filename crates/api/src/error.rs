//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ferropdv_billing::BillingError;
use serde_json::json;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Authentication errors
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Authentication required")]
    Unauthorized,
    #[error("Insufficient permissions")]
    Forbidden,

    // Validation errors
    #[error("Invalid request: {0}")]
    BadRequest(String),

    // Resource errors
    #[error("Resource not found")]
    NotFound,
    #[error("Resource already exists")]
    Conflict(String),

    // Subscription errors
    #[error("Trial already used for this account")]
    TrialAlreadyUsed,
    #[error("An active subscription already exists")]
    SubscriptionActive,

    // Webhook errors
    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    // Internal errors
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal server error")]
    Internal,
    #[error("Service unavailable")]
    ServiceUnavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // Authentication
            ApiError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", self.to_string()),

            // Validation
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),

            // Resources
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),

            // Subscriptions
            ApiError::TrialAlreadyUsed => {
                (StatusCode::CONFLICT, "TRIAL_ALREADY_USED", self.to_string())
            }
            ApiError::SubscriptionActive => {
                (StatusCode::CONFLICT, "SUBSCRIPTION_ACTIVE", self.to_string())
            }

            // Webhooks
            ApiError::WebhookSignatureInvalid => (
                StatusCode::UNAUTHORIZED,
                "WEBHOOK_SIGNATURE_INVALID",
                self.to_string(),
            ),

            // Internal
            ApiError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "Database error".to_string(),
            ),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                self.to_string(),
            ),
            ApiError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                self.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::TrialAlreadyUsed => ApiError::TrialAlreadyUsed,
            BillingError::AlreadyActive => ApiError::SubscriptionActive,
            BillingError::InvalidPlan(msg) => ApiError::BadRequest(msg),
            BillingError::DuplicatePayment(msg) => ApiError::Conflict(msg),
            BillingError::WebhookSignatureInvalid => ApiError::WebhookSignatureInvalid,
            BillingError::InvalidWebhook(msg) => ApiError::BadRequest(msg),
            BillingError::NotFound(_) => ApiError::NotFound,
            BillingError::Gateway(msg) => {
                tracing::error!(error = %msg, "gateway error");
                ApiError::ServiceUnavailable
            }
            BillingError::Database(msg) => ApiError::Database(msg),
            BillingError::Cache(msg) => {
                tracing::error!(error = %msg, "cache error");
                ApiError::Internal
            }
            BillingError::Config(msg) => {
                tracing::error!(error = %msg, "billing configuration error");
                ApiError::Internal
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound,
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    // PostgreSQL unique violation
                    if code == "23505" {
                        return ApiError::Conflict("Resource already exists".to_string());
                    }
                }
                ApiError::Database(db_err.to_string())
            }
            _ => ApiError::Database(err.to_string()),
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
