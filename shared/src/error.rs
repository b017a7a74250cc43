//! Closed error taxonomy shared by the gateway and the worker (spec §7).

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("rate limited, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("insufficient credits")]
    InsufficientCredits,

    #[error("input fetch failed")]
    InputFetch,

    #[error("provider transient error: {0}")]
    ProviderTransient(String),

    #[error("provider permanent error: {0}")]
    ProviderPermanent(String),

    #[error("store put failed")]
    StorePut,

    #[error("provider timed out")]
    ProviderTimeout,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Maps any error to the short, sanitized string the status endpoint or
    /// a failed row is allowed to show a client. Never includes a provider
    /// name (spec §9 obfuscation requirement).
    pub fn sanitized_message(&self) -> String {
        match self {
            CoreError::InputFetch => "input_fetch_failed".to_string(),
            CoreError::StorePut => "store_put_failed".to_string(),
            CoreError::ProviderTimeout => "provider_timeout".to_string(),
            CoreError::ProviderPermanent(_) => "provider_error".to_string(),
            CoreError::ProviderTransient(_) => "provider_error".to_string(),
            other => other.to_string().chars().take(200).collect(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::ProviderTransient(_))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
    pub request_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    pub retry_after: Option<u64>,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let (status, code, message, retry_after): (StatusCode, &str, String, Option<u64>) =
            match &self {
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None)
                }
                CoreError::Auth(msg) => {
                    (StatusCode::UNAUTHORIZED, "AUTH_ERROR", msg.clone(), None)
                }
                CoreError::RateLimited { retry_after } => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "RATE_LIMIT_EXCEEDED",
                    "rate limit exceeded".to_string(),
                    Some(*retry_after),
                ),
                CoreError::InsufficientCredits => (
                    StatusCode::PAYMENT_REQUIRED,
                    "INSUFFICIENT_CREDITS",
                    "insufficient_credits".to_string(),
                    None,
                ),
                CoreError::Conflict(msg) => {
                    (StatusCode::CONFLICT, "CONFLICT", msg.clone(), None)
                }
                CoreError::NotFound(msg) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None)
                }
                CoreError::Database(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "database operation failed".to_string(),
                    None,
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "an unexpected error occurred".to_string(),
                    None,
                ),
            };

        let body = ErrorResponse {
            error: ErrorDetails { code: code.to_string(), message, retry_after },
            request_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(seconds) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}
