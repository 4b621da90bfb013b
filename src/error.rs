//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

use crate::gateway::GatewayError;
use crate::store::StoreError;

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Validation Errors**: missing or malformed caller input
/// - **Configuration Errors**: provider credentials absent
/// - **Provider Errors**: transport failures, rejections and other provider answers
/// - **Resource Errors**: requested transactions not found
/// - **Database Errors**: storage failures
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// One entry per missing or malformed field.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Missing or invalid field(s): {}", .0.join(", "))]
    Validation(Vec<String>),

    /// Returns HTTP 500 Internal Server Error.
    #[error("{0}")]
    Configuration(String),

    /// The provider could not be reached at all.
    ///
    /// Returns HTTP 502 Bad Gateway.
    #[error("Unable to reach the payment provider: {message}")]
    Transport { message: String, details: Value },

    /// The provider refused the merchant configuration (e.g. `KEY_NOT_CONFIGURED`).
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Payment provider rejected the merchant configuration ({code})")]
    ProviderRejection { code: String, details: Value },

    /// Any other provider failure. Uses the provider's status when it is an error status.
    #[error("Payment provider returned an error")]
    UnknownProvider { status: Option<u16>, details: Value },

    /// Returns HTTP 404 Not Found.
    #[error("Transaction not found")]
    TransactionNotFound,

    /// Missing or wrong admin key.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    Unauthorized,

    /// Returns HTTP 500 Internal Server Error (details hidden from client).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        let details = err.payload();
        match err {
            GatewayError::Configuration(message) => AppError::Configuration(message),
            GatewayError::Transport { message } => AppError::Transport { message, details },
            GatewayError::Rejected { code, .. } => AppError::ProviderRejection { code, details },
            GatewayError::Provider { status, .. } => AppError::UnknownProvider { status, details },
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AppError::TransactionNotFound,
            StoreError::Database(e) => AppError::Database(e),
            other => AppError::Storage(other.to_string()),
        }
    }
}

impl AppError {
    /// HTTP status, error code and client-visible details for this error.
    fn parts(&self) -> (StatusCode, String, Value) {
        match self {
            AppError::Validation(fields) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR".to_string(),
                json!({ "fields": fields }),
            ),
            AppError::Configuration(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIGURATION_ERROR".to_string(),
                Value::Null,
            ),
            AppError::Transport { details, .. } => (
                StatusCode::BAD_GATEWAY,
                "PROVIDER_HOST_UNREACHABLE".to_string(),
                details.clone(),
            ),
            AppError::ProviderRejection { code, details } => {
                (StatusCode::BAD_REQUEST, code.clone(), details.clone())
            }
            AppError::UnknownProvider { status, details } => {
                let status = status
                    .and_then(|s| StatusCode::from_u16(s).ok())
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, "PROVIDER_ERROR".to_string(), details.clone())
            }
            AppError::TransactionNotFound => (
                StatusCode::NOT_FOUND,
                "TRANSACTION_NOT_FOUND".to_string(),
                Value::Null,
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "INVALID_API_KEY".to_string(),
                Value::Null,
            ),
            AppError::Database(_) | AppError::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR".to_string(),
                Value::Null,
            ),
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": "VALIDATION_ERROR",
///   "message": "Missing or invalid field(s): amount, redirectUrl",
///   "details": { "fields": ["amount", "redirectUrl"] }
/// }
/// ```
///
/// # Status Code Mapping
///
/// - `Validation`, `ProviderRejection` → 400 Bad Request
/// - `Unauthorized` → 401 Unauthorized
/// - `TransactionNotFound` → 404 Not Found
/// - `Configuration`, `Database`, `Storage` → 500 Internal Server Error
/// - `Transport` → 502 Bad Gateway
/// - `UnknownProvider` → the provider's error status, otherwise 500
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, details) = self.parts();

        // Internal failures are logged in full but never echoed to the client
        let message = match &self {
            AppError::Database(_) | AppError::Storage(_) => {
                tracing::error!(error = %self, "Request failed");
                "An internal error occurred".to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": code,
            "message": message,
            "details": details
        }));

        (status, body).into_response()
    }
}
