//! # Error Handling
//!
//! Custom error types for the HTTP surface and how they map to responses.
//!
//! ## JSON Response Format:
//! ```json
//! {
//!   "error": {
//!     "type": "validation_error",
//!     "message": "Server port cannot be 0",
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Application-level errors surfaced by HTTP handlers.
///
/// ## HTTP Status Code Mapping:
/// - Internal/ConfigError → 500 (Internal Server Error)
/// - BadRequest/ValidationError → 400 (Bad Request)
/// - NotFound → 404 (Not Found)
#[derive(Debug)]
pub enum AppError {
    /// Server-side failures
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Requested resource was not found
    NotFound(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// Input failed validation rules
    ValidationError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "not_found",
                msg.clone(),
            ),
            AppError::ConfigError(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
            AppError::ValidationError(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "validation_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing failures are client mistakes, not server faults.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::ValidationError("Server port cannot be 0".to_string());
        assert_eq!(err.to_string(), "Validation error: Server port cannot be 0");
    }

    #[test]
    fn test_status_code_mapping() {
        use actix_web::http::StatusCode;

        assert_eq!(
            AppError::Internal("boom".into()).error_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::BadRequest("nope".into()).error_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound("missing".into()).error_response().status(),
            StatusCode::NOT_FOUND
        );
    }
}
