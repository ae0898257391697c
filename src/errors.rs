// src/errors.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Lookup failure: {0}")]
    LookupFailure(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("MongoDB error: {0}")]
    MongoDB(#[from] mongodb::error::Error),

    #[error("Document not found")]
    DocumentNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::InvalidStateTransition(_) => (StatusCode::CONFLICT, "Invalid state transition".to_string()),
            AppError::InvariantViolation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "Invariant violation".to_string()),
            AppError::LookupFailure(_) => (StatusCode::NOT_FOUND, "Lookup failed".to_string()),
            AppError::PersistenceFailure(_) => (StatusCode::SERVICE_UNAVAILABLE, "Write not yet durable".to_string()),
            AppError::MongoDB(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string()),
            AppError::DocumentNotFound => (StatusCode::NOT_FOUND, "Document not found".to_string()),
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "Validation failed".to_string()),
            AppError::ConfigurationError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Configuration error".to_string()),
            AppError::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable".to_string()),
        };

        let body = Json(json!({
            "error": error_message,
            "message": self.to_string(),
            "success": false,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

// Helper conversion functions
impl AppError {
    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        AppError::InvalidStateTransition(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        AppError::InvariantViolation(msg.into())
    }

    pub fn invalid_data(msg: impl Into<String>) -> Self {
        AppError::ValidationError(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        AppError::PersistenceFailure(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::ConfigurationError(msg.into())
    }

    /// True for the errors that leave in-memory state untouched and are safe
    /// for the caller to retry or ignore.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AppError::InvalidStateTransition(_)
                | AppError::InvariantViolation(_)
                | AppError::ValidationError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = vec![
            (AppError::invalid_transition("not live"), StatusCode::CONFLICT),
            (AppError::invariant("too many wickets"), StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::LookupFailure("team".into()), StatusCode::NOT_FOUND),
            (AppError::persistence("timeout"), StatusCode::SERVICE_UNAVAILABLE),
            (AppError::invalid_data("runs"), StatusCode::BAD_REQUEST),
            (AppError::DocumentNotFound, StatusCode::NOT_FOUND),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_rejections() {
        assert!(AppError::invalid_transition("x").is_rejection());
        assert!(AppError::invariant("x").is_rejection());
        assert!(!AppError::persistence("x").is_rejection());
    }
}
