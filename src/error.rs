/// Unified error types for the Evalap service
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum AppError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Malformed or incomplete input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Bad or missing credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Role is not allowed to perform an administrative action
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Record exists but lies outside the caller's scope
    #[error("Not found: {0}")]
    ScopeDenied(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict errors (e.g., duplicate email)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Shared attempt store errors
    #[error("Cache error: {0}")]
    Cache(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Machine-readable code carried in every error body
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "ValidationFailed",
            AppError::Authentication(_) => "AuthenticationRequired",
            AppError::Authorization(_) => "Forbidden",
            AppError::ScopeDenied(_) | AppError::NotFound(_) => "NotFound",
            AppError::Conflict(_) => "Conflict",
            AppError::Database(_)
            | AppError::Cache(_)
            | AppError::Internal(_)
            | AppError::Io(_) => "InternalServerError",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::ScopeDenied(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_)
            | AppError::Cache(_)
            | AppError::Internal(_)
            | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = self.code().to_string();

        let message = match &self {
            // Out-of-scope records look exactly like missing ones
            AppError::ScopeDenied(_) => "Not found: record not found".to_string(),
            AppError::Database(e) => {
                tracing::error!("Database failure: {}", e);
                "Internal server error".to_string()
            }
            AppError::Cache(_) | AppError::Internal(_) | AppError::Io(_) => {
                tracing::error!("{}", self);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorResponse { error, message })).into_response()
    }
}

/// Result type alias for service operations
pub type AppResult<T> = Result<T, AppError>;
