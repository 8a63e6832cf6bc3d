// src/errors.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("MongoDB error: {0}")]
    MongoDB(#[from] mongodb::error::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Failed to generate unique join code after {0} attempts")]
    JoinCodeExhausted(usize),

    #[error("You are already a member of this pool")]
    AlreadyMember,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication error")]
    AuthError,

    #[error("Unauthorized access")]
    Unauthorized,

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::MongoDB(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
            AppError::Store(StoreError::Unavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable")
            }
            AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO error"),
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "Validation failed"),
            AppError::JoinCodeExhausted(_) => (StatusCode::CONFLICT, "Join code unavailable"),
            AppError::AlreadyMember => (StatusCode::CONFLICT, "Already a member"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "Not found"),
            AppError::AuthError => (StatusCode::UNAUTHORIZED, "Authentication failed"),
            AppError::Unauthorized => (StatusCode::FORBIDDEN, "Unauthorized access"),
            AppError::ConfigurationError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Configuration error")
            }
        };

        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        // Store and database internals stay in the logs.
        let message = if status.is_server_error() {
            error_message.to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": error_message,
            "message": message,
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

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        tracing::debug!("Rejected bearer token: {}", err);
        AppError::AuthError
    }
}

// Helper conversion functions
impl AppError {
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        AppError::ValidationError(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::ConfigurationError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
