//! Error types for the site guard

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Result type alias for site guard operations
pub type Result<T> = std::result::Result<T, SiteError>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum SiteError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Upload error: {0}")]
    Upload(#[from] crate::middleware::UploadError),

    #[error("Validation error: {0}")]
    Validation(#[from] crate::middleware::ValidationError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors from the collection store
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Collection {0} is not an array of records")]
    Corrupt(String),

    #[error("Invalid asset key: {0}")]
    InvalidKey(String),
}

impl From<config::ConfigError> for SiteError {
    fn from(err: config::ConfigError) -> Self {
        SiteError::Config(err.to_string())
    }
}

/// Failures surfaced to HTTP clients.
///
/// Every variant renders as `{ "error": "..." }` with its status code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Too many requests. Please try again later.")]
    RateLimited { retry_after_secs: u64 },

    #[error("Invalid CSRF token")]
    InvalidCsrf,

    #[error("{0}")]
    InvalidUpload(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Internal server error")]
    StorageFailure,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InvalidCsrf => StatusCode::FORBIDDEN,
            ApiError::InvalidUpload(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Generic error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response();

        if let ApiError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }

        response
    }
}

impl From<SiteError> for ApiError {
    fn from(err: SiteError) -> Self {
        match err {
            SiteError::Upload(e) => ApiError::InvalidUpload(e.to_string()),
            SiteError::Validation(e) => ApiError::BadRequest(e.to_string()),
            other => {
                error!("Request failed: {}", other);
                ApiError::StorageFailure
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        SiteError::from(err).into()
    }
}

impl From<crate::middleware::UploadError> for ApiError {
    fn from(err: crate::middleware::UploadError) -> Self {
        ApiError::InvalidUpload(err.to_string())
    }
}

impl From<crate::middleware::ValidationError> for ApiError {
    fn from(err: crate::middleware::ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}
