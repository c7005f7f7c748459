//! Error types for Vitrine services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    MissingField,

    // Rate limiting (2xxx)
    RateLimited,

    // External service errors (3xxx)
    GenerationError,
    GenerationTimeout,
    EmbeddingError,
    EmbeddingTimeout,
    IndexError,
    IndexTimeout,
    MalformedResponse,
    UpstreamError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,

    // Service unavailable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,

            // Rate limits (2xxx)
            ErrorCode::RateLimited => 2001,

            // External (3xxx)
            ErrorCode::GenerationError => 3001,
            ErrorCode::GenerationTimeout => 3002,
            ErrorCode::EmbeddingError => 3003,
            ErrorCode::EmbeddingTimeout => 3004,
            ErrorCode::IndexError => 3005,
            ErrorCode::IndexTimeout => 3006,
            ErrorCode::MalformedResponse => 3007,
            ErrorCode::UpstreamError => 3008,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,

            ErrorCode::ServiceUnavailable => 9999,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    // Rate limiting (from upstream providers)
    #[error("Rate limited by provider: {provider}")]
    RateLimited { provider: String },

    // External service errors
    #[error("Text generation error: {message}")]
    GenerationError { message: String },

    #[error("Text generation timeout after {timeout_ms}ms")]
    GenerationTimeout { timeout_ms: u64 },

    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Embedding timeout after {timeout_ms}ms")]
    EmbeddingTimeout { timeout_ms: u64 },

    #[error("Vector index error: {message}")]
    IndexError { message: String },

    #[error("Vector index timeout after {timeout_ms}ms")]
    IndexTimeout { timeout_ms: u64 },

    #[error("Malformed provider response: {message}")]
    MalformedResponse { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::GenerationError { .. } => ErrorCode::GenerationError,
            AppError::GenerationTimeout { .. } => ErrorCode::GenerationTimeout,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::EmbeddingTimeout { .. } => ErrorCode::EmbeddingTimeout,
            AppError::IndexError { .. } => ErrorCode::IndexError,
            AppError::IndexTimeout { .. } => ErrorCode::IndexTimeout,
            AppError::MalformedResponse { .. } => ErrorCode::MalformedResponse,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } |
            AppError::MissingField { .. } => StatusCode::BAD_REQUEST,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Internal { .. } |
            AppError::Configuration { .. } |
            AppError::Serialization(_) |
            AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::GenerationError { .. } |
            AppError::GenerationTimeout { .. } |
            AppError::EmbeddingError { .. } |
            AppError::EmbeddingTimeout { .. } |
            AppError::IndexError { .. } |
            AppError::IndexTimeout { .. } |
            AppError::MalformedResponse { .. } |
            AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// True when this error came from a provider rate limit
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, AppError::RateLimited { .. })
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details: None,
                request_id: None, // Should be filled by middleware
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::IndexError { message: "down".into() };
        assert_eq!(err.code(), ErrorCode::IndexError);
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "Empty message".into(),
            field: Some("message".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_rate_limit_detection() {
        let err = AppError::RateLimited { provider: "openai".into() };
        assert!(err.is_rate_limit());
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);

        let other = AppError::EmbeddingError { message: "boom".into() };
        assert!(!other.is_rate_limit());
    }

    #[test]
    fn test_numeric_codes_are_grouped() {
        assert_eq!(ErrorCode::ValidationError.as_code(), 1001);
        assert_eq!(ErrorCode::RateLimited.as_code(), 2001);
        assert_eq!(ErrorCode::MalformedResponse.as_code(), 3007);
        assert_eq!(ErrorCode::ServiceUnavailable.as_code(), 9999);
    }
}
