use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// API Error with rich context and automatic error trait implementations.
///
/// Uses thiserror for ergonomic error propagation. Each variant carries
/// enough context to produce both a log line and an HTTP response without
/// re-deriving either from the other.
#[derive(Error, Debug)]
pub enum ApiError {
    // Request validation 1xxx
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unsupported content type: {0}")]
    InvalidFileType(String),

    #[error("Upload too large: {size} bytes (limit {limit} bytes)")]
    FileTooLarge { size: usize, limit: usize },

    // Resource errors 2xxx
    #[error("Analysis not found: {0}")]
    NotFound(String),

    #[error("Illegal status transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Exhausted attempts generating a unique analysis code")]
    CodeExhausted,

    // Pipeline errors 3xxx
    #[error("Diagram rejected by guardrail: {0}")]
    GuardrailRejected(String),

    #[error("All LLM providers failed: {0}")]
    AllProvidersFailed(String),

    #[error("Analysis pipeline timed out after {0:?}")]
    PipelineTimeout(std::time::Duration),

    // System errors 5xxx
    #[error("Internal error: {0}")]
    InternalError(String),

    // Database errors - auto-convert from sqlx::Error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic wrapper for other errors - auto-convert from anyhow::Error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// Helper to create not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Helper to create validation error
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// Helper to create internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    pub fn illegal_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::IllegalTransition { from: from.into(), to: to.into() }
    }

    /// Get legacy error code for backward compatibility
    pub fn error_code(&self) -> i32 {
        match self {
            Self::ValidationError(_) => 1001,
            Self::InvalidFileType(_) => 1002,
            Self::FileTooLarge { .. } => 1003,

            Self::NotFound(_) => 2001,
            Self::IllegalTransition { .. } => 2002,
            Self::CodeExhausted => 2003,

            Self::GuardrailRejected(_) => 3001,
            Self::AllProvidersFailed(_) => 3002,
            Self::PipelineTimeout(_) => 3003,

            Self::InternalError(_) => 5001,
            Self::Database(_) => 5002,
            Self::Io(_) => 5003,
            Self::Other(_) => 5001,
        }
    }
}

/// Legacy error response for backward compatibility
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let message = self.to_string();

        let status = match &self {
            Self::ValidationError(_) | Self::InvalidFileType(_) => StatusCode::BAD_REQUEST,
            Self::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::IllegalTransition { .. } | Self::CodeExhausted => StatusCode::CONFLICT,
            Self::GuardrailRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::AllProvidersFailed(_) => StatusCode::BAD_GATEWAY,
            Self::PipelineTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::InternalError(_) | Self::Database(_) | Self::Io(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let response = ApiErrorResponse { code, message, details: None };

        (status, Json(response)).into_response()
    }
}

/// Implement From for serde_json::Error
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::internal_error(format!("JSON error: {}", err))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
