//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors become a JSON body
//! `{"error": "...", "detail": "..."}` with a matching status code.
//!
//! Internal errors (Database, Io, Internal) are logged with full detail but
//! only a generic message reaches the caller, so file paths and SQL never
//! leak to clients.

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nora_llm::LlmError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// All errors that can occur in the nora-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("too many requests: {0}")]
    TooManyRequests(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// An upstream service (LLM provider, Whisper) answered with an error.
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("gateway timeout: {0}")]
    GatewayTimeout(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
            ServerError::TooManyRequests(m) => (StatusCode::TOO_MANY_REQUESTS, m.clone()),
            ServerError::PayloadTooLarge(m) => (StatusCode::PAYLOAD_TOO_LARGE, m.clone()),
            ServerError::UnsupportedMediaType(m) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, m.clone()),
            ServerError::Upstream(m) => (StatusCode::BAD_GATEWAY, m.clone()),
            ServerError::ServiceUnavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
            ServerError::GatewayTimeout(m) => (StatusCode::GATEWAY_TIMEOUT, m.clone()),

            ServerError::Database(e) => {
                error!(error = %e, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_owned())
            }
            ServerError::Io(e) => {
                error!(error = %e, "io error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_owned())
            }
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_owned())
            }
        };
        // `detail` keeps FastAPI-style clients working.
        (status, Json(json!({ "error": client_message, "detail": client_message }))).into_response()
    }
}

impl From<LlmError> for ServerError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::UnknownProvider(_) | LlmError::InvalidModel { .. } => ServerError::BadRequest(e.to_string()),
            LlmError::NotConfigured { .. } | LlmError::Unavailable(_) => {
                ServerError::ServiceUnavailable(e.to_string())
            }
            LlmError::Timeout(_) => ServerError::GatewayTimeout(e.to_string()),
            LlmError::Http(_)
            | LlmError::Status { .. }
            | LlmError::Decode { .. }
            | LlmError::EmptyResponse(_)
            | LlmError::Truncated(_) => ServerError::Upstream(e.to_string()),
        }
    }
}

impl From<MultipartError> for ServerError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ServerError::PayloadTooLarge("Upload exceeds the request size limit".into());
        }
        ServerError::BadRequest(format!("invalid multipart body: {}", e.body_text()))
    }
}

impl From<validator::ValidationErrors> for ServerError {
    fn from(e: validator::ValidationErrors) -> Self {
        ServerError::BadRequest(e.to_string())
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(e: anyhow::Error) -> Self {
        error!(error = ?e, "converting anyhow error to ServerError::Internal");
        ServerError::Internal(e.to_string())
    }
}
