//! Server-side error taxonomy
//!
//! Every failure category maps to its own HTTP status so the client can
//! branch on the kind. Response bodies carry a JSON `detail` field.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Request-scoped errors surfaced over HTTP
#[derive(Error, Debug)]
pub enum ApiError {
    /// Bearer header missing or malformed
    #[error("Missing bearer token")]
    Unauthorized,

    /// Bearer token did not match the configured token
    #[error("Invalid token")]
    Forbidden,

    /// One-time auth token was already handed out
    #[error("Auth token already claimed")]
    TokenClaimed,

    /// Request body failed validation
    #[error("{0}")]
    BadRequest(String),

    /// Agent subprocess exceeded its hard deadline
    #[error("Agent timed out ({}s)", .0.as_secs())]
    UpstreamTimeout(Duration),

    /// Agent subprocess exited non-zero with no usable output
    #[error("Agent failed: {0}")]
    UpstreamFailure(String),

    /// Agent output did not parse as the expected structure
    #[error("Failed to parse agent output: {0}")]
    UpstreamProtocolError(String),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this failure category
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::TokenClaimed => StatusCode::GONE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::UpstreamFailure(_) | ApiError::UpstreamProtocolError(_) => {
                StatusCode::BAD_GATEWAY
            }
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}
