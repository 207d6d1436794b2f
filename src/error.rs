use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Upstream bodies quoted in error messages are cut to this many characters.
pub const ERROR_BODY_LIMIT: usize = 500;

/// Every way an `/analyze` call can fail.  All variants surface to the caller
/// as `{"error": "<message>"}`; none are retried.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Required environment configuration is absent.
    #[error("{0}")]
    Config(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Empty input")]
    EmptyInput,
    #[error("Invalid request body: {0}")]
    InvalidBody(String),
    #[error("Request too large (body exceeded limit {0} bytes)")]
    PayloadTooLarge(usize),
    /// OAuth exchange failed (status, body or shape).
    #[error("{0}")]
    UpstreamAuth(String),
    /// Completion request failed or its envelope had no usable content.
    #[error("{0}")]
    UpstreamChat(String),
    /// Model reply could not be recovered as JSON.
    #[error("Model did not return JSON")]
    Extraction,
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Unauthorized => StatusCode::UNAUTHORIZED,
            RelayError::EmptyInput | RelayError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            RelayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::Config(_)
            | RelayError::UpstreamAuth(_)
            | RelayError::UpstreamChat(_)
            | RelayError::Extraction => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Cut an upstream body to [`ERROR_BODY_LIMIT`] characters without splitting
/// a UTF-8 sequence.
pub fn truncate_body(text: &str) -> &str {
    match text.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
