//! Core library for the news analyst relay.  Wires the token provider,
//! chat client and reply normalization behind two HTTP handlers.

pub mod chat;
mod config;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod token;

pub use config::{AppConfig, OAuthCredentials};
pub use error::{ErrorResponse, RelayError};
pub use normalize::AnalysisResult;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{
    rejection::{BytesRejection, FailedToBufferBody},
    DefaultBodyLimit, State,
};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;

use crate::chat::ChatClient;
use crate::token::{AccessTokenSource, OAuthTokenProvider};

/// Header carrying the caller's shared secret.
pub const APP_SECRET_HEADER: &str = "x-app-secret";

/// One news item to classify.  Missing fields read as empty strings.
#[derive(Debug, Serialize, Default, Clone, PartialEq, Eq)]
pub struct AnalyzeRequest {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

impl AnalyzeRequest {
    /// Read the three fields from a decoded body.  A body that is not an
    /// object carries no fields.
    pub fn from_value(body: &Value) -> Self {
        let field = |name: &str| body.get(name).map(field_text).unwrap_or_default();
        match body {
            Value::Object(_) => Self {
                title: field("title"),
                snippet: field("snippet"),
                url: field("url"),
            },
            _ => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.snippet.is_empty() && self.url.is_empty()
    }
}

/// `null`, `false` and zero read as empty; strings are taken verbatim and
/// anything else is rendered as text.
fn field_text(value: &Value) -> String {
    match value {
        Value::Null | Value::Bool(false) => String::new(),
        Value::Number(n) if n.as_f64() == Some(0.0) => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Shared state handed to every handler invocation.
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<dyn AccessTokenSource>,
    pub chat: Arc<ChatClient>,
    pub app_secret: Option<String>,
    pub max_request_bytes: usize,
    pub port: u16,
}

impl AppState {
    /// Build state from parsed configuration, creating the OAuth provider
    /// and chat client over one shared HTTP client.
    pub fn from_config(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let client = http_client(config.upstream_timeout_ms)?;
        let tokens = OAuthTokenProvider::new(
            client.clone(),
            config.oauth_url.clone(),
            config.credentials.clone(),
        );
        Ok(Self::with_token_source(config, client, Arc::new(tokens)))
    }

    /// Same as [`AppState::from_config`] but with a caller-supplied token
    /// source.
    pub fn with_token_source(
        config: &AppConfig,
        client: reqwest::Client,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Self {
        Self {
            tokens,
            chat: Arc::new(ChatClient::new(client, config.chat_url.clone())),
            app_secret: config.app_secret.clone(),
            max_request_bytes: config.max_request_bytes,
            port: config.port,
        }
    }
}

pub fn http_client(timeout_ms: Option<u64>) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder();
    if let Some(ms) = timeout_ms {
        builder = builder.timeout(Duration::from_millis(ms));
    }
    builder.build()
}

/// Build state from environment variables.  See [`AppConfig::from_env`] for
/// the variables read.
pub async fn build_state_from_env() -> Result<AppState, Box<dyn std::error::Error>> {
    let config = AppConfig::from_env().map_err(|e| -> Box<dyn std::error::Error> { e.into() })?;
    if config.app_secret.is_none() {
        tracing::warn!("APP_SECRET not set; /analyze will reject every request");
    }
    Ok(AppState::from_config(&config)?)
}

/// Build the Axum router and attach handlers.
pub fn app(state: AppState) -> Router {
    let limit = state.max_request_bytes;
    Router::new()
        .route("/health", get(health_handler))
        .route("/analyze", post(analyze_handler))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

async fn health_handler() -> Response {
    (StatusCode::OK, Json(serde_json::json!({ "ok": true }))).into_response()
}

fn ensure_authorized(headers: &HeaderMap, app_secret: Option<&str>) -> Result<(), RelayError> {
    let expected = app_secret.ok_or(RelayError::Unauthorized)?;
    let supplied = headers
        .get(APP_SECRET_HEADER)
        .map(|v| v.as_bytes())
        .ok_or(RelayError::Unauthorized)?;
    if supplied != expected.as_bytes() {
        return Err(RelayError::Unauthorized);
    }
    Ok(())
}

/// Handler for `/analyze`.  Gates on the shared secret and input, then
/// fetches a token, asks the model and normalizes its reply.
async fn analyze_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    if let Err(err) = ensure_authorized(&headers, state.app_secret.as_deref()) {
        tracing::debug!("rejected /analyze call: bad or missing shared secret");
        return err.into_response();
    }

    let req = match decode_body(&state, &headers, body) {
        Ok(req) => req,
        Err(err) => return err.into_response(),
    };
    if req.is_empty() {
        return RelayError::EmptyInput.into_response();
    }

    match analyze(&state, &req).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "analysis failed");
            err.into_response()
        }
    }
}

/// Token, completion, JSON recovery and normalization for one validated
/// request.
pub async fn analyze(state: &AppState, req: &AnalyzeRequest) -> Result<AnalysisResult, RelayError> {
    let token = state.tokens.access_token().await?;
    let content = state.chat.complete(&token, req).await?;
    let reply = extract::recover_json(&content)?;
    Ok(normalize::normalize(&reply, &req.title))
}

/// Decode the request body.  Bodies not declared as JSON and empty bodies
/// carry no fields; only syntactically broken JSON is rejected.
fn decode_body(
    state: &AppState,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<AnalyzeRequest, RelayError> {
    let bytes = match body {
        Ok(bytes) => bytes,
        Err(BytesRejection::FailedToBufferBody(FailedToBufferBody::LengthLimitError(_))) => {
            tracing::warn!(limit = state.max_request_bytes, "request body exceeded configured limit");
            return Err(RelayError::PayloadTooLarge(state.max_request_bytes));
        }
        Err(other) => return Err(RelayError::InvalidBody(other.body_text())),
    };
    if !is_json_content_type(headers) || bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(AnalyzeRequest::default());
    }
    let value: Value =
        serde_json::from_slice(&bytes).map_err(|e| RelayError::InvalidBody(e.to_string()))?;
    Ok(AnalyzeRequest::from_value(&value))
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    let Some(raw) = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let mime = raw.split(';').next().unwrap_or("").trim();
    mime.eq_ignore_ascii_case("application/json")
        || mime.to_ascii_lowercase().ends_with("+json")
}
