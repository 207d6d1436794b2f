//! OAuth bearer token acquisition and caching.
//!
//! A single [`TokenCache`] lives in the application state.  Tokens are
//! reused until they come within [`REFRESH_MARGIN_SECS`] of their expiry,
//! after which the next caller performs a fresh credential exchange.
//! Concurrent refreshes are tolerated: both exchanges succeed and the last
//! write wins.

use std::sync::Mutex;

use serde_json::Value;

use crate::config::OAuthCredentials;
use crate::error::{truncate_body, RelayError};

/// A cached token is only handed out while `now + margin < expires_at`.
pub const REFRESH_MARGIN_SECS: i64 = 120;

/// Values above this are taken to be epoch milliseconds.
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub value: String,
    /// Absolute expiry, unix seconds.
    pub expires_at: i64,
}

impl CachedToken {
    pub fn is_fresh(&self, now: i64) -> bool {
        now + REFRESH_MARGIN_SECS < self.expires_at
    }
}

/// Process-wide token slot.  The lock only guards a read or a replace and is
/// never held across an await point.
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached token value if it is still fresh at `now`.
    pub fn current(&self, now: i64) -> Option<String> {
        let guard = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .filter(|tok| tok.is_fresh(now))
            .map(|tok| tok.value.clone())
    }

    pub fn store(&self, token: CachedToken) {
        let mut guard = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(token);
    }

    pub fn snapshot(&self) -> Option<CachedToken> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Anything able to hand out a bearer token for the chat endpoint.
#[async_trait::async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, RelayError>;
}

/// Exchanges client credentials at the OAuth endpoint and memoizes the
/// result in a [`TokenCache`].
pub struct OAuthTokenProvider {
    client: reqwest::Client,
    url: String,
    credentials: OAuthCredentials,
    cache: TokenCache,
}

impl OAuthTokenProvider {
    pub fn new(client: reqwest::Client, url: String, credentials: OAuthCredentials) -> Self {
        Self {
            client,
            url,
            credentials,
            cache: TokenCache::new(),
        }
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    async fn exchange(&self) -> Result<CachedToken, RelayError> {
        let (client_id, client_secret, scope) = match (
            self.credentials.client_id.as_deref(),
            self.credentials.client_secret.as_deref(),
            self.credentials.scope.as_deref(),
        ) {
            (Some(id), Some(secret), Some(scope)) => (id, secret, scope),
            _ => {
                return Err(RelayError::Config(
                    "Missing GIGACHAT_CLIENT_ID / GIGACHAT_CLIENT_SECRET / GIGACHAT_SCOPE"
                        .to_string(),
                ))
            }
        };

        let rq_uid = uuid::Uuid::new_v4().to_string();
        let resp = self
            .client
            .post(&self.url)
            .header("accept", "application/json")
            .header("RqUID", rq_uid.as_str())
            .basic_auth(client_id, Some(client_secret))
            .form(&[("scope", scope)])
            .send()
            .await
            .map_err(|e| RelayError::UpstreamAuth(format!("OAuth request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| RelayError::UpstreamAuth(format!("OAuth read failed: {e}")))?;
        if !status.is_success() {
            return Err(RelayError::UpstreamAuth(format!(
                "OAuth {}: {}",
                status.as_u16(),
                truncate_body(&text)
            )));
        }

        let data: Value = serde_json::from_str(&text).map_err(|e| {
            RelayError::UpstreamAuth(format!("OAuth response is not JSON: {e}"))
        })?;
        parse_token_response(&data).ok_or_else(|| {
            RelayError::UpstreamAuth(format!(
                "Unexpected OAuth response: {}",
                truncate_body(&text)
            ))
        })
    }
}

#[async_trait::async_trait]
impl AccessTokenSource for OAuthTokenProvider {
    async fn access_token(&self) -> Result<String, RelayError> {
        if let Some(token) = self.cache.current(now_secs()) {
            return Ok(token);
        }
        let fresh = self.exchange().await?;
        tracing::debug!(expires_at = fresh.expires_at, "access token refreshed");
        let value = fresh.value.clone();
        self.cache.store(fresh);
        Ok(value)
    }
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Pull `access_token` and `expires_at` out of an OAuth reply.  Empty tokens
/// and zero expiries are treated as missing.
fn parse_token_response(data: &Value) -> Option<CachedToken> {
    let value = data
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())?;
    let raw_expiry = match data.get("expires_at")? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    if raw_expiry == 0 {
        return None;
    }
    let expires_at = if raw_expiry > MILLIS_THRESHOLD {
        raw_expiry / 1000
    } else {
        raw_expiry
    };
    Some(CachedToken {
        value: value.to_string(),
        expires_at,
    })
}
