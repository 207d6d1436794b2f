use std::env;

use anyhow::{anyhow, Result};

pub const DEFAULT_OAUTH_URL: &str = "https://ngw.devices.sberbank.ru:9443/api/v2/oauth";
pub const DEFAULT_CHAT_URL: &str = "https://gigachat.devices.sberbank.ru/api/v1/chat/completions";
pub const DEFAULT_PORT: u16 = 8080;
/// Matches the 1mb JSON body limit of the original deployment.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// OAuth client credentials.  Each part stays optional here; absence is
/// reported per request when a token exchange is attempted.
#[derive(Debug, Clone, Default)]
pub struct OAuthCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub credentials: OAuthCredentials,
    pub app_secret: Option<String>,
    pub port: u16,
    pub oauth_url: String,
    pub chat_url: String,
    pub max_request_bytes: usize,
    pub upstream_timeout_ms: Option<u64>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let credentials = OAuthCredentials {
            client_id: non_empty_env("GIGACHAT_CLIENT_ID"),
            client_secret: non_empty_env("GIGACHAT_CLIENT_SECRET"),
            scope: non_empty_env("GIGACHAT_SCOPE"),
        };
        let app_secret = non_empty_env("APP_SECRET");

        let port = match parse_optional_u64("PORT")? {
            Some(p) => u16::try_from(p).map_err(|_| anyhow!("PORT must fit in 0..=65535"))?,
            None => DEFAULT_PORT,
        };
        let oauth_url =
            non_empty_env("GIGACHAT_OAUTH_URL").unwrap_or_else(|| DEFAULT_OAUTH_URL.to_string());
        let chat_url =
            non_empty_env("GIGACHAT_CHAT_URL").unwrap_or_else(|| DEFAULT_CHAT_URL.to_string());
        let max_request_bytes = parse_optional_u64("MAX_REQUEST_BYTES")?
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_MAX_REQUEST_BYTES);
        let upstream_timeout_ms = parse_optional_u64("UPSTREAM_TIMEOUT_MS")?.filter(|ms| *ms > 0);

        Ok(Self {
            credentials,
            app_secret,
            port,
            oauth_url,
            chat_url,
            max_request_bytes,
            upstream_timeout_ms,
        })
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.is_empty())
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}
