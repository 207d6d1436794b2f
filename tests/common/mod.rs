#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use http_body_util::BodyExt;
use news_analyst::token::AccessTokenSource;
use news_analyst::{AppConfig, OAuthCredentials, RelayError};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

pub const SECRET: &str = "relay-secret";

/// Tracks environment variable mutations and restores originals on drop.
pub struct EnvGuard {
    originals: HashMap<String, Option<String>>,
}

impl EnvGuard {
    pub fn new() -> Self {
        Self {
            originals: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.capture(key);
        std::env::set_var(key, value);
    }

    pub fn remove(&mut self, key: &str) {
        self.capture(key);
        std::env::remove_var(key);
    }

    fn capture(&mut self, key: &str) {
        if self.originals.contains_key(key) {
            return;
        }
        let original = std::env::var(key).ok();
        self.originals.insert(key.to_string(), original);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, original) in self.originals.drain() {
            match original {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}

/// Behaviour knobs and observations shared with the mock upstream handlers.
pub struct MockState {
    pub oauth_calls: AtomicUsize,
    pub chat_calls: AtomicUsize,
    /// Seconds from "now" at which issued tokens expire.
    pub expires_in: AtomicI64,
    pub oauth_status: Mutex<StatusCode>,
    pub oauth_body: Mutex<Option<String>>,
    pub chat_status: Mutex<StatusCode>,
    pub chat_body: Mutex<Option<String>>,
    pub chat_content: Mutex<String>,
    pub last_oauth_headers: Mutex<Option<HeaderMap>>,
    pub last_oauth_form: Mutex<Option<String>>,
    pub last_chat_headers: Mutex<Option<HeaderMap>>,
    pub last_chat_request: Mutex<Option<Value>>,
}

impl MockState {
    fn new() -> Self {
        Self {
            oauth_calls: AtomicUsize::new(0),
            chat_calls: AtomicUsize::new(0),
            expires_in: AtomicI64::new(1_800),
            oauth_status: Mutex::new(StatusCode::OK),
            oauth_body: Mutex::new(None),
            chat_status: Mutex::new(StatusCode::OK),
            chat_body: Mutex::new(None),
            chat_content: Mutex::new(r#"{"direction":"рынок"}"#.to_string()),
            last_oauth_headers: Mutex::new(None),
            last_oauth_form: Mutex::new(None),
            last_chat_headers: Mutex::new(None),
            last_chat_request: Mutex::new(None),
        }
    }

    pub fn oauth_calls(&self) -> usize {
        self.oauth_calls.load(Ordering::SeqCst)
    }

    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    pub fn set_chat_content(&self, content: &str) {
        *self.chat_content.lock().unwrap() = content.to_string();
    }
}

/// OAuth and chat endpoints served from one local listener.
pub struct MockUpstream {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl MockUpstream {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::new());
        let router = Router::new()
            .route("/oauth", post(oauth))
            .route("/chat", post(chat))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn oauth_url(&self) -> String {
        format!("http://{}/oauth", self.addr)
    }

    pub fn chat_url(&self) -> String {
        format!("http://{}/chat", self.addr)
    }

    pub fn config(&self) -> AppConfig {
        AppConfig {
            credentials: OAuthCredentials {
                client_id: Some("client".into()),
                client_secret: Some("secret".into()),
                scope: Some("GIGACHAT_API_PERS".into()),
            },
            app_secret: Some(SECRET.into()),
            port: 0,
            oauth_url: self.oauth_url(),
            chat_url: self.chat_url(),
            max_request_bytes: 1024 * 1024,
            upstream_timeout_ms: Some(5_000),
        }
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn oauth(State(state): State<Arc<MockState>>, headers: HeaderMap, form: String) -> Response {
    let n = state.oauth_calls.fetch_add(1, Ordering::SeqCst) + 1;
    *state.last_oauth_headers.lock().unwrap() = Some(headers);
    *state.last_oauth_form.lock().unwrap() = Some(form);
    let status = *state.oauth_status.lock().unwrap();
    if let Some(body) = state.oauth_body.lock().unwrap().clone() {
        return (status, body).into_response();
    }
    let expires_at = chrono::Utc::now().timestamp() + state.expires_in.load(Ordering::SeqCst);
    (
        status,
        Json(json!({ "access_token": format!("token-{n}"), "expires_at": expires_at })),
    )
        .into_response()
}

async fn chat(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.chat_calls.fetch_add(1, Ordering::SeqCst);
    *state.last_chat_headers.lock().unwrap() = Some(headers);
    *state.last_chat_request.lock().unwrap() = Some(body);
    let status = *state.chat_status.lock().unwrap();
    if let Some(raw) = state.chat_body.lock().unwrap().clone() {
        return (status, raw).into_response();
    }
    let content = state.chat_content.lock().unwrap().clone();
    (
        status,
        Json(json!({
            "choices": [{ "message": { "role": "assistant", "content": content }, "index": 0 }],
            "model": "GigaChat",
            "object": "chat.completion"
        })),
    )
        .into_response()
}

/// Token source that counts calls and never touches the network.
pub struct CountingTokens {
    pub calls: AtomicUsize,
}

impl CountingTokens {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AccessTokenSource for CountingTokens {
    async fn access_token(&self) -> Result<String, RelayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("counted".to_string())
    }
}

pub fn analyze_request(secret: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/analyze")
        .header("content-type", "application/json");
    if let Some(s) = secret {
        builder = builder.header("x-app-secret", s);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn read_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
