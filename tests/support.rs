#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::ffi::OsString;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Form, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_core::future::BoxFuture;
use webview_native_auth_lib::{AppResult, HttpForwarder, InteractiveContext, SignInPrompt, TokenSupplier};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Serializes environment mutation across tests and restores previous values on drop.
pub struct EnvGuard {
    saved: Vec<(String, Option<OsString>)>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvGuard {
    pub fn new() -> Self {
        Self {
            saved: Vec::new(),
            _lock: env_lock(),
        }
    }

    fn save_once(&mut self, key: &str) {
        if self.saved.iter().any(|(k, _)| k == key) {
            return;
        }
        self.saved.push((key.to_string(), std::env::var_os(key)));
    }

    pub fn set_var(&mut self, key: &str, value: impl Into<OsString>) {
        self.save_once(key);
        std::env::set_var(key, value.into());
    }

    pub fn remove_var(&mut self, key: &str) {
        self.save_once(key);
        std::env::remove_var(key);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in self.saved.drain(..).rev() {
            match value {
                Some(v) => std::env::set_var(&key, v),
                None => std::env::remove_var(&key),
            }
        }
    }
}

pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    addr
}

// ---------------------------------------------------------------------------
// Fake Graph
// ---------------------------------------------------------------------------

async fn me(headers: HeaderMap) -> impl IntoResponse {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer abc123");
    if authorized {
        (StatusCode::OK, Json(serde_json::json!({"id": "1"}))).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": {"code": "InvalidAuthenticationToken"}})),
        )
            .into_response()
    }
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let values = |name: &str| -> Vec<String> {
        headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    };
    let payload = serde_json::json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "authorization": values("authorization"),
        "x_trace": values("x-trace"),
        "body": String::from_utf8_lossy(&body),
    });
    (
        StatusCode::OK,
        [("x-echo", "1")],
        Json(payload),
    )
}

/// `/v1.0/me` answers `{"id":"1"}` for `Bearer abc123`; every other path echoes the request.
pub async fn spawn_fake_graph() -> SocketAddr {
    let router = Router::new().route("/v1.0/me", get(me)).fallback(echo);
    serve(router).await
}

// ---------------------------------------------------------------------------
// Token suppliers
// ---------------------------------------------------------------------------

pub struct FixedToken {
    token: String,
    pub calls: AtomicUsize,
}

impl FixedToken {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl TokenSupplier for FixedToken {
    fn get_token<'a>(&'a self, _ctx: &'a InteractiveContext) -> BoxFuture<'a, AppResult<String>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.token.clone())
        })
    }
}

/// Hands out the queued tokens in call order, sleeping the paired delay first.
pub struct ScriptedTokens {
    script: Mutex<VecDeque<(String, Duration)>>,
}

impl ScriptedTokens {
    pub fn new(script: &[(&str, Duration)]) -> Self {
        Self {
            script: Mutex::new(
                script
                    .iter()
                    .map(|(token, delay)| (token.to_string(), *delay))
                    .collect(),
            ),
        }
    }
}

impl TokenSupplier for ScriptedTokens {
    fn get_token<'a>(&'a self, _ctx: &'a InteractiveContext) -> BoxFuture<'a, AppResult<String>> {
        Box::pin(async move {
            let next = self.script.lock().expect("script lock").pop_front();
            let (token, delay) = next.ok_or_else(|| "AUTH_TOKEN_ENDPOINT: script exhausted".to_string())?;
            tokio::time::sleep(delay).await;
            Ok(token)
        })
    }
}

pub struct RejectingSupplier;

impl TokenSupplier for RejectingSupplier {
    fn get_token<'a>(&'a self, _ctx: &'a InteractiveContext) -> BoxFuture<'a, AppResult<String>> {
        Box::pin(async { Err("AUTH_SIGN_IN_CANCELLED: user closed the sign-in window".into()) })
    }
}

// ---------------------------------------------------------------------------
// Forwarder double
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header_values(&self, name: &str) -> Vec<String> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
            .collect()
    }
}

/// Records forwarded requests and answers each with the same canned response.
pub struct RecordingForwarder {
    status: u16,
    content_type: &'static str,
    body: &'static str,
    pub requests: Mutex<Vec<RecordedRequest>>,
}

impl RecordingForwarder {
    pub fn new(status: u16, content_type: &'static str, body: &'static str) -> Self {
        Self {
            status,
            content_type,
            body,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl HttpForwarder for RecordingForwarder {
    fn send(&self, request: reqwest::Request) -> BoxFuture<'_, AppResult<reqwest::Response>> {
        Box::pin(async move {
            let recorded = RecordedRequest {
                method: request.method().to_string(),
                uri: request.url().to_string(),
                headers: request
                    .headers()
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                    .collect(),
                body: request
                    .body()
                    .and_then(|b| b.as_bytes())
                    .map(<[u8]>::to_vec)
                    .unwrap_or_default(),
            };
            self.requests.lock().expect("requests lock").push(recorded);

            let response = http::Response::builder()
                .status(self.status)
                .header("content-type", self.content_type)
                .body(self.body.as_bytes().to_vec())
                .expect("canned response");
            Ok(reqwest::Response::from(response))
        })
    }
}

/// Answers 200 with a body that breaks off after a few bytes.
pub struct BrokenBodyForwarder;

struct ResetAfterPrefix {
    sent: bool,
}

impl tokio::io::AsyncRead for ResetAfterPrefix {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        if self.sent {
            return std::task::Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )));
        }
        self.sent = true;
        buf.put_slice(b"{\"value\":[");
        std::task::Poll::Ready(Ok(()))
    }
}

impl HttpForwarder for BrokenBodyForwarder {
    fn send(&self, _request: reqwest::Request) -> BoxFuture<'_, AppResult<reqwest::Response>> {
        Box::pin(async move {
            let body = reqwest::Body::wrap_stream(tokio_util::io::ReaderStream::new(
                ResetAfterPrefix { sent: false },
            ));
            let response = http::Response::builder()
                .status(200)
                .header("content-type", "application/json")
                .body(body)
                .expect("broken response");
            Ok(reqwest::Response::from(response))
        })
    }
}

// ---------------------------------------------------------------------------
// Fake identity platform
// ---------------------------------------------------------------------------

pub const TEST_CLIENT_ID: &str = "test-client";
pub const GOOD_CODE: &str = "good-code";

#[derive(Default)]
struct TokenEndpointState {
    grants: Mutex<Vec<HashMap<String, String>>>,
    refreshes: AtomicUsize,
    expires_in: AtomicI64,
}

#[derive(Clone)]
pub struct FakeTokenEndpoint {
    pub addr: SocketAddr,
    state: Arc<TokenEndpointState>,
}

impl FakeTokenEndpoint {
    pub async fn spawn() -> Self {
        let state = Arc::new(TokenEndpointState::default());
        state.expires_in.store(3600, Ordering::SeqCst);
        let router = Router::new()
            .route("/common/oauth2/v2.0/token", post(token))
            .with_state(state.clone());
        let addr = serve(router).await;
        Self { addr, state }
    }

    pub fn authority_host(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Lifetime reported for the next issued access tokens.
    pub fn set_expires_in(&self, seconds: i64) {
        self.state.expires_in.store(seconds, Ordering::SeqCst);
    }

    pub fn grants(&self) -> Vec<HashMap<String, String>> {
        self.state.grants.lock().expect("grants lock").clone()
    }

    pub fn grant_types(&self) -> Vec<String> {
        self.grants()
            .iter()
            .map(|g| g.get("grant_type").cloned().unwrap_or_default())
            .collect()
    }
}

async fn token(
    State(state): State<Arc<TokenEndpointState>>,
    Form(form): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    state.grants.lock().expect("grants lock").push(form.clone());
    let expires_in = state.expires_in.load(Ordering::SeqCst);

    if form.get("client_id").map(String::as_str) != Some(TEST_CLIENT_ID) {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "invalid_client"})),
        );
    }

    match form.get("grant_type").map(String::as_str) {
        Some("authorization_code") => {
            let code_ok = form.get("code").map(String::as_str) == Some(GOOD_CODE);
            let verifier_ok = form.get("code_verifier").is_some_and(|v| v.len() >= 43);
            if !code_ok || !verifier_ok {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"error": "invalid_grant"})),
                );
            }
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "token_type": "Bearer",
                    "access_token": "at-interactive",
                    "refresh_token": "rt-1",
                    "expires_in": expires_in,
                })),
            )
        }
        Some("refresh_token") => match form.get("refresh_token").map(String::as_str) {
            Some("rt-revoked") => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "invalid_grant",
                    "error_description": "AADSTS70008: The refresh token has expired"
                })),
            ),
            Some(_) => {
                let n = state.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
                (
                    StatusCode::OK,
                    Json(serde_json::json!({
                        "token_type": "Bearer",
                        "access_token": format!("at-refreshed-{n}"),
                        "expires_in": expires_in,
                    })),
                )
            }
            None => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "invalid_request"})),
            ),
        },
        _ => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "unsupported_grant_type"})),
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptBehavior {
    /// Follows the redirect with a valid code, like a user finishing sign-in.
    Approve,
    /// Follows the redirect with `error=access_denied`.
    Deny,
    /// Never follows the redirect.
    Ignore,
}

/// Stands in for the browser: reads the authorize URL and drives the loopback redirect.
pub struct TestPrompt {
    behavior: PromptBehavior,
    pub presented: AtomicUsize,
    pub last_url: Mutex<Option<reqwest::Url>>,
}

impl TestPrompt {
    pub fn new(behavior: PromptBehavior) -> Self {
        Self {
            behavior,
            presented: AtomicUsize::new(0),
            last_url: Mutex::new(None),
        }
    }
}

impl SignInPrompt for TestPrompt {
    fn present<'a>(&'a self, authorize_url: &'a reqwest::Url) -> BoxFuture<'a, AppResult<()>> {
        Box::pin(async move {
            self.presented.fetch_add(1, Ordering::SeqCst);
            *self.last_url.lock().expect("url lock") = Some(authorize_url.clone());

            let query: HashMap<String, String> = authorize_url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            let mut redirect =
                reqwest::Url::parse(query.get("redirect_uri").expect("redirect_uri")).expect("url");
            redirect.set_host(Some("127.0.0.1")).expect("host");
            let state = query.get("state").expect("state");

            match self.behavior {
                PromptBehavior::Approve => {
                    redirect
                        .query_pairs_mut()
                        .append_pair("code", GOOD_CODE)
                        .append_pair("state", state);
                }
                PromptBehavior::Deny => {
                    redirect
                        .query_pairs_mut()
                        .append_pair("error", "access_denied")
                        .append_pair("error_description", "the user declined")
                        .append_pair("state", state);
                }
                PromptBehavior::Ignore => return Ok(()),
            }

            reqwest::get(redirect).await.expect("follow redirect");
            Ok(())
        })
    }
}
