//! Usage: Loopback redirect listener for the interactive authorization-code flow.

use super::error_code::AuthErrorCode;
use crate::shared::error::AppResult;
use crate::shared::security::constant_time_eq;
use reqwest::Url;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

/// Bound on reading one request line from an accepted connection.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

const SUCCESS_HTML: &str =
    "<html><body><h1>Signed in</h1><p>You may close this window and return to the app.</p></body></html>";
const ERROR_HTML: &str =
    "<html><body><h1>Sign-in failed</h1><p>You may close this window and retry.</p></body></html>";
const NOT_FOUND_HTML: &str = "<html><body><h1>Not found</h1></body></html>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CallbackPayload {
    pub(crate) code: Option<String>,
    pub(crate) state: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) error_description: Option<String>,
}

impl CallbackPayload {
    /// Maps the redirect to the authorization code, or to the failure the identity
    /// platform reported.
    pub(crate) fn into_code(self) -> AppResult<String> {
        if let Some(error) = self.error {
            let detail = self
                .error_description
                .map(|d| format!("{error}: {d}"))
                .unwrap_or_else(|| error.clone());
            if error == "access_denied" {
                return Err(AuthErrorCode::SignInCancelled.error(detail));
            }
            return Err(AuthErrorCode::Callback.error(detail));
        }
        match self.code {
            Some(code) if !code.is_empty() => Ok(code),
            _ => Err(AuthErrorCode::Callback.error("redirect carried no authorization code")),
        }
    }
}

#[derive(Debug)]
pub(crate) struct CallbackListener {
    port: u16,
    listener_v4: Option<TcpListener>,
    listener_v6: Option<TcpListener>,
}

impl CallbackListener {
    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    async fn accept(&mut self) -> std::io::Result<TcpStream> {
        let (socket, _) = match (self.listener_v4.as_mut(), self.listener_v6.as_mut()) {
            (Some(v4), Some(v6)) => {
                tokio::select! {
                    result = v4.accept() => result?,
                    result = v6.accept() => result?,
                }
            }
            (Some(v4), None) => v4.accept().await?,
            (None, Some(v6)) => v6.accept().await?,
            (None, None) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "no loopback listener bound",
                ))
            }
        };
        Ok(socket)
    }
}

/// Binds the redirect listener on IPv4 and IPv6 loopback. A busy preferred port falls
/// back to a dynamic one; `0` always picks a dynamic port.
pub(crate) async fn bind_callback_listener(preferred_port: u16) -> AppResult<CallbackListener> {
    match try_bind_on_port(preferred_port).await {
        Ok(bound) => Ok(bound),
        Err(preferred_err) if preferred_port == 0 => Err(AuthErrorCode::Callback
            .error(format!("redirect listener bind failed: {preferred_err}"))),
        Err(preferred_err) => match try_bind_on_port(0).await {
            Ok(bound) => {
                tracing::debug!(
                    preferred_port,
                    port = bound.port,
                    "preferred redirect port busy; using dynamic port"
                );
                Ok(bound)
            }
            Err(fallback_err) => Err(AuthErrorCode::Callback.error(format!(
                "redirect listener bind failed: {preferred_err}; fallback_dynamic_port: {fallback_err}"
            ))),
        },
    }
}

async fn try_bind_on_port(port: u16) -> Result<CallbackListener, String> {
    if port == 0 {
        return try_bind_dynamic_port().await;
    }

    let mut bind_errors: Vec<String> = Vec::new();
    let listener_v4 = match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => Some(listener),
        Err(err) => {
            bind_errors.push(format!("127.0.0.1:{port} ({err})"));
            None
        }
    };
    let listener_v6 = match TcpListener::bind(("::1", port)).await {
        Ok(listener) => Some(listener),
        Err(err) => {
            bind_errors.push(format!("::1:{port} ({err})"));
            None
        }
    };
    if listener_v4.is_none() && listener_v6.is_none() {
        return Err(bind_errors.join("; "));
    }

    Ok(CallbackListener {
        port,
        listener_v4,
        listener_v6,
    })
}

async fn try_bind_dynamic_port() -> Result<CallbackListener, String> {
    let mut bind_errors: Vec<String> = Vec::new();

    match TcpListener::bind(("127.0.0.1", 0)).await {
        Ok(listener_v4) => {
            let port = listener_v4
                .local_addr()
                .map_err(|e| format!("127.0.0.1:0 (local_addr failed: {e})"))?
                .port();
            // Browsers may resolve `localhost` to ::1; the v6 side is best effort.
            let listener_v6 = TcpListener::bind(("::1", port)).await.ok();
            return Ok(CallbackListener {
                port,
                listener_v4: Some(listener_v4),
                listener_v6,
            });
        }
        Err(err) => bind_errors.push(format!("127.0.0.1:0 ({err})")),
    }

    match TcpListener::bind(("::1", 0)).await {
        Ok(listener_v6) => {
            let port = listener_v6
                .local_addr()
                .map_err(|e| format!("::1:0 (local_addr failed: {e})"))?
                .port();
            let listener_v4 = TcpListener::bind(("127.0.0.1", port)).await.ok();
            return Ok(CallbackListener {
                port,
                listener_v4,
                listener_v6: Some(listener_v6),
            });
        }
        Err(err) => bind_errors.push(format!("::1:0 ({err})")),
    }

    Err(bind_errors.join("; "))
}

/// Serves the loopback listener until the redirect for `expected_path` arrives.
///
/// Requests for other paths (favicon probes and the like) get a 404 and the wait
/// continues. Connections are read concurrently, so a connection that never sends
/// a request does not block later ones. The whole wait is bounded by `timeout`.
pub(crate) async fn wait_for_callback(
    mut listener: CallbackListener,
    expected_path: &str,
    expected_state: &str,
    timeout: Duration,
) -> AppResult<CallbackPayload> {
    let mut reads: JoinSet<(TcpStream, AppResult<String>)> = JoinSet::new();
    let serve = async {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let mut socket = accepted.map_err(|e| {
                        AuthErrorCode::Callback.error(format!("redirect accept failed: {e}"))
                    })?;
                    // Each connection is read on its own task; an idle preconnect must not
                    // hold up the redirect queued behind it.
                    reads.spawn(async move {
                        let target = match tokio::time::timeout(
                            REQUEST_READ_TIMEOUT,
                            read_request_target(&mut socket),
                        )
                        .await
                        {
                            Ok(target) => target,
                            Err(_) => Err(AuthErrorCode::Callback.error("redirect read timed out")),
                        };
                        (socket, target)
                    });
                }
                Some(joined) = reads.join_next(), if !reads.is_empty() => {
                    let (mut socket, target) = match joined {
                        Ok(read) => read,
                        Err(err) => {
                            tracing::debug!("redirect read task failed: {err}");
                            continue;
                        }
                    };
                    let target = match target {
                        Ok(target) => target,
                        Err(err) => {
                            tracing::debug!("ignoring malformed redirect request: {err}");
                            respond(&mut socket, "400 Bad Request", ERROR_HTML).await;
                            continue;
                        }
                    };

                    let payload = match parse_callback_target(&target, expected_path) {
                        Ok(Some(payload)) => payload,
                        Ok(None) => {
                            respond(&mut socket, "404 Not Found", NOT_FOUND_HTML).await;
                            continue;
                        }
                        Err(err) => {
                            respond(&mut socket, "400 Bad Request", ERROR_HTML).await;
                            return Err(err);
                        }
                    };

                    if let Err(err) = validate_state(&payload, expected_state) {
                        respond(&mut socket, "400 Bad Request", ERROR_HTML).await;
                        return Err(err);
                    }

                    if payload.error.is_some() {
                        respond(&mut socket, "400 Bad Request", ERROR_HTML).await;
                    } else {
                        respond(&mut socket, "200 OK", SUCCESS_HTML).await;
                    }
                    return Ok(payload);
                }
            }
        }
    };

    tokio::time::timeout(timeout, serve).await.map_err(|_| {
        AuthErrorCode::SignInTimeout.error(format!(
            "no redirect received within {}s",
            timeout.as_secs()
        ))
    })?
}

async fn read_request_target(socket: &mut TcpStream) -> AppResult<String> {
    let mut buffer = vec![0u8; 8192];
    let size = socket
        .read(&mut buffer)
        .await
        .map_err(|e| AuthErrorCode::Callback.error(format!("redirect read failed: {e}")))?;
    if size == 0 {
        return Err(AuthErrorCode::Callback.error("redirect request is empty"));
    }

    let request = String::from_utf8_lossy(&buffer[..size]);
    let first = request
        .lines()
        .next()
        .ok_or_else(|| AuthErrorCode::Callback.error("malformed redirect request"))?;
    let mut parts = first.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();
    if method != "GET" || target.is_empty() {
        return Err(AuthErrorCode::Callback.error("redirect request must be GET"));
    }
    Ok(target.to_string())
}

async fn respond(socket: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Parses a request target. `Ok(None)` means the path is not the redirect path.
pub(crate) fn parse_callback_target(
    target: &str,
    expected_path: &str,
) -> AppResult<Option<CallbackPayload>> {
    let url = Url::parse(&format!("http://127.0.0.1{target}"))
        .map_err(|e| AuthErrorCode::Callback.error(format!("invalid redirect target: {e}")))?;
    if url.path() != expected_path {
        return Ok(None);
    }

    let mut payload = CallbackPayload {
        code: None,
        state: None,
        error: None,
        error_description: None,
    };
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => payload.code = Some(value.into_owned()),
            "state" => payload.state = Some(value.into_owned()),
            "error" => payload.error = Some(value.into_owned()),
            "error_description" => payload.error_description = Some(value.into_owned()),
            _ => {}
        }
    }

    if payload.code.is_none() && payload.error.is_none() {
        return Err(AuthErrorCode::Callback.error("redirect missing code/error"));
    }
    Ok(Some(payload))
}

fn validate_state(payload: &CallbackPayload, expected_state: &str) -> AppResult<()> {
    let state = payload
        .state
        .as_deref()
        .ok_or_else(|| AuthErrorCode::Callback.error("redirect missing state"))?;
    if !constant_time_eq(state.as_bytes(), expected_state.as_bytes()) {
        return Err("SEC_INVALID_INPUT: redirect state mismatch".into());
    }
    Ok(())
}
