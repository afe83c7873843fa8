//! Usage: Thin pass-through HTTP forwarder (no retry, no timeout override).

use super::error_code::InterceptErrorCode;
use crate::shared::error::{AppError, AppResult};
use futures_core::future::BoxFuture;

pub trait HttpForwarder: Send + Sync {
    /// Sends the request and resolves once response headers arrive; the body stays streamed.
    fn send(&self, request: reqwest::Request) -> BoxFuture<'_, AppResult<reqwest::Response>>;
}

#[derive(Debug, Clone)]
pub struct ReqwestForwarder {
    client: reqwest::Client,
}

impl ReqwestForwarder {
    pub fn new(user_agent: &str) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| {
                InterceptErrorCode::HttpClientInit.error(format!("http client init failed: {e}"))
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl HttpForwarder for ReqwestForwarder {
    fn send(&self, request: reqwest::Request) -> BoxFuture<'_, AppResult<reqwest::Response>> {
        Box::pin(async move {
            let method = request.method().clone();
            let url = request.url().clone();
            match self.client.execute(request).await {
                Ok(response) => {
                    tracing::debug!(
                        method = %method,
                        host = url.host_str().unwrap_or_default(),
                        path = url.path(),
                        status = response.status().as_u16(),
                        "forwarded request answered"
                    );
                    Ok(response)
                }
                Err(err) => {
                    tracing::warn!(
                        method = %method,
                        host = url.host_str().unwrap_or_default(),
                        path = url.path(),
                        kind = classify_transport_error(&err),
                        "forwarded request failed: {}",
                        err
                    );
                    Err(transport_error(err))
                }
            }
        })
    }
}

fn classify_transport_error(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        return "timeout";
    }
    if err.is_connect() {
        return "connect";
    }
    if err.is_body() {
        return "body";
    }
    if err.is_request() {
        return "request";
    }
    "other"
}

fn transport_error(err: reqwest::Error) -> AppError {
    InterceptErrorCode::Transport
        .error(format!("{} error: {err}", classify_transport_error(&err)))
        .with_source(err)
}
