//! Usage: Translate between content-view requests/responses and reqwest types.

use super::error_code::InterceptErrorCode;
use super::request::{RequestContent, WebResourceRequest};
use super::response::{serialize_headers, WebResourceResponse};
use crate::shared::error::AppResult;
use crate::shared::security::is_sensitive_header;
use reqwest::header::{HeaderName, HeaderValue};
use std::io::{Cursor, Seek, Write};

/// Upper bound on the buffer reserved up front from `Content-Length`.
const MAX_PREALLOCATED_BODY_BYTES: u64 = 4 * 1024 * 1024;

/// Converts a content-view request into a request the HTTP client can send.
///
/// Headers are copied in order (repeats are appended); content is wrapped as a
/// streaming body and only read when the request is sent.
pub fn to_http_request(request: WebResourceRequest) -> AppResult<reqwest::Request> {
    let WebResourceRequest {
        method,
        uri,
        headers,
        content,
    } = request;

    let method = reqwest::Method::from_bytes(method.trim().as_bytes()).map_err(|e| {
        InterceptErrorCode::Translation.error(format!("invalid request method {method:?}: {e}"))
    })?;
    let url = reqwest::Url::parse(uri.trim()).map_err(|e| {
        InterceptErrorCode::Translation.error(format!("invalid request uri {uri:?}: {e}"))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(InterceptErrorCode::Translation
            .error(format!("unsupported request scheme {:?}", url.scheme())));
    }

    let mut out = reqwest::Request::new(method, url);
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|e| {
            InterceptErrorCode::Translation.error(format!("invalid header name {name:?}: {e}"))
        })?;
        let mut header_value = HeaderValue::from_str(&value).map_err(|e| {
            InterceptErrorCode::Translation
                .error(format!("invalid value for header {header_name}: {e}"))
        })?;
        header_value.set_sensitive(is_sensitive_header(header_name.as_str()));
        out.headers_mut().append(header_name, header_value);
    }

    if let Some(content) = content {
        *out.body_mut() = Some(content.into_body());
    }

    Ok(out)
}

/// Converts a client request back into the content-view shape.
///
/// Only in-memory bodies can be recovered; streaming bodies are rejected.
pub fn to_web_resource_request(request: &reqwest::Request) -> AppResult<WebResourceRequest> {
    let mut headers = Vec::with_capacity(request.headers().len());
    for (name, value) in request.headers() {
        let value = value.to_str().map_err(|e| {
            InterceptErrorCode::Translation.error(format!("header {name} is not text: {e}"))
        })?;
        headers.push((name.as_str().to_string(), value.to_string()));
    }

    let content = match request.body() {
        None => None,
        Some(body) => {
            let bytes = body.as_bytes().ok_or_else(|| {
                InterceptErrorCode::Translation
                    .error("streaming request body cannot be converted back")
            })?;
            Some(RequestContent::from(bytes.to_vec()))
        }
    };

    Ok(WebResourceRequest {
        method: request.method().as_str().to_string(),
        uri: request.url().as_str().to_string(),
        headers,
        content,
    })
}

/// Buffers the response body into a seekable stream rewound to offset 0 and
/// builds the content-view response.
pub async fn to_web_resource_response(
    mut response: reqwest::Response,
) -> AppResult<WebResourceResponse> {
    let status = response.status();
    let reason_phrase = status.canonical_reason().unwrap_or_default().to_string();
    let headers = serialize_headers(response.headers());

    let capacity = response
        .content_length()
        .map(|len| len.min(MAX_PREALLOCATED_BODY_BYTES) as usize)
        .unwrap_or_default();
    let mut content = Cursor::new(Vec::with_capacity(capacity));

    while let Some(chunk) = response.chunk().await.map_err(|e| {
        InterceptErrorCode::Translation
            .error(format!("failed to read response body: {e}"))
            .with_source(e)
    })? {
        content.write_all(&chunk).map_err(|e| {
            InterceptErrorCode::Translation.error(format!("failed to buffer response body: {e}"))
        })?;
    }

    // Writing leaves the cursor at the end; the content view reads from position 0.
    content.rewind().map_err(|e| {
        InterceptErrorCode::Translation.error(format!("failed to rewind response body: {e}"))
    })?;

    tracing::trace!(
        status = status.as_u16(),
        body_bytes = content.get_ref().len(),
        "response translated"
    );

    Ok(WebResourceResponse::new(
        status.as_u16(),
        reason_phrase,
        headers,
        content,
    ))
}
