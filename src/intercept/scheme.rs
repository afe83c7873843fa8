//! Usage: Helpers for serving intercepted requests through a custom URI scheme
//! (`graph://localhost/v1.0/me` → `{api_endpoint}/v1.0/me`).

use super::response::WebResourceResponse;
use crate::shared::error::{AppError, AppResult};
use reqwest::Url;
use serde::Serialize;

/// Response headers the host rebuilds itself; copying them would corrupt framing.
const HOP_BY_HOP_HEADERS: [&str; 5] = [
    "connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

/// Maps a custom-scheme URI onto the API endpoint, keeping path and query.
pub fn rewrite_to_endpoint(scheme_uri: &str, api_endpoint: &str) -> AppResult<String> {
    let url = Url::parse(scheme_uri)
        .map_err(|e| format!("SEC_INVALID_INPUT: invalid scheme uri {scheme_uri}: {e}"))?;
    let mut out = api_endpoint.trim().trim_end_matches('/').to_string();
    let path = url.path();
    if path.is_empty() || !path.starts_with('/') {
        out.push('/');
    }
    out.push_str(path);
    if let Some(query) = url.query() {
        out.push('?');
        out.push_str(query);
    }
    Ok(out)
}

/// Headers handed back to the page: upstream headers minus hop-by-hop ones, plus
/// permissive CORS so scripts on the app origin can read the response.
pub fn view_headers(response: &WebResourceResponse) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = response
        .header_pairs()
        .into_iter()
        .filter(|(name, _)| {
            !HOP_BY_HOP_HEADERS
                .iter()
                .any(|hop| name.eq_ignore_ascii_case(hop))
                && !name.eq_ignore_ascii_case("access-control-allow-origin")
        })
        .collect();
    headers.push(("Access-Control-Allow-Origin".to_string(), "*".to_string()));
    headers
}

/// HTTP status reported to the page when an intercepted request fails.
pub fn failure_status(err: &AppError) -> u16 {
    if err.is_cancelled() {
        return 503;
    }
    let code = err.code();
    if code.starts_with("AUTH_") {
        return 401;
    }
    if code == "SEC_INVALID_INPUT" || code == "INTERCEPT_TRANSLATION" {
        return 400;
    }
    502
}

#[derive(Debug, Serialize)]
struct FailureBody<'a> {
    code: &'a str,
    message: &'a str,
}

pub fn failure_body(err: &AppError) -> Vec<u8> {
    let body = FailureBody {
        code: err.code(),
        message: err.message(),
    };
    serde_json::to_vec(&body).unwrap_or_else(|_| err.to_string().into_bytes())
}
