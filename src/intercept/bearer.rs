//! Usage: Attach the bearer credential to a forwarded request.

use super::error_code::InterceptErrorCode;
use crate::shared::error::AppResult;
use crate::shared::security::redact_authorization;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

/// Sets exactly one `Authorization: Bearer <token>` header, dropping any prior values.
pub fn attach_bearer(headers: &mut HeaderMap, token: &str) -> AppResult<()> {
    if token.trim().is_empty() {
        return Err(InterceptErrorCode::Translation.error("token supplier returned an empty token"));
    }

    let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
        InterceptErrorCode::Translation.error(format!("token is not a valid header value: {e}"))
    })?;
    value.set_sensitive(true);

    for stale in headers.get_all(AUTHORIZATION) {
        tracing::debug!(
            replaced = %redact_authorization(&String::from_utf8_lossy(stale.as_bytes())),
            "dropping authorization header set by the page"
        );
    }
    // `insert` replaces every existing value for the name.
    headers.insert(AUTHORIZATION, value);
    Ok(())
}
