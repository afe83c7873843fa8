//! Usage: Token endpoint helpers (authorization_code + refresh_token grants).

use super::error_code::AuthErrorCode;
use crate::shared::error::AppResult;
use crate::shared::security::mask_token;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub(crate) struct TokenExchangeRequest {
    pub(crate) token_uri: String,
    pub(crate) client_id: String,
    pub(crate) scope: String,
    pub(crate) code: String,
    pub(crate) redirect_uri: String,
    pub(crate) code_verifier: String,
}

#[derive(Debug, Clone)]
pub(crate) struct TokenRefreshRequest {
    pub(crate) token_uri: String,
    pub(crate) client_id: String,
    pub(crate) scope: String,
    pub(crate) refresh_token: String,
}

#[derive(Clone)]
pub(crate) struct TokenSet {
    pub(crate) access_token: String,
    pub(crate) refresh_token: Option<String>,
    pub(crate) expires_at: Option<i64>,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &mask_token(&self.access_token))
            .field(
                "refresh_token",
                &self.refresh_token.as_deref().map(mask_token),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

pub(crate) async fn exchange_authorization_code(
    client: &reqwest::Client,
    req: &TokenExchangeRequest,
) -> AppResult<TokenSet> {
    let mut form: HashMap<&str, String> = HashMap::new();
    form.insert("grant_type", "authorization_code".to_string());
    form.insert("code", req.code.trim().to_string());
    form.insert("redirect_uri", req.redirect_uri.trim().to_string());
    form.insert("client_id", req.client_id.trim().to_string());
    form.insert("code_verifier", req.code_verifier.trim().to_string());
    form.insert("scope", req.scope.clone());

    let response = client
        .post(req.token_uri.trim())
        .form(&form)
        .send()
        .await
        .map_err(|e| {
            AuthErrorCode::TokenEndpoint
                .error(format!("authorization code exchange request failed: {e}"))
                .with_source(e)
        })?;

    parse_token_response(response).await
}

pub(crate) async fn refresh_access_token(
    client: &reqwest::Client,
    req: &TokenRefreshRequest,
) -> AppResult<TokenSet> {
    let mut form: HashMap<&str, String> = HashMap::new();
    form.insert("grant_type", "refresh_token".to_string());
    form.insert("refresh_token", req.refresh_token.trim().to_string());
    form.insert("client_id", req.client_id.trim().to_string());
    form.insert("scope", req.scope.clone());

    let response = client
        .post(req.token_uri.trim())
        .form(&form)
        .send()
        .await
        .map_err(|e| {
            AuthErrorCode::TokenEndpoint
                .error(format!("refresh request failed: {e}"))
                .with_source(e)
        })?;

    parse_token_response(response).await
}

/// Lifetime assumed when the token response omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

async fn parse_token_response(response: reqwest::Response) -> AppResult<TokenSet> {
    let status = response.status();
    let body = response.text().await.map_err(|e| {
        AuthErrorCode::TokenEndpoint
            .error(format!("token response read failed: {e}"))
            .with_source(e)
    })?;

    if !status.is_success() {
        let (error_code, error_message) = parse_oauth_error_details(&body);
        if is_relogin_error(error_code.as_deref(), error_message.as_deref()) {
            return Err(AuthErrorCode::ReloginRequired.error(format!(
                "refresh token rejected ({}); interactive sign-in required",
                error_code.as_deref().unwrap_or("unknown")
            )));
        }

        let snippet = sanitize_oauth_error_body_snippet(&body);
        let mut msg = format!("token endpoint returned status={}", status.as_u16());
        if let Some(code) = error_code {
            msg.push_str(" code=");
            msg.push_str(code.as_str());
        }
        if let Some(detail) = error_message {
            msg.push_str(" message=");
            msg.push_str(detail.chars().take(240).collect::<String>().as_str());
        }
        msg.push_str(" body=");
        msg.push_str(snippet.as_str());
        return Err(AuthErrorCode::TokenEndpoint.error(msg));
    }

    let value: Value = serde_json::from_str(&body).map_err(|e| {
        AuthErrorCode::TokenEndpoint.error(format!("token response json invalid: {e}"))
    })?;

    let access_token = string_field(&value, "access_token").ok_or_else(|| {
        AuthErrorCode::TokenEndpoint.error("token response missing access_token")
    })?;
    let refresh_token = string_field(&value, "refresh_token");

    let expires_in = value.get("expires_in").and_then(parse_i64_lossy);
    let now = crate::shared::time::now_unix_seconds();
    // A token without a usable lifetime still has to age out of the cache.
    let expires_in = expires_in
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    let expires_at = Some(now.saturating_add(expires_in));

    Ok(TokenSet {
        access_token,
        refresh_token,
        expires_at,
    })
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_i64_lossy(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lc = key.trim().to_ascii_lowercase();
    key_lc.contains("token") || key_lc.contains("secret") || key_lc == "authorization"
}

fn redact_sensitive_json_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                if is_sensitive_key(key) {
                    if let Some(raw) = nested.as_str() {
                        *nested = Value::String(mask_token(raw));
                        continue;
                    }
                }
                redact_sensitive_json_fields(nested);
            }
        }
        Value::Array(items) => {
            for nested in items {
                redact_sensitive_json_fields(nested);
            }
        }
        _ => {}
    }
}

fn sanitize_oauth_error_body_snippet(body: &str) -> String {
    if let Ok(mut value) = serde_json::from_str::<Value>(body) {
        redact_sensitive_json_fields(&mut value);
        if let Ok(encoded) = serde_json::to_string(&value) {
            return encoded.chars().take(500).collect();
        }
    }
    body.chars().take(500).collect()
}

fn parse_oauth_error_details(body: &str) -> (Option<String>, Option<String>) {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return (None, None),
    };

    let code = string_field(&value, "error");
    let message = string_field(&value, "error_description");
    (code, message)
}

/// `invalid_grant` covers expired, revoked and already-redeemed refresh tokens;
/// `interaction_required` means consent or MFA must happen in the browser.
fn is_relogin_error(code: Option<&str>, message: Option<&str>) -> bool {
    let code_hit = code.map(str::trim).is_some_and(|v| {
        v.eq_ignore_ascii_case("invalid_grant") || v.eq_ignore_ascii_case("interaction_required")
    });
    if code_hit {
        return true;
    }
    message
        .map(str::to_ascii_lowercase)
        .is_some_and(|v| v.contains("refresh token has expired"))
}
