//! Usage: Adapter settings (schema + TOML read/write + environment overrides).

use crate::intercept::filter::{RequestFilter, ResourceContext};
use crate::shared::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_API_ENDPOINT: &str = "https://graph.microsoft.com";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_TENANT: &str = "common";
pub const DEFAULT_SCOPE: &str = "User.Read";
const DEFAULT_SIGN_IN_TIMEOUT_SECONDS: u32 = 300;
const MIN_SIGN_IN_TIMEOUT_SECONDS: u32 = 10;
const MAX_SIGN_IN_TIMEOUT_SECONDS: u32 = 60 * 60;
const DEFAULT_REFRESH_LEAD_SECONDS: u32 = 300;
const MAX_REFRESH_LEAD_SECONDS: u32 = 60 * 60;

pub const ENV_PREFIX: &str = "WEBVIEW_AUTH_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterSettings {
    pub schema_version: u32,
    /// Requests whose URI starts with this endpoint get the bearer token.
    pub api_endpoint: String,
    pub resource_context: ResourceContext,
    pub client_id: String,
    pub tenant: String,
    pub authority_host: String,
    pub scopes: Vec<String>,
    /// Loopback redirect port; 0 picks a free port per sign-in.
    pub redirect_port: u16,
    pub sign_in_timeout_seconds: u32,
    pub refresh_lead_seconds: u32,
    pub user_agent: String,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            resource_context: ResourceContext::XmlHttpRequest,
            client_id: String::new(),
            tenant: DEFAULT_TENANT.to_string(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            scopes: vec![DEFAULT_SCOPE.to_string()],
            redirect_port: 0,
            sign_in_timeout_seconds: DEFAULT_SIGN_IN_TIMEOUT_SECONDS,
            refresh_lead_seconds: DEFAULT_REFRESH_LEAD_SECONDS,
            user_agent: default_user_agent(),
        }
    }
}

fn default_user_agent() -> String {
    format!("webview-native-auth/{}", env!("CARGO_PKG_VERSION"))
}

impl AdapterSettings {
    /// Filter matching everything under `api_endpoint`.
    pub fn request_filter(&self) -> AppResult<RequestFilter> {
        let endpoint = self.api_endpoint.trim_end_matches('/');
        RequestFilter::new(&format!("{endpoint}/*"), self.resource_context)
    }
}

/// Clamps out-of-range values back into bounds. Returns whether anything changed.
pub fn sanitize(settings: &mut AdapterSettings) -> bool {
    let mut changed = false;

    let trimmed = settings.api_endpoint.trim().trim_end_matches('/').to_string();
    if trimmed.is_empty() {
        settings.api_endpoint = DEFAULT_API_ENDPOINT.to_string();
        changed = true;
    } else if trimmed != settings.api_endpoint {
        settings.api_endpoint = trimmed;
        changed = true;
    }

    let authority = settings.authority_host.trim().trim_end_matches('/').to_string();
    if authority.is_empty() {
        settings.authority_host = DEFAULT_AUTHORITY_HOST.to_string();
        changed = true;
    } else if authority != settings.authority_host {
        settings.authority_host = authority;
        changed = true;
    }

    let tenant = settings.tenant.trim().to_string();
    if tenant.is_empty() {
        settings.tenant = DEFAULT_TENANT.to_string();
        changed = true;
    } else if tenant != settings.tenant {
        settings.tenant = tenant;
        changed = true;
    }

    let client_id = settings.client_id.trim().to_string();
    if client_id != settings.client_id {
        settings.client_id = client_id;
        changed = true;
    }

    let mut scopes: Vec<String> = Vec::with_capacity(settings.scopes.len());
    for scope in &settings.scopes {
        let scope = scope.trim();
        if scope.is_empty() || scopes.iter().any(|s| s == scope) {
            continue;
        }
        scopes.push(scope.to_string());
    }
    if scopes.is_empty() {
        scopes.push(DEFAULT_SCOPE.to_string());
    }
    if scopes != settings.scopes {
        settings.scopes = scopes;
        changed = true;
    }

    let timeout = settings
        .sign_in_timeout_seconds
        .clamp(MIN_SIGN_IN_TIMEOUT_SECONDS, MAX_SIGN_IN_TIMEOUT_SECONDS);
    if timeout != settings.sign_in_timeout_seconds {
        settings.sign_in_timeout_seconds = timeout;
        changed = true;
    }

    if settings.refresh_lead_seconds > MAX_REFRESH_LEAD_SECONDS {
        settings.refresh_lead_seconds = MAX_REFRESH_LEAD_SECONDS;
        changed = true;
    }

    if settings.user_agent.trim().is_empty() {
        settings.user_agent = default_user_agent();
        changed = true;
    }

    if settings.schema_version != SCHEMA_VERSION {
        settings.schema_version = SCHEMA_VERSION;
        changed = true;
    }

    changed
}

/// Applies `WEBVIEW_AUTH_*` overrides using `lookup` as the variable source.
pub fn apply_overrides(
    settings: &mut AdapterSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> AppResult<()> {
    let get = |name: &str| {
        lookup(&format!("{ENV_PREFIX}{name}"))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    if let Some(v) = get("API_ENDPOINT") {
        settings.api_endpoint = v;
    }
    if let Some(v) = get("CLIENT_ID") {
        settings.client_id = v;
    }
    if let Some(v) = get("TENANT") {
        settings.tenant = v;
    }
    if let Some(v) = get("AUTHORITY_HOST") {
        settings.authority_host = v;
    }
    if let Some(v) = get("SCOPES") {
        settings.scopes = v
            .split([' ', ','])
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(v) = get("RESOURCE_CONTEXT") {
        settings.resource_context = serde_json::from_value(serde_json::Value::String(v.clone()))
            .map_err(|_| format!("SEC_INVALID_INPUT: unknown resource context {v:?}"))?;
    }
    if let Some(v) = get("REDIRECT_PORT") {
        settings.redirect_port = v
            .parse()
            .map_err(|e| format!("SEC_INVALID_INPUT: invalid redirect port {v:?}: {e}"))?;
    }
    if let Some(v) = get("SIGN_IN_TIMEOUT_SECONDS") {
        settings.sign_in_timeout_seconds = v
            .parse()
            .map_err(|e| format!("SEC_INVALID_INPUT: invalid sign-in timeout {v:?}: {e}"))?;
    }
    Ok(())
}

/// Reads settings from a TOML file. A missing file yields defaults.
pub fn read_file(path: &Path) -> AppResult<AdapterSettings> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "settings file missing; using defaults");
            return Ok(AdapterSettings::default());
        }
        Err(err) => {
            return Err(AppError::new(
                "SYSTEM_ERROR",
                format!("failed to read settings {}: {err}", path.display()),
            )
            .with_source(err))
        }
    };

    let mut settings: AdapterSettings = toml::from_str(&raw)
        .map_err(|e| format!("SEC_INVALID_INPUT: invalid settings {}: {e}", path.display()))?;
    if sanitize(&mut settings) {
        tracing::info!(path = %path.display(), "settings sanitized after read");
    }
    Ok(settings)
}

pub fn write_file(path: &Path, settings: &AdapterSettings) -> AppResult<()> {
    let mut settings = settings.clone();
    sanitize(&mut settings);

    let raw = toml::to_string_pretty(&settings)
        .map_err(|e| format!("SYSTEM_ERROR: failed to serialize settings: {e}"))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("SYSTEM_ERROR: failed to create {}: {e}", parent.display()))?;
    }
    std::fs::write(path, raw)
        .map_err(|e| format!("SYSTEM_ERROR: failed to write settings {}: {e}", path.display()))?;
    Ok(())
}

/// File (optional) + process environment + sanitize.
pub fn load(path: Option<&Path>) -> AppResult<AdapterSettings> {
    let mut settings = match path {
        Some(path) => read_file(path)?,
        None => AdapterSettings::default(),
    };
    apply_overrides(&mut settings, |name| std::env::var(name).ok())?;
    sanitize(&mut settings);
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_target_graph_programmatic_requests() {
        let settings = AdapterSettings::default();
        assert_eq!(settings.api_endpoint, "https://graph.microsoft.com");
        assert_eq!(settings.resource_context, ResourceContext::XmlHttpRequest);
        assert_eq!(settings.scopes, vec!["User.Read".to_string()]);

        let filter = settings.request_filter().expect("filter");
        assert_eq!(filter.uri_prefix(), "https://graph.microsoft.com/");
    }

    #[test]
    fn sanitize_clamps_and_dedupes() {
        let mut settings = AdapterSettings {
            api_endpoint: " https://graph.microsoft.com/ ".to_string(),
            scopes: vec![" User.Read ".into(), "User.Read".into(), "".into(), "Mail.Read".into()],
            sign_in_timeout_seconds: 1,
            refresh_lead_seconds: 999_999,
            tenant: "  ".to_string(),
            ..AdapterSettings::default()
        };

        assert!(sanitize(&mut settings));
        assert_eq!(settings.api_endpoint, "https://graph.microsoft.com");
        assert_eq!(settings.scopes, vec!["User.Read".to_string(), "Mail.Read".to_string()]);
        assert_eq!(settings.sign_in_timeout_seconds, MIN_SIGN_IN_TIMEOUT_SECONDS);
        assert_eq!(settings.refresh_lead_seconds, MAX_REFRESH_LEAD_SECONDS);
        assert_eq!(settings.tenant, DEFAULT_TENANT);

        assert!(!sanitize(&mut settings));
    }

    #[test]
    fn empty_scopes_fall_back_to_default() {
        let mut settings = AdapterSettings {
            scopes: vec![],
            ..AdapterSettings::default()
        };
        sanitize(&mut settings);
        assert_eq!(settings.scopes, vec![DEFAULT_SCOPE.to_string()]);
    }

    #[test]
    fn overrides_apply_from_lookup() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("WEBVIEW_AUTH_CLIENT_ID", "11111111-2222-3333-4444-555555555555"),
            ("WEBVIEW_AUTH_SCOPES", "User.Read, Mail.Read"),
            ("WEBVIEW_AUTH_RESOURCE_CONTEXT", "fetch"),
            ("WEBVIEW_AUTH_REDIRECT_PORT", "53682"),
            ("WEBVIEW_AUTH_TENANT", ""),
        ]);
        let mut settings = AdapterSettings::default();
        apply_overrides(&mut settings, |name| env.get(name).map(|v| v.to_string()))
            .expect("overrides");

        assert_eq!(settings.client_id, "11111111-2222-3333-4444-555555555555");
        assert_eq!(settings.scopes, vec!["User.Read".to_string(), "Mail.Read".to_string()]);
        assert_eq!(settings.resource_context, ResourceContext::Fetch);
        assert_eq!(settings.redirect_port, 53682);
        assert_eq!(settings.tenant, DEFAULT_TENANT);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let mut settings = AdapterSettings::default();
        let err = apply_overrides(&mut settings, |name| {
            (name == "WEBVIEW_AUTH_REDIRECT_PORT").then(|| "not-a-port".to_string())
        })
        .expect_err("bad port");
        assert_eq!(err.code(), "SEC_INVALID_INPUT");

        let err = apply_overrides(&mut settings, |name| {
            (name == "WEBVIEW_AUTH_RESOURCE_CONTEXT").then(|| "carrier_pigeon".to_string())
        })
        .expect_err("bad context");
        assert_eq!(err.code(), "SEC_INVALID_INPUT");
    }
}
