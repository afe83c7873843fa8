//! Usage: Identity platform endpoints (authorize/token URLs, scopes, loopback redirect).

use crate::infra::settings::AdapterSettings;
use crate::shared::error::AppResult;
use reqwest::Url;

/// Always requested so the token endpoint issues a refresh token.
const OFFLINE_ACCESS_SCOPE: &str = "offline_access";
pub(crate) const REDIRECT_HOST: &str = "localhost";
pub(crate) const CALLBACK_PATH: &str = "/auth/callback";

#[derive(Debug, Clone)]
pub(crate) struct IdentityEndpoints {
    pub(crate) authorize_url: Url,
    pub(crate) token_url: Url,
    pub(crate) client_id: String,
    pub(crate) scopes: Vec<String>,
}

impl IdentityEndpoints {
    pub(crate) fn from_settings(settings: &AdapterSettings) -> AppResult<Self> {
        let client_id = settings.client_id.trim();
        if client_id.is_empty() {
            return Err("SEC_INVALID_INPUT: client_id is required for sign-in"
                .to_string()
                .into());
        }

        let base = format!(
            "{}/{}/oauth2/v2.0",
            settings.authority_host.trim().trim_end_matches('/'),
            settings.tenant.trim()
        );
        let authorize_url = Url::parse(&format!("{base}/authorize"))
            .map_err(|e| format!("SEC_INVALID_INPUT: invalid authority {base}: {e}"))?;
        let token_url = Url::parse(&format!("{base}/token"))
            .map_err(|e| format!("SEC_INVALID_INPUT: invalid authority {base}: {e}"))?;

        let mut scopes: Vec<String> = settings
            .scopes
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if !scopes.iter().any(|s| s.eq_ignore_ascii_case(OFFLINE_ACCESS_SCOPE)) {
            scopes.push(OFFLINE_ACCESS_SCOPE.to_string());
        }

        Ok(Self {
            authorize_url,
            token_url,
            client_id: client_id.to_string(),
            scopes,
        })
    }

    pub(crate) fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }

    pub(crate) fn redirect_uri(&self, port: u16) -> String {
        format!("http://{REDIRECT_HOST}:{port}{CALLBACK_PATH}")
    }

    pub(crate) fn build_authorize_url(
        &self,
        redirect_uri: &str,
        state: &str,
        code_challenge: &str,
    ) -> Url {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_mode", "query")
            .append_pair("scope", &self.scope_param())
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("prompt", "select_account");
        url
    }
}
