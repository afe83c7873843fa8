//! Usage: OAuth identity provider (authorization code + PKCE with loopback redirect,
//! refresh-token renewal) backing `TokenSupplier` and `AuthProvider`.

use super::callback_server::{bind_callback_listener, wait_for_callback};
use super::endpoints::{IdentityEndpoints, CALLBACK_PATH};
use super::error_code::AuthErrorCode;
use super::pkce::{generate_pkce_pair, generate_state};
use super::provider::{AuthProvider, InteractiveContext, ProviderState, SignInPrompt, TokenSupplier};
use super::token_exchange::{
    exchange_authorization_code, refresh_access_token, TokenExchangeRequest, TokenRefreshRequest,
    TokenSet,
};
use crate::infra::settings::AdapterSettings;
use crate::shared::error::AppResult;
use crate::shared::mutex_ext::MutexExt;
use crate::shared::security::mask_token;
use crate::shared::time::now_unix_seconds;
use futures_core::future::BoxFuture;
use std::time::Duration;

pub(crate) fn should_refresh_now(
    expires_at: Option<i64>,
    refresh_lead_s: i64,
    now_unix: i64,
) -> bool {
    let Some(expiry) = expires_at else {
        return false;
    };
    let lead = refresh_lead_s.max(0);
    expiry.saturating_sub(lead) <= now_unix
}

fn is_expired(expires_at: Option<i64>, now_unix: i64) -> bool {
    expires_at.is_some_and(|expiry| expiry <= now_unix)
}

struct CachedTokens {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
}

impl CachedTokens {
    fn from_refresh_token(refresh_token: String) -> Self {
        // Expired on purpose: the next acquisition goes straight to the refresh grant.
        Self {
            access_token: String::new(),
            refresh_token: Some(refresh_token),
            expires_at: Some(0),
        }
    }

    fn usable_access_token(&self, lead_s: i64, now_unix: i64) -> Option<&str> {
        if self.access_token.is_empty() || should_refresh_now(self.expires_at, lead_s, now_unix) {
            return None;
        }
        Some(&self.access_token)
    }

    fn absorb(&mut self, set: TokenSet) {
        self.access_token = set.access_token;
        self.expires_at = set.expires_at;
        // The token endpoint may omit the refresh token when it does not rotate it.
        if set.refresh_token.is_some() {
            self.refresh_token = set.refresh_token;
        }
    }
}

/// Signs in against the identity platform and hands out access tokens for the
/// configured scopes.
///
/// Token acquisition holds an async lock for its whole duration, so concurrent
/// callers share one refresh or one interactive sign-in instead of racing.
pub struct OAuthIdentityProvider {
    client: reqwest::Client,
    endpoints: IdentityEndpoints,
    redirect_port: u16,
    sign_in_timeout: Duration,
    refresh_lead_s: i64,
    tokens: tokio::sync::Mutex<Option<CachedTokens>>,
    state: std::sync::Mutex<ProviderState>,
}

impl std::fmt::Debug for OAuthIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthIdentityProvider")
            .field("client_id", &self.endpoints.client_id)
            .field("token_url", &self.endpoints.token_url.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl OAuthIdentityProvider {
    pub fn new(settings: &AdapterSettings) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(|e| format!("SYSTEM_ERROR: failed to build identity http client: {e}"))?;
        Self::with_client(settings, client)
    }

    pub fn with_client(settings: &AdapterSettings, client: reqwest::Client) -> AppResult<Self> {
        Ok(Self {
            client,
            endpoints: IdentityEndpoints::from_settings(settings)?,
            redirect_port: settings.redirect_port,
            sign_in_timeout: Duration::from_secs(u64::from(settings.sign_in_timeout_seconds)),
            refresh_lead_s: i64::from(settings.refresh_lead_seconds),
            tokens: tokio::sync::Mutex::new(None),
            state: std::sync::Mutex::new(ProviderState::SignedOut),
        })
    }

    /// Restores a session from a refresh token persisted by the host.
    pub async fn seed_refresh_token(&self, refresh_token: impl Into<String>) {
        let refresh_token = refresh_token.into();
        let refresh_token = refresh_token.trim();
        if refresh_token.is_empty() {
            return;
        }
        let mut tokens = self.tokens.lock().await;
        *tokens = Some(CachedTokens::from_refresh_token(refresh_token.to_string()));
        tracing::debug!(
            refresh_token = %mask_token(refresh_token),
            "identity provider seeded with refresh token"
        );
    }

    /// Current refresh token, for hosts that persist the session between runs.
    pub async fn refresh_token(&self) -> Option<String> {
        self.tokens
            .lock()
            .await
            .as_ref()
            .and_then(|cached| cached.refresh_token.clone())
    }

    fn set_state(&self, next: ProviderState) {
        let mut state = self.state.lock_or_recover();
        if *state != next {
            tracing::debug!(from = state.as_str(), to = next.as_str(), "provider state changed");
            *state = next;
        }
    }

    fn settle_state(&self, tokens: &Option<CachedTokens>) {
        let now = now_unix_seconds();
        let signed_in = tokens.as_ref().is_some_and(|cached| {
            cached.refresh_token.is_some()
                || (!cached.access_token.is_empty() && !is_expired(cached.expires_at, now))
        });
        self.set_state(if signed_in {
            ProviderState::SignedIn
        } else {
            ProviderState::SignedOut
        });
    }

    async fn acquire(&self, ctx: &InteractiveContext) -> AppResult<String> {
        let mut tokens = self.tokens.lock().await;
        let now = now_unix_seconds();
        if let Some(token) = tokens
            .as_ref()
            .and_then(|cached| cached.usable_access_token(self.refresh_lead_s, now))
        {
            return Ok(token.to_string());
        }

        match self.refresh_locked(&mut tokens).await {
            Ok(Some(token)) => return Ok(token),
            Ok(None) => {}
            Err(err) => {
                // Transient refresh failure inside the lead window: the old token still works.
                if let Some(cached) = tokens.as_ref() {
                    if !cached.access_token.is_empty() && !is_expired(cached.expires_at, now) {
                        tracing::warn!(
                            error_code = err.code(),
                            "token refresh failed; reusing unexpired access token: {}",
                            err.message()
                        );
                        self.settle_state(&tokens);
                        return Ok(cached.access_token.clone());
                    }
                }
                self.settle_state(&tokens);
                return Err(err);
            }
        }

        let Some(prompt) = ctx.prompt() else {
            self.settle_state(&tokens);
            return Err(AuthErrorCode::InteractionRequired
                .error("sign-in required but no interactive context is available"));
        };
        self.interactive_locked(&mut tokens, prompt).await
    }

    /// Runs the refresh grant if a refresh token is cached. `Ok(None)` means no
    /// session could be restored without UI.
    async fn refresh_locked(&self, tokens: &mut Option<CachedTokens>) -> AppResult<Option<String>> {
        let Some(refresh_token) = tokens.as_ref().and_then(|c| c.refresh_token.clone()) else {
            return Ok(None);
        };

        self.set_state(ProviderState::Loading);
        let request = TokenRefreshRequest {
            token_uri: self.endpoints.token_url.to_string(),
            client_id: self.endpoints.client_id.clone(),
            scope: self.endpoints.scope_param(),
            refresh_token,
        };
        match refresh_access_token(&self.client, &request).await {
            Ok(set) => {
                tracing::info!(
                    access_token = %mask_token(&set.access_token),
                    expires_at = set.expires_at,
                    "access token refreshed"
                );
                let cached = tokens.get_or_insert_with(|| CachedTokens {
                    access_token: String::new(),
                    refresh_token: None,
                    expires_at: None,
                });
                cached.absorb(set);
                let token = cached.access_token.clone();
                self.settle_state(tokens);
                Ok(Some(token))
            }
            Err(err) if AuthErrorCode::ReloginRequired.matches(&err) => {
                tracing::warn!("refresh token rejected; dropping cached session");
                *tokens = None;
                self.settle_state(tokens);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn interactive_locked(
        &self,
        tokens: &mut Option<CachedTokens>,
        prompt: &dyn SignInPrompt,
    ) -> AppResult<String> {
        self.set_state(ProviderState::Loading);
        match self.run_authorization_code_flow(prompt).await {
            Ok(set) => {
                tracing::info!(
                    access_token = %mask_token(&set.access_token),
                    expires_at = set.expires_at,
                    "interactive sign-in completed"
                );
                let token = set.access_token.clone();
                *tokens = Some(CachedTokens {
                    access_token: set.access_token,
                    refresh_token: set.refresh_token,
                    expires_at: set.expires_at,
                });
                self.settle_state(tokens);
                Ok(token)
            }
            Err(err) => {
                tracing::warn!(
                    error_code = err.code(),
                    "interactive sign-in failed: {}",
                    err.message()
                );
                self.settle_state(tokens);
                Err(err)
            }
        }
    }

    async fn run_authorization_code_flow(&self, prompt: &dyn SignInPrompt) -> AppResult<TokenSet> {
        let pkce = generate_pkce_pair();
        let state = generate_state();
        let listener = bind_callback_listener(self.redirect_port).await?;
        let redirect_uri = self.endpoints.redirect_uri(listener.port());
        let authorize_url =
            self.endpoints
                .build_authorize_url(&redirect_uri, &state, &pkce.code_challenge);

        tracing::info!(
            port = listener.port(),
            timeout_s = self.sign_in_timeout.as_secs(),
            "waiting for sign-in redirect"
        );

        // The prompt may block until the browser has followed the redirect, so it
        // runs concurrently with the listener.
        let (_, payload) = tokio::try_join!(
            prompt.present(&authorize_url),
            wait_for_callback(listener, CALLBACK_PATH, &state, self.sign_in_timeout),
        )?;
        let code = payload.into_code()?;

        let request = TokenExchangeRequest {
            token_uri: self.endpoints.token_url.to_string(),
            client_id: self.endpoints.client_id.clone(),
            scope: self.endpoints.scope_param(),
            code,
            redirect_uri,
            code_verifier: pkce.code_verifier,
        };
        exchange_authorization_code(&self.client, &request).await
    }
}

impl TokenSupplier for OAuthIdentityProvider {
    fn get_token<'a>(&'a self, ctx: &'a InteractiveContext) -> BoxFuture<'a, AppResult<String>> {
        Box::pin(self.acquire(ctx))
    }
}

impl AuthProvider for OAuthIdentityProvider {
    fn state(&self) -> ProviderState {
        *self.state.lock_or_recover()
    }

    fn sign_in<'a>(&'a self, ctx: &'a InteractiveContext) -> BoxFuture<'a, AppResult<()>> {
        Box::pin(async move {
            let prompt = ctx.prompt().ok_or_else(|| {
                AuthErrorCode::InteractionRequired.error("sign-in needs an interactive context")
            })?;
            let mut tokens = self.tokens.lock().await;
            self.interactive_locked(&mut tokens, prompt).await?;
            Ok(())
        })
    }

    fn sign_out(&self) -> BoxFuture<'_, AppResult<()>> {
        Box::pin(async move {
            let mut tokens = self.tokens.lock().await;
            *tokens = None;
            self.set_state(ProviderState::SignedOut);
            tracing::info!("signed out; cached tokens cleared");
            Ok(())
        })
    }

    fn try_silent_sign_in(&self) -> BoxFuture<'_, AppResult<bool>> {
        Box::pin(async move {
            let mut tokens = self.tokens.lock().await;
            let now = now_unix_seconds();
            if tokens
                .as_ref()
                .and_then(|cached| cached.usable_access_token(self.refresh_lead_s, now))
                .is_some()
            {
                self.settle_state(&tokens);
                return Ok(true);
            }
            match self.refresh_locked(&mut tokens).await {
                Ok(token) => Ok(token.is_some()),
                Err(err) => {
                    self.settle_state(&tokens);
                    Err(err)
                }
            }
        })
    }
}
