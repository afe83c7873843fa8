//! Usage: Script-facing shim over an `AuthProvider` (get token, sign in/out, silent sign-in).
//!
//! Hosted pages never see the provider itself; the shell exposes these operations
//! as commands, each returning plain serializable values.

use super::provider::{AuthProvider, InteractiveContext, ProviderState};
use crate::shared::error::AppResult;
use crate::shared::security::mask_token;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct AuthStateView {
    pub state: ProviderState,
    pub signed_in: bool,
}

#[derive(Clone)]
pub struct AuthBridge {
    provider: Arc<dyn AuthProvider>,
    interactive: InteractiveContext,
}

impl std::fmt::Debug for AuthBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthBridge")
            .field("state", &self.provider.state())
            .field("interactive", &self.interactive)
            .finish()
    }
}

impl AuthBridge {
    pub fn new(provider: Arc<dyn AuthProvider>, interactive: InteractiveContext) -> Self {
        Self {
            provider,
            interactive,
        }
    }

    pub fn provider(&self) -> &Arc<dyn AuthProvider> {
        &self.provider
    }

    pub async fn get_token(&self) -> AppResult<String> {
        let token = self.provider.get_token(&self.interactive).await?;
        tracing::debug!(token = %mask_token(&token), "token handed to hosted script");
        Ok(token)
    }

    pub async fn sign_in(&self) -> AppResult<AuthStateView> {
        self.provider.sign_in(&self.interactive).await?;
        Ok(self.state())
    }

    pub async fn sign_out(&self) -> AppResult<AuthStateView> {
        self.provider.sign_out().await?;
        Ok(self.state())
    }

    pub async fn try_silent_sign_in(&self) -> AppResult<bool> {
        self.provider.try_silent_sign_in().await
    }

    pub fn state(&self) -> AuthStateView {
        let state = self.provider.state();
        AuthStateView {
            state,
            signed_in: state == ProviderState::SignedIn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::provider::TokenSupplier;
    use crate::shared::mutex_ext::MutexExt;
    use futures_core::future::BoxFuture;
    use std::sync::Mutex;

    struct StubProvider {
        state: Mutex<ProviderState>,
    }

    impl TokenSupplier for StubProvider {
        fn get_token<'a>(&'a self, ctx: &'a InteractiveContext) -> BoxFuture<'a, AppResult<String>> {
            Box::pin(async move {
                if *self.state.lock_or_recover() == ProviderState::SignedIn {
                    return Ok("stub-token".to_string());
                }
                if ctx.is_interactive() {
                    Ok("prompted-token".to_string())
                } else {
                    Err("AUTH_INTERACTION_REQUIRED: no ui".into())
                }
            })
        }
    }

    impl AuthProvider for StubProvider {
        fn state(&self) -> ProviderState {
            *self.state.lock_or_recover()
        }

        fn sign_in<'a>(&'a self, _ctx: &'a InteractiveContext) -> BoxFuture<'a, AppResult<()>> {
            Box::pin(async move {
                *self.state.lock_or_recover() = ProviderState::SignedIn;
                Ok(())
            })
        }

        fn sign_out(&self) -> BoxFuture<'_, AppResult<()>> {
            Box::pin(async move {
                *self.state.lock_or_recover() = ProviderState::SignedOut;
                Ok(())
            })
        }

        fn try_silent_sign_in(&self) -> BoxFuture<'_, AppResult<bool>> {
            Box::pin(async move { Ok(*self.state.lock_or_recover() == ProviderState::SignedIn) })
        }
    }

    fn bridge() -> AuthBridge {
        AuthBridge::new(
            Arc::new(StubProvider {
                state: Mutex::new(ProviderState::SignedOut),
            }),
            InteractiveContext::non_interactive(),
        )
    }

    #[tokio::test]
    async fn bridge_tracks_provider_state() {
        let bridge = bridge();
        assert!(!bridge.state().signed_in);
        assert!(!bridge.try_silent_sign_in().await.expect("silent"));

        let view = bridge.sign_in().await.expect("sign in");
        assert_eq!(view.state, ProviderState::SignedIn);
        assert_eq!(bridge.get_token().await.expect("token"), "stub-token");

        let view = bridge.sign_out().await.expect("sign out");
        assert!(!view.signed_in);
    }

    #[tokio::test]
    async fn bridge_forwards_its_interactive_context() {
        let err = bridge().get_token().await.expect_err("non-interactive");
        assert_eq!(err.code(), "AUTH_INTERACTION_REQUIRED");
    }

    #[test]
    fn state_view_serializes_snake_case() {
        let view = AuthStateView {
            state: ProviderState::SignedIn,
            signed_in: true,
        };
        let json = serde_json::to_value(&view).expect("json");
        assert_eq!(json["state"], "signed_in");
        assert_eq!(json["signed_in"], true);
    }
}
