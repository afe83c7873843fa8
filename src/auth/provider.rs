//! Usage: Token supplier / auth provider traits consumed by the interceptor and the script bridge.
//!
//! Providers are constructed explicitly and passed around as `Arc<dyn ...>`; there is
//! no process-wide provider instance.

use crate::shared::error::AppResult;
use futures_core::future::BoxFuture;
use serde::Serialize;
use std::sync::Arc;

/// Presents an authorization page to the user (system browser, embedded window, ...).
pub trait SignInPrompt: Send + Sync {
    fn present<'a>(&'a self, authorize_url: &'a reqwest::Url) -> BoxFuture<'a, AppResult<()>>;
}

/// Capability to show interactive UI, handed to token acquisition explicitly
/// instead of relying on which thread the call happens to run on.
#[derive(Clone, Default)]
pub struct InteractiveContext {
    prompt: Option<Arc<dyn SignInPrompt>>,
}

impl std::fmt::Debug for InteractiveContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractiveContext")
            .field("interactive", &self.is_interactive())
            .finish()
    }
}

impl InteractiveContext {
    pub fn new(prompt: Arc<dyn SignInPrompt>) -> Self {
        Self {
            prompt: Some(prompt),
        }
    }

    /// A context that can never show UI; providers must fail instead of prompting.
    pub fn non_interactive() -> Self {
        Self { prompt: None }
    }

    pub fn is_interactive(&self) -> bool {
        self.prompt.is_some()
    }

    pub fn prompt(&self) -> Option<&dyn SignInPrompt> {
        self.prompt.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    SignedOut,
    Loading,
    SignedIn,
}

impl ProviderState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SignedOut => "signed_out",
            Self::Loading => "loading",
            Self::SignedIn => "signed_in",
        }
    }
}

/// The one capability the interceptor depends on.
///
/// Implementations own caching, refresh and retry, and must tolerate concurrent
/// callers.
pub trait TokenSupplier: Send + Sync {
    fn get_token<'a>(&'a self, ctx: &'a InteractiveContext) -> BoxFuture<'a, AppResult<String>>;
}

/// Full provider surface, reachable from hosted script through `AuthBridge`.
pub trait AuthProvider: TokenSupplier {
    fn state(&self) -> ProviderState;

    fn sign_in<'a>(&'a self, ctx: &'a InteractiveContext) -> BoxFuture<'a, AppResult<()>>;

    fn sign_out(&self) -> BoxFuture<'_, AppResult<()>>;

    /// Tries to restore a session without showing UI. Returns whether the
    /// provider is signed in afterwards.
    fn try_silent_sign_in(&self) -> BoxFuture<'_, AppResult<bool>>;
}

impl<T: TokenSupplier + ?Sized> TokenSupplier for Arc<T> {
    fn get_token<'a>(&'a self, ctx: &'a InteractiveContext) -> BoxFuture<'a, AppResult<String>> {
        (**self).get_token(ctx)
    }
}
