pub mod app;
pub mod auth;
pub mod infra;
pub mod intercept;
mod shared;
#[cfg(feature = "shell")]
pub mod shell;

pub use auth::bridge::{AuthBridge, AuthStateView};
pub use auth::identity::OAuthIdentityProvider;
pub use auth::provider::{
    AuthProvider, InteractiveContext, ProviderState, SignInPrompt, TokenSupplier,
};
pub use infra::settings::AdapterSettings;
pub use intercept::deferral::{InterceptResult, PendingResponse};
pub use intercept::dispatcher::{UiDispatcher, UiQueue, UiQueueHandle, UiTask};
pub use intercept::filter::{RequestFilter, ResourceContext};
pub use intercept::forwarder::{HttpForwarder, ReqwestForwarder};
pub use intercept::interceptor::{Interception, Interceptor};
pub use intercept::request::{RequestContent, WebResourceRequest};
pub use intercept::response::WebResourceResponse;
pub use shared::error::{AppError, AppResult, CANCELLED_CODE};
