//! Usage: Token acquisition (provider traits, OAuth identity provider, script bridge).

pub mod bridge;
mod callback_server;
mod endpoints;
pub mod error_code;
pub mod identity;
mod pkce;
pub mod provider;
mod token_exchange;
