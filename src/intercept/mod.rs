//! Usage: Request interception (filter, deferral, UI dispatch, translation, bearer injection, forwarding).

pub mod bearer;
pub mod deferral;
pub mod dispatcher;
pub mod error_code;
pub mod filter;
pub mod forwarder;
pub mod interceptor;
pub mod request;
pub mod response;
pub mod scheme;
pub mod translate;
