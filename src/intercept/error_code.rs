//! Usage: Stable error codes for interception failures.

use crate::shared::error::{AppError, CANCELLED_CODE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterceptErrorCode {
    /// The UI execution context was unavailable or the request was released unanswered.
    Cancelled,
    /// The content-view request or the HTTP response had an unusable shape.
    Translation,
    /// The HTTP client failed to reach the upstream or to read its reply.
    Transport,
    /// The HTTP client could not be constructed.
    HttpClientInit,
}

impl InterceptErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cancelled => CANCELLED_CODE,
            Self::Translation => "INTERCEPT_TRANSLATION",
            Self::Transport => "INTERCEPT_TRANSPORT",
            Self::HttpClientInit => "INTERCEPT_HTTP_CLIENT_INIT",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        Some(match value {
            CANCELLED_CODE => Self::Cancelled,
            "INTERCEPT_TRANSLATION" => Self::Translation,
            "INTERCEPT_TRANSPORT" => Self::Transport,
            "INTERCEPT_HTTP_CLIENT_INIT" => Self::HttpClientInit,
            _ => return None,
        })
    }

    pub fn error(self, message: impl Into<String>) -> AppError {
        AppError::new(self.as_str(), message)
    }
}
