//! Usage: Stable error codes for token acquisition failures.

use crate::shared::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorCode {
    /// The user declined or closed the authorization page.
    SignInCancelled,
    /// No redirect arrived within the sign-in timeout.
    SignInTimeout,
    /// The refresh token was rejected; an interactive sign-in is needed.
    ReloginRequired,
    /// The token endpoint failed or answered with an unusable payload.
    TokenEndpoint,
    /// A sign-in was needed but the caller cannot show UI.
    InteractionRequired,
    /// The loopback redirect listener failed.
    Callback,
}

impl AuthErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SignInCancelled => "AUTH_SIGN_IN_CANCELLED",
            Self::SignInTimeout => "AUTH_SIGN_IN_TIMEOUT",
            Self::ReloginRequired => "AUTH_RELOGIN_REQUIRED",
            Self::TokenEndpoint => "AUTH_TOKEN_ENDPOINT",
            Self::InteractionRequired => "AUTH_INTERACTION_REQUIRED",
            Self::Callback => "AUTH_CALLBACK",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        Some(match value {
            "AUTH_SIGN_IN_CANCELLED" => Self::SignInCancelled,
            "AUTH_SIGN_IN_TIMEOUT" => Self::SignInTimeout,
            "AUTH_RELOGIN_REQUIRED" => Self::ReloginRequired,
            "AUTH_TOKEN_ENDPOINT" => Self::TokenEndpoint,
            "AUTH_INTERACTION_REQUIRED" => Self::InteractionRequired,
            "AUTH_CALLBACK" => Self::Callback,
            _ => return None,
        })
    }

    pub fn error(self, message: impl Into<String>) -> AppError {
        AppError::new(self.as_str(), message)
    }

    pub fn matches(self, err: &AppError) -> bool {
        err.code() == self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::AuthErrorCode;

    #[test]
    fn codes_round_trip_through_strings() {
        for code in [
            AuthErrorCode::SignInCancelled,
            AuthErrorCode::SignInTimeout,
            AuthErrorCode::ReloginRequired,
            AuthErrorCode::TokenEndpoint,
            AuthErrorCode::InteractionRequired,
            AuthErrorCode::Callback,
        ] {
            assert_eq!(AuthErrorCode::from_str(code.as_str()), Some(code));
        }
        assert_eq!(AuthErrorCode::from_str("INTERCEPT_TRANSPORT"), None);
    }

    #[test]
    fn matches_compares_codes_only() {
        let err = AuthErrorCode::ReloginRequired.error("refresh token expired");
        assert!(AuthErrorCode::ReloginRequired.matches(&err));
        assert!(!AuthErrorCode::TokenEndpoint.matches(&err));
    }
}
