// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error types shared by the sign-in flow, the services and the stores.

/// Error type for every fallible sign-in operation.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Input rejected locally before any network call.
    #[error("{0}")]
    Validation(String),

    /// The remote PIN API rejected the request.
    #[error("{0}")]
    PinApi(String),

    /// The identity provider rejected the request.
    #[error("{message}")]
    Provider { code: String, message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// A bounded wait expired.
    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("No OTP request found. Please request OTP first.")]
    NoPendingChallenge,

    #[error("Authentication service is not ready")]
    NotReady,

    #[error("App launch failed: {0}")]
    Launch(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Provider code for an invalid E.164 number.
    pub const INVALID_PHONE_NUMBER: &'static str = "auth/invalid-phone-number";
    /// Provider code for throttled requests.
    pub const TOO_MANY_REQUESTS: &'static str = "auth/too-many-requests";
    /// Provider code for a missing human-verification token.
    pub const MISSING_RECAPTCHA_TOKEN: &'static str = "auth/missing-recaptcha-token";
    /// Provider code for a rejected human-verification token.
    pub const CAPTCHA_CHECK_FAILED: &'static str = "auth/captcha-check-failed";

    pub fn provider(code: impl Into<String>, message: impl Into<String>) -> Self {
        AuthError::Provider {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Provider error code, if this error came from the identity provider.
    pub fn provider_code(&self) -> Option<&str> {
        match self {
            AuthError::Provider { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    /// Text shown inline to the user.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Timeout(_) => {
                "The request took too long. Check your connection and try again.".to_string()
            }
            AuthError::NotReady => {
                "Sign-in is not available right now. Please try again.".to_string()
            }
            AuthError::Database(_) | AuthError::Storage(_) | AuthError::Internal(_) => {
                "Something went wrong. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Whether the failure is worth retrying without user changes.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthError::Timeout(_) | AuthError::Database(_) | AuthError::NotReady
        ) || self.provider_code() == Some(Self::TOO_MANY_REQUESTS)
    }
}

/// Result type alias for sign-in operations
pub type Result<T> = std::result::Result<T, AuthError>;
