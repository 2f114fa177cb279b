use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to callers waiting on a session [`Configuration`](crate::cache::configuration::Configuration).
///
/// Every variant is terminal for the pending call(s) it reaches; none of them
/// leaves the coordinator in a failed state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The credential could not be decoded or its claims are structurally invalid.
    #[error("malformed authentication token: {0}")]
    MalformedToken(String),

    /// The host provider reported a failure; the host's reason is kept verbatim.
    #[error("authentication token provider failed: {0}")]
    AuthenticationTokenProvider(String),

    /// The host provider did not answer within the configured window.
    #[error("authentication token provider did not respond within {0:?}")]
    TokenProviderTimeout(Duration),
}

impl SessionError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        SessionError::MalformedToken(reason.into())
    }

    /// A fresh `get_configuration` call may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::AuthenticationTokenProvider(_) | SessionError::TokenProviderTimeout(_)
        )
    }

    /// Short label used for metrics and structured logs.
    pub fn reason(&self) -> &'static str {
        match self {
            SessionError::MalformedToken(_) => "malformed_token",
            SessionError::AuthenticationTokenProvider(_) => "provider_error",
            SessionError::TokenProviderTimeout(_) => "timeout",
        }
    }
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
