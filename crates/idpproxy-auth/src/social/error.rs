//! Error types for social login.

use crate::error::ProxyError;

/// Errors that stop a social login step before an outcome can be recorded.
///
/// Failures that happen while talking to the provider do not show up here;
/// they end the login as a failed [`SocialOutcome`](super::SocialOutcome).
#[derive(Debug, thiserror::Error)]
pub enum SocialError {
    /// No provider is configured under this name.
    #[error("Social provider not found: {0}")]
    ProviderNotFound(String),

    /// The provider is configured but disabled.
    #[error("Social provider is disabled: {0}")]
    ProviderDisabled(String),

    /// The session id is unknown or expired.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The callback carried no state, or a state that is not bound to a session.
    #[error("Unknown or expired state")]
    UnknownState,

    /// Consumer credentials could not be resolved.
    #[error("Consumer credentials unavailable: {0}")]
    Credentials(#[from] ProxyError),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Failed to build a URL.
    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl SocialError {
    /// Returns `true` if the provider name did not resolve to a usable provider.
    #[must_use]
    pub fn is_provider_error(&self) -> bool {
        matches!(self, Self::ProviderNotFound(_) | Self::ProviderDisabled(_))
    }

    /// Returns `true` if the request did not correlate with a live session.
    #[must_use]
    pub fn is_session_error(&self) -> bool {
        matches!(self, Self::SessionNotFound(_) | Self::UnknownState)
    }
}
