//! Proxy error types.
//!
//! This module defines the errors shared by the secret distribution and
//! credential resolution code. Adapter-specific failures live in
//! [`crate::social::error`].

use std::fmt;

/// Errors that can occur while encrypting, decrypting or resolving consumer
/// credentials.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The caller supplied a malformed record or parameter.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of what is malformed.
        message: String,
    },

    /// A secret could not be encrypted (bad key or unserializable payload).
    #[error("Encryption error: {message}")]
    Encryption {
        /// Description of the encryption failure.
        message: String,
    },

    /// A token could not be decrypted or did not bind to the expected entity.
    ///
    /// Never propagated past the decryption unit; callers see absence instead.
    #[error("Decryption failure: {message}")]
    Decryption {
        /// Description of the decryption failure.
        message: String,
    },

    /// No credential source produced a key/secret for the query.
    #[error("No consumer credentials for {social_service} at {entity_id}")]
    CredentialNotFound {
        /// The social service that was asked for.
        social_service: String,
        /// The SP entity id that was asked for.
        entity_id: String,
    },

    /// The remote identity provider returned an error or a malformed response.
    #[error("Provider error: {provider} - {message}")]
    Provider {
        /// The provider name.
        provider: String,
        /// Description of the error.
        message: String,
    },

    /// Talking to the remote identity provider failed or timed out.
    #[error("Transport error: {provider} - {message}")]
    Transport {
        /// The provider name.
        provider: String,
        /// Description of the error.
        message: String,
    },

    /// SAML metadata could not be read or parsed.
    #[error("Metadata error: {message}")]
    Metadata {
        /// Description of the metadata error.
        message: String,
    },

    /// The proxy configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl ProxyError {
    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new `Encryption` error.
    #[must_use]
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption {
            message: message.into(),
        }
    }

    /// Creates a new `Decryption` error.
    #[must_use]
    pub fn decryption(message: impl Into<String>) -> Self {
        Self::Decryption {
            message: message.into(),
        }
    }

    /// Creates a new `CredentialNotFound` error.
    #[must_use]
    pub fn credential_not_found(
        social_service: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self::CredentialNotFound {
            social_service: social_service.into(),
            entity_id: entity_id.into(),
        }
    }

    /// Creates a new `Provider` error.
    #[must_use]
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Transport` error.
    #[must_use]
    pub fn transport(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Metadata` error.
    #[must_use]
    pub fn metadata(message: impl Into<String>) -> Self {
        Self::Metadata {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the error was caused by caller input.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::CredentialNotFound { .. } | Self::Metadata { .. }
        )
    }

    /// Returns `true` if the error came from talking to a remote provider.
    #[must_use]
    pub fn is_external_error(&self) -> bool {
        matches!(self, Self::Provider { .. } | Self::Transport { .. })
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::Encryption { .. } | Self::Decryption { .. } => ErrorCategory::Crypto,
            Self::CredentialNotFound { .. } => ErrorCategory::Credentials,
            Self::Provider { .. } | Self::Transport { .. } => ErrorCategory::Federation,
            Self::Metadata { .. } => ErrorCategory::Metadata,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of proxy errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed caller input.
    Validation,
    /// Encryption and decryption of secrets.
    Crypto,
    /// Consumer credential lookup.
    Credentials,
    /// Remote identity provider errors.
    Federation,
    /// SAML metadata handling.
    Metadata,
    /// Configuration errors.
    Configuration,
    /// Internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Crypto => write!(f, "crypto"),
            Self::Credentials => write!(f, "credentials"),
            Self::Federation => write!(f, "federation"),
            Self::Metadata => write!(f, "metadata"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
