//! Core of the IdP proxy that bridges OAuth2 social login providers to a
//! SAML federation.
//!
//! # Overview
//!
//! - [`secret`]: seals `(entity id, consumer secret)` records into compact
//!   JWE tokens with the operator's RSA key and opens them again
//! - [`metadata`]: renders tokens as `EntityAttributes` extensions and reads
//!   them back out of SAML metadata
//! - [`consumer`]: resolves the OAuth client key and secret for a social
//!   service and SP from an ordered list of sources
//! - [`social`]: runs the OAuth2 authorization-code flow and records the
//!   outcome on a login session
//!
//! # Example
//!
//! ```ignore
//! use idpproxy_auth::metadata::{CUSTOMER_ATTRIBUTE, embed};
//! use idpproxy_auth::secret::{ProxyKeyPair, encrypt_secret};
//!
//! let keys = ProxyKeyPair::from_pem_files("keys/idpproxy.key".as_ref(), None)?;
//! let token = encrypt_secret(
//!     "https://sp.example.org/",
//!     r#"{"facebook": {"key": "app-id", "secret": "app-secret"}}"#,
//!     keys.public_key(),
//! )?;
//! let fragment = embed(&token, CUSTOMER_ATTRIBUTE)?;
//! ```

pub mod config;
pub mod consumer;
pub mod error;
pub mod metadata;
pub mod secret;
pub mod social;

pub use config::{ConfigError, ProxyConfig};
pub use consumer::{ConsumerCredential, ConsumerInfo, CredentialSource};
pub use error::{ErrorCategory, ProxyError};
pub use secret::{ProxyKeyPair, decrypt_secret, encrypt_secret};

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;
