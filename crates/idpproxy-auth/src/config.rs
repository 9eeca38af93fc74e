//! Proxy configuration types.
//!
//! This module provides the `[proxy]` section of the server configuration:
//! key material, metadata files, consumer credential sources and social
//! providers.
//!
//! # Example TOML
//!
//! ```toml
//! [proxy.keys]
//! private_key = "keys/idpproxy.key"
//!
//! [proxy.metadata]
//! files = ["metadata/sp.xml"]
//!
//! [[proxy.consumer.sources]]
//! type = "file"
//! path = "consumers.json"
//!
//! [[proxy.consumer.sources]]
//! type = "metadata"
//!
//! [proxy.social]
//! request_timeout = "10s"
//! session_ttl = "30m"
//!
//! [[proxy.social.providers]]
//! name = "facebook"
//! authorization_endpoint = "https://www.facebook.com/dialog/oauth"
//! token_endpoint = "https://graph.facebook.com/oauth/access_token"
//! userinfo_endpoint = "https://graph.facebook.com/me"
//! scopes = ["email"]
//! authenticating_authority = "https://www.facebook.com"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// The `[proxy]` section.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// RSA key pair used to seal and open secrets.
    pub keys: KeyConfig,
    /// SAML metadata loaded at startup.
    pub metadata: MetadataConfig,
    /// Consumer credential sources.
    pub consumer: ConsumerConfig,
    /// Social login providers.
    pub social: SocialConfig,
}

/// Key material locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KeyConfig {
    /// PEM private key (PKCS#8 or PKCS#1).
    pub private_key: PathBuf,
    /// PEM public key. Derived from the private key when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<PathBuf>,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            private_key: PathBuf::from("keys/idpproxy.key"),
            public_key: None,
        }
    }
}

/// Metadata files.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Local SAML metadata XML files.
    pub files: Vec<PathBuf>,
}

/// Consumer credential sources, consulted in order.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// The sources.
    pub sources: Vec<SourceConfig>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            sources: vec![SourceConfig::Metadata],
        }
    }
}

/// One credential source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    /// A JSON or TOML credential file.
    File {
        /// Path to the file.
        path: PathBuf,
    },
    /// Secrets sealed into the loaded metadata.
    Metadata,
}

/// Social login settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SocialConfig {
    /// Timeout for token and user-info requests.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Lifetime of login sessions and pending state bindings.
    #[serde(with = "humantime_serde")]
    pub session_ttl: Duration,

    /// Configured providers.
    pub providers: Vec<SocialProviderConfig>,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            session_ttl: Duration::from_secs(3600),
            providers: Vec::new(),
        }
    }
}

/// An OAuth2 social provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SocialProviderConfig {
    /// Service name, used in URLs and as the credential lookup key.
    pub name: String,

    /// Human readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Authorization endpoint the browser is redirected to.
    pub authorization_endpoint: Url,

    /// Token endpoint for the code exchange.
    pub token_endpoint: Url,

    /// User-info resource fetched with the access token.
    pub userinfo_endpoint: Url,

    /// Requested scopes.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Separator used to join scopes (default: ",").
    #[serde(default = "default_scope_delimiter")]
    pub scope_delimiter: String,

    /// Value recorded as the session's authenticating authority.
    /// Defaults to the origin of the authorization endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticating_authority: Option<String>,

    /// Profile field holding the permanent user id (default: "id").
    #[serde(default = "default_user_id_field")]
    pub user_id_field: String,

    /// Profile field to attribute name mapping.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attribute_map: BTreeMap<String, String>,

    /// Whether this provider is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_scope_delimiter() -> String {
    ",".to_string()
}

fn default_user_id_field() -> String {
    "id".to_string()
}

fn default_true() -> bool {
    true
}

impl SocialProviderConfig {
    /// Creates a provider with the required endpoints.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        authorization_endpoint: Url,
        token_endpoint: Url,
        userinfo_endpoint: Url,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            authorization_endpoint,
            token_endpoint,
            userinfo_endpoint,
            scopes: Vec::new(),
            scope_delimiter: default_scope_delimiter(),
            authenticating_authority: None,
            user_id_field: default_user_id_field(),
            attribute_map: BTreeMap::new(),
            enabled: true,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Sets the scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<impl Into<String>>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the scope separator.
    #[must_use]
    pub fn with_scope_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.scope_delimiter = delimiter.into();
        self
    }

    /// Sets the authenticating authority.
    #[must_use]
    pub fn with_authenticating_authority(mut self, authority: impl Into<String>) -> Self {
        self.authenticating_authority = Some(authority.into());
        self
    }

    /// Sets the profile field holding the user id.
    #[must_use]
    pub fn with_user_id_field(mut self, field: impl Into<String>) -> Self {
        self.user_id_field = field.into();
        self
    }

    /// Maps a profile field to an attribute name.
    #[must_use]
    pub fn with_attribute(mut self, field: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.attribute_map.insert(field.into(), attribute.into());
        self
    }

    /// Sets whether the provider is enabled.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Scopes joined with the configured delimiter.
    #[must_use]
    pub fn scope(&self) -> String {
        self.scopes.join(&self.scope_delimiter)
    }

    /// The authenticating authority, falling back to the authorization
    /// endpoint's origin.
    #[must_use]
    pub fn authority(&self) -> String {
        self.authenticating_authority
            .clone()
            .unwrap_or_else(|| self.authorization_endpoint.origin().ascii_serialization())
    }
}

/// Proxy configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl ProxyConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The private key path is empty
    /// - A file source has an empty path
    /// - A timeout or TTL is zero
    /// - A provider name is empty, malformed or repeated
    /// - A provider has an empty scope delimiter or user id field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keys.private_key.as_os_str().is_empty() {
            return Err(ConfigError::Missing("proxy.keys.private_key".into()));
        }

        let empty_file_source = self.consumer.sources.iter().any(|source| {
            matches!(source, SourceConfig::File { path } if path.as_os_str().is_empty())
        });
        if empty_file_source {
            return Err(ConfigError::InvalidValue(
                "proxy.consumer.sources: file source needs a path".into(),
            ));
        }

        if self.social.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "proxy.social.request_timeout must be > 0".into(),
            ));
        }
        if self.social.session_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "proxy.social.session_ttl must be > 0".into(),
            ));
        }

        let mut seen = HashSet::new();
        for provider in &self.social.providers {
            let name = provider.name.as_str();
            if name.is_empty()
                || !name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return Err(ConfigError::InvalidValue(format!(
                    "social provider name '{name}' must be non-empty and use [A-Za-z0-9_-]"
                )));
            }
            if !seen.insert(name) {
                return Err(ConfigError::InvalidValue(format!(
                    "social provider '{name}' is configured twice"
                )));
            }
            if provider.scope_delimiter.is_empty() {
                return Err(ConfigError::InvalidValue(format!(
                    "social provider '{name}': scope_delimiter must not be empty"
                )));
            }
            if provider.user_id_field.is_empty() {
                return Err(ConfigError::InvalidValue(format!(
                    "social provider '{name}': user_id_field must not be empty"
                )));
            }
        }

        Ok(())
    }
}
