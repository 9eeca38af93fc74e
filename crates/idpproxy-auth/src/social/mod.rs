//! Social login providers.

pub mod error;
pub mod oauth2;
pub mod session;

use std::collections::BTreeMap;
use std::sync::Arc;

use url::Url;

pub use error::SocialError;
pub use oauth2::{
    AUTHENTICATION_FAILED, CallbackParams, OAuth2Provider, SocialOutcome, SocialProfile,
    callback_url,
};
pub use session::{AuthenticationState, LoginPhase, Session, SessionCache};

use crate::config::SocialConfig;
use crate::consumer::ConsumerInfo;

/// The configured providers, keyed by service name.
#[derive(Debug, Default)]
pub struct SocialRegistry {
    providers: BTreeMap<String, OAuth2Provider>,
}

impl SocialRegistry {
    /// Builds a provider for every entry in `config`.
    pub fn from_config(
        config: &SocialConfig,
        base_url: &Url,
        consumers: Arc<ConsumerInfo>,
        sessions: Arc<SessionCache>,
    ) -> Result<Self, SocialError> {
        let mut providers = BTreeMap::new();
        for provider in &config.providers {
            let adapter = OAuth2Provider::new(
                provider.clone(),
                base_url,
                config.request_timeout,
                Arc::clone(&consumers),
                Arc::clone(&sessions),
            )?;
            tracing::info!(
                provider = %provider.name,
                enabled = provider.enabled,
                callback = %adapter.callback_url(),
                "Registered social provider"
            );
            providers.insert(provider.name.clone(), adapter);
        }
        Ok(Self { providers })
    }

    /// Looks up an enabled provider.
    pub fn get(&self, service: &str) -> Result<&OAuth2Provider, SocialError> {
        let provider = self
            .providers
            .get(service)
            .ok_or_else(|| SocialError::ProviderNotFound(service.to_string()))?;
        if !provider.config().enabled {
            return Err(SocialError::ProviderDisabled(service.to_string()));
        }
        Ok(provider)
    }

    /// Names of the enabled providers, sorted.
    pub fn services(&self) -> Vec<&str> {
        self.providers
            .values()
            .filter(|p| p.config().enabled)
            .map(OAuth2Provider::name)
            .collect()
    }

    /// Number of configured providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` if no provider is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
