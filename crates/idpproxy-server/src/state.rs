//! Shared application state built once at startup.

use std::sync::Arc;
use std::time::Duration;

use idpproxy_auth::consumer::ConsumerInfo;
use idpproxy_auth::metadata::{MetadataError, MetadataStore};
use idpproxy_auth::secret::ProxyKeyPair;
use idpproxy_auth::social::{SessionCache, SocialError, SocialRegistry};
use idpproxy_auth::ProxyError;
use url::Url;

use crate::config::AppConfig;

/// Errors raised while assembling [`AppState`].
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to load proxy keys: {0}")]
    Keys(#[source] ProxyError),

    #[error("failed to load metadata: {0}")]
    Metadata(#[from] MetadataError),

    #[error("failed to set up consumer sources: {0}")]
    Consumers(#[source] ProxyError),

    #[error("failed to set up social providers: {0}")]
    Social(#[from] SocialError),
}

/// Everything the handlers need, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub keys: Arc<ProxyKeyPair>,
    pub metadata: Arc<MetadataStore>,
    pub consumers: Arc<ConsumerInfo>,
    pub sessions: Arc<SessionCache>,
    pub social: Arc<SocialRegistry>,
}

impl AppState {
    /// Loads keys and metadata from disk and wires the credential sources
    /// and social providers.
    pub fn from_config(config: &AppConfig) -> Result<Self, StartupError> {
        let proxy = &config.proxy;

        let keys = ProxyKeyPair::from_pem_files(
            &proxy.keys.private_key,
            proxy.keys.public_key.as_deref(),
        )
        .map_err(StartupError::Keys)?;
        tracing::info!(path = %proxy.keys.private_key.display(), "Proxy key pair loaded");

        let metadata = MetadataStore::load_files(proxy.metadata.files.as_slice())?;
        tracing::info!(
            files = proxy.metadata.files.len(),
            entities = metadata.len(),
            "Metadata loaded"
        );

        let consumers = ConsumerInfo::from_config(&proxy.consumer, &metadata, keys.private_key())
            .map_err(StartupError::Consumers)?;
        tracing::info!(sources = consumers.len(), "Consumer sources ready");

        let base_url = Url::parse(&config.base_url())
            .map_err(|e| StartupError::Config(format!("server.base_url: {e}")))?;

        let consumers = Arc::new(consumers);
        let sessions = Arc::new(SessionCache::new());
        let social = SocialRegistry::from_config(
            &proxy.social,
            &base_url,
            Arc::clone(&consumers),
            Arc::clone(&sessions),
        )?;

        Ok(Self {
            config: Arc::new(config.clone()),
            keys: Arc::new(keys),
            metadata: Arc::new(metadata),
            consumers,
            sessions,
            social: Arc::new(social),
        })
    }

    /// Lifetime of login sessions.
    pub fn session_ttl(&self) -> Duration {
        self.config.proxy.social.session_ttl
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("metadata_entities", &self.metadata.len())
            .field("consumers", &self.consumers)
            .field("sessions", &self.sessions.len())
            .field("social", &self.social.services())
            .finish_non_exhaustive()
    }
}
