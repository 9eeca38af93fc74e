//! Consumer credential resolution.
//!
//! A consumer credential is the OAuth client key and secret an SP uses with a
//! social service. Credentials come from an ordered list of
//! [`CredentialSource`]s; [`ConsumerInfo::resolve`] picks the answer with
//! these rules:
//!
//! 1. The first source that knows the `(entity, service)` pair wins.
//! 2. Otherwise the first `DEFAULT` entry seen for the service wins.
//! 3. Otherwise resolution fails with `CredentialNotFound`.

pub mod file;
pub mod metadata;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};

pub use file::FileSource;
pub use metadata::MetadataSource;

use crate::ProxyResult;
use crate::config::{ConsumerConfig, SourceConfig};
use crate::error::ProxyError;
use crate::metadata::MetadataStore;

/// Bucket consulted when an entity has no credentials of its own.
pub const DEFAULT_ENTITY: &str = "DEFAULT";

/// OAuth client key and secret for one social service.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerCredential {
    /// The client id.
    pub key: String,
    /// The client secret.
    pub secret: String,
}

impl ConsumerCredential {
    /// Creates a credential.
    #[must_use]
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for ConsumerCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerCredential")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Credentials of one entity, keyed by social service.
pub type ServiceCredentials = BTreeMap<String, ConsumerCredential>;

/// Credentials keyed by entity id, then social service.
pub type CredentialMap = HashMap<String, ServiceCredentials>;

/// Parses a decrypted metadata secret: a JSON object mapping social service
/// names to `{"key", "secret"}`.
pub fn parse_service_secret(secret: &str) -> ProxyResult<ServiceCredentials> {
    serde_json::from_str(secret).map_err(|e| {
        ProxyError::validation(format!(
            "secret must map social services to {{\"key\", \"secret\"}}: {e}"
        ))
    })
}

/// How specific a source's answer is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMatch {
    /// The source has credentials for the entity itself.
    Specific(ConsumerCredential),
    /// The source only had a `DEFAULT` entry for the service.
    Default(ConsumerCredential),
}

/// Looks up `(entity, service)` in `map`, falling back to the `DEFAULT` bucket.
#[must_use]
pub fn lookup_in(map: &CredentialMap, social_service: &str, entity_id: &str) -> Option<SourceMatch> {
    if let Some(credential) = map.get(entity_id).and_then(|s| s.get(social_service)) {
        return Some(SourceMatch::Specific(credential.clone()));
    }
    map.get(DEFAULT_ENTITY)
        .and_then(|s| s.get(social_service))
        .map(|credential| SourceMatch::Default(credential.clone()))
}

/// A place consumer credentials can be looked up in.
pub trait CredentialSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Looks up the credentials for `social_service` at `entity_id`.
    fn lookup(&self, social_service: &str, entity_id: &str) -> Option<SourceMatch>;
}

/// Ordered credential sources.
#[derive(Clone, Default)]
pub struct ConsumerInfo {
    sources: Vec<Arc<dyn CredentialSource>>,
}

impl ConsumerInfo {
    /// Creates a resolver over `sources`, consulted in order.
    #[must_use]
    pub fn new(sources: Vec<Arc<dyn CredentialSource>>) -> Self {
        Self { sources }
    }

    /// Builds the sources listed in `config`.
    ///
    /// The metadata-derived source is built at most once, from `store`, and
    /// shared if the list names it more than once.
    pub fn from_config(
        config: &ConsumerConfig,
        store: &MetadataStore,
        private_key: &RsaPrivateKey,
    ) -> ProxyResult<Self> {
        let mut sources: Vec<Arc<dyn CredentialSource>> = Vec::with_capacity(config.sources.len());
        let mut metadata_source: Option<Arc<MetadataSource>> = None;

        for source in &config.sources {
            match source {
                SourceConfig::File { path } => {
                    sources.push(Arc::new(FileSource::open(path)?));
                }
                SourceConfig::Metadata => {
                    let shared = metadata_source
                        .get_or_insert_with(|| Arc::new(MetadataSource::new(store, private_key)))
                        .clone();
                    sources.push(shared);
                }
            }
        }

        tracing::info!(
            sources = %sources.iter().map(|s| s.name()).collect::<Vec<_>>().join(","),
            "Consumer credential sources ready"
        );

        Ok(Self::new(sources))
    }

    /// Appends a source.
    pub fn push(&mut self, source: Arc<dyn CredentialSource>) {
        self.sources.push(source);
    }

    /// Number of sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Returns `true` if there are no sources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Resolves the consumer credential for `social_service` at `entity_id`.
    pub fn resolve(&self, social_service: &str, entity_id: &str) -> ProxyResult<ConsumerCredential> {
        tracing::debug!(%social_service, %entity_id, "Resolving consumer info");

        let mut fallback: Option<ConsumerCredential> = None;

        for source in &self.sources {
            match source.lookup(social_service, entity_id) {
                Some(SourceMatch::Specific(credential)) => {
                    tracing::debug!(source = source.name(), "Entity specific credentials found");
                    return Ok(credential);
                }
                Some(SourceMatch::Default(credential)) if fallback.is_none() => {
                    tracing::debug!(source = source.name(), "Default credentials noted");
                    fallback = Some(credential);
                }
                Some(SourceMatch::Default(_)) | None => {}
            }
        }

        fallback.ok_or_else(|| ProxyError::credential_not_found(social_service, entity_id))
    }
}

impl fmt::Debug for ConsumerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerInfo")
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// A fixed in-memory source.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    name: String,
    credentials: CredentialMap,
}

impl StaticSource {
    /// Creates a source over `credentials`.
    #[must_use]
    pub fn new(name: impl Into<String>, credentials: CredentialMap) -> Self {
        Self {
            name: name.into(),
            credentials,
        }
    }
}

impl CredentialSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, social_service: &str, entity_id: &str) -> Option<SourceMatch> {
        lookup_in(&self.credentials, social_service, entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str, &str, &str)]) -> CredentialMap {
        let mut map = CredentialMap::new();
        for (entity, service, key, secret) in entries {
            map.entry((*entity).to_string())
                .or_default()
                .insert((*service).to_string(), ConsumerCredential::new(*key, *secret));
        }
        map
    }

    fn source(name: &str, entries: &[(&str, &str, &str, &str)]) -> Arc<dyn CredentialSource> {
        Arc::new(StaticSource::new(name, map(entries)))
    }

    #[test]
    fn test_lookup_in_falls_back_per_service() {
        let credentials = map(&[
            ("E", "twitter", "tk", "ts"),
            ("DEFAULT", "facebook", "dk", "ds"),
        ]);

        assert_eq!(
            lookup_in(&credentials, "twitter", "E"),
            Some(SourceMatch::Specific(ConsumerCredential::new("tk", "ts")))
        );
        // entity known but service missing
        assert_eq!(
            lookup_in(&credentials, "facebook", "E"),
            Some(SourceMatch::Default(ConsumerCredential::new("dk", "ds")))
        );
        assert_eq!(lookup_in(&credentials, "github", "E"), None);
    }

    #[test]
    fn test_specific_beats_earlier_default() {
        let info = ConsumerInfo::new(vec![
            source("a", &[("DEFAULT", "facebook", "k1", "s1")]),
            source("b", &[("E", "facebook", "k2", "s2")]),
        ]);

        let credential = info.resolve("facebook", "E").unwrap();
        assert_eq!(credential, ConsumerCredential::new("k2", "s2"));
    }

    #[test]
    fn test_first_default_wins() {
        let info = ConsumerInfo::new(vec![
            source("a", &[("DEFAULT", "facebook", "k1", "s1")]),
            source("b", &[("DEFAULT", "facebook", "k2", "s2")]),
        ]);

        assert_eq!(info.resolve("facebook", "E").unwrap().key, "k1");
    }

    #[test]
    fn test_earlier_specific_beats_later_specific() {
        let info = ConsumerInfo::new(vec![
            source("a", &[("E", "facebook", "k1", "s1")]),
            source("b", &[("E", "facebook", "k2", "s2")]),
        ]);

        assert_eq!(info.resolve("facebook", "E").unwrap().key, "k1");
    }

    #[test]
    fn test_not_found() {
        let info = ConsumerInfo::new(vec![source("a", &[("E", "twitter", "k", "s")])]);

        let err = info.resolve("facebook", "E").unwrap_err();
        assert!(matches!(err, ProxyError::CredentialNotFound { .. }));
        assert!(ConsumerInfo::default().resolve("facebook", "E").is_err());
    }

    #[test]
    fn test_parse_service_secret() {
        let parsed =
            parse_service_secret(r#"{"facebook": {"key": "k", "secret": "s"}}"#).unwrap();
        assert_eq!(parsed["facebook"], ConsumerCredential::new("k", "s"));

        assert!(matches!(
            parse_service_secret("plain secret"),
            Err(ProxyError::Validation { .. })
        ));
        assert!(parse_service_secret(r#"{"facebook": "k"}"#).is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", ConsumerCredential::new("key", "hunter2"));
        assert!(debug.contains("key"));
        assert!(!debug.contains("hunter2"));
    }
}
