//! Credential source built from sealed secrets in SAML metadata.

use rsa::RsaPrivateKey;

use super::{CredentialMap, CredentialSource, SourceMatch, lookup_in, parse_service_secret};
use crate::metadata::{CUSTOMER_ATTRIBUTE, MetadataStore};
use crate::secret::decrypt_secret;

/// Credentials decrypted from every SP's customer attribute.
///
/// All tokens are opened once at construction; the source never changes
/// afterwards. Tokens that cannot be opened are left out.
#[derive(Debug, Clone, Default)]
pub struct MetadataSource {
    credentials: CredentialMap,
}

impl MetadataSource {
    /// Decrypts the customer attributes of every SP entity in `store`.
    ///
    /// When an entity carries several values, services from later values
    /// override the same services from earlier ones.
    #[must_use]
    pub fn new(store: &MetadataStore, private_key: &RsaPrivateKey) -> Self {
        let mut credentials = CredentialMap::new();

        for entity in store.entities().filter(|e| e.has_sp_role) {
            for token in entity.attribute_values(CUSTOMER_ATTRIBUTE) {
                let Some(secret) = decrypt_secret(token, private_key, &entity.entity_id) else {
                    continue;
                };
                match parse_service_secret(&secret) {
                    Ok(services) => {
                        credentials
                            .entry(entity.entity_id.clone())
                            .or_default()
                            .extend(services);
                    }
                    Err(e) => {
                        tracing::warn!(
                            entity_id = %entity.entity_id,
                            error = %e,
                            "The secrets in the metadata cannot be used for the sp"
                        );
                    }
                }
            }
        }

        tracing::debug!(entities = credentials.len(), "Decrypted metadata consumer secrets");

        Self { credentials }
    }

    /// Social services `entity_id` has usable credentials for, sorted.
    #[must_use]
    pub fn entity_services(&self, entity_id: &str) -> Vec<String> {
        self.credentials
            .get(entity_id)
            .map(|services| services.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of entities with credentials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Returns `true` if no entity had usable credentials.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

impl CredentialSource for MetadataSource {
    fn name(&self) -> &str {
        "metadata"
    }

    fn lookup(&self, social_service: &str, entity_id: &str) -> Option<SourceMatch> {
        lookup_in(&self.credentials, social_service, entity_id)
    }
}
