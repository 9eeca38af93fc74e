//! The plaintext sealed into metadata tokens.

use serde::{Deserialize, Deserializer, Serialize};

use crate::ProxyResult;
use crate::error::ProxyError;

/// An SP entity id paired with the consumer secret issued to it.
///
/// Serializes as `{"entityId": ..., "secret": ...}` in that field order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretRecord {
    #[serde(rename = "entityId")]
    entity_id: String,
    secret: String,
}

impl SecretRecord {
    /// Creates a record, rejecting empty fields.
    pub fn new(entity_id: impl Into<String>, secret: impl Into<String>) -> ProxyResult<Self> {
        let entity_id = entity_id.into();
        let secret = secret.into();

        if entity_id.trim().is_empty() {
            return Err(ProxyError::validation("entity id must not be empty"));
        }
        if secret.trim().is_empty() {
            return Err(ProxyError::validation("secret must not be empty"));
        }

        Ok(Self { entity_id, secret })
    }

    /// The SP entity id the secret is issued to.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// The secret text.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Canonical JSON payload.
    pub fn to_payload(&self) -> ProxyResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| ProxyError::encryption(format!("Failed to serialize record: {e}")))
    }
}

/// A decrypted payload, before the entity binding has been checked.
///
/// Older tokens carry the secret as an embedded JSON object rather than a
/// string and may bind several entity ids at once.
#[derive(Debug, Deserialize)]
pub(crate) struct OpenedRecord {
    #[serde(rename = "entityId")]
    pub entity_id: EntityBinding,
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub secret: Option<String>,
}

impl OpenedRecord {
    pub fn from_payload(payload: &[u8]) -> ProxyResult<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| ProxyError::decryption(format!("Invalid record payload: {e}")))
    }
}

/// The entity id (or ids) a record was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum EntityBinding {
    One(String),
    Many(Vec<String>),
}

impl EntityBinding {
    /// Returns `true` if the record may be used by `entity_id`.
    pub fn binds(&self, entity_id: &str) -> bool {
        match self {
            Self::One(id) => id == entity_id,
            Self::Many(ids) => ids.iter().any(|id| id == entity_id),
        }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        match Option::<serde_json::Value>::deserialize(deserializer)? {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_field_order() {
        let record = SecretRecord::new("https://sp.example/", "s3cret").unwrap();
        let payload = String::from_utf8(record.to_payload().unwrap()).unwrap();
        assert_eq!(
            payload,
            r#"{"entityId":"https://sp.example/","secret":"s3cret"}"#
        );
    }

    #[test]
    fn test_empty_fields_are_validation_errors() {
        assert!(matches!(
            SecretRecord::new("", "s"),
            Err(ProxyError::Validation { .. })
        ));
        assert!(matches!(
            SecretRecord::new("https://sp.example/", "  "),
            Err(ProxyError::Validation { .. })
        ));
    }

    #[test]
    fn test_quotes_in_input_stay_inside_fields() {
        let record = SecretRecord::new(r#"a", "secret": "b"#, "x").unwrap();
        let opened = OpenedRecord::from_payload(&record.to_payload().unwrap()).unwrap();
        assert!(opened.entity_id.binds(r#"a", "secret": "b"#));
        assert_eq!(opened.secret.as_deref(), Some("x"));
    }

    #[test]
    fn test_opened_record_accepts_object_secret() {
        let opened = OpenedRecord::from_payload(
            br#"{"entityId": "https://sp.example/", "secret": {"facebook": {"key": "k", "secret": "s"}}}"#,
        )
        .unwrap();
        let secret: serde_json::Value =
            serde_json::from_str(opened.secret.as_deref().unwrap()).unwrap();
        assert_eq!(secret["facebook"]["key"], "k");
    }

    #[test]
    fn test_opened_record_missing_secret() {
        let opened = OpenedRecord::from_payload(br#"{"entityId": "https://sp.example/"}"#).unwrap();
        assert!(opened.secret.is_none());
    }

    #[test]
    fn test_entity_binding() {
        let one = EntityBinding::One("https://a/".into());
        assert!(one.binds("https://a/"));
        assert!(!one.binds("https://a"));

        let many = EntityBinding::Many(vec!["https://a/".into(), "https://b/".into()]);
        assert!(many.binds("https://b/"));
        assert!(!many.binds("https://c/"));
    }
}
