//! Sealing consumer secrets into metadata tokens and opening them again.
//!
//! - [`encrypt_secret`] turns an `(entity id, secret)` pair into a compact JWE
//! - [`decrypt_secret`] opens a token and checks it was issued to the expected entity
//!
//! Decryption never fails loudly: a token that cannot be opened, is missing
//! its secret, or belongs to another entity simply yields `None`.

pub mod jwe;
pub mod keys;
pub mod record;

use rsa::{RsaPrivateKey, RsaPublicKey};

pub use keys::{ProxyKeyPair, parse_public_pem};
pub use record::SecretRecord;

use crate::ProxyResult;
use record::OpenedRecord;

/// Encrypts a consumer secret for the SP `entity_id`.
///
/// # Errors
///
/// Returns `Validation` for empty fields and `Encryption` when the key cannot
/// wrap the content key.
pub fn encrypt_secret(
    entity_id: &str,
    secret: &str,
    public_key: &RsaPublicKey,
) -> ProxyResult<String> {
    let record = SecretRecord::new(entity_id, secret)?;
    encrypt_record(&record, public_key)
}

/// Encrypts an already validated record.
pub fn encrypt_record(record: &SecretRecord, public_key: &RsaPublicKey) -> ProxyResult<String> {
    jwe::seal(&record.to_payload()?, public_key)
}

/// Decrypts `token` and returns its secret if it was issued to `expected_entity_id`.
pub fn decrypt_secret(
    token: &str,
    private_key: &RsaPrivateKey,
    expected_entity_id: &str,
) -> Option<String> {
    match open_bound(token, private_key, expected_entity_id) {
        Ok(secret) => Some(secret),
        Err(e) => {
            tracing::warn!(
                entity_id = %expected_entity_id,
                error = %e,
                "The secrets in the metadata cannot be used for the sp"
            );
            None
        }
    }
}

fn open_bound(
    token: &str,
    private_key: &RsaPrivateKey,
    expected_entity_id: &str,
) -> ProxyResult<String> {
    let payload = jwe::open(token, private_key)?;
    let record = OpenedRecord::from_payload(&payload)?;

    if !record.entity_id.binds(expected_entity_id) {
        return Err(crate::ProxyError::decryption("entity id does not match"));
    }

    record
        .secret
        .ok_or_else(|| crate::ProxyError::decryption("record has no secret"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProxyError;

    #[test]
    fn test_round_trip() {
        let keys = ProxyKeyPair::generate(1024).unwrap();
        let secret = r#"{"facebook":{"key":"k","secret":"s"}}"#;
        let token = encrypt_secret("https://sp.example/", secret, keys.public_key()).unwrap();

        assert_eq!(
            decrypt_secret(&token, keys.private_key(), "https://sp.example/").as_deref(),
            Some(secret)
        );
    }

    #[test]
    fn test_entity_mismatch_is_not_found() {
        let keys = ProxyKeyPair::generate(1024).unwrap();
        let token = encrypt_secret("A", "s", keys.public_key()).unwrap();

        assert!(decrypt_secret(&token, keys.private_key(), "B").is_none());
        assert!(decrypt_secret(&token, keys.private_key(), "A").is_some());
    }

    #[test]
    fn test_prefix_of_entity_is_not_found() {
        let keys = ProxyKeyPair::generate(1024).unwrap();
        let token = encrypt_secret("https://sp.example/long", "s", keys.public_key()).unwrap();

        assert!(decrypt_secret(&token, keys.private_key(), "https://sp.example/").is_none());
    }

    #[test]
    fn test_wrong_key_is_not_found() {
        let keys = ProxyKeyPair::generate(1024).unwrap();
        let other = ProxyKeyPair::generate(1024).unwrap();
        let token = encrypt_secret("A", "s", keys.public_key()).unwrap();

        assert!(decrypt_secret(&token, other.private_key(), "A").is_none());
    }

    #[test]
    fn test_missing_secret_is_not_found() {
        let keys = ProxyKeyPair::generate(1024).unwrap();
        let token = jwe::seal(br#"{"entityId": "A"}"#, keys.public_key()).unwrap();

        assert!(decrypt_secret(&token, keys.private_key(), "A").is_none());
    }

    #[test]
    fn test_non_json_payload_is_not_found() {
        let keys = ProxyKeyPair::generate(1024).unwrap();
        let token = jwe::seal(b"not json", keys.public_key()).unwrap();

        assert!(decrypt_secret(&token, keys.private_key(), "A").is_none());
    }

    #[test]
    fn test_malformed_record_is_caller_error() {
        let keys = ProxyKeyPair::generate(1024).unwrap();
        let err = encrypt_secret("", "s", keys.public_key()).unwrap_err();
        assert!(matches!(err, ProxyError::Validation { .. }));
    }
}
