//! End-to-end tests of sealing secrets into metadata and reading them back.

use idpproxy_auth::consumer::{ConsumerInfo, CredentialSource, MetadataSource, SourceMatch};
use idpproxy_auth::metadata::{CUSTOMER_ATTRIBUTE, MetadataStore, embed};
use idpproxy_auth::secret::{ProxyKeyPair, decrypt_secret, encrypt_secret, jwe};
use idpproxy_auth::{ConsumerCredential, ProxyError};
use std::sync::Arc;

const SP: &str = "https://sp.example.org/shibboleth";
const FACEBOOK_SECRET: &str = r#"{"facebook": {"key": "fb-app", "secret": "fb-secret"}}"#;

fn keys() -> ProxyKeyPair {
    ProxyKeyPair::generate(1024).unwrap()
}

fn sp_metadata(entity_id: &str, extension: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<md:EntitiesDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata">
  <md:EntityDescriptor entityID="{entity_id}">
    <md:SPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
      <md:Extensions>{extension}</md:Extensions>
      <md:AssertionConsumerService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST"
          Location="{entity_id}/acs" index="0"/>
    </md:SPSSODescriptor>
  </md:EntityDescriptor>
</md:EntitiesDescriptor>"#
    )
}

#[test]
fn round_trip_through_metadata() {
    let keys = keys();
    let token = encrypt_secret(SP, FACEBOOK_SECRET, keys.public_key()).unwrap();
    let xml = sp_metadata(SP, &embed(&token, CUSTOMER_ATTRIBUTE).unwrap());

    let store = MetadataStore::from_xml(&xml).unwrap();
    let values: Vec<_> = store
        .get(SP)
        .unwrap()
        .attribute_values(CUSTOMER_ATTRIBUTE)
        .collect();
    assert_eq!(values, vec![token.as_str()]);

    assert_eq!(
        decrypt_secret(values[0], keys.private_key(), SP).as_deref(),
        Some(FACEBOOK_SECRET)
    );
}

#[test]
fn metadata_source_feeds_resolver() {
    let keys = keys();
    let token = encrypt_secret(SP, FACEBOOK_SECRET, keys.public_key()).unwrap();
    let store = MetadataStore::from_xml(&sp_metadata(SP, &embed(&token, CUSTOMER_ATTRIBUTE).unwrap()))
        .unwrap();

    let source = MetadataSource::new(&store, keys.private_key());
    assert_eq!(source.entity_services(SP), vec!["facebook"]);

    let source: Arc<dyn CredentialSource> = Arc::new(source);
    let info = ConsumerInfo::new(vec![source]);
    assert_eq!(
        info.resolve("facebook", SP).unwrap(),
        ConsumerCredential::new("fb-app", "fb-secret")
    );
    assert!(matches!(
        info.resolve("twitter", SP),
        Err(ProxyError::CredentialNotFound { .. })
    ));
}

#[test]
fn token_copied_to_another_sp_is_ignored() {
    let keys = keys();
    let token = encrypt_secret(SP, FACEBOOK_SECRET, keys.public_key()).unwrap();
    let thief = "https://thief.example.org/";
    let store =
        MetadataStore::from_xml(&sp_metadata(thief, &embed(&token, CUSTOMER_ATTRIBUTE).unwrap()))
            .unwrap();

    let source = MetadataSource::new(&store, keys.private_key());
    assert!(source.entity_services(thief).is_empty());
    assert_eq!(source.lookup("facebook", thief), None);
}

#[test]
fn tampered_token_in_metadata_is_ignored() {
    let keys = keys();
    let token = encrypt_secret(SP, FACEBOOK_SECRET, keys.public_key()).unwrap();
    // drop the last character of the tag
    let tampered = &token[..token.len() - 1];
    let store =
        MetadataStore::from_xml(&sp_metadata(SP, &embed(tampered, CUSTOMER_ATTRIBUTE).unwrap()))
            .unwrap();

    assert!(MetadataSource::new(&store, keys.private_key()).is_empty());
}

#[test]
fn legacy_payload_with_entity_list_and_object_secret() {
    let keys = keys();
    let payload = format!(
        r#"{{"entityId": ["https://other.example/", "{SP}"], "secret": {FACEBOOK_SECRET}}}"#
    );
    let token = jwe::seal(payload.as_bytes(), keys.public_key()).unwrap();
    let store = MetadataStore::from_xml(&sp_metadata(SP, &embed(&token, CUSTOMER_ATTRIBUTE).unwrap()))
        .unwrap();

    let source = MetadataSource::new(&store, keys.private_key());
    assert_eq!(
        source.lookup("facebook", SP),
        Some(SourceMatch::Specific(ConsumerCredential::new(
            "fb-app",
            "fb-secret"
        )))
    );
}

#[test]
fn one_bad_token_does_not_hide_the_others() {
    let keys = keys();
    let good = encrypt_secret(SP, FACEBOOK_SECRET, keys.public_key()).unwrap();
    let extensions = format!(
        "{}{}",
        embed("not.a.valid.jwe.token", CUSTOMER_ATTRIBUTE).unwrap(),
        embed(&good, CUSTOMER_ATTRIBUTE).unwrap()
    );
    let store = MetadataStore::from_xml(&sp_metadata(SP, &extensions)).unwrap();

    let source = MetadataSource::new(&store, keys.private_key());
    assert_eq!(source.entity_services(SP), vec!["facebook"]);
}

#[test]
fn line_wrapped_token_in_metadata_still_resolves() {
    let keys = keys();
    let token = encrypt_secret(SP, FACEBOOK_SECRET, keys.public_key()).unwrap();
    let (head, tail) = token.split_at(token.len() / 2);
    let wrapped = format!("{head}\n      {tail}");
    let store = MetadataStore::from_xml(&sp_metadata(SP, &embed(&wrapped, CUSTOMER_ATTRIBUTE).unwrap()))
        .unwrap();

    let source = MetadataSource::new(&store, keys.private_key());
    assert_eq!(source.entity_services(SP), vec!["facebook"]);
}
