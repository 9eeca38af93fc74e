//! Compact JWE sealing with RSA-OAEP key wrap and AES-256-GCM content encryption.
//!
//! A token is five base64url segments joined by dots:
//! `header.encrypted_key.iv.ciphertext.tag`. The protected header is the
//! additional authenticated data of the GCM operation, so any change to any
//! segment makes [`open`] fail.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha1::Sha1;

use crate::ProxyResult;
use crate::error::ProxyError;

/// Key management algorithm identifier.
pub const ALG_RSA_OAEP: &str = "RSA-OAEP";

/// Content encryption algorithm identifier.
pub const ENC_A256GCM: &str = "A256GCM";

/// Content encryption key size for AES-256 (256 bits).
const KEY_SIZE: usize = 32;

/// IV size for AES-GCM (96 bits).
const IV_SIZE: usize = 12;

/// GCM authentication tag size.
const TAG_SIZE: usize = 16;

#[derive(Debug, Serialize, Deserialize)]
struct ProtectedHeader {
    alg: String,
    enc: String,
}

/// Encrypts `plaintext` for the holder of the private half of `public_key`.
pub fn seal(plaintext: &[u8], public_key: &RsaPublicKey) -> ProxyResult<String> {
    let header = serde_json::to_vec(&ProtectedHeader {
        alg: ALG_RSA_OAEP.to_string(),
        enc: ENC_A256GCM.to_string(),
    })
    .map_err(|e| ProxyError::encryption(format!("Failed to serialize header: {e}")))?;
    let header_b64 = URL_SAFE_NO_PAD.encode(header);

    let mut cek = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut cek);
    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);

    let encrypted_key = public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha1>(), &cek)
        .map_err(|e| ProxyError::encryption(format!("Key wrap failed: {e}")))?;

    let cipher = Aes256Gcm::new_from_slice(&cek)
        .map_err(|e| ProxyError::encryption(format!("Failed to create cipher: {e}")))?;
    let mut sealed = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: plaintext,
                aad: header_b64.as_bytes(),
            },
        )
        .map_err(|e| ProxyError::encryption(format!("Encryption failed: {e}")))?;

    // aes-gcm appends the tag to the ciphertext
    let tag = sealed.split_off(sealed.len() - TAG_SIZE);

    Ok([
        header_b64,
        URL_SAFE_NO_PAD.encode(encrypted_key),
        URL_SAFE_NO_PAD.encode(iv),
        URL_SAFE_NO_PAD.encode(sealed),
        URL_SAFE_NO_PAD.encode(tag),
    ]
    .join("."))
}

/// Decrypts a compact JWE produced by [`seal`].
///
/// ASCII whitespace anywhere in the token is ignored, so values that were
/// line-wrapped or re-indented inside a metadata document still open.
pub fn open(token: &str, private_key: &RsaPrivateKey) -> ProxyResult<Vec<u8>> {
    let compact: String = token
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let segments: Vec<&str> = compact.split('.').collect();
    let [header_b64, encrypted_key, iv, ciphertext, tag] = &segments[..] else {
        return Err(ProxyError::decryption(format!(
            "expected 5 segments, got {}",
            segments.len()
        )));
    };

    let header: ProtectedHeader = serde_json::from_slice(&decode_segment("header", header_b64)?)
        .map_err(|e| ProxyError::decryption(format!("Invalid protected header: {e}")))?;
    if header.alg != ALG_RSA_OAEP || header.enc != ENC_A256GCM {
        return Err(ProxyError::decryption(format!(
            "unsupported algorithms {}/{}",
            header.alg, header.enc
        )));
    }

    let cek = private_key
        .decrypt(Oaep::new::<Sha1>(), &decode_segment("encrypted key", encrypted_key)?)
        .map_err(|e| ProxyError::decryption(format!("Key unwrap failed: {e}")))?;
    if cek.len() != KEY_SIZE {
        return Err(ProxyError::decryption("Invalid content key size"));
    }

    let iv = decode_segment("iv", iv)?;
    if iv.len() != IV_SIZE {
        return Err(ProxyError::decryption("Invalid IV size"));
    }

    let tag = decode_segment("tag", tag)?;
    if tag.len() != TAG_SIZE {
        return Err(ProxyError::decryption("Invalid tag size"));
    }

    let mut sealed = decode_segment("ciphertext", ciphertext)?;
    sealed.extend_from_slice(&tag);

    let cipher = Aes256Gcm::new_from_slice(&cek)
        .map_err(|e| ProxyError::decryption(format!("Failed to create cipher: {e}")))?;
    cipher
        .decrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &sealed,
                aad: header_b64.as_bytes(),
            },
        )
        .map_err(|e| ProxyError::decryption(format!("Decryption failed: {e}")))
}

fn decode_segment(name: &str, segment: &str) -> ProxyResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| ProxyError::decryption(format!("Invalid {name} base64: {e}")))
}
