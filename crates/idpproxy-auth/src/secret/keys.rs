//! RSA key pair used to seal and open consumer secrets.
//!
//! The proxy works with one fixed key pair supplied by the operator. The public
//! half encrypts secrets into metadata, the private half decrypts them at
//! verification and authentication time.

use std::fmt;
use std::path::Path;

use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::ProxyResult;
use crate::error::ProxyError;

/// Smallest modulus accepted, in bytes (1024 bits).
const MIN_MODULUS_BYTES: usize = 128;

/// The operator's RSA key pair.
#[derive(Clone)]
pub struct ProxyKeyPair {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl ProxyKeyPair {
    /// Generates a fresh key pair with the given modulus size.
    pub fn generate(bits: usize) -> ProxyResult<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| ProxyError::configuration(format!("RSA key generation failed: {e}")))?;
        Self::from_private_key(private_key)
    }

    /// Builds a key pair from a private key, deriving the public half.
    pub fn from_private_key(private_key: RsaPrivateKey) -> ProxyResult<Self> {
        let public_key = RsaPublicKey::from(&private_key);
        Self::from_parts(private_key, public_key)
    }

    /// Builds a key pair from both halves, checking that they match.
    pub fn from_parts(private_key: RsaPrivateKey, public_key: RsaPublicKey) -> ProxyResult<Self> {
        if RsaPublicKey::from(&private_key) != public_key {
            return Err(ProxyError::configuration(
                "public key does not belong to the private key",
            ));
        }
        if public_key.size() < MIN_MODULUS_BYTES {
            return Err(ProxyError::configuration(format!(
                "RSA modulus must be at least {} bits, got {}",
                MIN_MODULUS_BYTES * 8,
                public_key.size() * 8
            )));
        }
        Ok(Self {
            private_key,
            public_key,
        })
    }

    /// Parses a PEM private key (PKCS#8 or PKCS#1).
    pub fn from_private_pem(pem: &str) -> ProxyResult<Self> {
        Self::from_private_key(parse_private_pem(pem)?)
    }

    /// Loads the key pair from PEM files.
    ///
    /// When `public_path` is `None` the public key is derived from the private key.
    pub fn from_pem_files(private_path: &Path, public_path: Option<&Path>) -> ProxyResult<Self> {
        let private_pem = read_pem(private_path)?;
        let private_key = parse_private_pem(&private_pem)?;

        match public_path {
            Some(path) => {
                let public_key = parse_public_pem(&read_pem(path)?)?;
                Self::from_parts(private_key, public_key)
            }
            None => Self::from_private_key(private_key),
        }
    }

    /// The private key.
    #[must_use]
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// The public key.
    #[must_use]
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Returns the private key as PKCS#8 PEM.
    pub fn private_key_pem(&self) -> ProxyResult<String> {
        self.private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| ProxyError::internal(format!("Failed to encode private key: {e}")))
    }

    /// Returns the public key as SPKI PEM.
    pub fn public_key_pem(&self) -> ProxyResult<String> {
        self.public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| ProxyError::internal(format!("Failed to encode public key: {e}")))
    }
}

impl fmt::Debug for ProxyKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyKeyPair")
            .field("modulus_bits", &(self.public_key.size() * 8))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Parses a PEM public key (SPKI or PKCS#1).
pub fn parse_public_pem(pem: &str) -> ProxyResult<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| ProxyError::encryption(format!("Invalid RSA public key: {e}")))
}

fn parse_private_pem(pem: &str) -> ProxyResult<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| ProxyError::configuration(format!("Invalid RSA private key: {e}")))
}

fn read_pem(path: &Path) -> ProxyResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        ProxyError::configuration(format!("Failed to read key file {}: {e}", path.display()))
    })
}
