//! Chunked RSA-OAEP (SHA-256) payload encryption.
//!
//! OAEP caps a single ciphertext block at `k - 2*hLen - 2` plaintext bytes,
//! where `k` is the modulus size and `hLen` the digest size. Payloads are
//! split into chunks of that size, each encrypted independently, and the
//! `k`-byte ciphertext blocks concatenated. Decryption walks the input in
//! `k`-byte steps.
//!
//! A missing key turns both directions into a passthrough.

use crate::domain::errors::MetricError;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::path::Path;

const DIGEST_LEN: usize = 32;

fn oaep() -> Oaep {
    Oaep::new::<Sha256>()
}

/// Plaintext bytes one OAEP block can carry under `key`.
fn plaintext_step(key: &RsaPublicKey) -> Result<usize, MetricError> {
    key.size()
        .checked_sub(2 * DIGEST_LEN + 2)
        .filter(|step| *step > 0)
        .ok_or_else(|| {
            MetricError::Crypto(format!(
                "{}-bit key too small for OAEP-SHA256",
                key.size() * 8
            ))
        })
}

fn read_pem(path: &Path) -> Result<String, MetricError> {
    std::fs::read_to_string(path)
        .map_err(|e| MetricError::Crypto(format!("reading key {}: {}", path.display(), e)))
}

#[derive(Debug, Clone, Default)]
pub struct Encryptor {
    key: Option<RsaPublicKey>,
}

impl Encryptor {
    pub fn new(key: Option<RsaPublicKey>) -> Self {
        Self { key }
    }

    /// Accepts `RSA PUBLIC KEY` (PKCS#1) and `PUBLIC KEY` (SPKI) PEM blocks.
    pub fn from_pem(pem: &str) -> Result<Self, MetricError> {
        let key = RsaPublicKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPublicKey::from_public_key_pem(pem))
            .map_err(|e| MetricError::Crypto(format!("parsing public key: {}", e)))?;
        plaintext_step(&key)?;
        Ok(Self::new(Some(key)))
    }

    /// Loads the key at `path`; an empty path means no encryption.
    pub fn from_file(path: Option<&Path>) -> Result<Self, MetricError> {
        match path.filter(|p| !p.as_os_str().is_empty()) {
            Some(path) => Self::from_pem(&read_pem(path)?),
            None => Ok(Self::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Plaintext bytes per OAEP block, `None` when disabled or when the key
    /// is too small to carry any.
    pub fn chunk_size(&self) -> Option<usize> {
        self.key.as_ref().and_then(|k| plaintext_step(k).ok())
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, MetricError> {
        let Some(key) = &self.key else {
            return Ok(plaintext.to_vec());
        };

        let step = plaintext_step(key)?;
        let mut rng = OsRng;
        let mut encrypted = Vec::with_capacity(plaintext.len().div_ceil(step) * key.size());
        for chunk in plaintext.chunks(step) {
            let block = key
                .encrypt(&mut rng, oaep(), chunk)
                .map_err(|e| MetricError::Crypto(format!("encrypting block: {}", e)))?;
            encrypted.extend_from_slice(&block);
        }
        Ok(encrypted)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Decryptor {
    key: Option<RsaPrivateKey>,
}

impl Decryptor {
    pub fn new(key: Option<RsaPrivateKey>) -> Self {
        Self { key }
    }

    /// Accepts `RSA PRIVATE KEY` (PKCS#1) and `PRIVATE KEY` (PKCS#8) PEM blocks.
    pub fn from_pem(pem: &str) -> Result<Self, MetricError> {
        let key = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| MetricError::Crypto(format!("parsing private key: {}", e)))?;
        Ok(Self::new(Some(key)))
    }

    pub fn from_file(path: Option<&Path>) -> Result<Self, MetricError> {
        match path.filter(|p| !p.as_os_str().is_empty()) {
            Some(path) => Self::from_pem(&read_pem(path)?),
            None => Ok(Self::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, MetricError> {
        let Some(key) = &self.key else {
            return Ok(ciphertext.to_vec());
        };

        let step = key.size();
        if ciphertext.len() % step != 0 {
            return Err(MetricError::Crypto(format!(
                "ciphertext length {} is not a multiple of the {}-byte block",
                ciphertext.len(),
                step
            )));
        }

        let mut decrypted = Vec::with_capacity(ciphertext.len());
        for block in ciphertext.chunks(step) {
            let chunk = key
                .decrypt(oaep(), block)
                .map_err(|e| MetricError::Crypto(format!("decrypting block: {}", e)))?;
            decrypted.extend_from_slice(&chunk);
        }
        Ok(decrypted)
    }
}
