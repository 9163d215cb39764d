// crates/formvault-core/src/core/cipher.rs
// ============================================================================
// Module: Formvault Field Cipher
// Description: Per-value authenticated encryption and keyed hashing.
// Purpose: Encrypt sensitive columns at rest and keep them equality-searchable.
// Dependencies: aes-gcm, base64, hmac, pbkdf2, rand, sha2, thiserror
// ============================================================================

//! ## Overview
//! [`FieldCipher`] encrypts one value at a time with AES-256-GCM. Every call
//! to [`FieldCipher::encrypt`] draws a fresh random nonce, prepends it to the
//! ciphertext, and base64-encodes the result for storage. The key is derived
//! once with PBKDF2-HMAC-SHA256 from host-provided secrets.
//!
//! [`FieldCipher::keyed_hash`] computes HMAC-SHA256 under a separate salt
//! secret so encrypted columns can still be matched by equality.
//!
//! Failures never abort a batch: both directions return `None` and the
//! caller skips the record. Key material is never formatted or logged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use aes_gcm::Aes256Gcm;
use aes_gcm::KeyInit;
use aes_gcm::Nonce;
use aes_gcm::aead::Aead;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::Hmac;
use hmac::Mac;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Nonce width prepended to every ciphertext.
pub const NONCE_LEN: usize = 12;
/// Derived key width.
const KEY_LEN: usize = 32;
/// GCM authentication tag width.
const TAG_LEN: usize = 16;
/// Default PBKDF2 iteration count.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;
/// Lowest accepted PBKDF2 iteration count.
pub const MIN_PBKDF2_ITERATIONS: u32 = 10_000;
/// Minimum combined length of the key material.
const MIN_SECRET_LEN: usize = 16;
/// Domain-separation salt for key derivation.
const DERIVATION_SALT: &[u8] = b"formvault/field-cipher/v1";

/// HMAC-SHA256 alias.
type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Cipher configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    /// Required secret material is missing or too short.
    #[error("cipher not configured: {0}")]
    NotConfigured(String),
}

// ============================================================================
// SECTION: Secrets
// ============================================================================

/// Secret inputs for key derivation, taken from the host environment.
#[derive(Clone)]
pub struct CipherSecrets {
    /// Secret strings concatenated into the encryption password.
    pub key_material: Vec<String>,
    /// Separate secret keying the equality hash.
    pub hash_salt: String,
    /// PBKDF2 iteration count.
    pub iterations: u32,
}

impl fmt::Debug for CipherSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherSecrets")
            .field("key_material", &"<redacted>")
            .field("hash_salt", &"<redacted>")
            .field("iterations", &self.iterations)
            .finish()
    }
}

// ============================================================================
// SECTION: Cipher
// ============================================================================

/// Symmetric field cipher with a process-lifetime derived key.
pub struct FieldCipher {
    /// AES-256-GCM instance keyed with the derived key.
    aead: Aes256Gcm,
    /// HMAC key for equality hashes.
    hash_key: Vec<u8>,
}

impl fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldCipher(<redacted>)")
    }
}

impl FieldCipher {
    /// Derives the cipher key from host secrets.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::NotConfigured`] when secrets are missing, too
    /// short, or the iteration count is below the floor.
    pub fn from_secrets(secrets: &CipherSecrets) -> Result<Self, CipherError> {
        let password: String = secrets.key_material.iter().map(|part| part.trim()).collect();
        if password.len() < MIN_SECRET_LEN {
            return Err(CipherError::NotConfigured(format!(
                "key material must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        let hash_salt = secrets.hash_salt.trim();
        if hash_salt.len() < MIN_SECRET_LEN {
            return Err(CipherError::NotConfigured(format!(
                "hash salt must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if hash_salt == password {
            return Err(CipherError::NotConfigured(
                "hash salt must differ from the key material".to_string(),
            ));
        }
        if secrets.iterations < MIN_PBKDF2_ITERATIONS {
            return Err(CipherError::NotConfigured(format!(
                "pbkdf2 iterations must be at least {MIN_PBKDF2_ITERATIONS}"
            )));
        }
        let mut key = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(
            password.as_bytes(),
            DERIVATION_SALT,
            secrets.iterations,
            &mut key,
        );
        let aead = <Aes256Gcm as KeyInit>::new_from_slice(&key)
            .map_err(|_| CipherError::NotConfigured("derived key rejected".to_string()))?;
        Ok(Self {
            aead,
            hash_key: hash_salt.as_bytes().to_vec(),
        })
    }

    /// Encrypts a value with a fresh random nonce.
    ///
    /// Returns `None` when the AEAD rejects the input.
    #[must_use]
    pub fn encrypt(&self, plaintext: &str) -> Option<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self.aead.encrypt(nonce, plaintext.as_bytes()).ok()?;
        let mut framed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        framed.extend_from_slice(&nonce_bytes);
        framed.extend_from_slice(&ciphertext);
        Some(BASE64.encode(framed))
    }

    /// Decrypts a stored value.
    ///
    /// Returns `None` for bad encoding, truncated input, authentication
    /// failure, or non-UTF-8 plaintext.
    #[must_use]
    pub fn decrypt(&self, stored: &str) -> Option<String> {
        let framed = BASE64.decode(stored.trim().as_bytes()).ok()?;
        if framed.len() < NONCE_LEN + TAG_LEN {
            return None;
        }
        let (nonce_bytes, ciphertext) = framed.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self.aead.decrypt(nonce, ciphertext).ok()?;
        String::from_utf8(plaintext).ok()
    }

    /// Computes the deterministic equality hash of a value (64 hex chars).
    #[must_use]
    pub fn keyed_hash(&self, value: &str) -> String {
        let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(&self.hash_key) else {
            // HMAC accepts keys of any length.
            return String::new();
        };
        mac.update(value.as_bytes());
        hex_encode(&mac.finalize().into_bytes())
    }
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

/// Returns `len` random bytes as lowercase hex.
#[must_use]
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex_encode(&bytes)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use super::*;

    fn secrets() -> CipherSecrets {
        CipherSecrets {
            key_material: vec!["auth-key-0123456789".to_string(), "secure-auth-key".to_string()],
            hash_salt: "hash-salt-abcdefghijkl".to_string(),
            iterations: MIN_PBKDF2_ITERATIONS,
        }
    }

    #[test]
    fn rejects_short_key_material() {
        let mut secrets = secrets();
        secrets.key_material = vec!["short".to_string()];
        let err = FieldCipher::from_secrets(&secrets).unwrap_err();
        assert!(matches!(err, CipherError::NotConfigured(_)));
    }

    #[test]
    fn rejects_low_iterations() {
        let mut secrets = secrets();
        secrets.iterations = 1;
        assert!(FieldCipher::from_secrets(&secrets).is_err());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let secrets = secrets();
        let rendered = format!("{secrets:?}");
        assert!(!rendered.contains("auth-key"));
        let cipher = FieldCipher::from_secrets(&secrets).unwrap();
        assert_eq!(format!("{cipher:?}"), "FieldCipher(<redacted>)");
    }

    #[test]
    fn truncated_ciphertext_yields_none() {
        let cipher = FieldCipher::from_secrets(&secrets()).unwrap();
        let stored = cipher.encrypt("a@x.com").unwrap();
        let mut raw = BASE64.decode(stored).unwrap();
        raw.truncate(NONCE_LEN + 4);
        assert_eq!(cipher.decrypt(&BASE64.encode(raw)), None);
        assert_eq!(cipher.decrypt("not base64 at all!"), None);
    }

    #[test]
    fn random_hex_has_expected_width() {
        let token = random_hex(16);
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|ch| ch.is_ascii_hexdigit()));
    }
}
