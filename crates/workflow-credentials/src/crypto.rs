// workflow-credentials/src/crypto.rs
// ============================================================================
// Module: At-Rest Encryption
// Description: AES-256-GCM encrypt/decrypt under a process-held master key.
// Purpose: Give the credential store a single place that touches key
// material; everything else handles opaque ciphertext strings.
// Dependencies: aes-gcm, base64, rand
// ============================================================================

//! ## Overview
//! Unlike a passphrase-derived scheme, this crate holds a 256-bit key
//! generated once per process (or supplied by the host) rather than
//! re-deriving one from a passphrase on every call — the master key stays
//! outside the core's address space where feasible; the core holds a
//! decryption handle, not the raw key material. The AEAD primitive itself
//! (`aes_gcm::Aes256Gcm`, random nonce per call, base64 framing) mirrors a
//! typical passphrase-based encryption scheme, adapted to skip the
//! PBKDF2/salt derivation step since the key is already 256 bits.

use aes_gcm::Aes256Gcm;
use aes_gcm::Nonce;
use aes_gcm::aead::Aead;
use aes_gcm::aead::KeyInit;
use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

/// Nonce size for AES-GCM, in bytes.
const NONCE_SIZE: usize = 12;
/// Key size for AES-256, in bytes.
const KEY_SIZE: usize = 32;

/// Fixed algorithm label stored alongside every encrypted key, satisfying
/// `Key.algorithm`.
pub const ALGORITHM_LABEL: &str = "aes-256-gcm";

/// Encryption/decryption failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The ciphertext or iv was not valid base64.
    #[error("invalid base64 encoding: {0}")]
    InvalidEncoding(String),
    /// AEAD encryption failed.
    #[error("encryption failed")]
    EncryptFailed,
    /// AEAD decryption failed (wrong key, corrupted ciphertext, or tampering).
    #[error("decryption failed")]
    DecryptFailed,
    /// The decrypted bytes were not valid UTF-8.
    #[error("decrypted value is not valid utf-8")]
    InvalidUtf8,
}

/// A 256-bit key held for the lifetime of the process.
///
/// # Invariants
/// - Never serialized; never logged.
pub struct MasterKey([u8; KEY_SIZE]);

impl MasterKey {
    /// Generates a new random master key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wraps raw key bytes supplied by the host (e.g. from a KMS or OS
    /// keystore handle).
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    fn cipher(&self) -> Aes256Gcm {
        #[allow(clippy::expect_used, reason = "a fixed 32-byte slice always constructs a valid AES-256 cipher")]
        Aes256Gcm::new_from_slice(&self.0).expect("master key is always 32 bytes")
    }
}

/// Encrypts `plaintext`, returning `(ciphertext_b64, iv_b64)`.
///
/// # Errors
/// Returns [`CryptoError::EncryptFailed`] if the AEAD operation fails.
pub fn encrypt_value(plaintext: &str, key: &MasterKey) -> Result<(String, String), CryptoError> {
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = key.cipher().encrypt(nonce, plaintext.as_bytes()).map_err(|_| CryptoError::EncryptFailed)?;
    Ok((BASE64.encode(ciphertext), BASE64.encode(nonce_bytes)))
}

/// Decrypts a `(ciphertext_b64, iv_b64)` pair produced by [`encrypt_value`].
///
/// # Errors
/// Returns [`CryptoError`] if either field is not valid base64, the nonce is
/// the wrong length, or the AEAD tag fails to verify.
pub fn decrypt_value(ciphertext_b64: &str, iv_b64: &str, key: &MasterKey) -> Result<String, CryptoError> {
    let ciphertext = BASE64.decode(ciphertext_b64).map_err(|err| CryptoError::InvalidEncoding(err.to_string()))?;
    let nonce_bytes = BASE64.decode(iv_b64).map_err(|err| CryptoError::InvalidEncoding(err.to_string()))?;
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidEncoding("iv must be 12 bytes".to_string()));
    }
    let nonce = Nonce::from_slice(&nonce_bytes);
    let plaintext = key.cipher().decrypt(nonce, ciphertext.as_slice()).map_err(|_| CryptoError::DecryptFailed)?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = MasterKey::generate();
        let (ciphertext, iv) = encrypt_value("sk-live-abc123", &key).unwrap();
        let plaintext = decrypt_value(&ciphertext, &iv, &key).unwrap();
        assert_eq!(plaintext, "sk-live-abc123");
    }

    #[test]
    fn encrypt_produces_distinct_nonces() {
        let key = MasterKey::generate();
        let (ciphertext_a, iv_a) = encrypt_value("same-value", &key).unwrap();
        let (ciphertext_b, iv_b) = encrypt_value("same-value", &key).unwrap();
        assert_ne!(iv_a, iv_b);
        assert_ne!(ciphertext_a, ciphertext_b);
    }

    #[test]
    fn decrypt_with_wrong_key_fails() {
        let key = MasterKey::generate();
        let other = MasterKey::generate();
        let (ciphertext, iv) = encrypt_value("secret", &key).unwrap();
        assert_eq!(decrypt_value(&ciphertext, &iv, &other), Err(CryptoError::DecryptFailed));
    }

    #[test]
    fn decrypt_rejects_malformed_iv() {
        let key = MasterKey::generate();
        let (ciphertext, _) = encrypt_value("secret", &key).unwrap();
        let result = decrypt_value(&ciphertext, "not-base64!!!", &key);
        assert!(matches!(result, Err(CryptoError::InvalidEncoding(_))));
    }
}
