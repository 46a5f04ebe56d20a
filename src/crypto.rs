//! Symmetric session-key encryption of attachment content.
//!
//! Each attachment is encrypted under its own random 256-bit session key.
//! Ciphertext layout: `nonce (12 bytes) || AES-256-GCM ciphertext+tag`.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use thiserror::Error;

/// Nonce size for AES-GCM (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

/// Session key length in bytes.
pub const SESSION_KEY_LEN: usize = 32;

/// Errors from the cipher layer. Mapped to `AttachmentError::Decrypt` by
/// the fetch pipeline.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid session key: {0}")]
    InvalidKey(String),

    #[error("Ciphertext too short ({0} bytes)")]
    Truncated(usize),

    #[error("Encryption failed")]
    Encryption,

    #[error("Decryption failed: authentication tag mismatch")]
    Decryption,
}

/// A per-attachment symmetric key.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl SessionKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        let mut bytes = [0u8; SESSION_KEY_LEN];
        bytes.copy_from_slice(&key);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SESSION_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a base64-encoded key.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let raw = BASE64
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let bytes: [u8; SESSION_KEY_LEN] = raw
            .try_into()
            .map_err(|v: Vec<u8>| CryptoError::InvalidKey(format!("{} bytes", v.len())))?;
        Ok(Self(bytes))
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    fn as_key(&self) -> &Key<Aes256Gcm> {
        Key::<Aes256Gcm>::from_slice(&self.0)
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Symmetric encrypt/decrypt of attachment bytes under a session key.
pub trait SessionCipher: Send + Sync {
    fn encrypt(&self, key: &SessionKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn decrypt(&self, key: &SessionKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// AES-256-GCM with a random nonce prepended to the ciphertext.
#[derive(Debug, Default, Clone, Copy)]
pub struct AesGcmCipher;

impl SessionCipher for AesGcmCipher {
    fn encrypt(&self, key: &SessionKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = Aes256Gcm::new(key.as_key());
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::Encryption)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, key: &SessionKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < NONCE_SIZE {
            return Err(CryptoError::Truncated(ciphertext.len()));
        }
        let (nonce, body) = ciphertext.split_at(NONCE_SIZE);
        let cipher = Aes256Gcm::new(key.as_key());
        cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| CryptoError::Decryption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_then_decrypt() {
        let key = SessionKey::generate();
        let ct = AesGcmCipher.encrypt(&key, b"attachment body").unwrap();
        assert_ne!(&ct[NONCE_SIZE..], b"attachment body");
        let pt = AesGcmCipher.decrypt(&key, &ct).unwrap();
        assert_eq!(pt, b"attachment body");
    }

    #[test]
    fn test_wrong_key_fails() {
        let ct = AesGcmCipher
            .encrypt(&SessionKey::generate(), b"secret")
            .unwrap();
        let err = AesGcmCipher
            .decrypt(&SessionKey::generate(), &ct)
            .unwrap_err();
        assert!(matches!(err, CryptoError::Decryption));
    }

    #[test]
    fn test_truncated_ciphertext() {
        let err = AesGcmCipher
            .decrypt(&SessionKey::generate(), &[1, 2, 3])
            .unwrap_err();
        assert!(matches!(err, CryptoError::Truncated(3)));
    }

    #[test]
    fn test_key_base64() {
        let key = SessionKey::from_bytes([9u8; SESSION_KEY_LEN]);
        let parsed = SessionKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(parsed, key);
        assert!(SessionKey::from_base64("c2hvcnQ=").is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let key = SessionKey::from_bytes([1u8; SESSION_KEY_LEN]);
        assert_eq!(format!("{key:?}"), "SessionKey(..)");
    }
}
