//! # Message Cipher
//!
//! AES-256-GCM with a caller-supplied 96-bit IV and a 128-bit tag appended
//! to the ciphertext.
//!
//! ## Critical Security Requirement
//!
//! **Never reuse an IV with the same key.** The cipher does not draw IVs
//! itself; callers take a fresh one from [`Iv::random`] for every call. In
//! the messenger each message also gets its own key (fresh HKDF salt), so an
//! accidental IV collision still never pairs with a reused key.
//!
//! Decryption verifies the tag before releasing anything: on failure the
//! caller gets [`Error::AuthenticationFailed`] and no bytes of plaintext.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};

use super::{EncryptionKey, IV_SIZE};
use crate::error::{Error, Result};
use crate::random::{random_array, RandomSource};

/// A 96-bit AES-GCM initialization vector
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Iv([u8; IV_SIZE]);

impl Iv {
    /// Draw a fresh IV from `rng`
    pub fn random(rng: &dyn RandomSource) -> Result<Self> {
        Ok(Self(random_array(rng)?))
    }

    /// Create from existing bytes
    pub fn from_bytes(bytes: [u8; IV_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, which must be exactly 12 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; IV_SIZE] = bytes.try_into().map_err(|_| {
            Error::InvalidEnvelope(format!("IV must be {} bytes, got {}", IV_SIZE, bytes.len()))
        })?;
        Ok(Self(array))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; IV_SIZE] {
        &self.0
    }
}

/// Encrypt `plaintext`, returning ciphertext with the tag appended
pub fn encrypt(plaintext: &[u8], key: &EncryptionKey, iv: &Iv) -> Result<Vec<u8>> {
    encrypt_with_aad(plaintext, key, iv, &[])
}

/// Decrypt `ciphertext` (tag appended); fails with `AuthenticationFailed`
pub fn decrypt(ciphertext: &[u8], key: &EncryptionKey, iv: &Iv) -> Result<Vec<u8>> {
    decrypt_with_aad(ciphertext, key, iv, &[])
}

/// Encrypt with additional authenticated data
pub fn encrypt_with_aad(
    plaintext: &[u8],
    key: &EncryptionKey,
    iv: &Iv,
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| Error::CryptoUnavailable(format!("AES-256-GCM key setup failed: {}", e)))?;

    cipher
        .encrypt(Nonce::from_slice(iv.as_bytes()), Payload { msg: plaintext, aad })
        .map_err(|e| Error::EncryptionFailed(e.to_string()))
}

/// Decrypt with additional authenticated data
pub fn decrypt_with_aad(
    ciphertext: &[u8],
    key: &EncryptionKey,
    iv: &Iv,
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| Error::CryptoUnavailable(format!("AES-256-GCM key setup failed: {}", e)))?;

    cipher
        .decrypt(Nonce::from_slice(iv.as_bytes()), Payload { msg: ciphertext, aad })
        .map_err(|_| Error::AuthenticationFailed)
}

// ============================================================================
// TESTS
// ============================================================================
