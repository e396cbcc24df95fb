//! # Key Derivation Functions
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    KEY DERIVATION                                       │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Message keys (one per message)                                        │
//! │  ──────────────────────────────                                         │
//! │   ECDH shared secret ──┐                                               │
//! │   random salt ─────────┼──► HKDF-SHA256 ──► AES-256 key                │
//! │   protocol label ──────┘                                               │
//! │                                                                         │
//! │  The shared secret is fixed for a conversation; the salt is not, so   │
//! │  a compromised message key exposes exactly one message.                │
//! │                                                                         │
//! │  Backup keys                                                           │
//! │  ───────────                                                            │
//! │   password + 16-byte salt ──► PBKDF2-HMAC-SHA256 (N rounds) ──► key    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use hkdf::Hkdf;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use super::{SharedSecret, KEY_SIZE, MIN_SALT_SIZE};
use crate::error::{Error, Result};

/// An AES-256-GCM encryption key
///
/// Zeroized when dropped.
#[derive(ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

/// Derive a message key from an ECDH shared secret
///
/// `salt` must be at least [`MIN_SALT_SIZE`] bytes; `info` is the protocol
/// label (see [`MessengerConfig::hkdf_info`](crate::MessengerConfig)).
pub fn derive_encryption_key(
    shared_secret: &SharedSecret,
    salt: &[u8],
    info: &[u8],
) -> Result<EncryptionKey> {
    if salt.len() < MIN_SALT_SIZE {
        return Err(Error::KeyDerivationFailed(format!(
            "salt must be at least {} bytes, got {}",
            MIN_SALT_SIZE,
            salt.len()
        )));
    }

    let hkdf = Hkdf::<Sha256>::new(Some(salt), shared_secret.as_bytes());
    let mut key = [0u8; KEY_SIZE];
    hkdf.expand(info, &mut key)
        .map_err(|_| Error::KeyDerivationFailed("HKDF expansion failed".into()))?;

    Ok(EncryptionKey(key))
}

/// Derive a backup key from a password with PBKDF2-HMAC-SHA256
pub fn derive_backup_key(password: &str, salt: &[u8], iterations: u32) -> Result<EncryptionKey> {
    if iterations == 0 {
        return Err(Error::KeyDerivationFailed(
            "PBKDF2 needs at least one iteration".into(),
        ));
    }

    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    Ok(EncryptionKey(key))
}

// ============================================================================
// TESTS
// ============================================================================
