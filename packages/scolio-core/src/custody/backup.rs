//! Password-protected key backups.
//!
//! ```text
//! BackupBlob = base64( salt (16) || iv (12) || AES-256-GCM(payload) )
//!
//! key     = PBKDF2-HMAC-SHA256(password, salt, iterations)
//! payload = {"publicKey": "...", "privateKey": "..."}
//! ```
//!
//! The blob is self-contained: password plus blob is everything needed to
//! restore, no server-side secret is involved.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use zeroize::Zeroizing;

use crate::crypto::{decrypt, derive_backup_key, encrypt, EncodedKeyPair, Iv, IV_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use crate::random::{random_array, RandomSource};

/// Length of the PBKDF2 salt at the head of a backup
pub const BACKUP_SALT_SIZE: usize = 16;

const HEADER_SIZE: usize = BACKUP_SALT_SIZE + IV_SIZE;

/// Encrypt a key pair under `password`
pub fn seal_backup(
    pair: &EncodedKeyPair,
    password: &str,
    iterations: u32,
    rng: &dyn RandomSource,
) -> Result<String> {
    let salt: [u8; BACKUP_SALT_SIZE] = random_array(rng)?;
    let iv = Iv::random(rng)?;
    let key = derive_backup_key(password, &salt, iterations)?;

    let payload = Zeroizing::new(serde_json::to_vec(pair)?);
    let ciphertext = encrypt(&payload, &key, &iv)?;

    let mut blob = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(iv.as_bytes());
    blob.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(blob))
}

/// Decrypt a backup blob and check the key pair it holds
///
/// Every failure (bad base64, truncated blob, wrong password, tampered
/// ciphertext, unusable keys) is reported as `BackupDecryptionFailed`.
pub fn open_backup(blob: &str, password: &str, iterations: u32) -> Result<EncodedKeyPair> {
    let data = BASE64
        .decode(blob.trim())
        .map_err(|_| Error::BackupDecryptionFailed("backup is not valid base64".into()))?;

    if data.len() < HEADER_SIZE + TAG_SIZE {
        return Err(Error::BackupDecryptionFailed("backup is truncated".into()));
    }

    let (salt, rest) = data.split_at(BACKUP_SALT_SIZE);
    let (iv, ciphertext) = rest.split_at(IV_SIZE);
    let iv = Iv::from_slice(iv)?;

    let key = derive_backup_key(password, salt, iterations)?;
    let payload = Zeroizing::new(decrypt(ciphertext, &key, &iv).map_err(|_| {
        Error::BackupDecryptionFailed("wrong password or corrupted backup".into())
    })?);

    let pair: EncodedKeyPair = serde_json::from_slice(&payload)
        .map_err(|_| Error::BackupDecryptionFailed("backup payload is malformed".into()))?;

    pair.validate().map_err(|_| {
        Error::BackupDecryptionFailed("backup contains unusable key material".into())
    })?;

    Ok(pair)
}
