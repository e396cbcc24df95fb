//! Messenger configuration.
//!
//! The core reads no environment variables; the host application builds a
//! [`MessengerConfig`] (or loads one from its own settings file) and hands
//! it to [`KeyCustody`](crate::custody::KeyCustody) and
//! [`Messenger`](crate::messenger::Messenger).

use serde::{Deserialize, Serialize};

use crate::crypto::{MAX_SALT_SIZE, MIN_SALT_SIZE};
use crate::error::{Error, Result};

/// HKDF `info` label bound into every message key
pub const DEFAULT_HKDF_INFO: &str = "scoliologic-messenger-v1";

/// PBKDF2 iterations for password-protected backups
pub const DEFAULT_BACKUP_ITERATIONS: u32 = 100_000;

/// Durable storage record id for the key pair
pub const DEFAULT_KEY_ID: &str = "messenger_keypair";

/// Legacy flat-store entry holding the private key
pub const DEFAULT_LEGACY_PRIVATE_KEY: &str = "scolio_messenger_private_key";

/// Legacy flat-store entry holding the public key
pub const DEFAULT_LEGACY_PUBLIC_KEY: &str = "scolio_messenger_public_key";

/// Messenger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessengerConfig {
    /// HKDF `info` parameter (protocol version label)
    pub hkdf_info: String,
    /// Length of the per-message salt in bytes (16..=32)
    pub salt_len: usize,
    /// PBKDF2-SHA256 iterations used for key backups
    pub backup_iterations: u32,
    /// Record id of the key pair in durable storage
    pub key_id: String,
    /// Legacy entry name of the private key
    pub legacy_private_key: String,
    /// Legacy entry name of the public key
    pub legacy_public_key: String,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            hkdf_info: DEFAULT_HKDF_INFO.to_string(),
            salt_len: MAX_SALT_SIZE,
            backup_iterations: DEFAULT_BACKUP_ITERATIONS,
            key_id: DEFAULT_KEY_ID.to_string(),
            legacy_private_key: DEFAULT_LEGACY_PRIVATE_KEY.to_string(),
            legacy_public_key: DEFAULT_LEGACY_PUBLIC_KEY.to_string(),
        }
    }
}

impl MessengerConfig {
    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value is in range
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SALT_SIZE..=MAX_SALT_SIZE).contains(&self.salt_len) {
            return Err(Error::InvalidConfig(format!(
                "salt_len must be between {} and {} bytes, got {}",
                MIN_SALT_SIZE, MAX_SALT_SIZE, self.salt_len
            )));
        }
        if self.backup_iterations == 0 {
            return Err(Error::InvalidConfig(
                "backup_iterations must be at least 1".into(),
            ));
        }
        if self.hkdf_info.is_empty() {
            return Err(Error::InvalidConfig("hkdf_info must not be empty".into()));
        }
        if self.key_id.is_empty()
            || self.legacy_private_key.is_empty()
            || self.legacy_public_key.is_empty()
        {
            return Err(Error::InvalidConfig("storage ids must not be empty".into()));
        }
        if self.legacy_private_key == self.legacy_public_key {
            return Err(Error::InvalidConfig(
                "legacy private and public entries must differ".into(),
            ));
        }
        Ok(())
    }
}
