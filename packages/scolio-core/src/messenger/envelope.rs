//! Wire form of an encrypted message body.
//!
//! ```text
//! {
//!   "ciphertext":      base64(AES-GCM output, tag appended)
//!   "iv":              base64(12 bytes)
//!   "salt":            base64(16..=32 bytes)
//!   "senderPublicKey": base64(65-byte SEC1 point)
//! }
//! ```
//!
//! Envelopes arrive from the transport as untrusted JSON. Unknown fields
//! are rejected and every field is decoded and length-checked before any
//! key is derived.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::crypto::{decode_public_key, Iv, MAX_SALT_SIZE, MIN_SALT_SIZE, TAG_SIZE};
use crate::error::{Error, Result};

/// Result of encrypting one message: everything but the sender's key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EncryptedPayload {
    /// base64 AES-GCM output with the tag appended
    pub ciphertext: String,
    /// base64 12-byte IV
    pub iv: String,
    /// base64 HKDF salt
    pub salt: String,
}

/// An [`EncryptedPayload`] with the sender's public key attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EncryptedEnvelope {
    /// base64 AES-GCM output with the tag appended
    pub ciphertext: String,
    /// base64 12-byte IV
    pub iv: String,
    /// base64 HKDF salt
    pub salt: String,
    /// base64 SEC1 public key of the sender
    pub sender_public_key: String,
}

/// Decoded binary fields of a payload
pub(crate) struct DecodedPayload {
    pub ciphertext: Vec<u8>,
    pub iv: Iv,
    pub salt: Vec<u8>,
}

impl EncryptedPayload {
    /// Attach the sender's public key
    pub fn with_sender(self, sender_public_key: impl Into<String>) -> EncryptedEnvelope {
        EncryptedEnvelope {
            ciphertext: self.ciphertext,
            iv: self.iv,
            salt: self.salt,
            sender_public_key: sender_public_key.into(),
        }
    }

    /// Check every field decodes to a usable length
    pub fn validate(&self) -> Result<()> {
        self.decode().map(|_| ())
    }

    pub(crate) fn decode(&self) -> Result<DecodedPayload> {
        let ciphertext = decode_field("ciphertext", &self.ciphertext)?;
        if ciphertext.len() < TAG_SIZE {
            return Err(Error::InvalidEnvelope(format!(
                "ciphertext shorter than the {}-byte tag",
                TAG_SIZE
            )));
        }

        let iv = Iv::from_slice(&decode_field("iv", &self.iv)?)?;

        let salt = decode_field("salt", &self.salt)?;
        if !(MIN_SALT_SIZE..=MAX_SALT_SIZE).contains(&salt.len()) {
            return Err(Error::InvalidEnvelope(format!(
                "salt must be {}..={} bytes, got {}",
                MIN_SALT_SIZE,
                MAX_SALT_SIZE,
                salt.len()
            )));
        }

        Ok(DecodedPayload {
            ciphertext,
            iv,
            salt,
        })
    }
}

impl EncryptedEnvelope {
    /// Parse an envelope received from the transport
    pub fn from_json(json: &str) -> Result<Self> {
        let envelope: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidEnvelope(e.to_string()))?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// Serialize for the transport
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check every field, including that the sender key is a P-256 point
    pub fn validate(&self) -> Result<()> {
        self.payload().validate()?;
        decode_public_key(&self.sender_public_key)
            .map_err(|e| Error::InvalidEnvelope(format!("senderPublicKey: {}", e)))?;
        Ok(())
    }

    /// The envelope without its sender key
    pub fn payload(&self) -> EncryptedPayload {
        EncryptedPayload {
            ciphertext: self.ciphertext.clone(),
            iv: self.iv.clone(),
            salt: self.salt.clone(),
        }
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|_| Error::InvalidEnvelope(format!("{} is not valid base64", name)))
}
