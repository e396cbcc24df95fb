//! # Messenger
//!
//! The two operations the chat UI consumes: seal a message for a recipient
//! and open a message from a sender.
//!
//! ## Sealing a Message
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    MESSAGE ENCRYPTION FLOW                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Sender                                                                │
//! │  ──────                                                                 │
//! │  1. Draw a fresh salt (32 bytes) and IV (12 bytes)                     │
//! │  2. shared = ECDH(my_private, their_public)                            │
//! │  3. key    = HKDF-SHA256(shared, salt, "scoliologic-messenger-v1")     │
//! │  4. ct     = AES-256-GCM(key, iv, plaintext)                           │
//! │  5. Envelope { ciphertext, iv, salt, senderPublicKey }                 │
//! │                                                                         │
//! │  Recipient                                                             │
//! │  ─────────                                                              │
//! │  1. Validate the envelope (base64, lengths, sender point)              │
//! │  2. shared = ECDH(my_private, senderPublicKey)   (same bytes)          │
//! │  3. key    = HKDF-SHA256(shared, envelope.salt, label)                 │
//! │  4. plaintext = AES-256-GCM-Open(key, iv, ct), or AuthenticationFailed │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every envelope is self-contained through its embedded salt and IV, so
//! independent messages need no ordering between them.
//!
//! The identity-explicit calls ([`Messenger::seal`], [`Messenger::open`],
//! [`Messenger::encrypt_message`], [`Messenger::decrypt_message`]) do pure
//! computation and are synchronous. The custody-backed calls touch storage
//! and are async.

mod envelope;
mod message;

pub use envelope::{EncryptedEnvelope, EncryptedPayload};
pub use message::{DecryptedMessage, EncryptedMessage, MessageStatus};

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use uuid::Uuid;

use crate::config::MessengerConfig;
use crate::crypto::{decrypt, derive_encryption_key, derive_shared_secret, encrypt, Iv};
use crate::custody::{KeyCustody, KeyPair};
use crate::error::{Error, Result};
use crate::random::{random_vec, RandomSource};

/// Message sealing and opening on top of a [`KeyCustody`]
pub struct Messenger {
    custody: Arc<KeyCustody>,
    rng: Arc<dyn RandomSource>,
    config: MessengerConfig,
}

impl Messenger {
    /// Create a messenger sharing `custody`'s configuration and randomness
    pub fn new(custody: Arc<KeyCustody>) -> Self {
        let rng = custody.random();
        let config = custody.config().clone();
        Self {
            custody,
            rng,
            config,
        }
    }

    /// Use a specific random source for salts and IVs
    pub fn with_random(mut self, rng: Arc<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    /// The key custodian behind this messenger
    pub fn custody(&self) -> &Arc<KeyCustody> {
        &self.custody
    }

    // ========================================================================
    // CORE OPERATIONS
    // ========================================================================

    /// Encrypt `plaintext` from `my_private_key` to `their_public_key`
    ///
    /// The sender's public key is not part of the result; see
    /// [`seal`](Self::seal) for a complete envelope.
    pub fn encrypt_message(
        &self,
        plaintext: &str,
        my_private_key: &str,
        their_public_key: &str,
    ) -> Result<EncryptedPayload> {
        let salt = random_vec(self.rng.as_ref(), self.config.salt_len)?;
        let iv = Iv::random(self.rng.as_ref())?;

        let shared = derive_shared_secret(my_private_key, their_public_key)?;
        let key = derive_encryption_key(&shared, &salt, self.config.hkdf_info.as_bytes())?;
        let ciphertext = encrypt(plaintext.as_bytes(), &key, &iv)?;

        Ok(EncryptedPayload {
            ciphertext: BASE64.encode(ciphertext),
            iv: BASE64.encode(iv.as_bytes()),
            salt: BASE64.encode(salt),
        })
    }

    /// Decrypt a payload sent by `their_public_key` to `my_private_key`
    pub fn decrypt_message(
        &self,
        payload: &EncryptedPayload,
        my_private_key: &str,
        their_public_key: &str,
    ) -> Result<String> {
        let decoded = payload.decode()?;

        let shared = derive_shared_secret(my_private_key, their_public_key)?;
        let key = derive_encryption_key(&shared, &decoded.salt, self.config.hkdf_info.as_bytes())?;

        let plaintext = decrypt(&decoded.ciphertext, &key, &decoded.iv).map_err(|e| {
            if matches!(e, Error::AuthenticationFailed) {
                tracing::warn!("Message failed authentication");
            }
            e
        })?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::InvalidEnvelope("plaintext is not UTF-8".into()))
    }

    /// Seal `plaintext` from `own` to `their_public_key`
    pub fn seal(
        &self,
        own: &KeyPair,
        their_public_key: &str,
        plaintext: &str,
    ) -> Result<EncryptedEnvelope> {
        let payload = self.encrypt_message(plaintext, &own.private_key, their_public_key)?;
        tracing::debug!(sender = %own.fingerprint, "Sealed message");
        Ok(payload.with_sender(own.public_key.clone()))
    }

    /// Open an envelope addressed to `own`
    pub fn open(&self, own: &KeyPair, envelope: &EncryptedEnvelope) -> Result<String> {
        envelope.validate()?;
        self.decrypt_message(
            &envelope.payload(),
            &own.private_key,
            &envelope.sender_public_key,
        )
    }

    // ========================================================================
    // CUSTODY-BACKED
    // ========================================================================

    /// Seal for `their_public_key` using this device's identity
    ///
    /// Creates the identity on first use.
    pub async fn seal_for(&self, their_public_key: &str, plaintext: &str) -> Result<EncryptedEnvelope> {
        let own = self.custody.ensure_key_pair().await?;
        self.seal(&own, their_public_key, plaintext)
    }

    /// Open an envelope addressed to this device's identity
    pub async fn open_received(&self, envelope: &EncryptedEnvelope) -> Result<String> {
        let own = self.custody.key_pair().await?.ok_or(Error::NoKeyPair)?;
        self.open(&own, envelope)
    }

    // ========================================================================
    // CHAT MESSAGES
    // ========================================================================

    /// Seal `text` into a new chat message record
    pub async fn seal_message(
        &self,
        chat_id: &str,
        sender_id: &str,
        their_public_key: &str,
        text: &str,
    ) -> Result<EncryptedMessage> {
        let envelope = self.seal_for(their_public_key, text).await?;
        Ok(EncryptedMessage {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            sender_id: sender_id.to_string(),
            envelope,
            timestamp: Utc::now(),
            status: MessageStatus::Sent,
        })
    }

    /// Open a chat message for display
    ///
    /// A message whose sender key is `own`'s public key was sent by us; it
    /// is opened against `counterparty_public_key` instead.
    pub fn open_message(
        &self,
        own: &KeyPair,
        message: &EncryptedMessage,
        counterparty_public_key: &str,
    ) -> Result<DecryptedMessage> {
        let envelope = &message.envelope;
        envelope.validate()?;

        let is_own = envelope.sender_public_key == own.public_key;
        let their_public_key = if is_own {
            counterparty_public_key
        } else {
            envelope.sender_public_key.as_str()
        };

        let text = self.decrypt_message(&envelope.payload(), &own.private_key, their_public_key)?;

        Ok(DecryptedMessage {
            id: message.id.clone(),
            chat_id: message.chat_id.clone(),
            sender_id: message.sender_id.clone(),
            text,
            timestamp: message.timestamp,
            status: message.status,
            is_own,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
