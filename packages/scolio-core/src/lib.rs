//! # Scolio Core
//!
//! The end-to-end encryption core of the Scoliologic patient messenger.
//! Message bodies are sealed on the sender's device and opened on the
//! recipient's; the chat server only ever relays opaque envelopes.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SCOLIO CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │                     Chat UI / transport layer                           │
//! │                               │                                         │
//! │                               ▼                                         │
//! │                  ┌─────────────────────────┐                            │
//! │                  │        Messenger        │                            │
//! │                  │ - seal / open envelopes │                            │
//! │                  │ - chat message records  │                            │
//! │                  └─────┬─────────────┬─────┘                            │
//! │                        │             │                                  │
//! │                        ▼             ▼                                  │
//! │  ┌─────────────────────────┐   ┌───────────────────────────────────┐   │
//! │  │       KeyCustody        │   │              Crypto               │   │
//! │  │                         │   │                                   │   │
//! │  │ - one device key pair   │   │ - P-256 keys + ECDH               │   │
//! │  │ - legacy migration      │   │ - HKDF-SHA256 per message         │   │
//! │  │ - password backups      │   │ - AES-256-GCM                     │   │
//! │  │ - SecureStorage seam    │   │ - PBKDF2 backup keys              │   │
//! │  └────────────┬────────────┘   └─────────────────┬─────────────────┘   │
//! │               │                                  │                      │
//! │               └────────────► RandomSource ◄──────┘                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`config`] - Protocol label, salt length, backup cost, storage ids
//! - [`random`] - Cryptographically secure random source
//! - [`crypto`] - Key pairs, key agreement, key derivation, AES-GCM
//! - [`custody`] - Durable key storage, migration and backups
//! - [`messenger`] - Envelope sealing and opening
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use scolio_core::{KeyCustody, MemoryStorage, Messenger, MessengerConfig};
//!
//! let custody = KeyCustody::new(Arc::new(MemoryStorage::new()), MessengerConfig::default())?;
//! let messenger = Messenger::new(Arc::new(custody));
//!
//! let envelope = messenger.seal_for(&doctor_public_key, "Hello").await?;
//! ```
//!
//! There is no global instance: every [`KeyCustody`] is constructed
//! explicitly around the storage backend it should use.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod config;
pub mod crypto;
pub mod custody;
pub mod error;
pub mod messenger;
pub mod random;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::MessengerConfig;
pub use crypto::EncodedKeyPair;
pub use custody::{
    CustodyState, EncryptedStorage, FileStorage, KeyCustody, KeyPair, MemoryStorage,
    SecureStorage,
};
pub use error::{Error, Result};
pub use messenger::{
    DecryptedMessage, EncryptedEnvelope, EncryptedMessage, EncryptedPayload, MessageStatus,
    Messenger,
};
pub use random::{OsRandom, RandomSource};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Scolio Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
