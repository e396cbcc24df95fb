//! # Cryptography Module
//!
//! The cryptographic primitives behind the encrypted messenger.
//!
//! ## Security Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  1. Key Pair (keys.rs)                                                 │
//! │     P-256 ECDH key pair                                                │
//! │     • public  = base64(SEC1 uncompressed point, 65 bytes)              │
//! │     • private = base64(PKCS#8 DER)                                     │
//! │                                                                         │
//! │  2. Key Agreement (agreement.rs)                                       │
//! │     my_private × their_public → 32-byte shared secret                  │
//! │     (identical on both sides of the conversation)                      │
//! │                                                                         │
//! │  3. Key Derivation (kdf.rs)                                            │
//! │     HKDF-SHA256(ikm = shared secret,                                   │
//! │                 salt = fresh random per message,                       │
//! │                 info = protocol label) → 256-bit AES key               │
//! │                                                                         │
//! │  4. Encryption (cipher.rs)                                             │
//! │     AES-256-GCM, 96-bit IV, 128-bit tag appended to the ciphertext    │
//! │                                                                         │
//! │  Backups: PBKDF2-HMAC-SHA256(password, 16-byte salt, 100k rounds)      │
//! │           → AES-256-GCM key                                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices
//!
//! | Algorithm | Purpose | Notes |
//! |-----------|---------|-------|
//! | ECDH P-256 | Key agreement | Interoperates with WebCrypto clients |
//! | HKDF-SHA256 | Message keys | New key per message via random salt |
//! | AES-256-GCM | Encryption | AEAD, tag verified before any plaintext is released |
//! | PBKDF2-SHA256 | Backup keys | Slow, password-derived |
//! | SHA-256 | Fingerprints | First 8 bytes shown to users |

mod agreement;
mod cipher;
mod kdf;
mod keys;

pub use agreement::{derive_shared_secret, SharedSecret};
pub use cipher::{decrypt, decrypt_with_aad, encrypt, encrypt_with_aad, Iv};
pub use kdf::{derive_backup_key, derive_encryption_key, EncryptionKey};
pub use keys::{
    decode_private_key, decode_public_key, fingerprint, generate, generate_with, public_key_for,
    EncodedKeyPair,
};

/// Size of AES-256 keys in bytes
pub const KEY_SIZE: usize = 32;

/// Size of the AES-GCM IV in bytes (96 bits)
pub const IV_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of an uncompressed SEC1 P-256 public key
pub const PUBLIC_KEY_SIZE: usize = 65;

/// Shortest salt accepted by key derivation
pub const MIN_SALT_SIZE: usize = 16;

/// Longest salt accepted in an envelope
pub const MAX_SALT_SIZE: usize = 32;
