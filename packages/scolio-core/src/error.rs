//! # Error Handling
//!
//! Error types for the messenger crypto core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Configuration                                                     │
//! │  │   └── InvalidConfig          - Out-of-range configuration value     │
//! │  │                                                                      │
//! │  ├── Crypto                                                            │
//! │  │   ├── CryptoUnavailable      - Primitive or RNG not usable          │
//! │  │   ├── KeyImportError         - Malformed key material               │
//! │  │   ├── KeyDerivationFailed    - HKDF / PBKDF2 rejected its input     │
//! │  │   ├── EncryptionFailed       - AES-GCM refused to encrypt           │
//! │  │   └── AuthenticationFailed   - AES-GCM tag did not verify           │
//! │  │                                                                      │
//! │  ├── Key Custody                                                       │
//! │  │   ├── NoKeyPair              - Nothing stored yet                   │
//! │  │   ├── BackupDecryptionFailed - Wrong password / corrupted backup    │
//! │  │   ├── StorageUnavailable     - Durable storage not accessible       │
//! │  │   └── StorageCorrupted       - Stored record cannot be parsed       │
//! │  │                                                                      │
//! │  └── Envelope                                                          │
//! │      └── InvalidEnvelope        - Rejected at the trust boundary       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of the variants ever carry key material, passwords or plaintext.
//! The UI layer maps them to user-facing messages; `CryptoUnavailable`
//! typically becomes "secure messaging unavailable on this device".

use thiserror::Error;

/// Result type alias for messenger core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the messenger core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors (100-199)
    // ========================================================================

    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // Crypto Errors (300-399)
    // ========================================================================

    /// The platform cannot provide a required primitive (RNG, curve, cipher)
    #[error("Secure messaging is unavailable on this device: {0}")]
    CryptoUnavailable(String),

    /// Key material could not be imported
    #[error("Failed to import key: {0}")]
    KeyImportError(String),

    /// Key derivation rejected its input
    #[error("Failed to derive key: {0}")]
    KeyDerivationFailed(String),

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// The authentication tag did not verify (tampering or wrong key)
    #[error("Message authentication failed")]
    AuthenticationFailed,

    // ========================================================================
    // Key Custody Errors (400-499)
    // ========================================================================

    /// No key pair is stored
    #[error("No key pair is stored on this device.")]
    NoKeyPair,

    /// A backup could not be decrypted (wrong password or corrupted blob)
    #[error("Failed to decrypt key backup: {0}")]
    BackupDecryptionFailed(String),

    /// Durable storage is not accessible
    #[error("Key storage is unavailable: {0}")]
    StorageUnavailable(String),

    /// A stored record exists but cannot be parsed
    #[error("Stored key data is corrupted: {0}")]
    StorageCorrupted(String),

    // ========================================================================
    // Envelope Errors (700-799)
    // ========================================================================

    /// An envelope failed validation before any cryptography ran
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Get a stable numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Configuration
    /// - 300-399: Crypto
    /// - 400-499: Key custody / storage
    /// - 700-799: Envelopes
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidConfig(_) => 100,

            Error::CryptoUnavailable(_) => 300,
            Error::KeyImportError(_) => 301,
            Error::KeyDerivationFailed(_) => 302,
            Error::EncryptionFailed(_) => 303,
            Error::AuthenticationFailed => 304,

            Error::NoKeyPair => 400,
            Error::BackupDecryptionFailed(_) => 401,
            Error::StorageUnavailable(_) => 402,
            Error::StorageCorrupted(_) => 403,

            Error::InvalidEnvelope(_) => 700,

            Error::Serialization(_) => 900,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Only storage access can succeed on a later attempt; everything else
    /// is a property of the data or the platform.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_))
    }

    /// Check if this error should be treated as a possible attack
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            Error::AuthenticationFailed | Error::BackupDecryptionFailed(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::StorageUnavailable(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
