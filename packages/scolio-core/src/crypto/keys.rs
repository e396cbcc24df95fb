//! # Key Pair Codec
//!
//! Generation and textual encoding of P-256 ECDH key pairs.
//!
//! ## Encoding
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         KEY ENCODING                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Public key  : base64( 0x04 || X (32 bytes) || Y (32 bytes) )          │
//! │                SEC1 uncompressed point, the WebCrypto "raw" format     │
//! │                                                                         │
//! │  Private key : base64( PKCS#8 DER PrivateKeyInfo )                     │
//! │                the WebCrypto "pkcs8" format                            │
//! │                                                                         │
//! │  Fingerprint : SHA-256(public key bytes)[0..8] as "AB CD EF ..."      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use p256::{FieldBytes, PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::PUBLIC_KEY_SIZE;
use crate::error::{Error, Result};
use crate::random::{random_array, OsRandom, RandomSource};

/// Number of digest bytes shown in a fingerprint
const FINGERPRINT_BYTES: usize = 8;

/// Attempts before giving up on drawing a valid scalar
const MAX_KEYGEN_ATTEMPTS: usize = 8;

/// A freshly generated (or imported) key pair in its textual form
///
/// The private key is zeroized when this value is dropped and is redacted
/// from `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct EncodedKeyPair {
    /// base64 SEC1 uncompressed public key, safe to share
    pub public_key: String,
    /// base64 PKCS#8 private key, never transmitted
    pub private_key: String,
}

impl fmt::Debug for EncodedKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedKeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl EncodedKeyPair {
    /// Check that both halves decode and belong together
    pub fn validate(&self) -> Result<()> {
        let public = decode_public_key(&self.public_key)?;
        let secret = decode_private_key(&self.private_key)?;
        if secret.public_key() != public {
            return Err(Error::KeyImportError(
                "public key does not match private key".into(),
            ));
        }
        Ok(())
    }
}

/// Generate a new key pair from the OS random source
pub fn generate() -> Result<EncodedKeyPair> {
    generate_with(&OsRandom)
}

/// Generate a new key pair drawing entropy from `rng`
///
/// A 32-byte candidate is rejected if it is zero or not below the curve
/// order; that happens with probability ~2^-32, so the retry loop is
/// practically a single pass.
pub fn generate_with(rng: &dyn RandomSource) -> Result<EncodedKeyPair> {
    for _ in 0..MAX_KEYGEN_ATTEMPTS {
        let candidate = Zeroizing::new(random_array::<32>(rng)?);
        if let Ok(secret) = SecretKey::from_bytes(FieldBytes::from_slice(candidate.as_slice())) {
            return encode_secret(&secret);
        }
    }
    Err(Error::CryptoUnavailable(
        "random source never produced a valid P-256 scalar".into(),
    ))
}

/// Decode a base64 public key into a curve point
///
/// Fails with `KeyImportError` for bad base64, the wrong length, or bytes
/// that are not a point on P-256.
pub fn decode_public_key(encoded: &str) -> Result<PublicKey> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|_| Error::KeyImportError("public key is not valid base64".into()))?;
    if bytes.len() != PUBLIC_KEY_SIZE {
        return Err(Error::KeyImportError(format!(
            "public key must be {} bytes, got {}",
            PUBLIC_KEY_SIZE,
            bytes.len()
        )));
    }
    PublicKey::from_sec1_bytes(&bytes)
        .map_err(|_| Error::KeyImportError("public key is not a point on P-256".into()))
}

/// Decode a base64 PKCS#8 private key
pub fn decode_private_key(encoded: &str) -> Result<SecretKey> {
    let der = Zeroizing::new(
        BASE64
            .decode(encoded.trim())
            .map_err(|_| Error::KeyImportError("private key is not valid base64".into()))?,
    );
    SecretKey::from_pkcs8_der(&der)
        .map_err(|_| Error::KeyImportError("private key is not a P-256 PKCS#8 key".into()))
}

/// Derive the encoded public key belonging to an encoded private key
pub fn public_key_for(private_key: &str) -> Result<String> {
    let secret = decode_private_key(private_key)?;
    Ok(encode_public(&secret.public_key()))
}

/// Compute the human-comparable fingerprint of a public key
///
/// SHA-256 over the decoded key bytes, first 8 bytes, upper-case hex,
/// space separated: `"3F A1 07 9C 44 0B D2 E8"`.
pub fn fingerprint(public_key: &str) -> Result<String> {
    let point = decode_public_key(public_key)?;
    let digest = Sha256::digest(point.to_encoded_point(false).as_bytes());

    Ok(digest[..FINGERPRINT_BYTES]
        .iter()
        .map(|b| hex::encode_upper([*b]))
        .collect::<Vec<_>>()
        .join(" "))
}

fn encode_public(public: &PublicKey) -> String {
    BASE64.encode(public.to_encoded_point(false).as_bytes())
}

fn encode_secret(secret: &SecretKey) -> Result<EncodedKeyPair> {
    let der = secret
        .to_pkcs8_der()
        .map_err(|e| Error::CryptoUnavailable(format!("PKCS#8 export failed: {}", e)))?;

    Ok(EncodedKeyPair {
        public_key: encode_public(&secret.public_key()),
        private_key: BASE64.encode(der.as_bytes()),
    })
}

// ============================================================================
// TESTS
// ============================================================================
