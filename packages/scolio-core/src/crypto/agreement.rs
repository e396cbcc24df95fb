//! ECDH key agreement on P-256.
//!
//! `my_private × their_public` yields the same 32 bytes as
//! `their_private × my_public`; that symmetry is what lets both sides of a
//! conversation derive identical message keys without ever sending one.

use p256::ecdh::diffie_hellman;
use zeroize::ZeroizeOnDrop;

use super::keys::{decode_private_key, decode_public_key};
use crate::error::Result;

/// The raw ECDH output (x-coordinate of the shared point)
///
/// Not a usable symmetric key by itself; feed it through
/// [`derive_encryption_key`](super::derive_encryption_key).
#[derive(ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    /// Create from raw DH output
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes (for key derivation)
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Import both textual keys and run ECDH
///
/// Fails with `KeyImportError` if either key is malformed or the public key
/// is not a valid P-256 point.
pub fn derive_shared_secret(my_private_key: &str, their_public_key: &str) -> Result<SharedSecret> {
    let secret = decode_private_key(my_private_key)?;
    let public = decode_public_key(their_public_key)?;

    let shared = diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());

    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(shared.raw_secret_bytes().as_slice());
    Ok(SharedSecret(bytes))
}
