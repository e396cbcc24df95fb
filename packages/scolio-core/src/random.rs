//! Cryptographically secure randomness.
//!
//! Every salt, IV and private key in the crate is drawn from a
//! [`RandomSource`]. Production code uses [`OsRandom`]; the trait exists so
//! the source can be swapped at construction time.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{Error, Result};

/// A source of cryptographically secure random bytes
pub trait RandomSource: Send + Sync {
    /// Fill `dest` entirely with random bytes
    fn fill(&self, dest: &mut [u8]) -> Result<()>;
}

/// Operating-system CSPRNG (getrandom / BCryptGenRandom / SecRandomCopyBytes)
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| Error::CryptoUnavailable(format!("OS random source failed: {}", e)))
    }
}

/// Draw a fixed-size array from `rng`
pub fn random_array<const N: usize>(rng: &dyn RandomSource) -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    rng.fill(&mut bytes)?;
    Ok(bytes)
}

/// Draw `len` bytes from `rng`
pub fn random_vec(rng: &dyn RandomSource, len: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)?;
    Ok(bytes)
}
