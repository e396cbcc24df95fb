//! # Secure Storage
//!
//! Backends for the key store.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SECURE STORAGE                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  SecureStorage trait                                                   │
//! │  ───────────────────                                                    │
//! │  • get(id)          - Read a record (None if absent)                   │
//! │  • put(id, value)   - Atomically create or replace a record            │
//! │  • delete(id)       - Remove a record                                  │
//! │                                                                         │
//! │  ┌───────────────┐  ┌───────────────┐  ┌──────────────────────────┐   │
//! │  │ MemoryStorage │  │  FileStorage  │  │ EncryptedStorage<S>      │   │
//! │  │               │  │               │  │                          │   │
//! │  │ tests, legacy │  │ one file per  │  │ AES-256-GCM around any   │   │
//! │  │ stand-in      │  │ record, temp  │  │ backend, record id bound │   │
//! │  │               │  │ file + rename │  │ as associated data       │   │
//! │  └───────────────┘  └───────────────┘  └──────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Platform keychains (iOS Keychain, Android Keystore, browser storage) plug
//! in by implementing [`SecureStorage`] in the host application.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use zeroize::Zeroizing;

use crate::crypto::{decrypt_with_aad, encrypt_with_aad, EncryptionKey, Iv, IV_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use crate::random::{OsRandom, RandomSource};

/// Durable key-value storage keyed by a fixed record id
///
/// Implementations must make `put` atomic: a reader sees either the old
/// value or the new one, never a torn write.
#[async_trait]
pub trait SecureStorage: Send + Sync {
    /// Read a record
    async fn get(&self, id: &str) -> Result<Option<Zeroizing<Vec<u8>>>>;

    /// Create or replace a record
    async fn put(&self, id: &str, value: &[u8]) -> Result<()>;

    /// Remove a record; returns whether it existed
    async fn delete(&self, id: &str) -> Result<bool>;
}

// ============================================================================
// IN-MEMORY
// ============================================================================

/// In-memory storage (tests, and a stand-in for the legacy flat store)
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with string entries
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<[u8]>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.as_ref().to_vec()))
            .collect();
        Self {
            entries: RwLock::new(map),
        }
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Check if a record exists
    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }
}

#[async_trait]
impl SecureStorage for MemoryStorage {
    async fn get(&self, id: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        Ok(self.entries.read().get(id).cloned().map(Zeroizing::new))
    }

    async fn put(&self, id: &str, value: &[u8]) -> Result<()> {
        self.entries.write().insert(id.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.entries.write().remove(id).is_some())
    }
}

// ============================================================================
// FILE-BACKED
// ============================================================================

/// Directory-backed storage that survives restarts
///
/// Each record lives in its own file named after the hex-encoded record id,
/// so ids can never escape the directory. Writes go to a temporary sibling
/// first and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open (creating if needed) a storage directory
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            Error::StorageUnavailable(format!("cannot create {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    /// The directory records are stored in
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.rec", hex::encode(id)))
    }

    fn temp_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.tmp", hex::encode(id)))
    }
}

#[async_trait]
impl SecureStorage for FileStorage {
    async fn get(&self, id: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        match tokio::fs::read(self.record_path(id)).await {
            Ok(bytes) => Ok(Some(Zeroizing::new(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::StorageUnavailable(format!("read failed: {}", e))),
        }
    }

    async fn put(&self, id: &str, value: &[u8]) -> Result<()> {
        let tmp = self.temp_path(id);
        tokio::fs::write(&tmp, value)
            .await
            .map_err(|e| Error::StorageUnavailable(format!("write failed: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }

        tokio::fs::rename(&tmp, self.record_path(id))
            .await
            .map_err(|e| Error::StorageUnavailable(format!("rename failed: {}", e)))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::StorageUnavailable(format!("delete failed: {}", e))),
        }
    }
}

// ============================================================================
// ENCRYPTING WRAPPER
// ============================================================================

/// Encrypts every value before handing it to the inner backend
///
/// Stored layout: `iv (12 bytes) || ciphertext || tag`. The record id is
/// used as associated data, so a record copied under another id fails to
/// decrypt.
pub struct EncryptedStorage<S> {
    inner: S,
    key: EncryptionKey,
    rng: Arc<dyn RandomSource>,
}

impl<S: SecureStorage> EncryptedStorage<S> {
    /// Wrap `inner`, sealing values under `key`
    pub fn new(inner: S, key: [u8; 32]) -> Self {
        Self {
            inner,
            key: EncryptionKey::from_bytes(key),
            rng: Arc::new(OsRandom),
        }
    }

    /// Use a specific random source for IVs
    pub fn with_random(mut self, rng: Arc<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    /// Access the wrapped backend
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: SecureStorage> SecureStorage for EncryptedStorage<S> {
    async fn get(&self, id: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let data = match self.inner.get(id).await? {
            Some(d) => d,
            None => return Ok(None),
        };

        if data.len() < IV_SIZE + TAG_SIZE {
            return Err(Error::StorageCorrupted("stored record too short".into()));
        }

        let iv = Iv::from_slice(&data[..IV_SIZE])?;
        let plaintext = decrypt_with_aad(&data[IV_SIZE..], &self.key, &iv, id.as_bytes())
            .map_err(|_| Error::StorageCorrupted("stored record failed authentication".into()))?;

        Ok(Some(Zeroizing::new(plaintext)))
    }

    async fn put(&self, id: &str, value: &[u8]) -> Result<()> {
        let iv = Iv::random(self.rng.as_ref())?;
        let ciphertext = encrypt_with_aad(value, &self.key, &iv, id.as_bytes())?;

        let mut record = Vec::with_capacity(IV_SIZE + ciphertext.len());
        record.extend_from_slice(iv.as_bytes());
        record.extend_from_slice(&ciphertext);

        self.inner.put(id, &record).await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.inner.delete(id).await
    }
}

// ============================================================================
// TESTS
// ============================================================================
