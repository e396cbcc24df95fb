//! # Key Custody
//!
//! Durable storage of this device's own key pair.
//!
//! ## Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CUSTODY STATES                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │                 legacy entries found                                    │
//! │   first access ─────────────────────► Migrating ──┐                    │
//! │        │                                          │ copy, then delete  │
//! │        │ nothing stored                           ▼                    │
//! │        └────────────► Uninitialized ─────────► Ready ◄──┐              │
//! │                            ▲        generate      │     │ generate     │
//! │                            │                      │     │              │
//! │                            │        clear_keys()  ▼     │              │
//! │                            └───────────────── Destroyed ┘              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One tokio mutex guards the state. It is held for the whole of a
//! migration or a first-time creation, so concurrent first callers queue
//! behind the winner and then read the pair it stored.
//!
//! ## Backups
//!
//! [`KeyCustody::export_keys`] and [`KeyCustody::import_keys`] produce and
//! consume a password-protected [`BackupBlob`](backup). PBKDF2 runs on the
//! blocking pool so it never stalls other tasks.

pub mod backup;
pub mod storage;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::config::MessengerConfig;
use crate::crypto::{self, EncodedKeyPair};
use crate::error::{Error, Result};
use crate::random::{OsRandom, RandomSource};

pub use backup::{open_backup, seal_backup, BACKUP_SALT_SIZE};
pub use storage::{EncryptedStorage, FileStorage, MemoryStorage, SecureStorage};

/// Where the custody store is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustodyState {
    /// No pair in durable storage and no legacy entries
    Uninitialized,
    /// Legacy entries are being moved into durable storage
    Migrating,
    /// A pair is stored and readable
    Ready,
    /// The pair was cleared; the next creation starts over
    Destroyed,
}

/// The device's stored identity
///
/// Exactly one is kept. Saving a new pair overwrites (and so destroys) the
/// previous one.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
    /// base64 SEC1 public key
    pub public_key: String,
    /// base64 PKCS#8 private key
    pub private_key: String,
    /// `"AB 12 CD 34 EF 56 78 90"` style digest of the public key
    pub fingerprint: String,
    /// When the pair was generated or imported
    #[zeroize(skip)]
    pub created_at: DateTime<Utc>,
    /// Last time the pair was handed out for a message operation
    #[zeroize(skip)]
    pub last_used_at: DateTime<Utc>,
}

impl KeyPair {
    /// Build a record from a validated textual pair
    pub fn from_encoded(encoded: &EncodedKeyPair) -> Result<Self> {
        encoded.validate()?;
        let now = Utc::now();
        Ok(Self {
            public_key: encoded.public_key.trim().to_string(),
            private_key: encoded.private_key.trim().to_string(),
            fingerprint: crypto::fingerprint(&encoded.public_key)?,
            created_at: now,
            last_used_at: now,
        })
    }

    /// The textual pair without bookkeeping fields
    pub fn to_encoded(&self) -> EncodedKeyPair {
        EncodedKeyPair {
            public_key: self.public_key.clone(),
            private_key: self.private_key.clone(),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .field("fingerprint", &self.fingerprint)
            .field("created_at", &self.created_at)
            .field("last_used_at", &self.last_used_at)
            .finish()
    }
}

/// Custodian of the device key pair
///
/// Built explicitly around an injected [`SecureStorage`]; there is no global
/// instance.
pub struct KeyCustody {
    storage: Arc<dyn SecureStorage>,
    legacy: Option<Arc<dyn SecureStorage>>,
    rng: Arc<dyn RandomSource>,
    config: MessengerConfig,
    /// `None` until the first access has read storage
    state: Mutex<Option<CustodyState>>,
}

impl KeyCustody {
    /// Create a custodian over `storage`
    pub fn new(storage: Arc<dyn SecureStorage>, config: MessengerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            storage,
            legacy: None,
            rng: Arc::new(OsRandom),
            config,
            state: Mutex::new(None),
        })
    }

    /// Attach the legacy flat store to migrate from
    pub fn with_legacy(mut self, legacy: Arc<dyn SecureStorage>) -> Self {
        self.legacy = Some(legacy);
        self
    }

    /// Use a specific random source for key generation and backups
    pub fn with_random(mut self, rng: Arc<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    /// The configuration in use
    pub fn config(&self) -> &MessengerConfig {
        &self.config
    }

    /// The random source in use
    pub fn random(&self) -> Arc<dyn RandomSource> {
        Arc::clone(&self.rng)
    }

    // ========================================================================
    // STATE
    // ========================================================================

    /// Current lifecycle state (reads storage on first call)
    pub async fn state(&self) -> Result<CustodyState> {
        let mut state = self.state.lock().await;
        self.resolve(&mut state).await
    }

    /// Move legacy entries into durable storage
    ///
    /// Returns `true` if legacy entries were found and consumed. A second
    /// call finds nothing and returns `false`.
    pub async fn migrate_legacy(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        let migrated = self.migrate_locked(&mut state).await?;
        if state.is_none() {
            *state = Some(self.stored_state().await?);
        }
        Ok(migrated)
    }

    async fn resolve(&self, state: &mut Option<CustodyState>) -> Result<CustodyState> {
        if let Some(current) = *state {
            return Ok(current);
        }

        self.migrate_locked(state).await?;
        let found = self.stored_state().await?;
        *state = Some(found);
        Ok(found)
    }

    async fn stored_state(&self) -> Result<CustodyState> {
        Ok(match self.load().await? {
            Some(_) => CustodyState::Ready,
            None => CustodyState::Uninitialized,
        })
    }

    async fn migrate_locked(&self, state: &mut Option<CustodyState>) -> Result<bool> {
        let legacy = match &self.legacy {
            Some(legacy) => legacy,
            None => return Ok(false),
        };

        let private = legacy.get(&self.config.legacy_private_key).await?;
        let public = legacy.get(&self.config.legacy_public_key).await?;
        let (private, public) = match (private, public) {
            (Some(private), Some(public)) => (private, public),
            _ => return Ok(false),
        };

        let previous = *state;
        *state = Some(CustodyState::Migrating);
        tracing::info!("Migrating key pair from legacy storage");

        match self.migrate_entries(legacy.as_ref(), &private, &public).await {
            Ok(()) => {
                *state = None;
                Ok(true)
            }
            Err(e) => {
                *state = previous;
                tracing::warn!("Legacy key migration failed: {}", e);
                Err(e)
            }
        }
    }

    async fn migrate_entries(
        &self,
        legacy: &dyn SecureStorage,
        private: &[u8],
        public: &[u8],
    ) -> Result<()> {
        if self.load().await?.is_some() {
            tracing::info!("Durable key pair already present; discarding legacy entries");
        } else {
            let restored = legacy_text(public).and_then(|public_key| {
                let encoded = EncodedKeyPair {
                    public_key,
                    private_key: legacy_text(private)?,
                };
                KeyPair::from_encoded(&encoded)
            });
            match restored {
                Ok(pair) => {
                    self.persist(&pair).await?;
                    tracing::info!(fingerprint = %pair.fingerprint, "Legacy key pair migrated");
                }
                Err(e) => {
                    tracing::warn!("Legacy key material is unusable, dropping it: {}", e);
                }
            }
        }

        legacy.delete(&self.config.legacy_private_key).await?;
        legacy.delete(&self.config.legacy_public_key).await?;
        Ok(())
    }

    // ========================================================================
    // KEY PAIR
    // ========================================================================

    /// Return the stored pair, creating one with `generator` if none exists
    ///
    /// The stored pair's `last_used_at` is refreshed on every call.
    /// Concurrent first callers run `generator` exactly once between them.
    pub async fn get_or_create_key_pair<F, Fut>(&self, generator: F) -> Result<KeyPair>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<EncodedKeyPair>> + Send,
    {
        let mut state = self.state.lock().await;
        self.resolve(&mut state).await?;

        if let Some(mut pair) = self.load().await? {
            pair.last_used_at = Utc::now();
            self.persist(&pair).await?;
            *state = Some(CustodyState::Ready);
            tracing::debug!("Using stored key pair");
            return Ok(pair);
        }

        let encoded = generator().await?;
        let pair = KeyPair::from_encoded(&encoded)?;
        self.persist(&pair).await?;
        *state = Some(CustodyState::Ready);

        tracing::info!(fingerprint = %pair.fingerprint, "Generated new key pair");
        Ok(pair)
    }

    /// [`get_or_create_key_pair`](Self::get_or_create_key_pair) with a fresh
    /// P-256 pair from the configured random source
    pub async fn ensure_key_pair(&self) -> Result<KeyPair> {
        let rng = self.random();
        self.get_or_create_key_pair(move || async move { crypto::generate_with(rng.as_ref()) })
            .await
    }

    /// The stored pair, if any
    pub async fn key_pair(&self) -> Result<Option<KeyPair>> {
        let mut state = self.state.lock().await;
        self.resolve(&mut state).await?;
        self.load().await
    }

    /// The stored public key, if any
    pub async fn public_key(&self) -> Result<Option<String>> {
        Ok(self.key_pair().await?.map(|pair| pair.public_key.clone()))
    }

    /// The stored fingerprint, if any
    pub async fn fingerprint(&self) -> Result<Option<String>> {
        Ok(self.key_pair().await?.map(|pair| pair.fingerprint.clone()))
    }

    /// Store `encoded` as the device pair, replacing any existing one
    pub async fn save_key_pair(&self, encoded: &EncodedKeyPair) -> Result<KeyPair> {
        let pair = KeyPair::from_encoded(encoded)?;

        let mut state = self.state.lock().await;
        self.resolve(&mut state).await?;
        self.persist(&pair).await?;
        *state = Some(CustodyState::Ready);

        tracing::info!(fingerprint = %pair.fingerprint, "Key pair saved");
        Ok(pair)
    }

    /// Irreversibly delete the stored pair
    ///
    /// Legacy entries are removed too, including a lone half that
    /// migration would leave in place.
    pub async fn clear_keys(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.resolve(&mut state).await?;
        self.storage.delete(&self.config.key_id).await?;
        if let Some(legacy) = &self.legacy {
            legacy.delete(&self.config.legacy_private_key).await?;
            legacy.delete(&self.config.legacy_public_key).await?;
        }
        *state = Some(CustodyState::Destroyed);

        tracing::info!("Key pair cleared");
        Ok(())
    }

    // ========================================================================
    // BACKUP
    // ========================================================================

    /// Export the stored pair as a password-protected backup blob
    pub async fn export_keys(&self, password: &str) -> Result<String> {
        let pair = self.key_pair().await?.ok_or(Error::NoKeyPair)?;
        let encoded = pair.to_encoded();
        let password = Zeroizing::new(password.to_string());
        let iterations = self.config.backup_iterations;
        let rng = self.random();

        let blob = tokio::task::spawn_blocking(move || {
            seal_backup(&encoded, &password, iterations, rng.as_ref())
        })
        .await
        .map_err(|e| Error::CryptoUnavailable(format!("backup task failed: {}", e)))??;

        tracing::info!(fingerprint = %pair.fingerprint, "Key pair exported");
        Ok(blob)
    }

    /// Restore a pair from a backup blob, replacing any existing one
    ///
    /// Nothing is written unless the blob decrypts and holds a consistent
    /// pair.
    pub async fn import_keys(&self, blob: &str, password: &str) -> Result<KeyPair> {
        let blob = blob.to_string();
        let password = Zeroizing::new(password.to_string());
        let iterations = self.config.backup_iterations;

        let restored = tokio::task::spawn_blocking(move || {
            open_backup(&blob, &password, iterations)
        })
        .await
        .map_err(|e| Error::CryptoUnavailable(format!("backup task failed: {}", e)))?;

        let encoded = match restored {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!("Key backup import rejected: {}", e);
                return Err(e);
            }
        };

        let pair = self.save_key_pair(&encoded).await?;
        tracing::info!(fingerprint = %pair.fingerprint, "Key pair imported");
        Ok(pair)
    }

    // ========================================================================
    // RECORD I/O
    // ========================================================================

    async fn load(&self) -> Result<Option<KeyPair>> {
        let bytes = match self.storage.get(&self.config.key_id).await? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Error::StorageCorrupted(format!("key pair record: {}", e)))
    }

    async fn persist(&self, pair: &KeyPair) -> Result<()> {
        let bytes = Zeroizing::new(serde_json::to_vec(pair)?);
        self.storage.put(&self.config.key_id, &bytes).await
    }
}

fn legacy_text(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| Error::KeyImportError("legacy entry is not text".into()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    fn fast_config() -> MessengerConfig {
        MessengerConfig {
            backup_iterations: 1_000,
            ..MessengerConfig::default()
        }
    }

    fn custody_with(storage: Arc<MemoryStorage>) -> KeyCustody {
        KeyCustody::new(storage, fast_config()).unwrap()
    }

    fn legacy_store(pair: &EncodedKeyPair) -> Arc<MemoryStorage> {
        Arc::new(MemoryStorage::with_entries([
            ("scolio_messenger_private_key", pair.private_key.as_str()),
            ("scolio_messenger_public_key", pair.public_key.as_str()),
        ]))
    }

    /// Storage whose every call fails
    struct Unreachable;

    #[async_trait]
    impl SecureStorage for Unreachable {
        async fn get(&self, _id: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
            Err(Error::StorageUnavailable("offline".into()))
        }
        async fn put(&self, _id: &str, _value: &[u8]) -> Result<()> {
            Err(Error::StorageUnavailable("offline".into()))
        }
        async fn delete(&self, _id: &str) -> Result<bool> {
            Err(Error::StorageUnavailable("offline".into()))
        }
    }

    #[tokio::test]
    async fn test_fresh_store_is_uninitialized() {
        let custody = custody_with(Arc::new(MemoryStorage::new()));
        assert_eq!(custody.state().await.unwrap(), CustodyState::Uninitialized);
        assert!(custody.key_pair().await.unwrap().is_none());
        assert!(custody.public_key().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_or_create_generates_once() {
        let custody = custody_with(Arc::new(MemoryStorage::new()));

        let first = custody.ensure_key_pair().await.unwrap();
        let second = custody.ensure_key_pair().await.unwrap();

        assert_eq!(first.public_key, second.public_key);
        assert_eq!(first.private_key, second.private_key);
        assert_eq!(first.created_at, second.created_at);
        assert!(second.last_used_at >= first.last_used_at);
        assert_eq!(custody.state().await.unwrap(), CustodyState::Ready);
    }

    #[tokio::test]
    async fn test_fingerprint_format() {
        let custody = custody_with(Arc::new(MemoryStorage::new()));
        let pair = custody.ensure_key_pair().await.unwrap();

        assert_eq!(pair.fingerprint.len(), 23);
        assert_eq!(pair.fingerprint.split(' ').count(), 8);
        assert_eq!(
            custody.fingerprint().await.unwrap().as_deref(),
            Some(pair.fingerprint.as_str())
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_creates_one_pair() {
        let storage = Arc::new(MemoryStorage::new());
        let custody = Arc::new(custody_with(storage.clone()));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let custody = Arc::clone(&custody);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                custody
                    .get_or_create_key_pair(move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        crypto::generate()
                    })
                    .await
                    .unwrap()
                    .public_key
                    .clone()
            }));
        }

        let keys = futures::future::join_all(handles).await;
        let first = keys[0].as_ref().unwrap().clone();
        for key in &keys {
            assert_eq!(key.as_ref().unwrap(), &first);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_generator_error_leaves_store_empty() {
        let custody = custody_with(Arc::new(MemoryStorage::new()));

        let result = custody
            .get_or_create_key_pair(|| async { Err(Error::CryptoUnavailable("no curve".into())) })
            .await;

        assert!(matches!(result, Err(Error::CryptoUnavailable(_))));
        assert_eq!(custody.state().await.unwrap(), CustodyState::Uninitialized);
    }

    #[tokio::test]
    async fn test_pair_survives_restart() {
        let storage = Arc::new(MemoryStorage::new());
        let created = custody_with(storage.clone()).ensure_key_pair().await.unwrap();

        let reopened = custody_with(storage);
        assert_eq!(reopened.state().await.unwrap(), CustodyState::Ready);
        let loaded = reopened.key_pair().await.unwrap().unwrap();
        assert_eq!(loaded.public_key, created.public_key);
    }

    #[tokio::test]
    async fn test_file_storage_survives_restart() {
        let dir = tempfile::tempdir().unwrap();

        let created = {
            let storage = Arc::new(FileStorage::open(dir.path()).await.unwrap());
            KeyCustody::new(storage, fast_config())
                .unwrap()
                .ensure_key_pair()
                .await
                .unwrap()
        };

        let storage = Arc::new(FileStorage::open(dir.path()).await.unwrap());
        let custody = KeyCustody::new(storage, fast_config()).unwrap();
        let loaded = custody.ensure_key_pair().await.unwrap();
        assert_eq!(loaded.public_key, created.public_key);
        assert_eq!(loaded.fingerprint, created.fingerprint);
    }

    #[tokio::test]
    async fn test_migration_moves_legacy_pair() {
        let legacy_pair = crypto::generate().unwrap();
        let legacy = legacy_store(&legacy_pair);
        let custody = custody_with(Arc::new(MemoryStorage::new())).with_legacy(legacy.clone());

        let pair = custody.ensure_key_pair().await.unwrap();

        assert_eq!(pair.public_key, legacy_pair.public_key);
        assert_eq!(pair.private_key, legacy_pair.private_key);
        assert!(legacy.is_empty());
    }

    #[tokio::test]
    async fn test_migration_is_idempotent() {
        let legacy_pair = crypto::generate().unwrap();
        let legacy = legacy_store(&legacy_pair);
        let storage = Arc::new(MemoryStorage::new());
        let custody = custody_with(storage.clone()).with_legacy(legacy.clone());

        assert!(custody.migrate_legacy().await.unwrap());
        let after_first = custody.key_pair().await.unwrap().unwrap();
        assert!(legacy.is_empty());

        assert!(!custody.migrate_legacy().await.unwrap());
        let after_second = custody.key_pair().await.unwrap().unwrap();

        assert_eq!(after_first, after_second);
        assert_eq!(storage.len(), 1);
        assert_eq!(custody.state().await.unwrap(), CustodyState::Ready);
    }

    #[tokio::test]
    async fn test_migration_keeps_existing_durable_pair() {
        let storage = Arc::new(MemoryStorage::new());
        let existing = custody_with(storage.clone()).ensure_key_pair().await.unwrap();

        let legacy = legacy_store(&crypto::generate().unwrap());
        let custody = custody_with(storage).with_legacy(legacy.clone());

        assert!(custody.migrate_legacy().await.unwrap());
        assert!(legacy.is_empty());
        assert_eq!(
            custody.public_key().await.unwrap(),
            Some(existing.public_key.clone())
        );
    }

    #[tokio::test]
    async fn test_half_legacy_store_left_alone() {
        let pair = crypto::generate().unwrap();
        let legacy = Arc::new(MemoryStorage::with_entries([(
            "scolio_messenger_public_key",
            pair.public_key.as_str(),
        )]));
        let custody = custody_with(Arc::new(MemoryStorage::new())).with_legacy(legacy.clone());

        assert!(!custody.migrate_legacy().await.unwrap());
        assert_eq!(legacy.len(), 1);
        assert_eq!(custody.state().await.unwrap(), CustodyState::Uninitialized);
    }

    #[tokio::test]
    async fn test_unusable_legacy_entries_are_dropped() {
        let legacy = Arc::new(MemoryStorage::with_entries([
            ("scolio_messenger_private_key", "not-a-key"),
            ("scolio_messenger_public_key", "also-not-a-key"),
        ]));
        let custody = custody_with(Arc::new(MemoryStorage::new())).with_legacy(legacy.clone());

        assert!(custody.migrate_legacy().await.unwrap());
        assert!(legacy.is_empty());
        assert_eq!(custody.state().await.unwrap(), CustodyState::Uninitialized);
    }

    #[tokio::test]
    async fn test_non_text_legacy_entries_are_dropped() {
        let legacy = Arc::new(MemoryStorage::with_entries([
            ("scolio_messenger_private_key", vec![0xffu8, 0xfe]),
            ("scolio_messenger_public_key", vec![0xffu8, 0xfe]),
        ]));
        let custody = custody_with(Arc::new(MemoryStorage::new())).with_legacy(legacy.clone());

        let pair = custody.ensure_key_pair().await.unwrap();
        assert!(legacy.is_empty());

        let again = custody.ensure_key_pair().await.unwrap();
        assert_eq!(again.public_key, pair.public_key);
    }

    #[tokio::test]
    async fn test_clear_first_removes_legacy_entries() {
        let legacy_pair = crypto::generate().unwrap();
        let legacy = legacy_store(&legacy_pair);
        let custody = custody_with(Arc::new(MemoryStorage::new())).with_legacy(legacy.clone());

        custody.clear_keys().await.unwrap();
        assert!(legacy.is_empty());
        assert_eq!(custody.state().await.unwrap(), CustodyState::Destroyed);

        let fresh = custody.ensure_key_pair().await.unwrap();
        assert_ne!(fresh.public_key, legacy_pair.public_key);
        assert!(legacy.is_empty());
    }

    #[tokio::test]
    async fn test_clear_removes_half_legacy_store() {
        let pair = crypto::generate().unwrap();
        let legacy = Arc::new(MemoryStorage::with_entries([(
            "scolio_messenger_private_key",
            pair.private_key.as_str(),
        )]));
        let custody = custody_with(Arc::new(MemoryStorage::new())).with_legacy(legacy.clone());

        custody.clear_keys().await.unwrap();
        assert!(legacy.is_empty());
    }

    #[tokio::test]
    async fn test_import_first_consumes_legacy_entries() {
        let source = custody_with(Arc::new(MemoryStorage::new()));
        let backed_up = source.ensure_key_pair().await.unwrap();
        let blob = source.export_keys("pw").await.unwrap();

        let legacy = legacy_store(&crypto::generate().unwrap());
        let storage = Arc::new(MemoryStorage::new());
        let target = custody_with(storage.clone()).with_legacy(legacy.clone());

        let imported = target.import_keys(&blob, "pw").await.unwrap();

        assert!(legacy.is_empty());
        assert_eq!(imported.public_key, backed_up.public_key);
        assert_eq!(
            target.public_key().await.unwrap(),
            Some(backed_up.public_key.clone())
        );
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_save_first_consumes_legacy_entries() {
        let legacy = legacy_store(&crypto::generate().unwrap());
        let custody = custody_with(Arc::new(MemoryStorage::new())).with_legacy(legacy.clone());

        let chosen = crypto::generate().unwrap();
        custody.save_key_pair(&chosen).await.unwrap();

        assert!(legacy.is_empty());
        assert_eq!(custody.public_key().await.unwrap(), Some(chosen.public_key.clone()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_migrates_once() {
        let legacy_pair = crypto::generate().unwrap();
        let legacy = legacy_store(&legacy_pair);
        let storage = Arc::new(MemoryStorage::new());
        let custody = Arc::new(custody_with(storage.clone()).with_legacy(legacy.clone()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let custody = Arc::clone(&custody);
            handles.push(tokio::spawn(async move {
                custody.ensure_key_pair().await.unwrap().public_key.clone()
            }));
        }

        for key in futures::future::join_all(handles).await {
            assert_eq!(key.unwrap(), legacy_pair.public_key);
        }
        assert_eq!(storage.len(), 1);
        assert!(legacy.is_empty());
        assert_eq!(custody.state().await.unwrap(), CustodyState::Ready);
    }

    #[tokio::test]
    async fn test_backup_round_trip() {
        let custody = custody_with(Arc::new(MemoryStorage::new()));
        let original = custody.ensure_key_pair().await.unwrap();
        let blob = custody.export_keys("pw").await.unwrap();

        let other = custody_with(Arc::new(MemoryStorage::new()));
        let restored = other.import_keys(&blob, "pw").await.unwrap();

        assert_eq!(restored.public_key, original.public_key);
        assert_eq!(restored.private_key, original.private_key);
        assert_eq!(restored.fingerprint, original.fingerprint);
        assert_eq!(other.state().await.unwrap(), CustodyState::Ready);
    }

    #[tokio::test]
    async fn test_backup_round_trip_default_iterations() {
        let custody = KeyCustody::new(Arc::new(MemoryStorage::new()), MessengerConfig::default())
            .unwrap();
        let original = custody.ensure_key_pair().await.unwrap();

        let blob = custody.export_keys("pw").await.unwrap();
        custody.clear_keys().await.unwrap();
        let restored = custody.import_keys(&blob, "pw").await.unwrap();

        assert_eq!(restored.public_key, original.public_key);
    }

    #[tokio::test]
    async fn test_wrong_password_leaves_keys_untouched() {
        let source = custody_with(Arc::new(MemoryStorage::new()));
        source.ensure_key_pair().await.unwrap();
        let blob = source.export_keys("pw").await.unwrap();

        let target = custody_with(Arc::new(MemoryStorage::new()));
        let before = target.ensure_key_pair().await.unwrap();

        let result = target.import_keys(&blob, "wrong-pw").await;
        assert!(matches!(result, Err(Error::BackupDecryptionFailed(_))));

        let after = target.key_pair().await.unwrap().unwrap();
        assert_eq!(after.public_key, before.public_key);
        assert_eq!(after.private_key, before.private_key);
    }

    #[tokio::test]
    async fn test_export_without_keys() {
        let custody = custody_with(Arc::new(MemoryStorage::new()));
        assert!(matches!(
            custody.export_keys("pw").await,
            Err(Error::NoKeyPair)
        ));
    }

    #[tokio::test]
    async fn test_clear_keys_then_regenerate() {
        let custody = custody_with(Arc::new(MemoryStorage::new()));
        let old = custody.ensure_key_pair().await.unwrap();

        custody.clear_keys().await.unwrap();
        assert_eq!(custody.state().await.unwrap(), CustodyState::Destroyed);
        assert!(custody.key_pair().await.unwrap().is_none());

        let new = custody.ensure_key_pair().await.unwrap();
        assert_ne!(new.public_key, old.public_key);
        assert_eq!(custody.state().await.unwrap(), CustodyState::Ready);
    }

    #[tokio::test]
    async fn test_save_rejects_mismatched_pair() {
        let custody = custody_with(Arc::new(MemoryStorage::new()));
        let a = crypto::generate().unwrap();
        let b = crypto::generate().unwrap();

        let mixed = EncodedKeyPair {
            public_key: a.public_key.clone(),
            private_key: b.private_key.clone(),
        };
        assert!(matches!(
            custody.save_key_pair(&mixed).await,
            Err(Error::KeyImportError(_))
        ));
        assert!(custody.key_pair().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupted_record() {
        let storage = Arc::new(MemoryStorage::with_entries([("messenger_keypair", "{oops")]));
        let custody = custody_with(storage);
        assert!(matches!(
            custody.key_pair().await,
            Err(Error::StorageCorrupted(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_storage() {
        let custody = KeyCustody::new(Arc::new(Unreachable), fast_config()).unwrap();
        let err = custody.ensure_key_pair().await.unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable(_)));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_encrypted_storage_backend() {
        let storage = Arc::new(EncryptedStorage::new(MemoryStorage::new(), [9u8; 32]));
        let custody = KeyCustody::new(storage.clone(), fast_config()).unwrap();
        let pair = custody.ensure_key_pair().await.unwrap();

        let raw = storage.inner().get("messenger_keypair").await.unwrap().unwrap();
        let needle = pair.private_key.as_bytes();
        assert!(!raw.windows(needle.len()).any(|w| w == needle));
    }

    #[tokio::test]
    async fn test_save_trims_padded_pair() {
        let custody = custody_with(Arc::new(MemoryStorage::new()));
        let pair = crypto::generate().unwrap();
        let padded = EncodedKeyPair {
            public_key: format!("{}\n", pair.public_key),
            private_key: format!(" {}", pair.private_key),
        };

        let saved = custody.save_key_pair(&padded).await.unwrap();
        assert_eq!(saved.public_key, pair.public_key);
        assert_eq!(saved.private_key, pair.private_key);
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let pair = KeyPair::from_encoded(&crypto::generate().unwrap()).unwrap();
        let debug = format!("{:?}", pair);
        assert!(!debug.contains(&pair.private_key));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = MessengerConfig {
            salt_len: 8,
            ..MessengerConfig::default()
        };
        assert!(matches!(
            KeyCustody::new(Arc::new(MemoryStorage::new()), config),
            Err(Error::InvalidConfig(_))
        ));
    }
}
