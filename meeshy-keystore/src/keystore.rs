//! KeyStore: envelope custody of server-layer data keys.

use crate::audit::{AuditAction, AuditEvent, AuditSink};
use crate::error::KeystoreError;
use crate::master_key::MasterKeyProvider;
use crate::storage::StorageBackend;
use crate::types::*;

use chrono::Utc;
use meeshy_envelope::{Aad, ServerLayerCipher, SymmetricKey};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

// ---------------------------------------------------------------------------
// KeyStore
// ---------------------------------------------------------------------------

/// Hands out data keys: one per conversation, or a fresh one per call when
/// there is no conversation.
///
/// DEKs are persisted only in wrapped form. Unwrapped DEKs are cached by
/// key-id for the life of the store; there is no size-based eviction, only
/// the explicit [`evict`](Self::evict) / [`clear_cache`](Self::clear_cache)
/// hooks.
pub struct KeyStore {
    storage: Arc<dyn StorageBackend>,
    master: Arc<MasterKeyProvider>,
    audit: Arc<dyn AuditSink>,
    purpose: KeyPurpose,
    cipher: ServerLayerCipher,
    cache: RwLock<HashMap<KeyId, SymmetricKey>>,
}

impl KeyStore {
    /// Create a keystore for the `server-layer-translation` purpose.
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        master: Arc<MasterKeyProvider>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self::with_purpose(storage, master, audit, KeyPurpose::server_layer_translation())
    }

    /// Create a keystore scoped to another purpose namespace.
    pub fn with_purpose(
        storage: Arc<dyn StorageBackend>,
        master: Arc<MasterKeyProvider>,
        audit: Arc<dyn AuditSink>,
        purpose: KeyPurpose,
    ) -> Self {
        Self {
            storage,
            master,
            audit,
            purpose,
            cipher: ServerLayerCipher::new(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn purpose(&self) -> &KeyPurpose {
        &self.purpose
    }

    // -----------------------------------------------------------------------
    // Key resolution
    // -----------------------------------------------------------------------

    /// Resolve the data key for a message.
    ///
    /// With a conversation id, every call for that conversation returns the
    /// same key, including calls racing to create it. Without one (or with
    /// an empty id) a new single-use key is minted on each call.
    pub async fn get_or_create_key(
        &self,
        conversation_id: Option<&str>,
    ) -> Result<(KeyId, SymmetricKey), KeystoreError> {
        match conversation_id.filter(|c| !c.is_empty()) {
            Some(conversation) => self.conversation_key(conversation).await,
            None => self.single_use_key(),
        }
    }

    /// Fetch a data key by id, for decrypting or re-encrypting a server layer.
    pub async fn get_key_by_id(&self, id: &KeyId) -> Result<SymmetricKey, KeystoreError> {
        if let Some(key) = self.cache.read().await.get(id) {
            return Ok(key.clone());
        }

        let record = match self.storage.get(id)? {
            Some(record) if record.purpose == self.purpose => record,
            other => {
                let detail = match other {
                    Some(_) => "key belongs to another purpose",
                    None => "no stored record",
                };
                self.audit.record(
                    AuditEvent::key_event(id, &self.purpose, AuditAction::KeyNotFound)
                        .with_failure()
                        .with_detail(detail),
                );
                return Err(KeystoreError::KeyNotFound(id.clone()));
            }
        };

        let key = self.unwrap_and_cache(&record).await?;
        self.storage.touch(id, Utc::now())?;
        Ok(key)
    }

    /// Retire the active key of a conversation.
    ///
    /// The next [`get_or_create_key`](Self::get_or_create_key) for the
    /// conversation mints a new key. Server layers sealed under the retired
    /// key still resolve through [`get_key_by_id`](Self::get_key_by_id).
    pub async fn retire_conversation_key(
        &self,
        conversation_id: &str,
    ) -> Result<Option<KeyId>, KeystoreError> {
        let Some(record) = self.storage.find_active(&self.purpose, conversation_id)? else {
            return Ok(None);
        };
        self.storage.mark_deleted(&record.id, Utc::now())?;
        self.audit.record(
            AuditEvent::key_event(&record.id, &self.purpose, AuditAction::KeyRetired)
                .with_conversation(Some(conversation_id)),
        );
        tracing::info!(key_id = %record.id, "conversation key retired");
        Ok(Some(record.id))
    }

    /// Stored metadata for a key (never the key itself).
    pub async fn record(&self, id: &KeyId) -> Result<KeyRecord, KeystoreError> {
        self.storage
            .get(id)?
            .ok_or_else(|| KeystoreError::KeyNotFound(id.clone()))
    }

    // -----------------------------------------------------------------------
    // Cache controls
    // -----------------------------------------------------------------------

    pub async fn cached_key_count(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Drop one unwrapped key from memory. Returns whether it was cached.
    pub async fn evict(&self, id: &KeyId) -> bool {
        self.cache.write().await.remove(id).is_some()
    }

    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn single_use_key(&self) -> Result<(KeyId, SymmetricKey), KeystoreError> {
        let (record, key) = self.mint(None)?;
        self.storage.insert(&record)?;
        self.audit.record(AuditEvent::key_event(
            &record.id,
            &self.purpose,
            AuditAction::KeyCreated { single_use: true },
        ));
        tracing::debug!(key_id = %record.id, "single-use key created");
        Ok((record.id, key))
    }

    async fn conversation_key(
        &self,
        conversation: &str,
    ) -> Result<(KeyId, SymmetricKey), KeystoreError> {
        if let Some(record) = self.storage.find_active(&self.purpose, conversation)? {
            return self.resolve_existing(&record).await;
        }

        let (record, key) = self.mint(Some(conversation))?;
        match self.storage.insert(&record) {
            Ok(()) => {
                self.cache.write().await.insert(record.id.clone(), key.clone());
                self.audit.record(
                    AuditEvent::key_event(
                        &record.id,
                        &self.purpose,
                        AuditAction::KeyCreated { single_use: false },
                    )
                    .with_conversation(Some(conversation)),
                );
                tracing::info!(key_id = %record.id, "conversation key created");
                Ok((record.id, key))
            }
            Err(KeystoreError::UniqueViolation { .. }) => {
                // Another writer created the key first; ours is dropped (and zeroized).
                drop(key);
                let winner = self
                    .storage
                    .find_active(&self.purpose, conversation)?
                    .ok_or_else(|| {
                        KeystoreError::StorageError(
                            "unique violation reported but no active key found".into(),
                        )
                    })?;
                tracing::debug!(
                    discarded = %record.id,
                    winner = %winner.id,
                    "lost conversation key creation race"
                );
                self.audit.record(
                    AuditEvent::key_event(
                        &record.id,
                        &self.purpose,
                        AuditAction::CreationRaceLost { winner: winner.id.clone() },
                    )
                    .with_conversation(Some(conversation))
                    .with_detail("discarded minted key, adopted winner"),
                );
                self.resolve_existing(&winner).await
            }
            Err(e) => Err(e),
        }
    }

    async fn resolve_existing(
        &self,
        record: &KeyRecord,
    ) -> Result<(KeyId, SymmetricKey), KeystoreError> {
        let cached = self.cache.read().await.get(&record.id).cloned();
        let key = match cached {
            Some(key) => key,
            None => self.unwrap_and_cache(record).await?,
        };
        self.storage.touch(&record.id, Utc::now())?;
        Ok((record.id.clone(), key))
    }

    /// Generate a DEK and its wrapped record. Nothing is persisted here.
    fn mint(
        &self,
        conversation_id: Option<&str>,
    ) -> Result<(KeyRecord, SymmetricKey), KeystoreError> {
        let master = self.master.master_key()?;
        let id = KeyId::generate();
        let dek = SymmetricKey::generate()
            .map_err(|e| KeystoreError::EncryptionError(e.to_string()))?;
        let aad = Aad::for_key_wrap(self.purpose.as_str(), id.as_str());
        let wrapped = self
            .cipher
            .seal(dek.as_bytes(), master.key(), &aad)
            .map_err(|e| KeystoreError::EncryptionError(e.to_string()))?;

        let now = Utc::now();
        let record = KeyRecord {
            id,
            wrapped_key: wrapped.ciphertext,
            wrap_iv: wrapped.iv,
            wrap_auth_tag: wrapped.auth_tag,
            algorithm: KeyAlgorithm::Aes256Gcm,
            purpose: self.purpose.clone(),
            conversation_id: conversation_id.map(str::to_owned),
            created_at: now,
            last_accessed_at: now,
            deleted_at: None,
        };
        Ok((record, dek))
    }

    /// Verify and decrypt a wrapped DEK, then cache it.
    ///
    /// Two tasks may unwrap the same record at once; both produce the same
    /// key, so the later cache insert is harmless.
    async fn unwrap_and_cache(&self, record: &KeyRecord) -> Result<SymmetricKey, KeystoreError> {
        let master = self.master.master_key()?;
        let aad = Aad::for_key_wrap(record.purpose.as_str(), record.id.as_str());

        let unwrapped = self
            .cipher
            .open(&record.sealed_key(), master.key(), &aad)
            .map(Zeroizing::new)
            .ok()
            .and_then(|raw| SymmetricKey::from_slice(&raw).ok());

        let Some(key) = unwrapped else {
            tracing::warn!(key_id = %record.id, "wrapped key failed integrity check");
            self.audit.record(
                AuditEvent::key_event(&record.id, &record.purpose, AuditAction::UnwrapFailed)
                    .with_conversation(record.conversation_id.as_deref())
                    .with_failure()
                    .with_detail("wrapped key failed integrity check"),
            );
            return Err(KeystoreError::UnwrapIntegrity(record.id.clone()));
        };

        self.cache.write().await.insert(record.id.clone(), key.clone());
        self.audit.record(
            AuditEvent::key_event(&record.id, &record.purpose, AuditAction::KeyUnwrapped)
                .with_conversation(record.conversation_id.as_deref()),
        );
        Ok(key)
    }
}
