//! Storage backends: where wrapped key records live.

use crate::error::KeystoreError;
use crate::types::{KeyId, KeyPurpose, KeyRecord};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

// ---------------------------------------------------------------------------
// Storage trait
// ---------------------------------------------------------------------------

/// Backend for persisting key records.
///
/// Implementations must enforce at most one active record per
/// `(purpose, conversation_id)`: [`insert`](Self::insert) reports a second
/// one as [`KeystoreError::UniqueViolation`]. The keystore relies on this to
/// settle concurrent first messages in a new conversation.
///
/// Implement this for your infrastructure:
/// - InMemoryBackend (testing, single process)
/// - FileBackend (development, single host)
/// - Your database (production: a unique index on purpose + conversation)
pub trait StorageBackend: Send + Sync {
    fn get(&self, id: &KeyId) -> Result<Option<KeyRecord>, KeystoreError>;
    fn find_active(
        &self,
        purpose: &KeyPurpose,
        conversation_id: &str,
    ) -> Result<Option<KeyRecord>, KeystoreError>;
    fn insert(&self, record: &KeyRecord) -> Result<(), KeystoreError>;
    fn touch(&self, id: &KeyId, at: DateTime<Utc>) -> Result<(), KeystoreError>;
    fn mark_deleted(&self, id: &KeyId, at: DateTime<Utc>) -> Result<(), KeystoreError>;
    fn list(&self) -> Result<Vec<KeyRecord>, KeystoreError>;
}

fn poisoned<T>(_: T) -> KeystoreError {
    KeystoreError::StorageError("lock poisoned".into())
}

fn unique_violation(record: &KeyRecord, conversation_id: &str) -> KeystoreError {
    KeystoreError::UniqueViolation {
        purpose: record.purpose.clone(),
        conversation_id: conversation_id.to_string(),
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tables {
    records: HashMap<String, KeyRecord>,
    /// (purpose, conversation) -> id of the active record.
    active: HashMap<(String, String), KeyId>,
}

/// In-memory storage (for testing and ephemeral use).
pub struct InMemoryBackend {
    tables: RwLock<Tables>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Overwrite a stored record as-is, to simulate corruption.
    #[cfg(test)]
    pub(crate) fn replace(&self, record: KeyRecord) -> Result<(), KeystoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.records.insert(record.id.as_str().to_string(), record);
        Ok(())
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for InMemoryBackend {
    fn get(&self, id: &KeyId) -> Result<Option<KeyRecord>, KeystoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.records.get(id.as_str()).cloned())
    }

    fn find_active(
        &self,
        purpose: &KeyPurpose,
        conversation_id: &str,
    ) -> Result<Option<KeyRecord>, KeystoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let slot = (purpose.as_str().to_string(), conversation_id.to_string());
        Ok(tables
            .active
            .get(&slot)
            .and_then(|id| tables.records.get(id.as_str()))
            .cloned())
    }

    fn insert(&self, record: &KeyRecord) -> Result<(), KeystoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        if tables.records.contains_key(record.id.as_str()) {
            return Err(KeystoreError::DuplicateKey(record.id.clone()));
        }
        if let (Some(conversation), true) = (&record.conversation_id, record.is_active()) {
            let slot = (record.purpose.as_str().to_string(), conversation.clone());
            if tables.active.contains_key(&slot) {
                return Err(unique_violation(record, conversation));
            }
            tables.active.insert(slot, record.id.clone());
        }
        tables
            .records
            .insert(record.id.as_str().to_string(), record.clone());
        Ok(())
    }

    fn touch(&self, id: &KeyId, at: DateTime<Utc>) -> Result<(), KeystoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let record = tables
            .records
            .get_mut(id.as_str())
            .ok_or_else(|| KeystoreError::KeyNotFound(id.clone()))?;
        record.last_accessed_at = at;
        Ok(())
    }

    fn mark_deleted(&self, id: &KeyId, at: DateTime<Utc>) -> Result<(), KeystoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let record = tables
            .records
            .get_mut(id.as_str())
            .ok_or_else(|| KeystoreError::KeyNotFound(id.clone()))?;
        record.deleted_at = Some(at);
        let slot = record
            .conversation_id
            .clone()
            .map(|c| (record.purpose.as_str().to_string(), c));
        if let Some(slot) = slot {
            if tables.active.get(&slot) == Some(id) {
                tables.active.remove(&slot);
            }
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<KeyRecord>, KeystoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.records.values().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// File backend
// ---------------------------------------------------------------------------

/// File-based storage (one JSON file per key).
///
/// Directory layout:
/// ```text
/// keys/
///   {key_id}.json
/// active/
///   {sha256(purpose "|" conversation_id)}.id   -- holds the active key id
/// ```
///
/// The `active/` entry is created with an exclusive hard link, so the
/// filesystem itself arbitrates between two writers racing on the same
/// conversation, even across processes. Conversation ids are hashed because they are
/// caller-supplied and may not be valid file names.
pub struct FileBackend {
    dir: PathBuf,
    /// Serializes read-modify-write of record files within this process.
    write_lock: Mutex<()>,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, KeystoreError> {
        let dir = dir.into();
        for sub in ["keys", "active"] {
            std::fs::create_dir_all(dir.join(sub))
                .map_err(|e| KeystoreError::StorageError(format!("create dir: {}", e)))?;
        }
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn key_path(&self, id: &KeyId) -> PathBuf {
        self.dir.join("keys").join(format!("{}.json", id.as_str()))
    }

    fn active_path(&self, purpose: &KeyPurpose, conversation_id: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(purpose.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(conversation_id.as_bytes());
        let name = format!("{:x}.id", hasher.finalize());
        self.dir.join("active").join(name)
    }

    fn read_key_file(&self, path: &Path) -> Result<KeyRecord, KeystoreError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| KeystoreError::StorageError(format!("read: {}", e)))?;
        serde_json::from_str(&data)
            .map_err(|e| KeystoreError::StorageError(format!("parse: {}", e)))
    }

    fn write_key_file(&self, record: &KeyRecord) -> Result<(), KeystoreError> {
        let path = self.key_path(&record.id);
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| KeystoreError::StorageError(format!("serialize: {}", e)))?;
        // Atomic write: write to a uniquely named temp, then rename
        let tmp = path.with_extension(format!("{}.tmp", KeyId::generate()));
        std::fs::write(&tmp, &json)
            .map_err(|e| KeystoreError::StorageError(format!("write: {}", e)))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| KeystoreError::StorageError(format!("rename: {}", e)))?;
        Ok(())
    }

    fn read_active_id(&self, path: &Path) -> Result<Option<KeyId>, KeystoreError> {
        match std::fs::read_to_string(path) {
            Ok(id) => Ok(Some(KeyId::new(id.trim()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KeystoreError::StorageError(format!("read index: {}", e))),
        }
    }

    /// Claim the active slot. `Ok(false)` means another record holds it.
    ///
    /// The index is written to a temp file and hard-linked into place, so
    /// readers never observe a half-written id.
    fn claim_active(&self, path: &Path, id: &KeyId) -> Result<bool, KeystoreError> {
        let tmp = path.with_extension(format!("{}.tmp", id.as_str()));
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)
            .map_err(|e| KeystoreError::StorageError(format!("create index: {}", e)))?;
        file.write_all(id.as_str().as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| KeystoreError::StorageError(format!("write index: {}", e)))?;
        drop(file);

        let claimed = match std::fs::hard_link(&tmp, path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(KeystoreError::StorageError(format!("link index: {}", e))),
        };
        let _ = std::fs::remove_file(&tmp);
        claimed
    }

    /// Take over an index whose record is gone or no longer active.
    ///
    /// Returns `Ok(false)` when the current holder is live. The check and the
    /// takeover run under `write_lock`, so two writers in this process cannot
    /// both discard the same stale entry.
    fn reclaim_stale(
        &self,
        index: &Path,
        record: &KeyRecord,
        conversation_id: &str,
    ) -> Result<bool, KeystoreError> {
        let _guard = self.write_lock.lock().map_err(poisoned)?;
        if let Some(holder) = self.read_active_id(index)? {
            let live = self
                .get(&holder)?
                .is_some_and(|r| r.is_active_for(&record.purpose, conversation_id));
            if live {
                return Ok(false);
            }
            tracing::warn!(key_id = %holder, "reclaiming stale active index");
            remove_index(index)?;
        }
        self.claim_active(index, &record.id)
    }

    fn update<F>(&self, id: &KeyId, f: F) -> Result<KeyRecord, KeystoreError>
    where
        F: FnOnce(&mut KeyRecord),
    {
        let _guard = self.write_lock.lock().map_err(poisoned)?;
        let mut record = self
            .get(id)?
            .ok_or_else(|| KeystoreError::KeyNotFound(id.clone()))?;
        f(&mut record);
        self.write_key_file(&record)?;
        Ok(record)
    }
}

fn remove_index(path: &Path) -> Result<(), KeystoreError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(KeystoreError::StorageError(format!("remove index: {}", e))),
    }
}

/// Only ids of this shape can name a file under `keys/`.
fn is_plain_token(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl StorageBackend for FileBackend {
    fn get(&self, id: &KeyId) -> Result<Option<KeyRecord>, KeystoreError> {
        // Ids arrive from untrusted payloads
        if !is_plain_token(id.as_str()) {
            return Ok(None);
        }
        let path = self.key_path(id);
        if !path.exists() {
            return Ok(None);
        }
        self.read_key_file(&path).map(Some)
    }

    fn find_active(
        &self,
        purpose: &KeyPurpose,
        conversation_id: &str,
    ) -> Result<Option<KeyRecord>, KeystoreError> {
        let Some(id) = self.read_active_id(&self.active_path(purpose, conversation_id))? else {
            return Ok(None);
        };
        Ok(self
            .get(&id)?
            .filter(|r| r.is_active_for(purpose, conversation_id)))
    }

    fn insert(&self, record: &KeyRecord) -> Result<(), KeystoreError> {
        {
            let _guard = self.write_lock.lock().map_err(poisoned)?;
            if self.key_path(&record.id).exists() {
                return Err(KeystoreError::DuplicateKey(record.id.clone()));
            }
            self.write_key_file(record)?;
        }

        if let (Some(conversation), true) = (&record.conversation_id, record.is_active()) {
            let index = self.active_path(&record.purpose, conversation);
            if !self.claim_active(&index, &record.id)?
                && !self.reclaim_stale(&index, record, conversation)?
            {
                // Lost the slot: remove our orphan record before reporting
                let _ = std::fs::remove_file(self.key_path(&record.id));
                return Err(unique_violation(record, conversation));
            }
        }
        Ok(())
    }

    fn touch(&self, id: &KeyId, at: DateTime<Utc>) -> Result<(), KeystoreError> {
        self.update(id, |r| r.last_accessed_at = at).map(|_| ())
    }

    fn mark_deleted(&self, id: &KeyId, at: DateTime<Utc>) -> Result<(), KeystoreError> {
        let _guard = self.write_lock.lock().map_err(poisoned)?;
        let mut record = self
            .get(id)?
            .ok_or_else(|| KeystoreError::KeyNotFound(id.clone()))?;

        // Free the slot before stamping the record: an index left behind by a
        // crash in between would otherwise name a retired key
        if let Some(conversation) = &record.conversation_id {
            let index = self.active_path(&record.purpose, conversation);
            if self.read_active_id(&index)?.as_ref() == Some(id) {
                remove_index(&index)?;
            }
        }
        record.deleted_at = Some(at);
        self.write_key_file(&record)
    }

    fn list(&self) -> Result<Vec<KeyRecord>, KeystoreError> {
        let mut records = Vec::new();
        let entries = std::fs::read_dir(self.dir.join("keys"))
            .map_err(|e| KeystoreError::StorageError(format!("readdir: {}", e)))?;
        for entry in entries {
            let entry = entry.map_err(|e| KeystoreError::StorageError(format!("entry: {}", e)))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                records.push(self.read_key_file(&path)?);
            }
        }
        Ok(records)
    }
}
