//! # Meeshy Keystore
//!
//! Envelope key custody for server-layer encryption.
//!
//! A master key (KEK) loaded once from configuration wraps per-conversation
//! data keys (DEKs). Only wrapped DEKs are persisted; unwrapped ones live in
//! an in-process cache keyed by key-id.
//!
//! ## Quick Start
//!
//! ```ignore
//! use meeshy_keystore::*;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let master = Arc::new(MasterKeyProvider::from_env(DEFAULT_MASTER_KEY_VAR)?);
//! let storage = Arc::new(InMemoryBackend::new());
//! let audit = Arc::new(TracingAuditSink);
//! let ks = KeyStore::new(storage, master, audit);
//!
//! // Same conversation, same key
//! let (id, key) = ks.get_or_create_key(Some("conv-42")).await?;
//! let (again, _) = ks.get_or_create_key(Some("conv-42")).await?;
//! assert_eq!(id, again);
//!
//! // Later, from the key-id embedded in a message
//! let same = ks.get_key_by_id(&id).await?;
//! assert_eq!(key, same);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod error;
pub mod keystore;
pub mod master_key;
pub mod storage;
pub mod types;

// Re-export main types for convenience
pub use audit::{
    AuditAction, AuditEvent, AuditSink, FileAuditSink, InMemoryAuditSink, IntegrityChainSink,
    TracingAuditSink,
};
pub use error::{ConfigurationError, KeystoreError};
pub use keystore::KeyStore;
pub use master_key::{MasterKey, MasterKeyProvider, DEFAULT_MASTER_KEY_VAR};
pub use storage::{FileBackend, InMemoryBackend, StorageBackend};
pub use types::{KeyAlgorithm, KeyId, KeyPurpose, KeyRecord, SERVER_LAYER_TRANSLATION};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
