//! Error types for the keystore.

use crate::types::{KeyId, KeyPurpose};
use std::fmt;

// ---------------------------------------------------------------------------
// Startup configuration
// ---------------------------------------------------------------------------

/// The master key could not be loaded. Fatal: the process must not start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// No secret at the named source (environment variable, config key).
    Missing { source: String },
    /// The secret is not valid base64.
    InvalidBase64,
    /// The secret decodes to the wrong number of bytes.
    InvalidLength { got: usize },
    /// `load` called on a provider that already holds a key.
    AlreadyLoaded,
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { source } => write!(f, "master key missing: {} is not set", source),
            Self::InvalidBase64 => write!(f, "master key is not valid base64"),
            Self::InvalidLength { got } => {
                write!(f, "master key must decode to 32 bytes, got {}", got)
            }
            Self::AlreadyLoaded => write!(f, "master key already loaded"),
        }
    }
}

impl std::error::Error for ConfigurationError {}

// ---------------------------------------------------------------------------
// Runtime keystore errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeystoreError {
    /// No record exists for this key-id (or it belongs to another purpose).
    KeyNotFound(KeyId),
    /// The wrapped key failed its tag check: corrupted row or wrong master key.
    UnwrapIntegrity(KeyId),
    /// The master key provider has not been loaded.
    MasterKeyUnavailable,
    /// An active key already exists for this (purpose, conversation).
    UniqueViolation { purpose: KeyPurpose, conversation_id: String },
    /// A record with this id already exists.
    DuplicateKey(KeyId),
    StorageError(String),
    EncryptionError(String),
}

impl fmt::Display for KeystoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyNotFound(id) => write!(f, "decryption key not found: {}", id),
            Self::UnwrapIntegrity(id) => write!(f, "wrapped key failed integrity check: {}", id),
            Self::MasterKeyUnavailable => write!(f, "master key not initialized"),
            Self::UniqueViolation { purpose, conversation_id } => write!(
                f,
                "active key already exists for {} / {}",
                purpose, conversation_id
            ),
            Self::DuplicateKey(id) => write!(f, "duplicate key: {}", id),
            Self::StorageError(msg) => write!(f, "storage error: {}", msg),
            Self::EncryptionError(msg) => write!(f, "encryption error: {}", msg),
        }
    }
}

impl std::error::Error for KeystoreError {}
