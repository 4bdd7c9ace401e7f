//! Core types: KeyId, KeyPurpose, KeyAlgorithm, KeyRecord.

use chrono::{DateTime, Utc};
use meeshy_envelope::SealedText;
use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Key identifiers
// ---------------------------------------------------------------------------

/// Unique key identifier (hex-encoded random bytes).
///
/// This is the only handle a consumer needs to decrypt later; it travels
/// inside every server layer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    /// Create a new random KeyId.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand_core::OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Create from a specific string (for lookups and tests).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Purpose namespace
// ---------------------------------------------------------------------------

/// Purpose used for hybrid-message server layers.
pub const SERVER_LAYER_TRANSLATION: &str = "server-layer-translation";

/// Logical namespace for keys. Keys never cross purposes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyPurpose(String);

impl KeyPurpose {
    pub fn new(purpose: impl Into<String>) -> Self {
        Self(purpose.into())
    }

    pub fn server_layer_translation() -> Self {
        Self::new(SERVER_LAYER_TRANSLATION)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for KeyPurpose {
    fn default() -> Self {
        Self::server_layer_translation()
    }
}

impl fmt::Display for KeyPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Wrap algorithm
// ---------------------------------------------------------------------------

/// AEAD scheme used to wrap the DEK. Only one exists today.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::Aes256Gcm => write!(f, "aes-256-gcm"),
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted record
// ---------------------------------------------------------------------------

/// A data-encryption key as persisted: wrapped under the master key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRecord {
    /// Unique identifier.
    pub id: KeyId,
    /// DEK ciphertext under the master key (base64).
    pub wrapped_key: String,
    /// IV used for the wrap (base64).
    pub wrap_iv: String,
    /// Tag produced by the wrap (base64).
    pub wrap_auth_tag: String,
    pub algorithm: KeyAlgorithm,
    pub purpose: KeyPurpose,
    /// Set for conversation keys; `None` for single-use keys.
    pub conversation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Bumped on every unwrap and conversation lookup.
    pub last_accessed_at: DateTime<Utc>,
    /// Set when the key is retired. Retired keys still decrypt by id but are
    /// never handed out for new messages.
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl KeyRecord {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Whether this is the live key for `(purpose, conversation_id)`.
    pub fn is_active_for(&self, purpose: &KeyPurpose, conversation_id: &str) -> bool {
        self.is_active()
            && &self.purpose == purpose
            && self.conversation_id.as_deref() == Some(conversation_id)
    }

    /// The wrap in the cipher's transport form.
    pub fn sealed_key(&self) -> SealedText {
        SealedText {
            ciphertext: self.wrapped_key.clone(),
            iv: self.wrap_iv.clone(),
            auth_tag: self.wrap_auth_tag.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(conversation: Option<&str>) -> KeyRecord {
        let now = Utc::now();
        KeyRecord {
            id: KeyId::new("k1"),
            wrapped_key: "w".into(),
            wrap_iv: "i".into(),
            wrap_auth_tag: "t".into(),
            algorithm: KeyAlgorithm::Aes256Gcm,
            purpose: KeyPurpose::server_layer_translation(),
            conversation_id: conversation.map(str::to_owned),
            created_at: now,
            last_accessed_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn key_ids_are_random_hex() {
        let a = KeyId::generate();
        let b = KeyId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn active_for_matches_purpose_and_conversation() {
        let purpose = KeyPurpose::server_layer_translation();
        let mut r = record(Some("c1"));
        assert!(r.is_active_for(&purpose, "c1"));
        assert!(!r.is_active_for(&purpose, "c2"));
        assert!(!r.is_active_for(&KeyPurpose::new("other"), "c1"));
        r.deleted_at = Some(Utc::now());
        assert!(!r.is_active_for(&purpose, "c1"));
        assert!(!record(None).is_active_for(&purpose, "c1"));
    }

    #[test]
    fn record_json_shape() {
        let json = serde_json::to_value(record(Some("c1"))).unwrap();
        assert_eq!(json["algorithm"], "aes-256-gcm");
        assert_eq!(json["purpose"], "server-layer-translation");
        assert_eq!(json["conversationId"], "c1");
        assert_eq!(json["wrapAuthTag"], "t");
        assert!(json.get("lastAccessedAt").is_some());
    }

    #[test]
    fn record_without_deleted_at_parses() {
        let mut json = serde_json::to_value(record(None)).unwrap();
        json.as_object_mut().unwrap().remove("deletedAt");
        let parsed: KeyRecord = serde_json::from_value(json).unwrap();
        assert!(parsed.is_active());
    }
}
