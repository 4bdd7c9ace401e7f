//! Hybrid payload types as they travel between client and server.

use meeshy_envelope::SealedText;
use meeshy_keystore::KeyId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HybridError;

/// The end-to-end layer: whatever structure the E2EE protocol produced.
///
/// Carried through untouched. Equality is structural, which is all this
/// crate ever does with it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct E2eeBlob(Value);

impl E2eeBlob {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for E2eeBlob {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// The server-decryptable layer: one AEAD output plus the id of its DEK.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerLayer {
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
    pub key_id: KeyId,
}

impl ServerLayer {
    pub fn new(sealed: SealedText, key_id: KeyId) -> Self {
        Self {
            ciphertext: sealed.ciphertext,
            iv: sealed.iv,
            auth_tag: sealed.auth_tag,
            key_id,
        }
    }

    /// The AEAD fields without the key id.
    pub fn sealed(&self) -> SealedText {
        SealedText {
            ciphertext: self.ciphertext.clone(),
            iv: self.iv.clone(),
            auth_tag: self.auth_tag.clone(),
        }
    }
}

/// Encryption mode of a message. Only `Hybrid` carries a server layer that
/// may be re-encrypted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadMode {
    Hybrid,
    E2ee,
    Server,
}

/// Both layers of one message plus translation eligibility.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridPayload {
    pub e2ee: E2eeBlob,
    pub server: ServerLayer,
    pub mode: PayloadMode,
    pub can_translate: bool,
    /// Creation time, milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl HybridPayload {
    /// Strict parse of an untrusted JSON value.
    pub fn from_json(value: Value) -> Result<Self, HybridError> {
        if !value.is_object() {
            return Err(HybridError::InvalidPayload("expected a JSON object".into()));
        }
        serde_json::from_value(value).map_err(|e| HybridError::InvalidPayload(e.to_string()))
    }

    pub fn to_json(&self) -> Result<Value, HybridError> {
        serde_json::to_value(self).map_err(|e| HybridError::InvalidPayload(e.to_string()))
    }

    /// Whether the server layer may be replaced by a translation.
    pub fn is_translatable(&self) -> bool {
        self.mode == PayloadMode::Hybrid && self.can_translate
    }
}
