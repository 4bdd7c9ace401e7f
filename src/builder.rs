//! HybridPayloadBuilder: composes and re-encrypts hybrid payloads.

use std::sync::Arc;

use chrono::Utc;
use meeshy_envelope::ServerLayerCipher;
use meeshy_keystore::KeyStore;

use crate::error::HybridError;
use crate::payload::{E2eeBlob, HybridPayload, PayloadMode, ServerLayer};

/// Builds hybrid payloads on top of a [`KeyStore`].
///
/// Cheap to clone; clones share the keystore and its key cache.
#[derive(Clone)]
pub struct HybridPayloadBuilder {
    keystore: Arc<KeyStore>,
    cipher: ServerLayerCipher,
}

impl HybridPayloadBuilder {
    pub fn new(keystore: Arc<KeyStore>) -> Self {
        Self {
            keystore,
            cipher: ServerLayerCipher::new(),
        }
    }

    pub fn keystore(&self) -> &Arc<KeyStore> {
        &self.keystore
    }

    /// Wrap a message in both layers.
    ///
    /// The server layer is sealed under the conversation's key, or under a
    /// fresh single-use key when `conversation_id` is `None`. `e2ee` is moved
    /// into the payload as is.
    pub async fn create_hybrid_payload(
        &self,
        e2ee: E2eeBlob,
        plaintext: &str,
        conversation_id: Option<&str>,
    ) -> Result<HybridPayload, HybridError> {
        let (key_id, key) = self.keystore.get_or_create_key(conversation_id).await?;
        let sealed = self.cipher.encrypt(plaintext, &key)?;
        tracing::debug!(%key_id, conversation = conversation_id.is_some(), "hybrid payload created");

        Ok(HybridPayload {
            e2ee,
            server: ServerLayer::new(sealed, key_id),
            mode: PayloadMode::Hybrid,
            can_translate: true,
            timestamp: Utc::now().timestamp_millis(),
        })
    }

    /// Replace the server layer with `translated_text`, sealed under the same
    /// key-id with a fresh IV.
    ///
    /// Returns a new payload; everything except the server layer's
    /// ciphertext, IV and tag is carried over unchanged, `timestamp`
    /// included.
    pub async fn translate_hybrid_message(
        &self,
        payload: &HybridPayload,
        translated_text: &str,
    ) -> Result<HybridPayload, HybridError> {
        if !payload.is_translatable() {
            tracing::debug!(mode = ?payload.mode, can_translate = payload.can_translate, "translation refused");
            return Err(HybridError::UnsupportedTranslation);
        }

        let key_id = &payload.server.key_id;
        let key = self.keystore.get_key_by_id(key_id).await?;
        let sealed = self.cipher.encrypt(translated_text, &key)?;
        tracing::debug!(%key_id, "server layer re-encrypted");

        Ok(HybridPayload {
            server: ServerLayer::new(sealed, key_id.clone()),
            ..payload.clone()
        })
    }

    /// Decrypt a server layer, resolving its key by id.
    ///
    /// An unknown key-id is reported as such; every other failure is
    /// [`HybridError::DecryptionFailed`].
    pub async fn decrypt_server_layer(&self, server: &ServerLayer) -> Result<String, HybridError> {
        let key = self.keystore.get_key_by_id(&server.key_id).await?;
        Ok(self.cipher.decrypt(&server.sealed(), &key)?)
    }
}
