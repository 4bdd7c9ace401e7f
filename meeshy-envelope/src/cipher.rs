//! ServerLayerCipher: the stateless seal/open primitive behind the server layer.

use serde::{Deserialize, Serialize};

use crate::aad::Aad;
use crate::aead::{self, IV_BYTES, TAG_BYTES};
use crate::encoding;
use crate::error::{DecryptionError, EncodingError};
use crate::key::SymmetricKey;

/// One AEAD output in transport form (base64 strings).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedText {
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
}

/// AES-256-GCM, 96-bit IV drawn fresh on every seal, 128-bit tag.
///
/// Holds no state, so one value can be shared freely across tasks.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerLayerCipher;

impl ServerLayerCipher {
    pub const fn new() -> Self {
        Self
    }

    /// Seal raw bytes under `key`, binding `aad`.
    pub fn seal(
        &self,
        plaintext: &[u8],
        key: &SymmetricKey,
        aad: &Aad,
    ) -> Result<SealedText, EncodingError> {
        let iv = aead::iv()?;
        let (ciphertext, tag) = aead::aead_seal(key.as_bytes(), &iv, plaintext, aad.as_bytes())?;
        Ok(SealedText {
            ciphertext: encoding::encode(&ciphertext),
            iv: encoding::encode(&iv),
            auth_tag: encoding::encode(&tag),
        })
    }

    /// Open a sealed value. Every failure is the same [`DecryptionError`].
    pub fn open(
        &self,
        sealed: &SealedText,
        key: &SymmetricKey,
        aad: &Aad,
    ) -> Result<Vec<u8>, DecryptionError> {
        let ciphertext = encoding::decode(&sealed.ciphertext)?;
        let iv: [u8; IV_BYTES] = encoding::decode_array(&sealed.iv)?;
        let tag: [u8; TAG_BYTES] = encoding::decode_array(&sealed.auth_tag)?;
        aead::aead_open(key.as_bytes(), &iv, &ciphertext, &tag, aad.as_bytes())
    }

    /// Encrypt UTF-8 text for the server layer.
    pub fn encrypt(&self, plaintext: &str, key: &SymmetricKey) -> Result<SealedText, EncodingError> {
        self.seal(plaintext.as_bytes(), key, &Aad::empty())
    }

    /// Decrypt a server layer back to text. Authentic bytes that are not
    /// UTF-8 are reported as a decryption failure too.
    pub fn decrypt(&self, sealed: &SealedText, key: &SymmetricKey) -> Result<String, DecryptionError> {
        let bytes = self.open(sealed, key, &Aad::empty())?;
        String::from_utf8(bytes).map_err(|_| DecryptionError)
    }
}
