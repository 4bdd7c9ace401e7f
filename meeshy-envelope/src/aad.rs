//! Typed associated data.

/// Additional Authenticated Data: bound to the ciphertext but not encrypted.
///
/// Server-layer message text is sealed with [`Aad::empty`]. Wrapped data keys
/// are sealed with [`Aad::for_key_wrap`] so a stored row cannot be replayed
/// under a different key-id or purpose.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Aad {
    inner: Vec<u8>,
}

impl Aad {
    /// Raw AAD from arbitrary bytes.
    pub fn raw(bytes: &[u8]) -> Self {
        Self {
            inner: bytes.to_vec(),
        }
    }

    /// Empty AAD (still authenticated, just zero-length).
    pub fn empty() -> Self {
        Self { inner: Vec::new() }
    }

    /// AAD for a data key wrapped under the master key.
    ///
    /// Format: `keywrap|{purpose}|{key_id}`
    pub fn for_key_wrap(purpose: &str, key_id: &str) -> Self {
        Self {
            inner: format!("keywrap|{}|{}", purpose, key_id).into_bytes(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.inner
    }
}

impl Default for Aad {
    fn default() -> Self {
        Self::empty()
    }
}
