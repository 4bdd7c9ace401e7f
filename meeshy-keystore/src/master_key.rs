//! MasterKeyProvider: loads and holds the key-encryption key (KEK).

use std::fmt;
use std::sync::OnceLock;

use meeshy_envelope::{encoding, SymmetricKey, KEY_BYTES};
use zeroize::Zeroizing;

use crate::error::{ConfigurationError, KeystoreError};

/// Environment variable read by [`MasterKeyProvider::from_env`] callers by default.
pub const DEFAULT_MASTER_KEY_VAR: &str = "MEESHY_MASTER_KEY";

/// The root key that wraps every DEK.
///
/// Not serializable; `Debug` is redacted.
pub struct MasterKey(SymmetricKey);

impl MasterKey {
    /// Decode a base64 secret that must be exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, ConfigurationError> {
        let raw = Zeroizing::new(
            encoding::decode(encoded.trim()).map_err(|_| ConfigurationError::InvalidBase64)?,
        );
        if raw.len() != KEY_BYTES {
            return Err(ConfigurationError::InvalidLength { got: raw.len() });
        }
        let key = SymmetricKey::from_slice(&raw)
            .map_err(|e| ConfigurationError::InvalidLength { got: e.got })?;
        Ok(Self(key))
    }

    pub(crate) fn key(&self) -> &SymmetricKey {
        &self.0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

/// Process-scoped holder of the master key.
///
/// Loaded once at startup, read-only afterwards. Passed to the
/// [`KeyStore`](crate::KeyStore) explicitly rather than living in a global.
#[derive(Default)]
pub struct MasterKeyProvider {
    key: OnceLock<MasterKey>,
}

impl MasterKeyProvider {
    /// An empty provider. Every key operation fails with
    /// [`KeystoreError::MasterKeyUnavailable`] until [`load`](Self::load) succeeds.
    pub fn new() -> Self {
        Self {
            key: OnceLock::new(),
        }
    }

    /// Provider loaded from a base64 secret.
    pub fn from_base64(encoded: &str) -> Result<Self, ConfigurationError> {
        let provider = Self::new();
        provider.load(encoded)?;
        Ok(provider)
    }

    /// Provider loaded from an environment variable.
    pub fn from_env(var: &str) -> Result<Self, ConfigurationError> {
        let provider = Self::new();
        provider.load_from_env(var)?;
        Ok(provider)
    }

    pub fn load(&self, encoded: &str) -> Result<(), ConfigurationError> {
        if self.key.get().is_some() {
            return Err(ConfigurationError::AlreadyLoaded);
        }
        let key = MasterKey::from_base64(encoded)?;
        self.key
            .set(key)
            .map_err(|_| ConfigurationError::AlreadyLoaded)?;
        tracing::info!("master key loaded");
        Ok(())
    }

    pub fn load_from_env(&self, var: &str) -> Result<(), ConfigurationError> {
        let encoded = std::env::var(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigurationError::Missing { source: var.to_string() })?;
        self.load(&encoded)
    }

    pub fn is_loaded(&self) -> bool {
        self.key.get().is_some()
    }

    pub fn master_key(&self) -> Result<&MasterKey, KeystoreError> {
        self.key.get().ok_or(KeystoreError::MasterKeyUnavailable)
    }
}

impl fmt::Debug for MasterKeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKeyProvider")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(len: usize) -> String {
        encoding::encode(&vec![0x11u8; len])
    }

    #[test]
    fn loads_valid_key() {
        let provider = MasterKeyProvider::from_base64(&encoded(32)).unwrap();
        assert!(provider.is_loaded());
        assert!(provider.master_key().is_ok());
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        let secret = format!("  {}\n", encoded(32));
        assert!(MasterKeyProvider::from_base64(&secret).is_ok());
    }

    #[test]
    fn rejects_bad_base64() {
        let err = MasterKeyProvider::from_base64("***not-base64***").unwrap_err();
        assert_eq!(err, ConfigurationError::InvalidBase64);
    }

    #[test]
    fn rejects_wrong_length() {
        for len in [0, 16, 31, 33, 64] {
            let err = MasterKeyProvider::from_base64(&encoded(len)).unwrap_err();
            assert_eq!(err, ConfigurationError::InvalidLength { got: len });
        }
    }

    #[test]
    fn missing_env_var() {
        let err = MasterKeyProvider::from_env("MEESHY_TEST_MASTER_KEY_NEVER_SET").unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::Missing { source: "MEESHY_TEST_MASTER_KEY_NEVER_SET".into() }
        );
    }

    #[test]
    fn unloaded_provider_is_unavailable() {
        let provider = MasterKeyProvider::new();
        assert!(!provider.is_loaded());
        assert_eq!(provider.master_key().unwrap_err(), KeystoreError::MasterKeyUnavailable);
    }

    #[test]
    fn second_load_is_rejected() {
        let provider = MasterKeyProvider::from_base64(&encoded(32)).unwrap();
        assert_eq!(provider.load(&encoded(32)), Err(ConfigurationError::AlreadyLoaded));
    }

    #[test]
    fn debug_never_prints_key() {
        let provider = MasterKeyProvider::from_base64(&encoded(32)).unwrap();
        let shown = format!("{:?} {:?}", provider, provider.master_key().unwrap());
        assert!(!shown.contains(&encoded(32)));
        assert!(shown.contains("redacted"));
    }
}
