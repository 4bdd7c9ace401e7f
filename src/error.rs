//! Error type for payload composition and translation.

use core::fmt;

use meeshy_envelope::{DecryptionError, EncodingError};
use meeshy_keystore::{ConfigurationError, KeystoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HybridError {
    /// Master key missing or malformed. Fatal at startup.
    Configuration(ConfigurationError),
    /// Key lookup, unwrap or persistence failed.
    Keystore(KeystoreError),
    /// Server-layer authentication failed. Deliberately says nothing more.
    DecryptionFailed,
    /// Sealing failed (RNG unavailable).
    Encryption(EncodingError),
    /// Payload is not in hybrid mode or has translation disabled.
    UnsupportedTranslation,
    /// Value could not be parsed as a hybrid payload.
    InvalidPayload(String),
}

impl fmt::Display for HybridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(e) => write!(f, "configuration error: {}", e),
            Self::Keystore(e) => write!(f, "{}", e),
            Self::DecryptionFailed => write!(f, "decryption failed"),
            Self::Encryption(e) => write!(f, "{}", e),
            Self::UnsupportedTranslation => {
                write!(f, "payload does not support server-side translation")
            }
            Self::InvalidPayload(msg) => write!(f, "invalid hybrid payload: {}", msg),
        }
    }
}

impl std::error::Error for HybridError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Configuration(e) => Some(e),
            Self::Keystore(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigurationError> for HybridError {
    fn from(e: ConfigurationError) -> Self {
        Self::Configuration(e)
    }
}

impl From<KeystoreError> for HybridError {
    fn from(e: KeystoreError) -> Self {
        Self::Keystore(e)
    }
}

impl From<DecryptionError> for HybridError {
    fn from(_: DecryptionError) -> Self {
        Self::DecryptionFailed
    }
}

impl From<EncodingError> for HybridError {
    fn from(e: EncodingError) -> Self {
        Self::Encryption(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meeshy_keystore::KeyId;

    #[test]
    fn messages_are_caller_facing() {
        assert_eq!(
            HybridError::UnsupportedTranslation.to_string(),
            "payload does not support server-side translation"
        );
        assert_eq!(HybridError::from(DecryptionError).to_string(), "decryption failed");

        let missing = HybridError::from(KeystoreError::KeyNotFound(KeyId::new("k-9")));
        assert!(missing.to_string().contains("decryption key not found"));
        assert!(missing.to_string().contains("k-9"));
    }
}
