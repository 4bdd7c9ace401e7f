//! Base64 (standard alphabet, padded) transport encoding.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::DecryptionError;

pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode(text: &str) -> Result<Vec<u8>, DecryptionError> {
    STANDARD.decode(text).map_err(|_| DecryptionError)
}

/// Decode into a fixed-size array; any length mismatch is a decryption failure.
pub fn decode_array<const N: usize>(text: &str) -> Result<[u8; N], DecryptionError> {
    decode(text)?.try_into().map_err(|_| DecryptionError)
}
