//! # Meeshy Envelope
//!
//! The symmetric half of Meeshy's hybrid messages: the server layer.
//!
//! ## Quick Start
//!
//! ```rust
//! use meeshy_envelope::{ServerLayerCipher, SymmetricKey};
//!
//! let cipher = ServerLayerCipher::new();
//! let key = SymmetricKey::generate().unwrap();
//!
//! let sealed = cipher.encrypt("Bonjour", &key).unwrap();
//! let text = cipher.decrypt(&sealed, &key).unwrap();
//!
//! assert_eq!(text, "Bonjour");
//! ```
//!
//! ## Security Properties
//!
//! - **AES-256-GCM**: 96-bit random IV per call, 128-bit tag
//! - **Uniform errors**: All open failures produce identical error type
//! - **AAD binding**: Wrapped keys are bound to their record
//!
//! ## What's NOT Provided
//!
//! - Key storage (see `meeshy-keystore`)
//! - The end-to-end layer
//! - Streaming encryption

#![deny(unsafe_code)]

// Exposed for known-answer tests; not a stable API.
#[doc(hidden)]
pub mod aead;

mod aad;
mod cipher;
pub mod encoding;
mod error;
mod key;

pub use aad::Aad;
pub use cipher::{SealedText, ServerLayerCipher};
pub use error::{DecryptionError, EncodingError, KeyLengthError};
pub use key::SymmetricKey;

pub use aead::{IV_BYTES, KEY_BYTES, TAG_BYTES};
