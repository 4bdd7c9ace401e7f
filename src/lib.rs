//! # Meeshy Hybrid
//!
//! Double encryption for chat messages that still need server-side
//! translation.
//!
//! Every message carries two layers: the end-to-end ciphertext (opaque here,
//! passed through byte for byte) and a server layer sealed with AES-256-GCM
//! under a per-conversation key the platform can unwrap. Translation replaces
//! only the server layer.
//!
//! ## Quick Start
//!
//! ```ignore
//! use meeshy_hybrid::{E2eeBlob, HybridConfig, is_valid_hybrid_payload};
//!
//! # async fn demo() -> Result<(), meeshy_hybrid::HybridError> {
//! let builder = HybridConfig::from_env()?.build()?;
//!
//! let e2ee = E2eeBlob::new(serde_json::json!({ "ciphertext": "...", "type": 3 }));
//! let payload = builder.create_hybrid_payload(e2ee, "Hello", Some("conv-1")).await?;
//! assert!(is_valid_hybrid_payload(&payload.to_json()?));
//!
//! // Server side: decrypt, translate, re-seal under the same key
//! let text = builder.decrypt_server_layer(&payload.server).await?;
//! let translated = builder.translate_hybrid_message(&payload, "Bonjour").await?;
//! assert_eq!(translated.e2ee, payload.e2ee);
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Properties
//!
//! - **Envelope keys**: DEKs are stored only wrapped under the master key
//! - **Uniform errors**: every server-layer failure is the same `DecryptionFailed`
//! - **Fresh IVs**: each seal draws a new 96-bit IV, so conversation keys are reused safely
//! - **One key per conversation**: concurrent first messages converge on one key
//!
//! ## What's NOT Provided
//!
//! - The end-to-end protocol
//! - Translation itself
//! - Key-cache eviction policy

#![deny(unsafe_code)]

mod builder;
pub mod config;
mod error;
mod payload;
pub mod telemetry;
mod validate;

pub use builder::HybridPayloadBuilder;
pub use config::HybridConfig;
pub use error::HybridError;
pub use payload::{E2eeBlob, HybridPayload, PayloadMode, ServerLayer};
pub use telemetry::{init_tracing, LogFormat};
pub use validate::is_valid_hybrid_payload;

// Collaborating crates, re-exported so callers need a single dependency
pub use meeshy_envelope::{DecryptionError, SealedText, ServerLayerCipher, SymmetricKey};
pub use meeshy_keystore::{
    AuditEvent, ConfigurationError, FileAuditSink, InMemoryAuditSink, InMemoryBackend,
    IntegrityChainSink, KeyId, KeyStore, KeystoreError, MasterKeyProvider,
};
