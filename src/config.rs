//! Environment configuration and wiring.
//!
//! Configuration (environment variables):
//!   MEESHY_MASTER_KEY    - base64 of the 32-byte master key (required)
//!   MEESHY_KEYSTORE_DIR  - directory for file-backed key records and the
//!                          audit log `audit.jsonl` (default: in-memory, audit to tracing)
//!   MEESHY_LOG_FORMAT    - "json" for structured logging, "pretty" for dev
//!   MEESHY_AUDIT_CHAIN   - "false" to disable the audit hash chain (default: enabled)

use std::path::PathBuf;
use std::sync::Arc;

use meeshy_keystore::{
    AuditSink, ConfigurationError, FileAuditSink, FileBackend, InMemoryBackend,
    IntegrityChainSink, KeyStore, MasterKeyProvider, StorageBackend, TracingAuditSink,
    DEFAULT_MASTER_KEY_VAR,
};

use crate::builder::HybridPayloadBuilder;
use crate::error::HybridError;
use crate::telemetry::LogFormat;

pub const KEYSTORE_DIR_VAR: &str = "MEESHY_KEYSTORE_DIR";
pub const LOG_FORMAT_VAR: &str = "MEESHY_LOG_FORMAT";
pub const AUDIT_CHAIN_VAR: &str = "MEESHY_AUDIT_CHAIN";
/// Audit log file name inside the keystore directory.
pub const AUDIT_LOG_FILE: &str = "audit.jsonl";

/// Everything needed to stand up a [`HybridPayloadBuilder`].
#[derive(Debug, Clone)]
pub struct HybridConfig {
    pub master: Arc<MasterKeyProvider>,
    pub keystore_dir: Option<PathBuf>,
    pub log_format: LogFormat,
    pub audit_chain: bool,
}

impl HybridConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its
    /// value. Fails if the master key is missing or malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let encoded = lookup(DEFAULT_MASTER_KEY_VAR)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigurationError::Missing {
                source: DEFAULT_MASTER_KEY_VAR.into(),
            })?;
        let master = Arc::new(MasterKeyProvider::from_base64(&encoded)?);

        let keystore_dir = lookup(KEYSTORE_DIR_VAR)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        let log_format = lookup(LOG_FORMAT_VAR)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();
        let audit_chain = lookup(AUDIT_CHAIN_VAR)
            .map(|v| !matches!(v.trim(), "false" | "0"))
            .unwrap_or(true);

        Ok(Self {
            master,
            keystore_dir,
            log_format,
            audit_chain,
        })
    }

    /// Wire master key, storage, audit and keystore into a builder.
    ///
    /// With a keystore directory, audit events are appended to
    /// `audit.jsonl` beside the keys and a chain resumes from the events
    /// already there. Without one they go to `tracing`.
    pub fn build(&self) -> Result<HybridPayloadBuilder, HybridError> {
        let storage: Arc<dyn StorageBackend> = match &self.keystore_dir {
            Some(dir) => Arc::new(FileBackend::new(dir)?),
            None => Arc::new(InMemoryBackend::new()),
        };
        let audit = self.audit_sink()?;

        tracing::info!(
            keystore_dir = ?self.keystore_dir,
            audit_chain = self.audit_chain,
            "hybrid keystore ready"
        );
        let keystore = KeyStore::new(storage, self.master.clone(), audit);
        Ok(HybridPayloadBuilder::new(Arc::new(keystore)))
    }

    /// Where the audit log lives, if it is persisted.
    pub fn audit_log_path(&self) -> Option<PathBuf> {
        self.keystore_dir.as_ref().map(|dir| dir.join(AUDIT_LOG_FILE))
    }

    fn audit_sink(&self) -> Result<Arc<dyn AuditSink>, HybridError> {
        let Some(path) = self.audit_log_path() else {
            let sink: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
            return Ok(if self.audit_chain {
                Arc::new(IntegrityChainSink::new(sink))
            } else {
                sink
            });
        };

        let file: Arc<dyn AuditSink> = Arc::new(FileAuditSink::new(&path));
        if !self.audit_chain {
            return Ok(file);
        }
        let previous = if path.exists() {
            FileAuditSink::read_events(&path)?
        } else {
            Vec::new()
        };
        if !IntegrityChainSink::verify(&previous) {
            tracing::warn!(path = ?path, "existing audit log does not verify; extending it anyway");
        }
        Ok(Arc::new(IntegrityChainSink::resume(file, &previous)))
    }
}
