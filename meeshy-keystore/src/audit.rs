//! Audit logging: every key operation emits a structured event.

use crate::error::KeystoreError;
use crate::types::{KeyId, KeyPurpose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Audit events
// ---------------------------------------------------------------------------

/// What happened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    KeyCreated { single_use: bool },
    KeyUnwrapped,
    CreationRaceLost { winner: KeyId },
    UnwrapFailed,
    KeyNotFound,
    KeyRetired,
}

/// A structured audit event. Never carries key material.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// Which key was involved.
    pub key_id: Option<KeyId>,
    pub purpose: Option<KeyPurpose>,
    pub conversation_id: Option<String>,
    /// What happened.
    pub action: AuditAction,
    /// Who or what triggered this.
    pub actor: String,
    /// Success or failure.
    pub success: bool,
    /// Additional context.
    pub detail: Option<String>,
    /// Monotonic sequence number (populated by integrity chain sink).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// SHA-256 hash of the previous event's JSON (populated by integrity chain sink).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
}

impl AuditEvent {
    /// Create a new audit event for a key operation.
    pub fn key_event(key_id: &KeyId, purpose: &KeyPurpose, action: AuditAction) -> Self {
        Self {
            timestamp: Utc::now(),
            key_id: Some(key_id.clone()),
            purpose: Some(purpose.clone()),
            conversation_id: None,
            action,
            actor: "keystore".into(),
            success: true,
            detail: None,
            sequence: None,
            prev_hash: None,
        }
    }

    pub fn with_conversation(mut self, conversation_id: Option<&str>) -> Self {
        self.conversation_id = conversation_id.map(str::to_owned);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.success = false;
        self
    }
}

// ---------------------------------------------------------------------------
// Audit sink trait
// ---------------------------------------------------------------------------

/// Where audit events go. Implement this for your SIEM/log system.
///
/// Synchronous so it can be called from any context; async sinks should
/// hand events to a channel.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

// ---------------------------------------------------------------------------
// Built-in sinks
// ---------------------------------------------------------------------------

/// Logs events via the `tracing` crate.
///
/// The whole event goes out as JSON in the `event` field, so a log captured
/// from a chained sink can be fed back to [`IntegrityChainSink::verify`].
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(target: "meeshy_keystore::audit", error = %e, "audit serialize failed");
                return;
            }
        };
        if event.success {
            tracing::info!(
                target: "meeshy_keystore::audit",
                key_id = ?event.key_id,
                action = ?event.action,
                event = %json,
                "audit"
            );
        } else {
            tracing::warn!(
                target: "meeshy_keystore::audit",
                key_id = ?event.key_id,
                action = ?event.action,
                detail = ?event.detail,
                event = %json,
                "audit failure"
            );
        }
    }
}

/// Appends events as JSON lines to a file.
pub struct FileAuditSink {
    path: PathBuf,
}

impl FileAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every event from a log written by this sink.
    pub fn read_events(path: impl AsRef<Path>) -> Result<Vec<AuditEvent>, KeystoreError> {
        let data = std::fs::read_to_string(path.as_ref())
            .map_err(|e| KeystoreError::StorageError(format!("read audit log: {}", e)))?;
        data.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|e| KeystoreError::StorageError(format!("parse audit log: {}", e)))
            })
            .collect()
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: AuditEvent) {
        let mut line = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(target: "meeshy_keystore::audit", error = %e, "audit serialize failed");
                return;
            }
        };
        line.push('\n');
        let written = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(e) = written {
            tracing::error!(target: "meeshy_keystore::audit", path = ?self.path, error = %e, "audit write failed");
        }
    }
}

/// Collects events in memory (for tests).
#[derive(Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn events_for_key(&self, key_id: &KeyId) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.key_id.as_ref() == Some(key_id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

// ---------------------------------------------------------------------------
// Integrity chain sink (tamper-evident audit log)
// ---------------------------------------------------------------------------

const GENESIS: &[u8] = b"meeshy-keystore-audit-genesis";

/// Wraps any `AuditSink` and adds a SHA-256 hash chain.
///
/// Each event gets a monotonic `sequence` number and a `prev_hash`
/// containing the SHA-256 hex digest of the previous event's JSON.
/// [`IntegrityChainSink::verify`] replays a captured log and detects any
/// insertion, deletion, or modification.
pub struct IntegrityChainSink {
    inner: Arc<dyn AuditSink>,
    state: Mutex<ChainState>,
}

struct ChainState {
    sequence: u64,
    prev_hash: String,
}

impl IntegrityChainSink {
    pub fn new(inner: Arc<dyn AuditSink>) -> Self {
        Self {
            inner,
            state: Mutex::new(ChainState {
                sequence: 0,
                prev_hash: genesis_hash(),
            }),
        }
    }

    /// Continue a chain whose earlier events are `previous`, as read back
    /// from a persistent log. An empty slice starts from genesis.
    pub fn resume(inner: Arc<dyn AuditSink>, previous: &[AuditEvent]) -> Self {
        let (sequence, prev_hash) = match previous.last() {
            Some(last) => {
                let next = last.sequence.map_or(previous.len() as u64, |n| n + 1);
                let hash = serde_json::to_string(last)
                    .map(|json| format!("{:x}", Sha256::digest(json.as_bytes())))
                    .unwrap_or_else(|_| genesis_hash());
                (next, hash)
            }
            None => (0, genesis_hash()),
        };
        Self {
            inner,
            state: Mutex::new(ChainState { sequence, prev_hash }),
        }
    }

    /// Check that `events` form an unbroken chain from genesis.
    pub fn verify(events: &[AuditEvent]) -> bool {
        let mut expected = genesis_hash();
        for (i, event) in events.iter().enumerate() {
            if event.sequence != Some(i as u64) || event.prev_hash.as_deref() != Some(expected.as_str()) {
                return false;
            }
            match serde_json::to_string(event) {
                Ok(json) => expected = format!("{:x}", Sha256::digest(json.as_bytes())),
                Err(_) => return false,
            }
        }
        true
    }
}

fn genesis_hash() -> String {
    format!("{:x}", Sha256::digest(GENESIS))
}

impl AuditSink for IntegrityChainSink {
    fn record(&self, mut event: AuditEvent) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };

        event.sequence = Some(state.sequence);
        event.prev_hash = Some(state.prev_hash.clone());

        // Hash covers the complete event JSON, including sequence + prev_hash
        if let Ok(json) = serde_json::to_string(&event) {
            state.prev_hash = format!("{:x}", Sha256::digest(json.as_bytes()));
        }
        state.sequence += 1;

        // Forward while still holding the lock so the inner sink sees chain order
        self.inner.record(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(n: u8) -> AuditEvent {
        AuditEvent::key_event(
            &KeyId::new(format!("key-{}", n)),
            &KeyPurpose::server_layer_translation(),
            AuditAction::KeyUnwrapped,
        )
    }

    #[test]
    fn in_memory_sink_collects() {
        let sink = InMemoryAuditSink::new();
        assert!(sink.is_empty());
        sink.record(event(1));
        sink.record(event(2).with_failure().with_detail("boom"));
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.events_for_key(&KeyId::new("key-2")).len(), 1);
        assert!(!sink.events()[1].success);
    }

    #[test]
    fn chain_is_verifiable() {
        let inner = Arc::new(InMemoryAuditSink::new());
        let chain = IntegrityChainSink::new(inner.clone());
        for n in 0..5 {
            chain.record(event(n));
        }
        let events = inner.events();
        assert_eq!(events.len(), 5);
        assert_eq!(events[4].sequence, Some(4));
        assert!(IntegrityChainSink::verify(&events));
    }

    #[test]
    fn chain_detects_tampering() {
        let inner = Arc::new(InMemoryAuditSink::new());
        let chain = IntegrityChainSink::new(inner.clone());
        for n in 0..4 {
            chain.record(event(n));
        }

        let mut modified = inner.events();
        modified[1].actor = "intruder".into();
        assert!(!IntegrityChainSink::verify(&modified));

        let mut dropped = inner.events();
        dropped.remove(2);
        assert!(!IntegrityChainSink::verify(&dropped));
    }

    #[test]
    fn event_builders() {
        let e = event(1).with_conversation(Some("c1"));
        assert_eq!(e.conversation_id.as_deref(), Some("c1"));
        assert_eq!(e.actor, "keystore");
        assert!(e.success);

        let failed = event(2).with_failure().with_detail("bad tag");
        assert!(!failed.success);
        assert_eq!(failed.detail.as_deref(), Some("bad tag"));
    }

    #[test]
    fn file_sink_chain_verifies_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let chain = IntegrityChainSink::new(Arc::new(FileAuditSink::new(&path)));
        for n in 0..4 {
            chain.record(event(n));
        }
        chain.record(event(9).with_failure().with_detail("wrapped key failed integrity check"));

        let events = FileAuditSink::read_events(&path).unwrap();
        assert_eq!(events.len(), 5);
        assert_eq!(events[4].detail.as_deref(), Some("wrapped key failed integrity check"));
        assert!(IntegrityChainSink::verify(&events));

        // Edit one line on disk
        let log = std::fs::read_to_string(&path).unwrap();
        let tampered = log.replacen("key-1", "key-7", 1);
        std::fs::write(&path, tampered).unwrap();
        assert!(!IntegrityChainSink::verify(&FileAuditSink::read_events(&path).unwrap()));
    }

    #[test]
    fn resumed_chain_extends_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let chain = IntegrityChainSink::new(Arc::new(FileAuditSink::new(&path)));
            chain.record(event(1));
            chain.record(event(2));
        }
        let earlier = FileAuditSink::read_events(&path).unwrap();
        let chain = IntegrityChainSink::resume(Arc::new(FileAuditSink::new(&path)), &earlier);
        chain.record(event(3));

        let events = FileAuditSink::read_events(&path).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].sequence, Some(2));
        assert!(IntegrityChainSink::verify(&events));
    }

    #[test]
    fn file_sink_missing_log_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            FileAuditSink::read_events(dir.path().join("absent.jsonl")),
            Err(KeystoreError::StorageError(_))
        ));
    }
}
