//! Concurrent get-or-create must converge on a single key per conversation.

use chrono::{DateTime, Utc};
use meeshy_keystore::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const MASTER_B64: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

fn keystore(storage: Arc<dyn StorageBackend>) -> (Arc<KeyStore>, Arc<InMemoryAuditSink>) {
    let master = Arc::new(MasterKeyProvider::from_base64(MASTER_B64).unwrap());
    let audit = Arc::new(InMemoryAuditSink::new());
    (Arc::new(KeyStore::new(storage, master, audit.clone())), audit)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_callers_share_one_key() {
    let storage = Arc::new(InMemoryBackend::new());
    let (ks, _) = keystore(storage.clone());

    let mut handles = Vec::new();
    for _ in 0..64 {
        let ks = ks.clone();
        handles.push(tokio::spawn(async move {
            ks.get_or_create_key(Some("busy-conversation")).await
        }));
    }

    let mut ids = HashSet::new();
    let mut keys = Vec::new();
    for handle in handles {
        let (id, key) = handle.await.unwrap().unwrap();
        ids.insert(id);
        keys.push(key);
    }
    assert_eq!(ids.len(), 1);
    assert!(keys.windows(2).all(|w| w[0] == w[1]));

    let active: Vec<_> = storage
        .list()
        .unwrap()
        .into_iter()
        .filter(|r| r.is_active() && r.conversation_id.is_some())
        .collect();
    assert_eq!(active.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_stores_share_storage() {
    // Two processes pointing at the same database
    let storage: Arc<dyn StorageBackend> = Arc::new(InMemoryBackend::new());
    let (a, _) = keystore(storage.clone());
    let (b, _) = keystore(storage);

    let (ra, rb) = tokio::join!(
        tokio::spawn({
            let a = a.clone();
            async move { a.get_or_create_key(Some("shared")).await }
        }),
        tokio::spawn({
            let b = b.clone();
            async move { b.get_or_create_key(Some("shared")).await }
        }),
    );
    let (id_a, key_a) = ra.unwrap().unwrap();
    let (id_b, key_b) = rb.unwrap().unwrap();
    assert_eq!(id_a, id_b);
    assert_eq!(key_a, key_b);
}

/// Reports "no active key" on the first lookup even when one exists, the way
/// a lagging read replica would, forcing the insert to hit the constraint.
struct StaleFirstRead {
    inner: InMemoryBackend,
    stale: AtomicBool,
}

impl StorageBackend for StaleFirstRead {
    fn get(&self, id: &KeyId) -> Result<Option<KeyRecord>, KeystoreError> {
        self.inner.get(id)
    }

    fn find_active(
        &self,
        purpose: &KeyPurpose,
        conversation_id: &str,
    ) -> Result<Option<KeyRecord>, KeystoreError> {
        if self.stale.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.find_active(purpose, conversation_id)
    }

    fn insert(&self, record: &KeyRecord) -> Result<(), KeystoreError> {
        self.inner.insert(record)
    }

    fn touch(&self, id: &KeyId, at: DateTime<Utc>) -> Result<(), KeystoreError> {
        self.inner.touch(id, at)
    }

    fn mark_deleted(&self, id: &KeyId, at: DateTime<Utc>) -> Result<(), KeystoreError> {
        self.inner.mark_deleted(id, at)
    }

    fn list(&self) -> Result<Vec<KeyRecord>, KeystoreError> {
        self.inner.list()
    }
}

#[tokio::test]
async fn losing_writer_adopts_the_winner() {
    let backend = Arc::new(StaleFirstRead {
        inner: InMemoryBackend::new(),
        stale: AtomicBool::new(false),
    });
    let (ks, audit) = keystore(backend.clone());

    let (winner, winner_key) = ks.get_or_create_key(Some("conv")).await.unwrap();
    ks.clear_cache().await;

    backend.stale.store(true, Ordering::SeqCst);
    let (id, key) = ks.get_or_create_key(Some("conv")).await.unwrap();
    assert_eq!(id, winner);
    assert_eq!(key, winner_key);

    let lost: Vec<_> = audit
        .events()
        .into_iter()
        .filter(|e| matches!(e.action, AuditAction::CreationRaceLost { .. }))
        .collect();
    assert_eq!(lost.len(), 1);
    assert_eq!(lost[0].action, AuditAction::CreationRaceLost { winner: winner.clone() });
    assert_ne!(lost[0].key_id.as_ref(), Some(&winner));
    assert!(lost[0].detail.is_some());

    // The discarded key was never persisted
    assert_eq!(backend.list().unwrap().len(), 1);
}
