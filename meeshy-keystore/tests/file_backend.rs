//! KeyStore over the file backend, including a restart.

use meeshy_envelope::ServerLayerCipher;
use meeshy_keystore::*;
use std::collections::HashSet;
use std::sync::Arc;

const MASTER_B64: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

fn open(dir: &std::path::Path) -> KeyStore {
    KeyStore::new(
        Arc::new(FileBackend::new(dir).unwrap()),
        Arc::new(MasterKeyProvider::from_base64(MASTER_B64).unwrap()),
        Arc::new(InMemoryAuditSink::new()),
    )
}

#[tokio::test]
async fn keys_survive_restart() {
    let dir = tempfile::tempdir().unwrap();

    let (conv_id, single_id, sealed) = {
        let ks = open(dir.path());
        let (conv_id, conv_key) = ks.get_or_create_key(Some("conv-1")).await.unwrap();
        let (single_id, _) = ks.get_or_create_key(None).await.unwrap();
        let sealed = ServerLayerCipher::new().encrypt("persisted", &conv_key).unwrap();
        (conv_id, single_id, sealed)
    };

    let ks = open(dir.path());
    assert_eq!(ks.cached_key_count().await, 0);

    let (again, _) = ks.get_or_create_key(Some("conv-1")).await.unwrap();
    assert_eq!(again, conv_id);

    let key = ks.get_key_by_id(&conv_id).await.unwrap();
    assert_eq!(ServerLayerCipher::new().decrypt(&sealed, &key).unwrap(), "persisted");
    assert!(ks.get_key_by_id(&single_id).await.is_ok());
}

#[tokio::test]
async fn retired_key_stays_readable_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let old = {
        let ks = open(dir.path());
        let (old, _) = ks.get_or_create_key(Some("conv")).await.unwrap();
        ks.retire_conversation_key("conv").await.unwrap();
        old
    };

    let ks = open(dir.path());
    let (fresh, _) = ks.get_or_create_key(Some("conv")).await.unwrap();
    assert_ne!(fresh, old);
    assert!(ks.get_key_by_id(&old).await.is_ok());
    assert!(ks.record(&old).await.unwrap().deleted_at.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creation_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let ks = Arc::new(open(dir.path()));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let ks = ks.clone();
            tokio::spawn(async move { ks.get_or_create_key(Some("disk-conv")).await })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap().unwrap().0);
    }
    assert_eq!(ids.len(), 1);
}

#[tokio::test]
async fn conversation_ids_need_not_be_file_names() {
    let dir = tempfile::tempdir().unwrap();
    let ks = open(dir.path());
    let (a, _) = ks.get_or_create_key(Some("../../etc/passwd")).await.unwrap();
    let (b, _) = ks.get_or_create_key(Some("../../etc/passwd")).await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn half_finished_retire_does_not_wedge_conversation() {
    let dir = tempfile::tempdir().unwrap();
    let old = {
        let ks = open(dir.path());
        ks.get_or_create_key(Some("conv")).await.unwrap().0
    };

    // Stamp the record as retired but leave its active index behind
    let path = dir.path().join("keys").join(format!("{}.json", old.as_str()));
    let mut record: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    record["deletedAt"] = serde_json::json!(chrono::Utc::now());
    std::fs::write(&path, serde_json::to_string_pretty(&record).unwrap()).unwrap();

    let ks = open(dir.path());
    let (fresh, _) = ks.get_or_create_key(Some("conv")).await.unwrap();
    assert_ne!(fresh, old);
    for _ in 0..3 {
        assert_eq!(ks.get_or_create_key(Some("conv")).await.unwrap().0, fresh);
    }
    assert!(ks.get_key_by_id(&old).await.is_ok());
}
