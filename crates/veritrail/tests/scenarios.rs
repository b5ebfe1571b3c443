//! End-to-end scenarios through the Engine.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use veritrail::core::{hash_bytes, EntityType, EventType, Metadata, VerificationStatus, Verdict};
use veritrail::ledger::{LedgerConfig, LocalLedger};
use veritrail::store::{MemoryStore, SqliteStore};
use veritrail::{Engine, EngineConfig, EngineError};
use veritrail_testkit::{init_tracing, TestFixture};

#[tokio::test]
async fn test_ingest_seal_verify_link() {
    let fixture = TestFixture::new();
    let engine = &fixture.engine;

    let original = engine
        .ingest_under(
            "parcel-118",
            EntityType(1),
            b"original survey",
            Some("file:///survey.pdf"),
            Metadata::new(),
        )
        .await
        .unwrap();
    let sealed = engine.seal_artifact(&original).await.unwrap();
    assert!(sealed.proof_bundle.as_ref().unwrap().verify());

    let ok = engine.verify_bytes("parcel-118", b"original survey").await.unwrap();
    assert_eq!(
        ok.verdict,
        Verdict::Authentic {
            hash: hash_bytes(b"original survey")
        }
    );

    let bad = engine.verify_bytes("parcel-118", b"original survey!").await.unwrap();
    assert_eq!(bad.status(), VerificationStatus::Tampered);
    assert_ne!(Some(bad.current_hash()), bad.stored_hash());

    let redacted = fixture.ingest(b"redacted survey").await;
    engine
        .create_link(&original, &redacted, "redacted_copy")
        .await
        .unwrap();
    let ancestors = engine.ancestors(&redacted, 5).await.unwrap();
    assert_eq!(ancestors.len(), 1);
    assert_eq!(ancestors[0].artifact_id, original);

    let kinds: Vec<EventType> = engine
        .events(&original)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        kinds,
        vec![
            EventType::Ingested,
            EventType::Sealed,
            EventType::Verified,
            EventType::Verified,
        ]
    );
}

#[tokio::test]
async fn test_sealed_chain_links_and_meets_difficulty() {
    init_tracing();
    let ledger = Arc::new(LocalLedger::new(LedgerConfig::default().with_difficulty(2)).unwrap());
    let engine = Engine::new(
        MemoryStore::new(),
        ledger.clone(),
        EngineConfig::default().with_difficulty(2),
    );

    for i in 0..5u8 {
        let hash = hash_bytes(&[i]).to_hex();
        engine
            .seal(EntityType(1), &hash, Metadata::new())
            .await
            .unwrap();
    }

    let blocks = ledger.blocks().unwrap();
    assert_eq!(blocks.len(), 6);
    for pair in blocks.windows(2) {
        assert_eq!(pair[1].previous_hash, pair[0].hash);
    }
    for block in &blocks {
        assert!(block.hash.to_hex().starts_with("00"));
    }
    assert!(engine.validate_ledger().await.unwrap());
}

#[tokio::test]
async fn test_reseal_creates_new_transaction() {
    let fixture = TestFixture::new();
    let id = fixture.ingest(b"permit").await;

    let first = fixture.engine.seal_artifact(&id).await.unwrap();
    let second = fixture.engine.seal_artifact(&id).await.unwrap();
    assert_ne!(first.ledger_tx_id, second.ledger_tx_id);

    let artifact = fixture.engine.artifact(&id).await.unwrap();
    assert_eq!(
        artifact.ledger_tx_ref.as_deref(),
        Some(second.ledger_tx_id.as_str())
    );
}

#[tokio::test]
async fn test_sqlite_state_survives_reopen() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("veritrail.db");
    let config = EngineConfig::default().with_difficulty(1);

    let (id, child) = {
        let engine =
            Engine::with_local_ledger(SqliteStore::open(&path).unwrap(), config.clone()).unwrap();
        let id = engine
            .ingest_under(
                "deed-9",
                EntityType(4),
                b"deed",
                None,
                [("county".to_string(), json!("Kern"))].into_iter().collect(),
            )
            .await
            .unwrap();
        let child = engine
            .ingest_bytes(EntityType(4), b"deed copy", None, Metadata::new())
            .await
            .unwrap();
        engine.create_link(&id, &child, "derived_from").await.unwrap();
        (id, child)
    };

    let engine = Engine::with_local_ledger(SqliteStore::open(&path).unwrap(), config).unwrap();
    let result = engine.verify_bytes("deed-9", b"deed").await.unwrap();
    assert!(result.verdict.is_authentic());
    assert_eq!(result.artifact_id, Some(id));
    assert_eq!(engine.artifact(&id).await.unwrap().metadata["county"], json!("Kern"));
    assert_eq!(engine.list_parents(&child, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_seal_timeout_leaves_chain_untouched() {
    init_tracing();
    // Import an easy chain, then demand a difficulty that will never be met.
    let easy = LocalLedger::new(LedgerConfig::default().with_difficulty(1)).unwrap();
    let hard = LedgerConfig::default().with_difficulty(64);
    let ledger = Arc::new(
        LocalLedger::restore(hard, easy.blocks().unwrap(), easy.transactions().unwrap()).unwrap(),
    );
    let engine = Engine::new(
        MemoryStore::new(),
        ledger.clone(),
        EngineConfig::default().with_timeout(Duration::from_millis(50)),
    );

    let hash = hash_bytes(b"slow").to_hex();
    let err = engine
        .seal(EntityType(1), &hash, Metadata::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Timeout(_)));
    assert!(err.is_retryable());

    assert_eq!(ledger.len().unwrap(), 1);
    assert_eq!(ledger.pending().unwrap().len(), 1);

    let artifact = engine
        .find(EntityType(1), &hash)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(artifact.ledger_tx_ref, None);
}

#[tokio::test]
async fn test_verify_file_against_baseline() {
    let fixture = TestFixture::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.txt");
    std::fs::write(&path, b"quarterly report").unwrap();

    fixture.ingest_under("report-q3", b"quarterly report").await;
    let ok = fixture.engine.verify_file("report-q3", &path).await.unwrap();
    assert!(ok.verdict.is_authentic());

    std::fs::write(&path, b"quarterly report (edited)").unwrap();
    let bad = fixture.engine.verify_file("report-q3", &path).await.unwrap();
    assert_eq!(bad.status(), VerificationStatus::Tampered);

    let history = fixture.engine.verification_history("report-q3").await.unwrap();
    assert_eq!(history.len(), 2);
}
