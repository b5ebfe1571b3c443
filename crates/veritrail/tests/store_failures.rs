//! The Engine over a store that fails or stalls on chosen writes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use veritrail::core::{
    hash_bytes, Artifact, ArtifactEvent, ArtifactFile, ArtifactId, Baseline, EntityType,
    FileInfo, Metadata, ProvenanceEdge, Sha256Digest, VerificationResult,
};
use veritrail::ledger::{LedgerConfig, LocalLedger};
use veritrail::store::{InsertResult, MemoryStore, Result as StoreResult, Store, StoreError};
use veritrail::{Engine, EngineConfig, EngineError};
use veritrail_testkit::init_tracing;

/// A [`MemoryStore`] with switchable faults.
#[derive(Default)]
struct FaultyStore {
    inner: MemoryStore,
    reject_tx_ref: AtomicBool,
    attach_delay: Option<Duration>,
}

#[async_trait]
impl Store for FaultyStore {
    async fn insert_artifact(
        &self,
        artifact: &Artifact,
        ingested: &ArtifactEvent,
    ) -> StoreResult<InsertResult<ArtifactId>> {
        self.inner.insert_artifact(artifact, ingested).await
    }

    async fn get_artifact(&self, id: &ArtifactId) -> StoreResult<Option<Artifact>> {
        self.inner.get_artifact(id).await
    }

    async fn find_artifact(
        &self,
        entity_type: EntityType,
        content_hash: &Sha256Digest,
    ) -> StoreResult<Option<Artifact>> {
        self.inner.find_artifact(entity_type, content_hash).await
    }

    async fn has_artifact(&self, id: &ArtifactId) -> StoreResult<bool> {
        self.inner.has_artifact(id).await
    }

    async fn count_artifacts(&self) -> StoreResult<u64> {
        self.inner.count_artifacts().await
    }

    async fn merge_metadata(
        &self,
        id: &ArtifactId,
        incoming: &Metadata,
    ) -> StoreResult<Metadata> {
        self.inner.merge_metadata(id, incoming).await
    }

    async fn set_ledger_tx_ref(&self, id: &ArtifactId, tx_ref: &str) -> StoreResult<()> {
        if self.reject_tx_ref.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".into()));
        }
        self.inner.set_ledger_tx_ref(id, tx_ref).await
    }

    async fn set_manifest_hash(
        &self,
        id: &ArtifactId,
        hash: &Sha256Digest,
    ) -> StoreResult<()> {
        self.inner.set_manifest_hash(id, hash).await
    }

    async fn attach_file(&self, file: &ArtifactFile) -> StoreResult<()> {
        if let Some(delay) = self.attach_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.attach_file(file).await
    }

    async fn list_files(&self, id: &ArtifactId) -> StoreResult<Vec<ArtifactFile>> {
        self.inner.list_files(id).await
    }

    async fn record_event(&self, event: &ArtifactEvent) -> StoreResult<()> {
        self.inner.record_event(event).await
    }

    async fn list_events(&self, id: &ArtifactId) -> StoreResult<Vec<ArtifactEvent>> {
        self.inner.list_events(id).await
    }

    async fn record_baseline(&self, baseline: &Baseline) -> StoreResult<()> {
        self.inner.record_baseline(baseline).await
    }

    async fn latest_baseline(
        &self,
        reference_id: &str,
    ) -> StoreResult<Option<Baseline>> {
        self.inner.latest_baseline(reference_id).await
    }

    async fn record_verification(&self, result: &VerificationResult) -> StoreResult<()> {
        self.inner.record_verification(result).await
    }

    async fn list_verifications(
        &self,
        reference_id: &str,
    ) -> StoreResult<Vec<VerificationResult>> {
        self.inner.list_verifications(reference_id).await
    }

    async fn insert_edge(
        &self,
        edge: &ProvenanceEdge,
    ) -> StoreResult<InsertResult<ProvenanceEdge>> {
        self.inner.insert_edge(edge).await
    }

    async fn children_of(
        &self,
        parent: &ArtifactId,
        relation: Option<&str>,
    ) -> StoreResult<Vec<ProvenanceEdge>> {
        self.inner.children_of(parent, relation).await
    }

    async fn parents_of(
        &self,
        child: &ArtifactId,
        relation: Option<&str>,
    ) -> StoreResult<Vec<ProvenanceEdge>> {
        self.inner.parents_of(child, relation).await
    }

    async fn delete_edge(
        &self,
        parent: &ArtifactId,
        child: &ArtifactId,
    ) -> StoreResult<bool> {
        self.inner.delete_edge(parent, child).await
    }
}

fn file_info(name: &str) -> FileInfo {
    FileInfo {
        name: name.to_string(),
        uri: format!("file:///{}", name),
        content_hash: hash_bytes(name.as_bytes()),
        size_bytes: 1024,
        content_type: "application/pdf".into(),
    }
}

#[tokio::test]
async fn test_unstored_ledger_reference_keeps_block() {
    init_tracing();
    let ledger = Arc::new(LocalLedger::new(LedgerConfig::default().with_difficulty(1)).unwrap());
    let store = FaultyStore::default();
    let engine = Engine::new(store, ledger.clone(), EngineConfig::default());

    let id = engine
        .ingest_bytes(EntityType(1), b"deed", None, Metadata::new())
        .await
        .unwrap();
    engine.store().reject_tx_ref.store(true, Ordering::SeqCst);

    let err = engine.seal_artifact(&id).await.unwrap_err();
    assert!(matches!(err, EngineError::Store(StoreError::Backend(_))));
    assert!(err.is_retryable());

    // The block was appended before the store write failed.
    assert_eq!(ledger.len().unwrap(), 2);
    let tx = ledger.transactions().unwrap().pop().unwrap();
    let proof = engine.proof(&tx.tx_id).await.unwrap().unwrap();
    assert!(proof.verify());

    let artifact = engine.artifact(&id).await.unwrap();
    assert_eq!(artifact.ledger_tx_ref, None);
}

#[tokio::test]
async fn test_slow_attach_times_out() {
    init_tracing();
    let store = FaultyStore {
        attach_delay: Some(Duration::from_secs(5)),
        ..Default::default()
    };
    let config = EngineConfig::default()
        .with_difficulty(1)
        .with_timeout(Duration::from_millis(50));
    let engine = Engine::with_local_ledger(store, config).unwrap();

    let id = engine
        .ingest_bytes(EntityType(1), b"deed", None, Metadata::new())
        .await
        .unwrap();

    let err = engine.attach_file(&id, file_info("deed.pdf")).await.unwrap_err();
    assert!(matches!(err, EngineError::Timeout(_)));
    assert!(err.is_retryable());
    assert!(engine.files(&id).await.unwrap().is_empty());
}
