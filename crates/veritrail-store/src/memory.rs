//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use veritrail_core::{
    merge_new_keys, Artifact, ArtifactEvent, ArtifactFile, ArtifactId, Baseline, EntityType,
    Metadata, ProvenanceEdge, Sha256Digest, VerificationResult,
};

use crate::error::{Result, StoreError};
use crate::traits::{InsertResult, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Artifacts indexed by id.
    artifacts: HashMap<ArtifactId, Artifact>,

    /// Dedup index: (entity_type, content_hash) -> artifact id.
    by_key: HashMap<(EntityType, Sha256Digest), ArtifactId>,

    /// Attached files per artifact.
    files: HashMap<ArtifactId, Vec<ArtifactFile>>,

    /// Audit events per artifact.
    events: HashMap<ArtifactId, Vec<ArtifactEvent>>,

    /// Baselines per reference id, in insert order.
    baselines: HashMap<String, Vec<Baseline>>,

    /// Verification log per reference id.
    verifications: HashMap<String, Vec<VerificationResult>>,

    /// Edges in insert order.
    edges: Vec<ProvenanceEdge>,

    /// Pair index over `edges`.
    edge_pairs: HashSet<(ArtifactId, ArtifactId)>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStoreInner {
    fn artifact_mut(&mut self, id: &ArtifactId) -> Result<&mut Artifact> {
        self.artifacts
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("artifact {}", id)))
    }

    fn require(&self, id: &ArtifactId) -> Result<()> {
        if self.artifacts.contains_key(id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("artifact {}", id)))
        }
    }
}

fn relation_matches(edge: &ProvenanceEdge, relation: Option<&str>) -> bool {
    relation.map_or(true, |r| edge.relation == r)
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_artifact(
        &self,
        artifact: &Artifact,
        ingested: &ArtifactEvent,
    ) -> Result<InsertResult<ArtifactId>> {
        let mut inner = self.write()?;

        let key = (artifact.entity_type, artifact.content_hash);
        if let Some(&existing) = inner.by_key.get(&key) {
            return Ok(InsertResult::AlreadyExists { existing });
        }

        inner.by_key.insert(key, artifact.id);
        inner.artifacts.insert(artifact.id, artifact.clone());
        inner
            .events
            .entry(artifact.id)
            .or_default()
            .push(ingested.clone());

        Ok(InsertResult::Inserted)
    }

    async fn get_artifact(&self, id: &ArtifactId) -> Result<Option<Artifact>> {
        let inner = self.read()?;
        Ok(inner.artifacts.get(id).cloned())
    }

    async fn find_artifact(
        &self,
        entity_type: EntityType,
        content_hash: &Sha256Digest,
    ) -> Result<Option<Artifact>> {
        let inner = self.read()?;
        Ok(inner
            .by_key
            .get(&(entity_type, *content_hash))
            .and_then(|id| inner.artifacts.get(id))
            .cloned())
    }

    async fn has_artifact(&self, id: &ArtifactId) -> Result<bool> {
        let inner = self.read()?;
        Ok(inner.artifacts.contains_key(id))
    }

    async fn count_artifacts(&self) -> Result<u64> {
        let inner = self.read()?;
        Ok(inner.artifacts.len() as u64)
    }

    async fn merge_metadata(&self, id: &ArtifactId, incoming: &Metadata) -> Result<Metadata> {
        let mut inner = self.write()?;
        let artifact = inner.artifact_mut(id)?;
        merge_new_keys(&mut artifact.metadata, incoming);
        Ok(artifact.metadata.clone())
    }

    async fn set_ledger_tx_ref(&self, id: &ArtifactId, tx_ref: &str) -> Result<()> {
        let mut inner = self.write()?;
        inner.artifact_mut(id)?.ledger_tx_ref = Some(tx_ref.to_string());
        Ok(())
    }

    async fn set_manifest_hash(&self, id: &ArtifactId, hash: &Sha256Digest) -> Result<()> {
        let mut inner = self.write()?;
        inner.artifact_mut(id)?.manifest_hash = Some(*hash);
        Ok(())
    }

    async fn attach_file(&self, file: &ArtifactFile) -> Result<()> {
        let mut inner = self.write()?;
        inner.require(&file.artifact_id)?;
        inner
            .files
            .entry(file.artifact_id)
            .or_default()
            .push(file.clone());
        Ok(())
    }

    async fn list_files(&self, id: &ArtifactId) -> Result<Vec<ArtifactFile>> {
        let inner = self.read()?;
        Ok(inner.files.get(id).cloned().unwrap_or_default())
    }

    async fn record_event(&self, event: &ArtifactEvent) -> Result<()> {
        let mut inner = self.write()?;
        inner.require(&event.artifact_id)?;
        inner
            .events
            .entry(event.artifact_id)
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn list_events(&self, id: &ArtifactId) -> Result<Vec<ArtifactEvent>> {
        let inner = self.read()?;
        Ok(inner.events.get(id).cloned().unwrap_or_default())
    }

    async fn record_baseline(&self, baseline: &Baseline) -> Result<()> {
        let mut inner = self.write()?;
        inner.require(&baseline.artifact_id)?;
        inner
            .baselines
            .entry(baseline.reference_id.clone())
            .or_default()
            .push(baseline.clone());
        Ok(())
    }

    async fn latest_baseline(&self, reference_id: &str) -> Result<Option<Baseline>> {
        let inner = self.read()?;
        // max_by_key keeps the last of equal maxima, i.e. the later insert.
        Ok(inner
            .baselines
            .get(reference_id)
            .and_then(|list| list.iter().max_by_key(|b| b.recorded_at))
            .cloned())
    }

    async fn record_verification(&self, result: &VerificationResult) -> Result<()> {
        let mut inner = self.write()?;
        inner
            .verifications
            .entry(result.reference_id.clone())
            .or_default()
            .push(result.clone());
        Ok(())
    }

    async fn list_verifications(&self, reference_id: &str) -> Result<Vec<VerificationResult>> {
        let inner = self.read()?;
        Ok(inner
            .verifications
            .get(reference_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_edge(&self, edge: &ProvenanceEdge) -> Result<InsertResult<ProvenanceEdge>> {
        let mut inner = self.write()?;
        let pair = (edge.parent_artifact_id, edge.child_artifact_id);

        if inner.edge_pairs.contains(&pair) {
            let existing = inner
                .edges
                .iter()
                .find(|e| (e.parent_artifact_id, e.child_artifact_id) == pair)
                .cloned()
                .ok_or_else(|| StoreError::InvalidData("edge index out of sync".into()))?;
            return Ok(InsertResult::AlreadyExists { existing });
        }

        inner.edge_pairs.insert(pair);
        inner.edges.push(edge.clone());
        Ok(InsertResult::Inserted)
    }

    async fn children_of(
        &self,
        parent: &ArtifactId,
        relation: Option<&str>,
    ) -> Result<Vec<ProvenanceEdge>> {
        let inner = self.read()?;
        Ok(inner
            .edges
            .iter()
            .filter(|e| &e.parent_artifact_id == parent && relation_matches(e, relation))
            .cloned()
            .collect())
    }

    async fn parents_of(
        &self,
        child: &ArtifactId,
        relation: Option<&str>,
    ) -> Result<Vec<ProvenanceEdge>> {
        let inner = self.read()?;
        Ok(inner
            .edges
            .iter()
            .filter(|e| &e.child_artifact_id == child && relation_matches(e, relation))
            .cloned()
            .collect())
    }

    async fn delete_edge(&self, parent: &ArtifactId, child: &ArtifactId) -> Result<bool> {
        let mut inner = self.write()?;
        let pair = (*parent, *child);
        if !inner.edge_pairs.remove(&pair) {
            return Ok(false);
        }
        inner
            .edges
            .retain(|e| (e.parent_artifact_id, e.child_artifact_id) != pair);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use veritrail_core::{EventType, Verdict};

    fn make_artifact(body: &[u8]) -> (Artifact, ArtifactEvent) {
        let artifact = Artifact::new(
            EntityType(1),
            Sha256Digest::hash(body),
            Some("file:///doc.pdf".into()),
            Metadata::new(),
            1_000,
        );
        let event = ArtifactEvent::new(artifact.id, EventType::Ingested, "test", json!({}), 1_000);
        (artifact, event)
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStore::new();
        let (artifact, event) = make_artifact(b"doc");

        let result = store.insert_artifact(&artifact, &event).await.unwrap();
        assert_eq!(result, InsertResult::Inserted);

        let retrieved = store.get_artifact(&artifact.id).await.unwrap().unwrap();
        assert_eq!(retrieved.content_hash, artifact.content_hash);
        assert_eq!(store.list_events(&artifact.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_dedup_key() {
        let store = MemoryStore::new();
        let (first, e1) = make_artifact(b"doc");
        let (second, e2) = make_artifact(b"doc");
        assert_ne!(first.id, second.id);

        store.insert_artifact(&first, &e1).await.unwrap();
        let r2 = store.insert_artifact(&second, &e2).await.unwrap();
        assert_eq!(r2, InsertResult::AlreadyExists { existing: first.id });
        assert_eq!(store.count_artifacts().await.unwrap(), 1);
        // The loser's event was not written.
        assert!(store.list_events(&second.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_children_require_artifact() {
        let store = MemoryStore::new();
        let missing = ArtifactId::from_bytes([9; 16]);
        let event = ArtifactEvent::new(missing, EventType::Sealed, "test", json!({}), 1);
        assert!(matches!(
            store.record_event(&event).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_latest_baseline_tie_goes_to_later_insert() {
        let store = MemoryStore::new();
        let (a, ea) = make_artifact(b"v1");
        let (b, eb) = make_artifact(b"v2");
        store.insert_artifact(&a, &ea).await.unwrap();
        store.insert_artifact(&b, &eb).await.unwrap();

        for art in [&a, &b] {
            store
                .record_baseline(&Baseline {
                    reference_id: "doc-1".into(),
                    artifact_id: art.id,
                    content_hash: art.content_hash,
                    recorded_at: 5,
                })
                .await
                .unwrap();
        }

        let latest = store.latest_baseline("doc-1").await.unwrap().unwrap();
        assert_eq!(latest.artifact_id, b.id);
        assert!(store.latest_baseline("doc-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_verification_log() {
        let store = MemoryStore::new();
        let result = VerificationResult {
            reference_id: "ref".into(),
            artifact_id: None,
            verdict: Verdict::NoBaseline {
                current: Sha256Digest::hash(b"x"),
            },
            baseline_timestamp: None,
            verified_at: 10,
        };
        store.record_verification(&result).await.unwrap();
        assert_eq!(store.list_verifications("ref").await.unwrap(), vec![result]);
    }

    #[tokio::test]
    async fn test_edge_idempotent_and_delete() {
        let store = MemoryStore::new();
        let a = ArtifactId::from_bytes([1; 16]);
        let c = ArtifactId::from_bytes([3; 16]);
        let edge = ProvenanceEdge::new(a, c, "derived_from", 1);
        let retry = ProvenanceEdge::new(a, c, "derived_from", 2);

        assert!(store.insert_edge(&edge).await.unwrap().is_inserted());
        assert_eq!(
            store.insert_edge(&retry).await.unwrap(),
            InsertResult::AlreadyExists {
                existing: edge.clone()
            }
        );
        assert_eq!(store.children_of(&a, None).await.unwrap(), vec![edge.clone()]);
        assert!(store.children_of(&a, Some("cites")).await.unwrap().is_empty());
        assert_eq!(store.parents_of(&c, Some("derived_from")).await.unwrap().len(), 1);

        assert!(store.delete_edge(&a, &c).await.unwrap());
        assert!(!store.delete_edge(&a, &c).await.unwrap());
        assert!(store.children_of(&a, None).await.unwrap().is_empty());
    }
}
