//! The Engine: unified API for Veritrail.
//!
//! The Engine brings together the artifact store and a ledger backend into
//! one interface for ingesting, sealing, verifying, and linking artifacts.

use std::future::Future;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use veritrail_core::{
    hash_bytes, hash_stream, now_millis, Artifact, ArtifactEvent, ArtifactFile, ArtifactId,
    Baseline, EntityType, EventType, FileInfo, FileManifest, Metadata, Sha256Digest,
};
use veritrail_ledger::{BlockId, LedgerBackend, LocalLedger, ProofBundle, TxId};
use veritrail_store::{InsertResult, Store};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// Result of sealing an artifact onto the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealOutcome {
    pub artifact_id: ArtifactId,
    pub ledger_tx_id: TxId,
    pub block_id: BlockId,
    /// Seal time (Unix ms).
    pub sealed_at: i64,
    /// Proof of inclusion, when the backend can produce one.
    pub proof_bundle: Option<ProofBundle>,
}

/// Parse a caller-supplied hex digest, rejecting anything but 64 hex chars.
pub(crate) fn parse_hash(s: &str) -> Result<Sha256Digest> {
    Sha256Digest::from_hex(s).map_err(|e| EngineError::Validation(e.to_string()))
}

/// Parse a caller-supplied artifact id.
pub(crate) fn parse_artifact_id(s: &str) -> Result<ArtifactId> {
    ArtifactId::from_hex(s).map_err(|e| EngineError::Validation(e.to_string()))
}

/// The main Engine struct.
///
/// Provides a unified API for:
/// - Creating or finding content-addressed artifacts
/// - Attaching files and audit events
/// - Sealing artifacts onto the ledger
/// - Verifying presented content against baselines
/// - Linking artifacts into a provenance graph
///
/// The Engine is `Send + Sync`; share it across workers behind an `Arc`.
pub struct Engine<S: Store> {
    /// The storage backend.
    pub(crate) store: Arc<S>,
    /// The ledger backend, local or external.
    pub(crate) ledger: Arc<dyn LedgerBackend>,
    /// Configuration.
    pub(crate) config: EngineConfig,
    /// Serializes manifest recomputation.
    manifest_lock: Mutex<()>,
}

impl<S: Store> Engine<S> {
    /// Create an engine over a store and an already constructed ledger.
    pub fn new(store: S, ledger: Arc<dyn LedgerBackend>, config: EngineConfig) -> Self {
        info!(ledger = ledger.kind(), "engine started");
        Self {
            store: Arc::new(store),
            ledger,
            config,
            manifest_lock: Mutex::new(()),
        }
    }

    /// Create an engine with a fresh [`LocalLedger`] built from `config.ledger`.
    pub fn with_local_ledger(store: S, config: EngineConfig) -> Result<Self> {
        let ledger = LocalLedger::new(config.ledger.clone())?;
        Ok(Self::new(store, Arc::new(ledger), config))
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the ledger backend.
    pub fn ledger(&self) -> &dyn LedgerBackend {
        self.ledger.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `fut` under the configured operation timeout, if any.
    pub(crate) async fn within<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.config.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| EngineError::Timeout(limit))?,
            None => fut.await,
        }
    }

    /// Append an audit event, logging instead of failing.
    pub(crate) async fn audit(&self, event: ArtifactEvent) {
        if let Err(e) = self.store.record_event(&event).await {
            warn!(
                artifact_id = %event.artifact_id,
                event_type = %event.event_type,
                error = %e,
                "failed to record audit event"
            );
        }
    }

    pub(crate) fn event(
        &self,
        artifact_id: ArtifactId,
        event_type: EventType,
        payload: Value,
    ) -> ArtifactEvent {
        ArtifactEvent::new(
            artifact_id,
            event_type,
            self.config.actor.clone(),
            payload,
            now_millis(),
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Artifact Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Return the artifact for `(entity_type, content_hash)`, creating it if needed.
    ///
    /// `content_hash` must be exactly 64 hex characters (either case). On a
    /// dedup hit, metadata keys the artifact lacks are merged in and no event
    /// is written. A new artifact gets an `ingested` event.
    pub async fn create_or_get(
        &self,
        entity_type: EntityType,
        content_hash: &str,
        source_uri: Option<&str>,
        metadata: Metadata,
    ) -> Result<ArtifactId> {
        let digest = parse_hash(content_hash)?;
        self.within(self.create_or_get_digest(entity_type, digest, source_uri, metadata))
            .await
            .map(|(id, _)| id)
    }

    /// Hash `content` and create or find its artifact.
    pub async fn ingest_bytes(
        &self,
        entity_type: EntityType,
        content: &[u8],
        source_uri: Option<&str>,
        metadata: Metadata,
    ) -> Result<ArtifactId> {
        let digest = hash_bytes(content);
        self.within(self.create_or_get_digest(entity_type, digest, source_uri, metadata))
            .await
            .map(|(id, _)| id)
    }

    /// Ingest `content` and record it as the baseline for `reference_id`.
    pub async fn ingest_under(
        &self,
        reference_id: &str,
        entity_type: EntityType,
        content: &[u8],
        source_uri: Option<&str>,
        metadata: Metadata,
    ) -> Result<ArtifactId> {
        let id = self
            .ingest_bytes(entity_type, content, source_uri, metadata)
            .await?;
        self.record_baseline(reference_id, &id).await?;
        Ok(id)
    }

    /// Returns the artifact id and whether this call created it.
    pub(crate) async fn create_or_get_digest(
        &self,
        entity_type: EntityType,
        content_hash: Sha256Digest,
        source_uri: Option<&str>,
        metadata: Metadata,
    ) -> Result<(ArtifactId, bool)> {
        if let Some(existing) = self.store.find_artifact(entity_type, &content_hash).await? {
            debug!(artifact_id = %existing.id, "dedup hit");
            self.merge_on_dedup(&existing.id, &metadata).await?;
            return Ok((existing.id, false));
        }

        let artifact = Artifact::new(
            entity_type,
            content_hash,
            source_uri.map(str::to_string),
            metadata.clone(),
            now_millis(),
        );
        let ingested = ArtifactEvent::new(
            artifact.id,
            EventType::Ingested,
            self.config.actor.clone(),
            json!({
                "entity_type": entity_type,
                "content_hash": content_hash,
                "source_uri": source_uri,
            }),
            artifact.created_at,
        );

        match self.store.insert_artifact(&artifact, &ingested).await? {
            InsertResult::Inserted => {
                info!(
                    artifact_id = %artifact.id,
                    entity_type = %entity_type,
                    content_hash = %content_hash,
                    "artifact created"
                );
                Ok((artifact.id, true))
            }
            InsertResult::AlreadyExists { existing } => {
                debug!(artifact_id = %existing, "lost insert race; using winner");
                self.merge_on_dedup(&existing, &metadata).await?;
                Ok((existing, false))
            }
        }
    }

    async fn merge_on_dedup(&self, id: &ArtifactId, metadata: &Metadata) -> Result<()> {
        if self.config.merge_metadata_on_dedup && !metadata.is_empty() {
            self.store.merge_metadata(id, metadata).await?;
        }
        Ok(())
    }

    /// Get an artifact by id.
    pub async fn artifact(&self, id: &ArtifactId) -> Result<Artifact> {
        self.within(async {
            self.store
                .get_artifact(id)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("artifact {}", id)))
        })
        .await
    }

    /// Find an artifact by its dedup key.
    pub async fn find(
        &self,
        entity_type: EntityType,
        content_hash: &str,
    ) -> Result<Option<Artifact>> {
        let digest = parse_hash(content_hash)?;
        self.within(async { Ok(self.store.find_artifact(entity_type, &digest).await?) })
            .await
    }

    /// Total number of artifacts.
    pub async fn artifact_count(&self) -> Result<u64> {
        self.within(async { Ok(self.store.count_artifacts().await?) })
            .await
    }

    /// Audit trail of an artifact, oldest first.
    pub async fn events(&self, id: &ArtifactId) -> Result<Vec<ArtifactEvent>> {
        self.within(async {
            self.require_artifact(id).await?;
            Ok(self.store.list_events(id).await?)
        })
        .await
    }

    /// Files attached to an artifact, in attachment order.
    pub async fn files(&self, id: &ArtifactId) -> Result<Vec<ArtifactFile>> {
        self.within(async {
            self.require_artifact(id).await?;
            Ok(self.store.list_files(id).await?)
        })
        .await
    }

    pub(crate) async fn require_artifact(&self, id: &ArtifactId) -> Result<()> {
        if self.store.has_artifact(id).await? {
            Ok(())
        } else {
            Err(EngineError::NotFound(format!("artifact {}", id)))
        }
    }

    /// Attach a file and refresh the artifact's manifest hash.
    ///
    /// Returns the new manifest hash.
    pub async fn attach_file(&self, artifact_id: &ArtifactId, info: FileInfo) -> Result<Sha256Digest> {
        if info.name.is_empty() {
            return Err(EngineError::Validation("file name must not be empty".into()));
        }

        let file = ArtifactFile::new(*artifact_id, info, now_millis());
        self.within(async {
            let _manifest = self.manifest_lock.lock().await;

            self.store.attach_file(&file).await?;
            let files = self.store.list_files(artifact_id).await?;
            let manifest_hash = FileManifest::from_files(&files).hash()?;
            self.store.set_manifest_hash(artifact_id, &manifest_hash).await?;

            self.audit(self.event(
                *artifact_id,
                EventType::FileAttached,
                json!({
                    "name": file.name,
                    "content_hash": file.content_hash,
                    "size_bytes": file.size_bytes,
                    "manifest_hash": manifest_hash,
                }),
            ))
            .await;

            debug!(artifact_id = %artifact_id, files = files.len(), "file attached");
            Ok(manifest_hash)
        })
        .await
    }

    /// Append an audit event as the configured actor.
    pub async fn record_event(
        &self,
        artifact_id: &ArtifactId,
        event_type: EventType,
        payload: Value,
    ) -> Result<()> {
        let event = self.event(*artifact_id, event_type, payload);
        self.within(async { Ok(self.store.record_event(&event).await?) })
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Baselines
    // ─────────────────────────────────────────────────────────────────────────

    /// Make an artifact's content hash the baseline for `reference_id`.
    ///
    /// Later baselines supersede earlier ones for verification.
    pub async fn record_baseline(
        &self,
        reference_id: &str,
        artifact_id: &ArtifactId,
    ) -> Result<Baseline> {
        if reference_id.is_empty() {
            return Err(EngineError::Validation("reference id must not be empty".into()));
        }

        self.within(async {
            let artifact = self
                .store
                .get_artifact(artifact_id)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("artifact {}", artifact_id)))?;

            let baseline = Baseline {
                reference_id: reference_id.to_string(),
                artifact_id: artifact.id,
                content_hash: artifact.content_hash,
                recorded_at: now_millis(),
            };
            self.store.record_baseline(&baseline).await?;
            info!(reference_id, artifact_id = %artifact.id, "baseline recorded");
            Ok(baseline)
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sealing
    // ─────────────────────────────────────────────────────────────────────────

    /// Create or find the artifact, then seal it onto the ledger.
    pub async fn seal(
        &self,
        entity_type: EntityType,
        content_hash: &str,
        metadata: Metadata,
    ) -> Result<SealOutcome> {
        let digest = parse_hash(content_hash)?;
        self.within(async {
            let (artifact_id, _) = self
                .create_or_get_digest(entity_type, digest, None, metadata)
                .await?;
            self.seal_inner(artifact_id, entity_type, digest).await
        })
        .await
    }

    /// Seal an existing artifact.
    pub async fn seal_artifact(&self, artifact_id: &ArtifactId) -> Result<SealOutcome> {
        self.within(async {
            let artifact = self
                .store
                .get_artifact(artifact_id)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("artifact {}", artifact_id)))?;
            self.seal_inner(artifact.id, artifact.entity_type, artifact.content_hash)
                .await
        })
        .await
    }

    async fn seal_inner(
        &self,
        artifact_id: ArtifactId,
        entity_type: EntityType,
        content_hash: Sha256Digest,
    ) -> Result<SealOutcome> {
        let payload = json!({
            "artifact_id": artifact_id,
            "entity_type": entity_type,
            "content_hash": content_hash,
        });
        let tx_id = self.ledger.submit("seal", &payload).await?;
        let receipt = self.ledger.seal(std::slice::from_ref(&tx_id)).await?;
        if let Err(e) = self
            .store
            .set_ledger_tx_ref(&artifact_id, tx_id.as_str())
            .await
        {
            // The block is already on the chain.
            error!(
                artifact_id = %artifact_id,
                tx_id = %tx_id,
                block_id = %receipt.block_id,
                error = %e,
                "artifact sealed but ledger reference not stored"
            );
            return Err(e.into());
        }

        let proof_bundle = match self.ledger.proof(&tx_id).await {
            Ok(proof) => proof,
            Err(e) => {
                warn!(tx_id = %tx_id, error = %e, "proof lookup failed after seal");
                None
            }
        };

        self.audit(
            self.event(
                artifact_id,
                EventType::Sealed,
                json!({
                    "block_id": receipt.block_id,
                    "block_hash": receipt.block_hash,
                    "ledger": self.ledger.kind(),
                }),
            )
            .with_ledger_tx_ref(tx_id.as_str()),
        )
        .await;

        info!(
            artifact_id = %artifact_id,
            tx_id = %tx_id,
            block_id = %receipt.block_id,
            "artifact sealed"
        );

        Ok(SealOutcome {
            artifact_id,
            ledger_tx_id: tx_id,
            block_id: receipt.block_id,
            sealed_at: receipt.sealed_at,
            proof_bundle,
        })
    }

    /// Recheck the ledger chain. `false` means further seals will be refused.
    pub async fn validate_ledger(&self) -> Result<bool> {
        Ok(self.ledger.validate_chain().await?)
    }

    /// Proof for a sealed ledger transaction.
    pub async fn proof(&self, tx_id: &TxId) -> Result<Option<ProofBundle>> {
        Ok(self.ledger.proof(tx_id).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Hashing
    // ─────────────────────────────────────────────────────────────────────────

    /// Hash a reader on a blocking worker with bounded memory.
    pub async fn hash_reader<R>(&self, reader: R) -> Result<Sha256Digest>
    where
        R: Read + Send + 'static,
    {
        let chunk_size = self.config.stream_chunk_size;
        tokio::task::spawn_blocking(move || -> Result<Sha256Digest> {
            Ok(hash_stream(reader, chunk_size)?)
        })
        .await
        .map_err(|e| EngineError::Io(io::Error::new(io::ErrorKind::Other, e)))?
    }

    /// Hash a file on a blocking worker with bounded memory.
    pub async fn hash_file(&self, path: impl AsRef<Path>) -> Result<Sha256Digest> {
        let path = path.as_ref().to_path_buf();
        let chunk_size = self.config.stream_chunk_size;
        tokio::task::spawn_blocking(move || -> Result<Sha256Digest> {
            let file = std::fs::File::open(&path)?;
            Ok(hash_stream(file, chunk_size)?)
        })
        .await
        .map_err(|e| EngineError::Io(io::Error::new(io::ErrorKind::Other, e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veritrail_store::{MemoryStore, SqliteStore};

    fn engine() -> Engine<MemoryStore> {
        Engine::with_local_ledger(MemoryStore::new(), EngineConfig::default().with_difficulty(1))
            .unwrap()
    }

    fn meta(pairs: &[(&str, Value)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_create_or_get_is_idempotent() {
        let engine = engine();
        let hash = hash_bytes(b"deed").to_hex();

        let id1 = engine
            .create_or_get(EntityType(1), &hash, Some("file:///deed.pdf"), Metadata::new())
            .await
            .unwrap();
        let id2 = engine
            .create_or_get(EntityType(1), &hash, None, Metadata::new())
            .await
            .unwrap();

        assert_eq!(id1, id2);
        assert_eq!(engine.artifact_count().await.unwrap(), 1);

        // Only the creating call writes an event.
        let events = engine.events(&id1).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Ingested);
    }

    #[tokio::test]
    async fn test_uppercase_hash_is_normalized() {
        let engine = engine();
        let hash = hash_bytes(b"deed").to_hex();

        let lower = engine
            .create_or_get(EntityType(1), &hash, None, Metadata::new())
            .await
            .unwrap();
        let upper = engine
            .create_or_get(EntityType(1), &hash.to_uppercase(), None, Metadata::new())
            .await
            .unwrap();
        assert_eq!(lower, upper);
        assert_eq!(engine.artifact(&lower).await.unwrap().content_hash.to_hex(), hash);
    }

    #[tokio::test]
    async fn test_invalid_hash_rejected_before_mutation() {
        let engine = engine();
        let bad_hashes = vec![
            String::new(),
            "abc".to_string(),
            "g".repeat(64),
            "a".repeat(65),
        ];
        for bad in &bad_hashes {
            let err = engine
                .create_or_get(EntityType(1), bad, None, Metadata::new())
                .await
                .unwrap_err();
            assert!(err.is_client_error(), "{:?}", err);
        }
        assert_eq!(engine.artifact_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dedup_merges_only_new_keys() {
        let engine = engine();
        let hash = hash_bytes(b"deed").to_hex();

        let id = engine
            .create_or_get(EntityType(1), &hash, None, meta(&[("owner", json!("alice"))]))
            .await
            .unwrap();
        engine
            .create_or_get(
                EntityType(1),
                &hash,
                None,
                meta(&[("owner", json!("mallory")), ("county", json!("Kern"))]),
            )
            .await
            .unwrap();

        let artifact = engine.artifact(&id).await.unwrap();
        assert_eq!(artifact.metadata["owner"], json!("alice"));
        assert_eq!(artifact.metadata["county"], json!("Kern"));
    }

    #[tokio::test]
    async fn test_dedup_merge_can_be_disabled() {
        let config = EngineConfig {
            merge_metadata_on_dedup: false,
            ..EngineConfig::default().with_difficulty(1)
        };
        let engine = Engine::with_local_ledger(MemoryStore::new(), config).unwrap();
        let hash = hash_bytes(b"deed").to_hex();

        let id = engine
            .create_or_get(EntityType(1), &hash, None, Metadata::new())
            .await
            .unwrap();
        engine
            .create_or_get(EntityType(1), &hash, None, meta(&[("county", json!("Kern"))]))
            .await
            .unwrap();
        assert!(engine.artifact(&id).await.unwrap().metadata.is_empty());
    }

    #[tokio::test]
    async fn test_attach_file_updates_manifest() {
        let engine = engine();
        let id = engine
            .ingest_bytes(EntityType(1), b"deed", None, Metadata::new())
            .await
            .unwrap();

        let info = |name: &str, body: &[u8]| FileInfo {
            name: name.into(),
            uri: format!("s3://bucket/{}", name),
            content_hash: hash_bytes(body),
            size_bytes: body.len() as u64,
            content_type: "application/pdf".into(),
        };

        let m1 = engine.attach_file(&id, info("a.pdf", b"a")).await.unwrap();
        let m2 = engine.attach_file(&id, info("b.pdf", b"b")).await.unwrap();
        assert_ne!(m1, m2);

        let artifact = engine.artifact(&id).await.unwrap();
        assert_eq!(artifact.manifest_hash, Some(m2));
        assert_eq!(engine.files(&id).await.unwrap().len(), 2);

        let kinds: Vec<EventType> = engine
            .events(&id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            kinds,
            vec![EventType::Ingested, EventType::FileAttached, EventType::FileAttached]
        );
    }

    #[tokio::test]
    async fn test_child_operations_on_missing_artifact() {
        let engine = engine();
        let missing = ArtifactId::generate();

        let err = engine
            .record_event(&missing, EventType::Other("reviewed".into()), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));

        let err = engine
            .attach_file(
                &missing,
                FileInfo {
                    name: "a.pdf".into(),
                    uri: "file:///a.pdf".into(),
                    content_hash: hash_bytes(b"a"),
                    size_bytes: 1,
                    content_type: "application/pdf".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        assert!(matches!(engine.events(&missing).await, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_seal_sets_ledger_ref_and_proof() {
        let engine = engine();
        let hash = hash_bytes(b"deed").to_hex();

        let outcome = engine
            .seal(EntityType(1), &hash, meta(&[("title", json!("Deed"))]))
            .await
            .unwrap();

        let artifact = engine.artifact(&outcome.artifact_id).await.unwrap();
        assert_eq!(artifact.ledger_tx_ref.as_deref(), Some(outcome.ledger_tx_id.as_str()));

        let proof = outcome.proof_bundle.unwrap();
        assert!(proof.verify());
        assert_eq!(proof.block_id, outcome.block_id);

        let events = engine.events(&outcome.artifact_id).await.unwrap();
        let sealed = events.last().unwrap();
        assert_eq!(sealed.event_type, EventType::Sealed);
        assert_eq!(sealed.ledger_tx_ref.as_deref(), Some(outcome.ledger_tx_id.as_str()));
        assert!(engine.validate_ledger().await.unwrap());
    }

    #[tokio::test]
    async fn test_hash_file_and_reader_agree() {
        let engine = Engine::with_local_ledger(
            SqliteStore::open_memory().unwrap(),
            EngineConfig {
                stream_chunk_size: 7,
                ..EngineConfig::default().with_difficulty(1)
            },
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.bin");
        let body: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &body).unwrap();

        let from_file = engine.hash_file(&path).await.unwrap();
        let from_reader = engine.hash_reader(io::Cursor::new(body.clone())).await.unwrap();
        assert_eq!(from_file, hash_bytes(&body));
        assert_eq!(from_reader, from_file);

        let missing = engine.hash_file(dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(missing, EngineError::Io(_)));
    }
}
