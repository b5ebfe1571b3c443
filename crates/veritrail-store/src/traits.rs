//! Store trait: the abstract interface for artifact persistence.
//!
//! This trait allows the engine to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use veritrail_core::{
    Artifact, ArtifactEvent, ArtifactFile, ArtifactId, Baseline, EntityType, Metadata,
    ProvenanceEdge, Sha256Digest, VerificationResult,
};

use crate::error::Result;

/// Result of inserting a record under a unique key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult<T> {
    /// The record was inserted.
    Inserted,
    /// A record with the same key already exists (not an error).
    AlreadyExists {
        /// The record, or its id, that holds the key.
        existing: T,
    },
}

impl<T> InsertResult<T> {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertResult::Inserted)
    }
}

/// The Store trait: async interface for Veritrail persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Uniqueness**: `(entity_type, content_hash)` identifies an artifact and
///   `(parent, child)` identifies an edge. Losing an insert race on either
///   key returns `AlreadyExists` with the winner.
/// - **Immutability**: only artifact metadata (new keys), `ledger_tx_ref` and
///   `manifest_hash` change after insert.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Artifact Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert an artifact together with its `ingested` event.
    ///
    /// # Returns
    /// - `Inserted` if the artifact was new; the event was recorded with it.
    /// - `AlreadyExists` with the surviving id if `(entity_type, content_hash)`
    ///   is taken. Nothing is written in that case.
    async fn insert_artifact(
        &self,
        artifact: &Artifact,
        ingested: &ArtifactEvent,
    ) -> Result<InsertResult<ArtifactId>>;

    /// Get an artifact by id.
    async fn get_artifact(&self, id: &ArtifactId) -> Result<Option<Artifact>>;

    /// Find an artifact by its dedup key.
    async fn find_artifact(
        &self,
        entity_type: EntityType,
        content_hash: &Sha256Digest,
    ) -> Result<Option<Artifact>>;

    /// Check if an artifact exists.
    async fn has_artifact(&self, id: &ArtifactId) -> Result<bool>;

    /// Total number of artifacts.
    async fn count_artifacts(&self) -> Result<u64>;

    /// Add keys from `incoming` that the artifact does not have yet.
    ///
    /// Returns the merged metadata. Fails with `NotFound` for unknown ids.
    async fn merge_metadata(&self, id: &ArtifactId, incoming: &Metadata) -> Result<Metadata>;

    /// Set the ledger back-reference.
    async fn set_ledger_tx_ref(&self, id: &ArtifactId, tx_ref: &str) -> Result<()>;

    /// Set the manifest hash.
    async fn set_manifest_hash(&self, id: &ArtifactId, hash: &Sha256Digest) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Child Records
    // ─────────────────────────────────────────────────────────────────────────

    /// Attach a file. Fails with `NotFound` for unknown artifacts.
    async fn attach_file(&self, file: &ArtifactFile) -> Result<()>;

    /// Files of an artifact, in attachment order.
    async fn list_files(&self, id: &ArtifactId) -> Result<Vec<ArtifactFile>>;

    /// Append an audit event. Fails with `NotFound` for unknown artifacts.
    async fn record_event(&self, event: &ArtifactEvent) -> Result<()>;

    /// Events of an artifact, in append order.
    async fn list_events(&self, id: &ArtifactId) -> Result<Vec<ArtifactEvent>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Baselines & Verification Log
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a baseline. Fails with `NotFound` for unknown artifacts.
    async fn record_baseline(&self, baseline: &Baseline) -> Result<()>;

    /// The most recently recorded baseline for a reference.
    ///
    /// Ties on `recorded_at` go to the later insert.
    async fn latest_baseline(&self, reference_id: &str) -> Result<Option<Baseline>>;

    /// Append a verification result to the log.
    async fn record_verification(&self, result: &VerificationResult) -> Result<()>;

    /// Verification results for a reference, oldest first.
    async fn list_verifications(&self, reference_id: &str) -> Result<Vec<VerificationResult>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Provenance Edges
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert an edge.
    ///
    /// Returns `AlreadyExists` with the stored edge if the pair is taken.
    async fn insert_edge(&self, edge: &ProvenanceEdge) -> Result<InsertResult<ProvenanceEdge>>;

    /// Edges leaving `parent`, optionally filtered by relation, oldest first.
    async fn children_of(
        &self,
        parent: &ArtifactId,
        relation: Option<&str>,
    ) -> Result<Vec<ProvenanceEdge>>;

    /// Edges arriving at `child`, optionally filtered by relation, oldest first.
    async fn parents_of(
        &self,
        child: &ArtifactId,
        relation: Option<&str>,
    ) -> Result<Vec<ProvenanceEdge>>;

    /// Remove an edge. Returns whether one was removed.
    async fn delete_edge(&self, parent: &ArtifactId, child: &ArtifactId) -> Result<bool>;
}
