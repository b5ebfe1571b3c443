//! Verification of presented content against stored baselines.
//!
//! The baseline for a reference id is the most recently recorded
//! [`Baseline`](veritrail_core::Baseline). If none exists and the reference
//! id is itself an artifact id, that artifact's content hash is used.
//!
//! Every verification is written to the verification log, and a `verified`
//! event is appended to the baseline artifact when there is one. Neither
//! write can fail the verification.

use std::io::Read;
use std::path::Path;

use serde_json::json;
use tracing::{debug, warn};

use veritrail_core::{
    hash_bytes, now_millis, ArtifactId, EventType, Sha256Digest, VerificationResult, Verdict,
};
use veritrail_store::Store;

use crate::engine::{parse_hash, Engine};
use crate::error::{EngineError, Result};

/// The baseline a verification compares against.
struct ResolvedBaseline {
    artifact_id: ArtifactId,
    content_hash: Sha256Digest,
    recorded_at: i64,
}

impl<S: Store> Engine<S> {
    /// Classify a presented hash against the baseline for `reference_id`.
    pub async fn verify_hash(
        &self,
        reference_id: &str,
        current_hash: &str,
    ) -> Result<VerificationResult> {
        let current = parse_hash(current_hash)?;
        self.verify_digest(reference_id, current).await
    }

    /// Hash `content` and verify it.
    pub async fn verify_bytes(
        &self,
        reference_id: &str,
        content: &[u8],
    ) -> Result<VerificationResult> {
        self.verify_digest(reference_id, hash_bytes(content)).await
    }

    /// Hash a reader on a blocking worker and verify the result.
    pub async fn verify_reader<R>(
        &self,
        reference_id: &str,
        reader: R,
    ) -> Result<VerificationResult>
    where
        R: Read + Send + 'static,
    {
        let current = self.within(self.hash_reader(reader)).await?;
        self.verify_digest(reference_id, current).await
    }

    /// Hash a file on a blocking worker and verify the result.
    pub async fn verify_file(
        &self,
        reference_id: &str,
        path: impl AsRef<Path>,
    ) -> Result<VerificationResult> {
        let current = self.within(self.hash_file(path)).await?;
        self.verify_digest(reference_id, current).await
    }

    /// Past verifications of a reference, oldest first.
    pub async fn verification_history(
        &self,
        reference_id: &str,
    ) -> Result<Vec<VerificationResult>> {
        self.within(async { Ok(self.store.list_verifications(reference_id).await?) })
            .await
    }

    async fn verify_digest(
        &self,
        reference_id: &str,
        current: Sha256Digest,
    ) -> Result<VerificationResult> {
        if reference_id.is_empty() {
            return Err(EngineError::Validation("reference id must not be empty".into()));
        }

        let baseline = self.within(self.resolve_baseline(reference_id)).await?;

        let verdict = Verdict::classify(current, baseline.as_ref().map(|b| b.content_hash));
        let result = VerificationResult {
            reference_id: reference_id.to_string(),
            artifact_id: baseline.as_ref().map(|b| b.artifact_id),
            verdict,
            baseline_timestamp: baseline.as_ref().map(|b| b.recorded_at),
            verified_at: now_millis(),
        };

        debug!(reference_id, status = %result.status(), "verified");
        self.audit_verification(&result).await;
        Ok(result)
    }

    async fn resolve_baseline(&self, reference_id: &str) -> Result<Option<ResolvedBaseline>> {
        if let Some(baseline) = self.store.latest_baseline(reference_id).await? {
            return Ok(Some(ResolvedBaseline {
                artifact_id: baseline.artifact_id,
                content_hash: baseline.content_hash,
                recorded_at: baseline.recorded_at,
            }));
        }

        let Ok(artifact_id) = ArtifactId::from_hex(reference_id) else {
            return Ok(None);
        };
        Ok(self
            .store
            .get_artifact(&artifact_id)
            .await?
            .map(|artifact| ResolvedBaseline {
                artifact_id: artifact.id,
                content_hash: artifact.content_hash,
                recorded_at: artifact.created_at,
            }))
    }

    async fn audit_verification(&self, result: &VerificationResult) {
        if let Err(e) = self.store.record_verification(result).await {
            warn!(
                reference_id = %result.reference_id,
                error = %e,
                "failed to record verification"
            );
        }

        if let Some(artifact_id) = result.artifact_id {
            self.audit(self.event(
                artifact_id,
                EventType::Verified,
                json!({
                    "reference_id": result.reference_id,
                    "status": result.status(),
                    "current_hash": result.current_hash(),
                    "stored_hash": result.stored_hash(),
                }),
            ))
            .await;
        }
    }
}
