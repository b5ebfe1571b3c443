//! Transport-agnostic request handling.
//!
//! [`ApiHandler`] takes deserialized request structs and returns response
//! structs whose serde field names are the external wire names. Errors come
//! back as an [`ApiError`] carrying an HTTP-style status code, so any
//! transport can map them without knowing [`EngineError`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use veritrail_core::{EntityType, Metadata, ProvenanceEdge, Sha256Digest, VerificationStatus};
use veritrail_ledger::{ProofBundle, TxId};
use veritrail_store::Store;

use crate::engine::{parse_artifact_id, Engine};
use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IngestRequest {
    pub entity_type: EntityType,
    pub content_hash: String,
    #[serde(default)]
    pub source_uri: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestResponse {
    pub artifact_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SealRequest {
    pub entity_type: EntityType,
    pub content_hash: String,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SealResponse {
    pub artifact_id: String,
    pub ledger_tx_id: TxId,
    pub sealed_at: i64,
    pub proof_bundle: Option<ProofBundle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VerifyRequest {
    pub reference_id: String,
    pub current_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyResponse {
    pub status: VerificationStatus,
    pub current_hash: Sha256Digest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_hash: Option<Sha256Digest>,
    pub verified_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LinkRequest {
    pub parent_id: String,
    pub child_id: String,
    pub relation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkResponse {
    pub edge_id: String,
    pub created_at: i64,
}

/// Error returned to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub status: u16,
    pub error: String,
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let status = match &e {
            EngineError::Validation(_) => 400,
            EngineError::NotFound(_) => 404,
            EngineError::Timeout(_) => 504,
            _ => 500,
        };
        if status == 500 {
            warn!(error = %e, "request failed");
        }
        ApiError {
            status,
            error: e.to_string(),
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Maps wire requests onto an [`Engine`].
pub struct ApiHandler<S: Store> {
    engine: Arc<Engine<S>>,
}

impl<S: Store> Clone for ApiHandler<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<S: Store> ApiHandler<S> {
    pub fn new(engine: Arc<Engine<S>>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine<S> {
        &self.engine
    }

    pub async fn ingest(&self, req: IngestRequest) -> ApiResult<IngestResponse> {
        let id = self
            .engine
            .create_or_get(
                req.entity_type,
                &req.content_hash,
                req.source_uri.as_deref(),
                req.metadata,
            )
            .await?;
        Ok(IngestResponse {
            artifact_id: id.to_hex(),
        })
    }

    pub async fn seal(&self, req: SealRequest) -> ApiResult<SealResponse> {
        let outcome = self
            .engine
            .seal(req.entity_type, &req.content_hash, req.metadata)
            .await?;
        Ok(SealResponse {
            artifact_id: outcome.artifact_id.to_hex(),
            ledger_tx_id: outcome.ledger_tx_id,
            sealed_at: outcome.sealed_at,
            proof_bundle: outcome.proof_bundle,
        })
    }

    pub async fn verify(&self, req: VerifyRequest) -> ApiResult<VerifyResponse> {
        let result = self
            .engine
            .verify_hash(&req.reference_id, &req.current_hash)
            .await?;
        Ok(VerifyResponse {
            status: result.status(),
            current_hash: result.current_hash(),
            stored_hash: result.stored_hash(),
            verified_at: result.verified_at,
        })
    }

    pub async fn link(&self, req: LinkRequest) -> ApiResult<LinkResponse> {
        let parent = parse_artifact_id(&req.parent_id)?;
        let child = parse_artifact_id(&req.child_id)?;
        let edge = self
            .engine
            .create_link(&parent, &child, &req.relation)
            .await?;
        Ok(LinkResponse {
            edge_id: edge.edge_id.to_hex(),
            created_at: edge.created_at,
        })
    }

    pub async fn children(
        &self,
        parent_id: &str,
        relation: Option<&str>,
    ) -> ApiResult<Vec<ProvenanceEdge>> {
        let parent = parse_artifact_id(parent_id)?;
        Ok(self.engine.list_children(&parent, relation).await?)
    }

    pub async fn parents(
        &self,
        child_id: &str,
        relation: Option<&str>,
    ) -> ApiResult<Vec<ProvenanceEdge>> {
        let child = parse_artifact_id(child_id)?;
        Ok(self.engine.list_parents(&child, relation).await?)
    }
}
