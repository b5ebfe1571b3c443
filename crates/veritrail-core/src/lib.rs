//! # Veritrail Core
//!
//! Pure primitives for Veritrail: canonical encoding, SHA-256 digests,
//! identifiers, and the artifact / provenance / verification data model.
//!
//! This crate contains no storage and no networking. The only I/O it performs
//! is reading from a caller-supplied [`std::io::Read`] in [`hash_stream`].
//!
//! ## Key Types
//!
//! - [`Sha256Digest`] - 32-byte digest, rendered as 64 lowercase hex chars
//! - [`ArtifactId`] - Opaque identifier of a stored artifact
//! - [`EntityType`] - Integer tag partitioning artifacts into categories
//! - [`Artifact`], [`ArtifactFile`], [`ArtifactEvent`] - Artifact records
//! - [`ProvenanceEdge`] - Directed link between two artifacts
//! - [`Verdict`] - Outcome of checking content against a baseline
//!
//! ## Canonicalization
//!
//! Structured records are hashed through a canonical JSON encoding. See the
//! [`canonical`] module.

pub mod artifact;
pub mod canonical;
pub mod digest;
pub mod error;
pub mod manifest;
pub mod provenance;
pub mod time;
pub mod types;
pub mod verification;

pub use artifact::{
    merge_new_keys, Artifact, ArtifactEvent, ArtifactFile, Baseline, EventType, FileInfo, Metadata,
};
pub use canonical::{canonical_value_bytes, canonicalize};
pub use digest::{hash_bytes, hash_record, hash_stream, Sha256Digest, DEFAULT_CHUNK_SIZE};
pub use error::{CoreError, Result};
pub use manifest::{FileManifest, ManifestEntry};
pub use provenance::ProvenanceEdge;
pub use time::now_millis;
pub use types::{ArtifactId, EdgeId, EntityType};
pub use verification::{VerificationResult, VerificationStatus, Verdict};
