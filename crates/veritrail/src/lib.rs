//! # Veritrail
//!
//! The unified API for Veritrail - tamper-evident records of digital
//! artifacts, sealed onto a hash-chained ledger and linked by provenance.
//!
//! ## Overview
//!
//! Veritrail provides a library for:
//!
//! - **Artifacts**: Content-addressed records, deduplicated on `(entity_type, content_hash)`
//! - **Sealing**: Anchoring an artifact's hash in a proof-of-work ledger block
//! - **Verification**: Classifying presented content as authentic, tampered, or unknown
//! - **Provenance**: Directed `parent -> child` links between artifacts
//!
//! ## Key Concepts
//!
//! - **Baseline**: The stored hash that later content is compared against.
//! - **Seal**: A ledger transaction carrying the artifact's hash, mined into a block.
//! - **Proof bundle**: Everything a third party needs to recheck a seal.
//! - **Lineage**: The ancestors or descendants of an artifact, depth-bounded.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use veritrail::{Engine, EngineConfig};
//! use veritrail::core::{EntityType, Metadata};
//! use veritrail::store::SqliteStore;
//!
//! async fn example() {
//!     let store = SqliteStore::open("veritrail.db").unwrap();
//!     let engine = Engine::with_local_ledger(store, EngineConfig::default()).unwrap();
//!
//!     let id = engine
//!         .ingest_under("deed-42", EntityType(1), b"scanned deed", None, Metadata::new())
//!         .await
//!         .unwrap();
//!     let _sealed = engine.seal_artifact(&id).await.unwrap();
//!
//!     let result = engine.verify_bytes("deed-42", b"scanned deed").await.unwrap();
//!     assert!(result.verdict.is_authentic());
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `veritrail::core` - Digests, identifiers, and the data model
//! - `veritrail::store` - Storage abstraction, SQLite and in-memory stores
//! - `veritrail::ledger` - Ledger backends, blocks, and proof-of-work

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod provenance;
pub mod verify;

// Re-export component crates
pub use veritrail_core as core;
pub use veritrail_ledger as ledger;
pub use veritrail_store as store;

// Re-export main types for convenience
pub use api::{
    ApiError, ApiHandler, ApiResult, IngestRequest, IngestResponse, LinkRequest, LinkResponse,
    SealRequest, SealResponse, VerifyRequest, VerifyResponse,
};
pub use config::EngineConfig;
pub use engine::{Engine, SealOutcome};
pub use error::{EngineError, Result};
pub use provenance::LineageEntry;

// Re-export commonly used core types
pub use veritrail_core::{
    Artifact, ArtifactId, EntityType, Metadata, ProvenanceEdge, Sha256Digest, VerificationResult,
    VerificationStatus, Verdict,
};
pub use veritrail_ledger::{LedgerBackend, LocalLedger, ProofBundle, TxId};
