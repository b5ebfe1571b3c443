//! # Veritrail Testkit
//!
//! Testing utilities for Veritrail.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known inputs with expected canonical bytes and SHA-256 digests
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: An engine over an in-memory store with an easy ledger difficulty
//!
//! ## Golden Vectors
//!
//! ```rust
//! use veritrail_testkit::vectors::verify_all_vectors;
//!
//! verify_all_vectors().unwrap();
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use veritrail_testkit::generators::json_object;
//!
//! proptest! {
//!     #[test]
//!     fn hash_is_deterministic(record in json_object()) {
//!         prop_assert_eq!(hash_record(&record)?, hash_record(&record)?);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use veritrail_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new();
//! assert_eq!(fixture.engine.config().ledger.difficulty, 1);
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{init_tracing, random_content, TestFixture};
pub use generators::IngestParams;
pub use vectors::{
    all_hash_vectors, all_record_vectors, verify_all_vectors, HashVector, RecordVector,
};
