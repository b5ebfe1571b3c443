//! # Veritrail Store
//!
//! Storage abstraction for Veritrail. Provides a trait-based interface for
//! artifact, audit, baseline, verification and provenance persistence with
//! SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The [`Store`] trait keeps the engine storage-agnostic. The primary
//! implementation is [`SqliteStore`], with [`MemoryStore`] for testing.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`InsertResult`] - Result of a keyed insert
//!
//! ## Usage
//!
//! ```rust,no_run
//! use veritrail_store::{SqliteStore, Store};
//!
//! async fn example() {
//!     // Open a SQLite database
//!     let store = SqliteStore::open("veritrail.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory().unwrap();
//!
//!     let count = store.count_artifacts().await.unwrap();
//!     assert_eq!(count, 0);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Insert-then-find**: a keyed insert that loses a uniqueness race reports
//!   `AlreadyExists` with the surviving record instead of failing
//! - **Append-only audit**: events, baselines and verification results are
//!   never updated or deleted
//! - **Child rows require a parent**: files, events and baselines for an
//!   unknown artifact fail with `NotFound`

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{InsertResult, Store};
