//! # Veritrail Ledger
//!
//! A hash-chained, append-only ledger with proof-of-work sealing, used as a
//! local stand-in for an external distributed ledger.
//!
//! ## Key Types
//!
//! - [`LedgerBackend`] - The sealing interface callers depend on
//! - [`LocalLedger`] - In-process hash chain
//! - [`ExternalLedger`] - Adapter over a [`LedgerClient`] for a remote service
//! - [`LedgerTransaction`], [`LedgerBlock`] - Chain records
//! - [`ProofBundle`] - Self-contained evidence that a transaction was sealed
//!
//! ## Usage
//!
//! ```rust,no_run
//! use veritrail_ledger::{LedgerBackend, LedgerConfig, LocalLedger};
//!
//! async fn example() {
//!     let ledger = LocalLedger::new(LedgerConfig::default()).unwrap();
//!
//!     let tx = ledger.submit("seal", &serde_json::json!({"doc": 1})).await.unwrap();
//!     let receipt = ledger.seal(&[tx]).await.unwrap();
//!     assert!(ledger.validate_chain().await.unwrap());
//!     println!("sealed in block {}", receipt.block_id);
//! }
//! ```
//!
//! ## Hashing
//!
//! - `signature = sha256(tx_id || operation || payload_digest_hex)`
//! - `merkle_root = sha256(signature_hex_1 || signature_hex_2 || ...)`
//! - `hash = sha256(block_id || timestamp || previous_hash_hex || merkle_root_hex || nonce)`
//!
//! Genesis links to 64 zeros. A block hash must start with `difficulty` zero
//! hex digits.

pub mod backend;
pub mod block;
pub mod chain;
pub mod config;
pub mod error;
pub mod external;
pub mod local;
pub mod pow;
pub mod transaction;
pub mod types;

pub use backend::{LedgerBackend, ProofBundle, SealReceipt};
pub use block::{merkle_root, BlockHeader, LedgerBlock};
pub use chain::validate_blocks;
pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use external::{ExternalLedger, ExternalSeal, LedgerClient};
pub use local::LocalLedger;
pub use pow::{mine, CancelFlag, MAX_DIFFICULTY};
pub use transaction::{compute_signature, LedgerTransaction};
pub use types::{BlockId, TxId};
