//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;
use veritrail_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Artifacts: one row per (entity_type, content_hash)
        CREATE TABLE artifacts (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            artifact_id TEXT NOT NULL UNIQUE,      -- 32 hex chars
            entity_type INTEGER NOT NULL,
            content_hash TEXT NOT NULL,            -- 64 lowercase hex chars
            manifest_hash TEXT,
            source_uri TEXT,
            ledger_tx_ref TEXT,
            metadata TEXT NOT NULL,                -- JSON object
            created_at INTEGER NOT NULL,           -- Unix ms

            UNIQUE(entity_type, content_hash)
        );

        -- Files attached to an artifact
        CREATE TABLE artifact_files (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            artifact_id TEXT NOT NULL REFERENCES artifacts(artifact_id),
            name TEXT NOT NULL,
            uri TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            content_type TEXT NOT NULL,
            attached_at INTEGER NOT NULL
        );

        -- Append-only audit trail
        CREATE TABLE artifact_events (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            artifact_id TEXT NOT NULL REFERENCES artifacts(artifact_id),
            event_type TEXT NOT NULL,
            actor TEXT NOT NULL,
            payload TEXT NOT NULL,                 -- JSON value
            ledger_tx_ref TEXT,
            created_at INTEGER NOT NULL
        );

        -- Baselines keyed by external reference id
        CREATE TABLE baselines (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            reference_id TEXT NOT NULL,
            artifact_id TEXT NOT NULL REFERENCES artifacts(artifact_id),
            content_hash TEXT NOT NULL,
            recorded_at INTEGER NOT NULL
        );

        -- Verification log
        CREATE TABLE verifications (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            reference_id TEXT NOT NULL,
            artifact_id TEXT,
            status TEXT NOT NULL,                  -- authentic | tampered | no_baseline
            current_hash TEXT NOT NULL,
            stored_hash TEXT,
            baseline_timestamp INTEGER,
            verified_at INTEGER NOT NULL
        );

        -- Provenance edges
        CREATE TABLE provenance_edges (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            edge_id TEXT NOT NULL UNIQUE,
            parent_artifact_id TEXT NOT NULL,
            child_artifact_id TEXT NOT NULL,
            relation TEXT NOT NULL,
            created_at INTEGER NOT NULL,

            UNIQUE(parent_artifact_id, child_artifact_id),
            CHECK(parent_artifact_id <> child_artifact_id)
        );

        -- Indexes for common queries
        CREATE INDEX idx_files_artifact ON artifact_files(artifact_id, seq);
        CREATE INDEX idx_events_artifact ON artifact_events(artifact_id, seq);
        CREATE INDEX idx_baselines_reference ON baselines(reference_id, recorded_at, seq);
        CREATE INDEX idx_verifications_reference ON verifications(reference_id, seq);
        CREATE INDEX idx_edges_child ON provenance_edges(child_artifact_id);
        "#,
    )?;

    Ok(())
}
