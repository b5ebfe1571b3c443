//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for Veritrail. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.
//!
//! Identifiers and digests are stored as lowercase hex text, metadata and
//! event payloads as JSON text.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::debug;

use veritrail_core::{
    merge_new_keys, Artifact, ArtifactEvent, ArtifactFile, ArtifactId, Baseline, EdgeId,
    EntityType, EventType, Metadata, ProvenanceEdge, Sha256Digest, VerificationResult,
    VerificationStatus, Verdict,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{InsertResult, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Execute a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Backend(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("spawn_blocking failed: {}", e)))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row conversion helpers
// ─────────────────────────────────────────────────────────────────────────────

const ARTIFACT_COLUMNS: &str = "artifact_id, entity_type, content_hash, manifest_hash, \
                                source_uri, ledger_tx_ref, metadata, created_at";

const EDGE_COLUMNS: &str =
    "edge_id, parent_artifact_id, child_artifact_id, relation, created_at";

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn invalid_column(idx: usize, msg: String) -> rusqlite::Error {
    conversion_error(idx, StoreError::InvalidData(msg))
}

fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| conversion_error(idx, e))
}

fn parse_opt_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: Option<String> = row.get(idx)?;
    text.map(|t| t.parse().map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn json_col<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| conversion_error(idx, e))
}

fn size_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let size: i64 = row.get(idx)?;
    u64::try_from(size).map_err(|_| invalid_column(idx, format!("negative size {}", size)))
}

fn row_to_artifact(row: &Row<'_>) -> rusqlite::Result<Artifact> {
    Ok(Artifact {
        id: parse_col(row, 0)?,
        entity_type: EntityType(row.get(1)?),
        content_hash: parse_col(row, 2)?,
        manifest_hash: parse_opt_col(row, 3)?,
        source_uri: row.get(4)?,
        ledger_tx_ref: row.get(5)?,
        metadata: json_col(row, 6)?,
        created_at: row.get(7)?,
    })
}

fn row_to_file(row: &Row<'_>) -> rusqlite::Result<ArtifactFile> {
    Ok(ArtifactFile {
        artifact_id: parse_col(row, 0)?,
        name: row.get(1)?,
        uri: row.get(2)?,
        content_hash: parse_col(row, 3)?,
        size_bytes: size_col(row, 4)?,
        content_type: row.get(5)?,
        attached_at: row.get(6)?,
    })
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<ArtifactEvent> {
    let event_type: String = row.get(1)?;
    Ok(ArtifactEvent {
        artifact_id: parse_col(row, 0)?,
        event_type: EventType::parse(&event_type),
        actor: row.get(2)?,
        payload: json_col(row, 3)?,
        ledger_tx_ref: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn row_to_baseline(row: &Row<'_>) -> rusqlite::Result<Baseline> {
    Ok(Baseline {
        reference_id: row.get(0)?,
        artifact_id: parse_col(row, 1)?,
        content_hash: parse_col(row, 2)?,
        recorded_at: row.get(3)?,
    })
}

fn row_to_verification(row: &Row<'_>) -> rusqlite::Result<VerificationResult> {
    let status_text: String = row.get(2)?;
    let status = VerificationStatus::parse(&status_text)
        .ok_or_else(|| invalid_column(2, format!("unknown status {}", status_text)))?;
    let current: Sha256Digest = parse_col(row, 3)?;
    let stored: Option<Sha256Digest> = parse_opt_col(row, 4)?;
    let verdict = Verdict::from_parts(status, current, stored)
        .ok_or_else(|| invalid_column(2, format!("inconsistent {} row", status)))?;

    Ok(VerificationResult {
        reference_id: row.get(0)?,
        artifact_id: parse_opt_col(row, 1)?,
        verdict,
        baseline_timestamp: row.get(5)?,
        verified_at: row.get(6)?,
    })
}

fn row_to_edge(row: &Row<'_>) -> rusqlite::Result<ProvenanceEdge> {
    let edge_id: String = row.get(0)?;
    Ok(ProvenanceEdge {
        edge_id: EdgeId::from_hex(&edge_id).map_err(|e| conversion_error(0, e))?,
        parent_artifact_id: parse_col(row, 1)?,
        child_artifact_id: parse_col(row, 2)?,
        relation: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

fn size_param(size: u64) -> Result<i64> {
    i64::try_from(size).map_err(|_| StoreError::InvalidData(format!("size {} too large", size)))
}

fn require_artifact(conn: &Connection, id: &ArtifactId) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM artifacts WHERE artifact_id = ?1)",
        params![id.to_hex()],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(StoreError::NotFound(format!("artifact {}", id)))
    }
}

fn artifact_id_by_key(
    conn: &Connection,
    entity_type: EntityType,
    content_hash: &Sha256Digest,
) -> Result<Option<ArtifactId>> {
    conn.query_row(
        "SELECT artifact_id FROM artifacts WHERE entity_type = ?1 AND content_hash = ?2",
        params![entity_type.0, content_hash.to_hex()],
        |row| parse_col(row, 0),
    )
    .optional()
    .map_err(StoreError::from)
}

fn edge_by_pair(
    conn: &Connection,
    parent: &ArtifactId,
    child: &ArtifactId,
) -> Result<Option<ProvenanceEdge>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM provenance_edges
             WHERE parent_artifact_id = ?1 AND child_artifact_id = ?2",
            EDGE_COLUMNS
        ),
        params![parent.to_hex(), child.to_hex()],
        row_to_edge,
    )
    .optional()
    .map_err(StoreError::from)
}

fn insert_event_row(conn: &Connection, event: &ArtifactEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO artifact_events
            (artifact_id, event_type, actor, payload, ledger_tx_ref, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.artifact_id.to_hex(),
            event.event_type.as_str(),
            event.actor,
            serde_json::to_string(&event.payload)?,
            event.ledger_tx_ref,
            event.created_at,
        ],
    )?;
    Ok(())
}

fn query_edges(
    conn: &Connection,
    column: &str,
    id: &ArtifactId,
    relation: Option<&str>,
) -> Result<Vec<ProvenanceEdge>> {
    let sql = format!(
        "SELECT {} FROM provenance_edges
         WHERE {} = ?1 AND (?2 IS NULL OR relation = ?2)
         ORDER BY seq",
        EDGE_COLUMNS, column
    );
    let mut stmt = conn.prepare(&sql)?;
    let edges = stmt
        .query_map(params![id.to_hex(), relation], row_to_edge)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(edges)
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_artifact(
        &self,
        artifact: &Artifact,
        ingested: &ArtifactEvent,
    ) -> Result<InsertResult<ArtifactId>> {
        let artifact = artifact.clone();
        let ingested = ingested.clone();

        self.run(move |conn| {
            if let Some(existing) =
                artifact_id_by_key(conn, artifact.entity_type, &artifact.content_hash)?
            {
                return Ok(InsertResult::AlreadyExists { existing });
            }

            let metadata = serde_json::to_string(&artifact.metadata)?;
            let tx = conn.transaction()?;

            let inserted = tx.execute(
                "INSERT INTO artifacts (
                    artifact_id, entity_type, content_hash, manifest_hash,
                    source_uri, ledger_tx_ref, metadata, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    artifact.id.to_hex(),
                    artifact.entity_type.0,
                    artifact.content_hash.to_hex(),
                    artifact.manifest_hash.map(|h| h.to_hex()),
                    artifact.source_uri,
                    artifact.ledger_tx_ref,
                    metadata,
                    artifact.created_at,
                ],
            );

            match inserted {
                Ok(_) => {}
                Err(e) if is_constraint_violation(&e) => {
                    // Another writer on the same file got there first.
                    drop(tx);
                    debug!(content_hash = %artifact.content_hash, "artifact insert lost race");
                    return match artifact_id_by_key(
                        conn,
                        artifact.entity_type,
                        &artifact.content_hash,
                    )? {
                        Some(existing) => Ok(InsertResult::AlreadyExists { existing }),
                        None => Err(StoreError::Database(e)),
                    };
                }
                Err(e) => return Err(e.into()),
            }

            insert_event_row(&tx, &ingested)?;
            tx.commit()?;
            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn get_artifact(&self, id: &ArtifactId) -> Result<Option<Artifact>> {
        let id = *id;
        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM artifacts WHERE artifact_id = ?1", ARTIFACT_COLUMNS),
                params![id.to_hex()],
                row_to_artifact,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn find_artifact(
        &self,
        entity_type: EntityType,
        content_hash: &Sha256Digest,
    ) -> Result<Option<Artifact>> {
        let content_hash = *content_hash;
        self.run(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM artifacts WHERE entity_type = ?1 AND content_hash = ?2",
                    ARTIFACT_COLUMNS
                ),
                params![entity_type.0, content_hash.to_hex()],
                row_to_artifact,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn has_artifact(&self, id: &ArtifactId) -> Result<bool> {
        let id = *id;
        self.run(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM artifacts WHERE artifact_id = ?1)",
                params![id.to_hex()],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
    }

    async fn count_artifacts(&self) -> Result<u64> {
        self.run(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM artifacts", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    async fn merge_metadata(&self, id: &ArtifactId, incoming: &Metadata) -> Result<Metadata> {
        let id = *id;
        let incoming = incoming.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;

            let mut metadata: Metadata = tx
                .query_row(
                    "SELECT metadata FROM artifacts WHERE artifact_id = ?1",
                    params![id.to_hex()],
                    |row| json_col(row, 0),
                )
                .optional()?
                .ok_or_else(|| StoreError::NotFound(format!("artifact {}", id)))?;

            if merge_new_keys(&mut metadata, &incoming) > 0 {
                tx.execute(
                    "UPDATE artifacts SET metadata = ?1 WHERE artifact_id = ?2",
                    params![serde_json::to_string(&metadata)?, id.to_hex()],
                )?;
            }

            tx.commit()?;
            Ok(metadata)
        })
        .await
    }

    async fn set_ledger_tx_ref(&self, id: &ArtifactId, tx_ref: &str) -> Result<()> {
        let id = *id;
        let tx_ref = tx_ref.to_string();
        self.run(move |conn| {
            let updated = conn.execute(
                "UPDATE artifacts SET ledger_tx_ref = ?1 WHERE artifact_id = ?2",
                params![tx_ref, id.to_hex()],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("artifact {}", id)));
            }
            Ok(())
        })
        .await
    }

    async fn set_manifest_hash(&self, id: &ArtifactId, hash: &Sha256Digest) -> Result<()> {
        let id = *id;
        let hash = *hash;
        self.run(move |conn| {
            let updated = conn.execute(
                "UPDATE artifacts SET manifest_hash = ?1 WHERE artifact_id = ?2",
                params![hash.to_hex(), id.to_hex()],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("artifact {}", id)));
            }
            Ok(())
        })
        .await
    }

    async fn attach_file(&self, file: &ArtifactFile) -> Result<()> {
        let file = file.clone();
        self.run(move |conn| {
            require_artifact(conn, &file.artifact_id)?;
            conn.execute(
                "INSERT INTO artifact_files
                    (artifact_id, name, uri, content_hash, size_bytes, content_type, attached_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    file.artifact_id.to_hex(),
                    file.name,
                    file.uri,
                    file.content_hash.to_hex(),
                    size_param(file.size_bytes)?,
                    file.content_type,
                    file.attached_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_files(&self, id: &ArtifactId) -> Result<Vec<ArtifactFile>> {
        let id = *id;
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT artifact_id, name, uri, content_hash, size_bytes, content_type, attached_at
                 FROM artifact_files WHERE artifact_id = ?1 ORDER BY seq",
            )?;
            let files = stmt
                .query_map(params![id.to_hex()], row_to_file)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(files)
        })
        .await
    }

    async fn record_event(&self, event: &ArtifactEvent) -> Result<()> {
        let event = event.clone();
        self.run(move |conn| {
            require_artifact(conn, &event.artifact_id)?;
            insert_event_row(conn, &event)
        })
        .await
    }

    async fn list_events(&self, id: &ArtifactId) -> Result<Vec<ArtifactEvent>> {
        let id = *id;
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT artifact_id, event_type, actor, payload, ledger_tx_ref, created_at
                 FROM artifact_events WHERE artifact_id = ?1 ORDER BY seq",
            )?;
            let events = stmt
                .query_map(params![id.to_hex()], row_to_event)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(events)
        })
        .await
    }

    async fn record_baseline(&self, baseline: &Baseline) -> Result<()> {
        let baseline = baseline.clone();
        self.run(move |conn| {
            require_artifact(conn, &baseline.artifact_id)?;
            conn.execute(
                "INSERT INTO baselines (reference_id, artifact_id, content_hash, recorded_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    baseline.reference_id,
                    baseline.artifact_id.to_hex(),
                    baseline.content_hash.to_hex(),
                    baseline.recorded_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn latest_baseline(&self, reference_id: &str) -> Result<Option<Baseline>> {
        let reference_id = reference_id.to_string();
        self.run(move |conn| {
            conn.query_row(
                "SELECT reference_id, artifact_id, content_hash, recorded_at
                 FROM baselines WHERE reference_id = ?1
                 ORDER BY recorded_at DESC, seq DESC LIMIT 1",
                params![reference_id],
                row_to_baseline,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn record_verification(&self, result: &VerificationResult) -> Result<()> {
        let result = result.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO verifications (
                    reference_id, artifact_id, status, current_hash, stored_hash,
                    baseline_timestamp, verified_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    result.reference_id,
                    result.artifact_id.map(|id| id.to_hex()),
                    result.status().as_str(),
                    result.current_hash().to_hex(),
                    result.stored_hash().map(|h| h.to_hex()),
                    result.baseline_timestamp,
                    result.verified_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_verifications(&self, reference_id: &str) -> Result<Vec<VerificationResult>> {
        let reference_id = reference_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT reference_id, artifact_id, status, current_hash, stored_hash,
                        baseline_timestamp, verified_at
                 FROM verifications WHERE reference_id = ?1 ORDER BY seq",
            )?;
            let results = stmt
                .query_map(params![reference_id], row_to_verification)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(results)
        })
        .await
    }

    async fn insert_edge(&self, edge: &ProvenanceEdge) -> Result<InsertResult<ProvenanceEdge>> {
        let edge = edge.clone();
        self.run(move |conn| {
            let parent = edge.parent_artifact_id;
            let child = edge.child_artifact_id;

            if let Some(existing) = edge_by_pair(conn, &parent, &child)? {
                return Ok(InsertResult::AlreadyExists { existing });
            }

            let inserted = conn.execute(
                "INSERT INTO provenance_edges
                    (edge_id, parent_artifact_id, child_artifact_id, relation, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    edge.edge_id.to_hex(),
                    parent.to_hex(),
                    child.to_hex(),
                    edge.relation,
                    edge.created_at,
                ],
            );

            match inserted {
                Ok(_) => Ok(InsertResult::Inserted),
                Err(e) if is_constraint_violation(&e) => match edge_by_pair(conn, &parent, &child)? {
                    Some(existing) => Ok(InsertResult::AlreadyExists { existing }),
                    None => Err(StoreError::Database(e)),
                },
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn children_of(
        &self,
        parent: &ArtifactId,
        relation: Option<&str>,
    ) -> Result<Vec<ProvenanceEdge>> {
        let parent = *parent;
        let relation = relation.map(str::to_string);
        self.run(move |conn| query_edges(conn, "parent_artifact_id", &parent, relation.as_deref()))
            .await
    }

    async fn parents_of(
        &self,
        child: &ArtifactId,
        relation: Option<&str>,
    ) -> Result<Vec<ProvenanceEdge>> {
        let child = *child;
        let relation = relation.map(str::to_string);
        self.run(move |conn| query_edges(conn, "child_artifact_id", &child, relation.as_deref()))
            .await
    }

    async fn delete_edge(&self, parent: &ArtifactId, child: &ArtifactId) -> Result<bool> {
        let parent = *parent;
        let child = *child;
        self.run(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM provenance_edges
                 WHERE parent_artifact_id = ?1 AND child_artifact_id = ?2",
                params![parent.to_hex(), child.to_hex()],
            )?;
            Ok(deleted > 0)
        })
        .await
    }
}
