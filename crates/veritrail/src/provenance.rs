//! The provenance graph.
//!
//! Directed `parent -> child` edges between artifacts. Each pair is linked at
//! most once and never to itself. Cycles through several artifacts are
//! possible and are not rejected, so traversals keep a visited set and a hard
//! depth bound.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use veritrail_core::{now_millis, ArtifactId, EventType, ProvenanceEdge};
use veritrail_store::{InsertResult, Store};

use crate::engine::Engine;
use crate::error::{EngineError, Result};

/// One artifact reached by a lineage traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineageEntry {
    pub artifact_id: ArtifactId,
    /// Edges between the start and this artifact; direct neighbours are 1.
    pub depth: usize,
    /// The edge through which the artifact was first reached.
    pub edge: ProvenanceEdge,
}

#[derive(Clone, Copy)]
enum Direction {
    Up,
    Down,
}

impl<S: Store> Engine<S> {
    /// Link `parent -> child`.
    ///
    /// Both artifacts must exist. Linking an already linked pair returns the
    /// stored edge unchanged, whatever `relation` is passed.
    pub async fn create_link(
        &self,
        parent: &ArtifactId,
        child: &ArtifactId,
        relation: &str,
    ) -> Result<ProvenanceEdge> {
        if parent == child {
            return Err(EngineError::Validation(format!(
                "artifact {} cannot be linked to itself",
                parent
            )));
        }
        if relation.is_empty() {
            return Err(EngineError::Validation("relation must not be empty".into()));
        }

        self.within(async {
            self.require_artifact(parent).await?;
            self.require_artifact(child).await?;

            let edge = ProvenanceEdge::new(*parent, *child, relation, now_millis());
            match self.store.insert_edge(&edge).await? {
                InsertResult::Inserted => {
                    info!(parent = %parent, child = %child, relation, "provenance link created");
                    self.audit(self.event(
                        *child,
                        EventType::Linked,
                        json!({
                            "edge_id": edge.edge_id,
                            "parent_artifact_id": parent,
                            "relation": relation,
                        }),
                    ))
                    .await;
                    Ok(edge)
                }
                InsertResult::AlreadyExists { existing } => {
                    debug!(edge_id = %existing.edge_id, "provenance link already exists");
                    Ok(existing)
                }
            }
        })
        .await
    }

    /// Edges leaving `parent`, optionally filtered by relation.
    pub async fn list_children(
        &self,
        parent: &ArtifactId,
        relation: Option<&str>,
    ) -> Result<Vec<ProvenanceEdge>> {
        self.within(async {
            self.require_artifact(parent).await?;
            Ok(self.store.children_of(parent, relation).await?)
        })
        .await
    }

    /// Edges arriving at `child`, optionally filtered by relation.
    pub async fn list_parents(
        &self,
        child: &ArtifactId,
        relation: Option<&str>,
    ) -> Result<Vec<ProvenanceEdge>> {
        self.within(async {
            self.require_artifact(child).await?;
            Ok(self.store.parents_of(child, relation).await?)
        })
        .await
    }

    /// Artifacts `id` derives from, nearest first, up to `max_depth` hops.
    pub async fn ancestors(&self, id: &ArtifactId, max_depth: usize) -> Result<Vec<LineageEntry>> {
        self.within(self.traverse(id, max_depth, Direction::Up)).await
    }

    /// Artifacts derived from `id`, nearest first, up to `max_depth` hops.
    pub async fn descendants(
        &self,
        id: &ArtifactId,
        max_depth: usize,
    ) -> Result<Vec<LineageEntry>> {
        self.within(self.traverse(id, max_depth, Direction::Down)).await
    }

    /// Remove the `parent -> child` edge. Returns whether one existed.
    ///
    /// Administrative only; nothing in normal operation deletes edges.
    pub async fn unlink(&self, parent: &ArtifactId, child: &ArtifactId) -> Result<bool> {
        let removed = self
            .within(async { Ok(self.store.delete_edge(parent, child).await?) })
            .await?;
        if removed {
            info!(parent = %parent, child = %child, "provenance link removed");
        }
        Ok(removed)
    }

    async fn traverse(
        &self,
        start: &ArtifactId,
        max_depth: usize,
        direction: Direction,
    ) -> Result<Vec<LineageEntry>> {
        self.require_artifact(start).await?;
        let max_depth = max_depth.min(self.config.max_traversal_depth);

        let mut visited = HashSet::new();
        visited.insert(*start);
        let mut result = Vec::new();
        let mut queue: VecDeque<(ArtifactId, usize)> = VecDeque::new();
        queue.push_back((*start, 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }

            let edges = match direction {
                Direction::Up => self.store.parents_of(&current, None).await?,
                Direction::Down => self.store.children_of(&current, None).await?,
            };

            for edge in edges {
                let next = match direction {
                    Direction::Up => edge.parent_artifact_id,
                    Direction::Down => edge.child_artifact_id,
                };
                if visited.insert(next) {
                    queue.push_back((next, depth + 1));
                    result.push(LineageEntry {
                        artifact_id: next,
                        depth: depth + 1,
                        edge,
                    });
                }
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Engine, EngineConfig, EngineError};
    use veritrail_core::{ArtifactId, EntityType, EventType, Metadata};
    use veritrail_store::MemoryStore;

    async fn setup(n: usize) -> (Engine<MemoryStore>, Vec<ArtifactId>) {
        let engine = Engine::with_local_ledger(
            MemoryStore::new(),
            EngineConfig::default().with_difficulty(1),
        )
        .unwrap();
        let mut ids = Vec::new();
        for i in 0..n {
            let id = engine
                .ingest_bytes(EntityType(1), format!("doc-{}", i).as_bytes(), None, Metadata::new())
                .await
                .unwrap();
            ids.push(id);
        }
        (engine, ids)
    }

    #[tokio::test]
    async fn test_link_is_idempotent() {
        let (engine, ids) = setup(2).await;
        let (a, c) = (ids[0], ids[1]);

        let first = engine.create_link(&a, &c, "derived_from").await.unwrap();
        let second = engine.create_link(&a, &c, "derived_from").await.unwrap();
        assert_eq!(first, second);

        let children = engine.list_children(&a, None).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].child_artifact_id, c);

        let linked = engine
            .events(&c)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.event_type == EventType::Linked)
            .count();
        assert_eq!(linked, 1);
    }

    #[tokio::test]
    async fn test_link_validation() {
        let (engine, ids) = setup(1).await;
        let a = ids[0];

        let err = engine.create_link(&a, &a, "self").await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let ghost = ArtifactId::generate();
        let err = engine.create_link(&a, &ghost, "derived_from").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        assert!(engine.list_children(&a, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fresh_artifact_has_no_links() {
        let (engine, ids) = setup(1).await;
        assert!(engine.list_parents(&ids[0], None).await.unwrap().is_empty());
        assert!(engine.list_children(&ids[0], None).await.unwrap().is_empty());
        assert!(engine.ancestors(&ids[0], 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_unknown_artifact_is_not_found() {
        let (engine, _) = setup(0).await;
        let ghost = ArtifactId::generate();

        let err = engine.list_children(&ghost, None).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        let err = engine.list_parents(&ghost, Some("derived_from")).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_relation_filter() {
        let (engine, ids) = setup(3).await;
        engine.create_link(&ids[0], &ids[1], "derived_from").await.unwrap();
        engine.create_link(&ids[0], &ids[2], "redacted_copy").await.unwrap();

        let redacted = engine
            .list_children(&ids[0], Some("redacted_copy"))
            .await
            .unwrap();
        assert_eq!(redacted.len(), 1);
        assert_eq!(redacted[0].child_artifact_id, ids[2]);

        let parents = engine.list_parents(&ids[1], Some("derived_from")).await.unwrap();
        assert_eq!(parents[0].parent_artifact_id, ids[0]);
    }

    #[tokio::test]
    async fn test_traversal_depth_and_order() {
        // 0 -> 1 -> 2 -> 3
        let (engine, ids) = setup(4).await;
        for w in ids.windows(2) {
            engine.create_link(&w[0], &w[1], "derived_from").await.unwrap();
        }

        let down = engine.descendants(&ids[0], 10).await.unwrap();
        let reached: Vec<(ArtifactId, usize)> =
            down.iter().map(|e| (e.artifact_id, e.depth)).collect();
        assert_eq!(reached, vec![(ids[1], 1), (ids[2], 2), (ids[3], 3)]);

        let bounded = engine.descendants(&ids[0], 2).await.unwrap();
        assert_eq!(bounded.len(), 2);

        let up = engine.ancestors(&ids[3], 10).await.unwrap();
        assert_eq!(up.first().unwrap().artifact_id, ids[2]);
        assert_eq!(up.last().unwrap().artifact_id, ids[0]);
        assert_eq!(up.last().unwrap().edge.child_artifact_id, ids[1]);
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        // 0 -> 1 -> 2 -> 0
        let (engine, ids) = setup(3).await;
        engine.create_link(&ids[0], &ids[1], "r").await.unwrap();
        engine.create_link(&ids[1], &ids[2], "r").await.unwrap();
        engine.create_link(&ids[2], &ids[0], "r").await.unwrap();

        let down = engine.descendants(&ids[0], 100).await.unwrap();
        assert_eq!(down.len(), 2);
        let up = engine.ancestors(&ids[0], 100).await.unwrap();
        assert_eq!(up.len(), 2);
    }

    #[tokio::test]
    async fn test_config_caps_depth() {
        let config = EngineConfig {
            max_traversal_depth: 1,
            ..EngineConfig::default().with_difficulty(1)
        };
        let engine = Engine::with_local_ledger(MemoryStore::new(), config).unwrap();
        let mut ids = Vec::new();
        for body in [b"a", b"b", b"c"] {
            ids.push(
                engine
                    .ingest_bytes(EntityType(1), body, None, Metadata::new())
                    .await
                    .unwrap(),
            );
        }
        engine.create_link(&ids[0], &ids[1], "r").await.unwrap();
        engine.create_link(&ids[1], &ids[2], "r").await.unwrap();

        assert_eq!(engine.descendants(&ids[0], 50).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unlink() {
        let (engine, ids) = setup(2).await;
        engine.create_link(&ids[0], &ids[1], "r").await.unwrap();

        assert!(engine.unlink(&ids[0], &ids[1]).await.unwrap());
        assert!(!engine.unlink(&ids[0], &ids[1]).await.unwrap());
        assert!(engine.list_children(&ids[0], None).await.unwrap().is_empty());
    }
}
