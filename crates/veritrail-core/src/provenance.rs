//! Provenance edges between artifacts.

use serde::{Deserialize, Serialize};

use crate::types::{ArtifactId, EdgeId};

/// A directed `parent -> child` relation between two artifacts.
///
/// `(parent_artifact_id, child_artifact_id)` is unique and the two ends
/// differ. Acyclicity is not enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceEdge {
    pub edge_id: EdgeId,
    pub parent_artifact_id: ArtifactId,
    pub child_artifact_id: ArtifactId,
    pub relation: String,
    pub created_at: i64,
}

impl ProvenanceEdge {
    pub fn new(parent: ArtifactId, child: ArtifactId, relation: impl Into<String>, now: i64) -> Self {
        Self {
            edge_id: EdgeId::derive(&parent, &child),
            parent_artifact_id: parent,
            child_artifact_id: child,
            relation: relation.into(),
            created_at: now,
        }
    }

    /// The artifact on the other end from `id`, if `id` is an endpoint.
    pub fn other_end(&self, id: &ArtifactId) -> Option<ArtifactId> {
        if &self.parent_artifact_id == id {
            Some(self.child_artifact_id)
        } else if &self.child_artifact_id == id {
            Some(self.parent_artifact_id)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_id_matches_pair() {
        let a = ArtifactId::from_bytes([1; 16]);
        let c = ArtifactId::from_bytes([3; 16]);
        let e1 = ProvenanceEdge::new(a, c, "derived_from", 1);
        let e2 = ProvenanceEdge::new(a, c, "derived_from", 2);
        assert_eq!(e1.edge_id, e2.edge_id);
        assert_eq!(e1.other_end(&a), Some(c));
        assert_eq!(e1.other_end(&c), Some(a));
        assert_eq!(e1.other_end(&ArtifactId::from_bytes([9; 16])), None);
    }
}
