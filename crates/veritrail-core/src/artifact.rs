//! Artifacts and the records they own.
//!
//! An [`Artifact`] is identified for dedup purposes by
//! `(entity_type, content_hash)`. It owns its [`ArtifactFile`]s and its
//! append-only [`ArtifactEvent`] trail. A [`Baseline`] ties an external
//! reference id to the artifact whose hash later verifications compare against.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::digest::Sha256Digest;
use crate::types::{ArtifactId, EntityType};

/// Free-form artifact metadata. Keys are kept sorted.
pub type Metadata = BTreeMap<String, Value>;

/// A content-addressed artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Opaque identifier.
    pub id: ArtifactId,
    /// Category tag. Immutable.
    pub entity_type: EntityType,
    /// SHA-256 of the artifact content. Immutable.
    pub content_hash: Sha256Digest,
    /// Hash over the attached file manifest, once files exist.
    pub manifest_hash: Option<Sha256Digest>,
    /// Where the content was first ingested from.
    pub source_uri: Option<String>,
    /// Back-reference to the ledger transaction that sealed this artifact.
    pub ledger_tx_ref: Option<String>,
    /// Metadata; new keys may be merged in, existing keys are never replaced.
    pub metadata: Metadata,
    /// Creation time (Unix ms).
    pub created_at: i64,
}

impl Artifact {
    /// Create a new artifact with a freshly generated id.
    pub fn new(
        entity_type: EntityType,
        content_hash: Sha256Digest,
        source_uri: Option<String>,
        metadata: Metadata,
        now: i64,
    ) -> Self {
        Self {
            id: ArtifactId::generate(),
            entity_type,
            content_hash,
            manifest_hash: None,
            source_uri,
            ledger_tx_ref: None,
            metadata,
            created_at: now,
        }
    }
}

/// Merge `incoming` into `existing`, adding only keys not already present.
///
/// Returns the number of keys added.
pub fn merge_new_keys(existing: &mut Metadata, incoming: &Metadata) -> usize {
    let mut added = 0;
    for (key, value) in incoming {
        if !existing.contains_key(key) {
            existing.insert(key.clone(), value.clone());
            added += 1;
        }
    }
    added
}

/// Caller-supplied description of a file to attach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub uri: String,
    pub content_hash: Sha256Digest,
    pub size_bytes: u64,
    pub content_type: String,
}

/// A file belonging to exactly one artifact. Immutable once attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub artifact_id: ArtifactId,
    pub name: String,
    pub uri: String,
    pub content_hash: Sha256Digest,
    pub size_bytes: u64,
    pub content_type: String,
    /// When the file was attached (Unix ms).
    pub attached_at: i64,
}

impl ArtifactFile {
    pub fn new(artifact_id: ArtifactId, info: FileInfo, now: i64) -> Self {
        Self {
            artifact_id,
            name: info.name,
            uri: info.uri,
            content_hash: info.content_hash,
            size_bytes: info.size_bytes,
            content_type: info.content_type,
            attached_at: now,
        }
    }
}

/// Kind of an audit event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    Ingested,
    Sealed,
    Verified,
    FileAttached,
    Linked,
    /// Application-defined event kind.
    Other(String),
}

impl EventType {
    /// Stable string form used in storage and on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Ingested => "ingested",
            EventType::Sealed => "sealed",
            EventType::Verified => "verified",
            EventType::FileAttached => "file_attached",
            EventType::Linked => "linked",
            EventType::Other(s) => s,
        }
    }

    /// Parse from the stable string form. Unknown kinds become `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "ingested" => EventType::Ingested,
            "sealed" => EventType::Sealed,
            "verified" => EventType::Verified,
            "file_attached" => EventType::FileAttached,
            "linked" => EventType::Linked,
            other => EventType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(EventType::parse(&s))
    }
}

/// An append-only audit record attached to an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEvent {
    pub artifact_id: ArtifactId,
    pub event_type: EventType,
    pub actor: String,
    pub payload: Value,
    pub ledger_tx_ref: Option<String>,
    pub created_at: i64,
}

impl ArtifactEvent {
    pub fn new(
        artifact_id: ArtifactId,
        event_type: EventType,
        actor: impl Into<String>,
        payload: Value,
        now: i64,
    ) -> Self {
        Self {
            artifact_id,
            event_type,
            actor: actor.into(),
            payload,
            ledger_tx_ref: None,
            created_at: now,
        }
    }

    /// Attach a ledger transaction reference.
    pub fn with_ledger_tx_ref(mut self, tx_ref: impl Into<String>) -> Self {
        self.ledger_tx_ref = Some(tx_ref.into());
        self
    }
}

/// The stored hash an external reference id is verified against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    pub reference_id: String,
    pub artifact_id: ArtifactId,
    pub content_hash: Sha256Digest,
    /// When the baseline was recorded (Unix ms).
    pub recorded_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_merge_adds_only_new_keys() {
        let mut existing = Metadata::new();
        existing.insert("owner".into(), json!("alice"));

        let mut incoming = Metadata::new();
        incoming.insert("owner".into(), json!("mallory"));
        incoming.insert("pages".into(), json!(4));

        let added = merge_new_keys(&mut existing, &incoming);
        assert_eq!(added, 1);
        assert_eq!(existing["owner"], json!("alice"));
        assert_eq!(existing["pages"], json!(4));
    }

    #[test]
    fn test_event_type_string_forms() {
        for kind in [
            EventType::Ingested,
            EventType::Sealed,
            EventType::Verified,
            EventType::FileAttached,
            EventType::Linked,
        ] {
            assert_eq!(EventType::parse(kind.as_str()), kind);
        }
        assert_eq!(
            EventType::parse("exported"),
            EventType::Other("exported".into())
        );
    }

    #[test]
    fn test_new_artifact_has_no_seal() {
        let artifact = Artifact::new(
            EntityType(1),
            Sha256Digest::hash(b"doc"),
            None,
            Metadata::new(),
            1_700_000_000_000,
        );
        assert!(artifact.ledger_tx_ref.is_none());
        assert!(artifact.manifest_hash.is_none());
    }

    proptest! {
        #[test]
        fn merge_never_overwrites(
            existing in prop::collection::btree_map("[a-e]", any::<i32>(), 0..5),
            incoming in prop::collection::btree_map("[a-e]", any::<i32>(), 0..5),
        ) {
            let mut merged: Metadata = existing.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            let incoming: Metadata = incoming.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            merge_new_keys(&mut merged, &incoming);

            for (k, v) in &existing {
                prop_assert_eq!(&merged[k], &json!(v));
            }
            for k in incoming.keys() {
                prop_assert!(merged.contains_key(k));
            }
        }
    }
}
