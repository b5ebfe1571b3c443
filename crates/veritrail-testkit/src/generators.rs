//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{Map, Value};

use veritrail_core::{ArtifactId, EntityType, Metadata, Sha256Digest};

/// Generate a random Sha256Digest.
pub fn sha256_digest() -> impl Strategy<Value = Sha256Digest> {
    any::<[u8; 32]>().prop_map(Sha256Digest::from_bytes)
}

/// Generate a random ArtifactId.
pub fn artifact_id() -> impl Strategy<Value = ArtifactId> {
    any::<[u8; 16]>().prop_map(ArtifactId::from_bytes)
}

pub fn entity_type() -> impl Strategy<Value = EntityType> {
    (1i64..=16).prop_map(EntityType)
}

/// Generate a relation name.
pub fn relation() -> impl Strategy<Value = String> {
    "[a-z][a-z_]{0,23}".prop_map(String::from)
}

/// Generate content bytes of at most `max_len`.
pub fn content(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a JSON scalar. Floats are finite.
pub fn json_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        any::<u64>().prop_map(Value::from),
        (-1.0e9f64..1.0e9).prop_map(Value::from),
        "\\PC{0,16}".prop_map(Value::String),
    ]
}

/// Generate a nested JSON value up to a small depth.
pub fn json_value() -> impl Strategy<Value = Value> {
    json_scalar().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z0-9_]{1,8}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Generate a JSON object.
pub fn json_object() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-z0-9_]{1,8}", json_value(), 0..8)
        .prop_map(|m| Value::Object(m.into_iter().collect()))
}

/// Generate artifact metadata.
pub fn metadata() -> impl Strategy<Value = Metadata> {
    prop::collection::btree_map("[a-z_]{1,10}", json_scalar(), 0..6)
}

/// Parameters for an ingest call.
#[derive(Debug, Clone)]
pub struct IngestParams {
    pub entity_type: EntityType,
    pub content: Vec<u8>,
    pub source_uri: Option<String>,
    pub metadata: Metadata,
}

impl Arbitrary for IngestParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            entity_type(),
            content(512),
            proptest::option::of("file:///[a-z]{1,12}\\.pdf"),
            metadata(),
        )
            .prop_map(|(entity_type, content, source_uri, metadata)| IngestParams {
                entity_type,
                content,
                source_uri,
                metadata,
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veritrail_core::{canonicalize, hash_record};

    proptest! {
        #[test]
        fn canonical_bytes_are_compact_json(record in json_object()) {
            let bytes = canonicalize(&record).unwrap();
            let reparsed: Value = serde_json::from_slice(&bytes).unwrap();
            prop_assert!(reparsed.is_object());
            prop_assert!(!bytes.contains(&b'\n'));
        }

        #[test]
        fn hash_record_is_deterministic(record in json_object()) {
            prop_assert_eq!(hash_record(&record).unwrap(), hash_record(&record).unwrap());
        }

        #[test]
        fn artifact_id_hex_round_trips(id in artifact_id()) {
            prop_assert_eq!(ArtifactId::from_hex(&id.to_hex()).unwrap(), id);
        }
    }
}
