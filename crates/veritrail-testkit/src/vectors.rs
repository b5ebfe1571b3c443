//! Golden test vectors for deterministic hashing.
//!
//! These vectors pin the canonical encoding and the SHA-256 digests so that
//! any other implementation reading the same store agrees byte for byte.

use serde_json::Value;

use veritrail_core::{canonicalize, hash_bytes, hash_record};

/// Raw bytes and their SHA-256 digest.
#[derive(Debug, Clone)]
pub struct HashVector {
    pub name: &'static str,
    pub input: Vec<u8>,
    /// Expected digest (hex).
    pub expected_hash: &'static str,
}

/// A JSON record, its canonical form, and the digest of that form.
#[derive(Debug, Clone)]
pub struct RecordVector {
    pub name: &'static str,
    /// Input as JSON text; key order and whitespace are deliberately arbitrary.
    pub input_json: &'static str,
    pub expected_canonical: &'static str,
    /// Expected digest (hex).
    pub expected_hash: &'static str,
}

/// Get all byte-hashing vectors.
pub fn all_hash_vectors() -> Vec<HashVector> {
    vec![
        HashVector {
            name: "empty input",
            input: Vec::new(),
            expected_hash: "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        },
        HashVector {
            name: "abc",
            input: b"abc".to_vec(),
            expected_hash: "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
        },
        HashVector {
            name: "hello world",
            input: b"hello world".to_vec(),
            expected_hash: "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9",
        },
        HashVector {
            name: "quick brown fox",
            input: b"The quick brown fox jumps over the lazy dog".to_vec(),
            expected_hash: "d7a8fbb307d7809469ca9abcb0082e4f8d5651e46d3cdb762d02d0bf37c9e592",
        },
        HashVector {
            name: "one million a",
            input: vec![b'a'; 1_000_000],
            expected_hash: "cdc76e5c9914fb9281a1c7e284d73e67f1809a48a497200e046d39ccc7112cd0",
        },
    ]
}

/// Get all canonical record vectors.
pub fn all_record_vectors() -> Vec<RecordVector> {
    vec![
        RecordVector {
            name: "empty object",
            input_json: "{ }",
            expected_canonical: "{}",
            expected_hash: "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a",
        },
        RecordVector {
            name: "keys sorted",
            input_json: r#"{"b": 1, "a": 2}"#,
            expected_canonical: r#"{"a":2,"b":1}"#,
            expected_hash: "d3626ac30a87e6f7a6428233b3c68299976865fa5508e4267c5415c76af7a772",
        },
        RecordVector {
            name: "nested with null and non-ascii",
            input_json: r#"{"z": {"y": [3, 2, 1], "x": "é"}, "a": null}"#,
            expected_canonical: r#"{"a":null,"z":{"x":"é","y":[3,2,1]}}"#,
            expected_hash: "365497187b1c0bae6423e30d3d066280e45607cba6dc4eee65c8ecb8c979f039",
        },
        RecordVector {
            name: "escaped string",
            input_json: r#"{"msg": "line\nbreak \"q\""}"#,
            expected_canonical: r#"{"msg":"line\nbreak \"q\""}"#,
            expected_hash: "2c82363e3fe0bda51fe123d479d85344e81f56a5e13a029cebf4d21aeb3dc39a",
        },
        RecordVector {
            name: "numbers",
            input_json: r#"{"scaled": 100.0, "pi": 3.25, "neg": -7, "big": 18446744073709551615}"#,
            expected_canonical: r#"{"big":18446744073709551615,"neg":-7,"pi":3.25,"scaled":100.0}"#,
            expected_hash: "a1ebfe045b991fa4e1d47090807a3365587118a541c79f5f26893b288691d04a",
        },
        RecordVector {
            name: "booleans and empty array",
            input_json: r#"{"items": [], "flags": [true, false]}"#,
            expected_canonical: r#"{"flags":[true,false],"items":[]}"#,
            expected_hash: "26c87a19576b46af7a3b12bee7bba96e05ceded41298f5aef0e71e8dd6e453b7",
        },
    ]
}

/// Check every vector, returning the first mismatch.
pub fn verify_all_vectors() -> Result<(), String> {
    for v in all_hash_vectors() {
        let actual = hex::encode(hash_bytes(&v.input).as_bytes());
        if actual != v.expected_hash {
            return Err(format!(
                "{}: expected {}, got {}",
                v.name, v.expected_hash, actual
            ));
        }
    }

    for v in all_record_vectors() {
        let value: Value = serde_json::from_str(v.input_json)
            .map_err(|e| format!("{}: bad input: {}", v.name, e))?;
        let canonical = canonicalize(&value).map_err(|e| format!("{}: {}", v.name, e))?;
        if canonical != v.expected_canonical.as_bytes() {
            return Err(format!(
                "{}: expected {}, got {}",
                v.name,
                v.expected_canonical,
                String::from_utf8_lossy(&canonical)
            ));
        }
        let hash = hash_record(&value)
            .map_err(|e| format!("{}: {}", v.name, e))?
            .to_hex();
        if hash != v.expected_hash {
            return Err(format!("{}: expected {}, got {}", v.name, v.expected_hash, hash));
        }
    }

    Ok(())
}
