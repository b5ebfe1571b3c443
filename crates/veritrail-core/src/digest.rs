//! SHA-256 digests of buffers, streams, and canonical records.
//!
//! Every entry point yields a [`Sha256Digest`], which renders as 64 lowercase
//! hex characters. All functions are pure in their input bytes.

use std::fmt;
use std::io::{ErrorKind, Read};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::canonical::canonicalize;
use crate::error::{CoreError, Result};

/// Default read size for [`hash_stream`].
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// A 32-byte SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sha256Digest(pub [u8; 32]);

impl Sha256Digest {
    /// Compute the SHA-256 digest of the given data.
    pub fn hash(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to a 64-character lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from exactly 64 hex characters (either case).
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != 64 {
            return Err(CoreError::InvalidHash(format!(
                "expected 64 hex characters, got {}",
                s.len()
            )));
        }
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidHash(e.to_string()))?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Number of leading zero hex nibbles in the rendered digest.
    pub fn leading_zero_nibbles(&self) -> u32 {
        let mut count = 0;
        for byte in self.0 {
            if byte == 0 {
                count += 2;
                continue;
            }
            if byte >> 4 == 0 {
                count += 1;
            }
            break;
        }
        count
    }

    /// The all-zero digest, used as the genesis sentinel.
    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SHA256({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Sha256Digest {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for Sha256Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Sha256Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Sha256Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Sha256Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Hash an in-memory buffer.
pub fn hash_bytes(data: &[u8]) -> Sha256Digest {
    Sha256Digest::hash(data)
}

/// Hash everything readable from `reader`, `chunk_size` bytes at a time.
///
/// Memory use is bounded by `chunk_size` regardless of the input length. A
/// zero chunk size is treated as 1.
pub fn hash_stream<R: Read>(mut reader: R, chunk_size: usize) -> Result<Sha256Digest> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Sha256Digest(hasher.finalize().into()))
}

/// Hash a structured record through its canonical encoding.
pub fn hash_record<T: Serialize + ?Sized>(record: &T) -> Result<Sha256Digest> {
    Ok(hash_bytes(&canonicalize(record)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    const EMPTY: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const ABC: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn test_hash_bytes_known_values() {
        assert_eq!(hash_bytes(b"").to_hex(), EMPTY);
        assert_eq!(hash_bytes(b"abc").to_hex(), ABC);
    }

    #[test]
    fn test_hash_stream_matches_hash_bytes() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        for chunk in [1, 7, 64, 4096, 1 << 20] {
            let streamed = hash_stream(&data[..], chunk).unwrap();
            assert_eq!(streamed, hash_bytes(&data), "chunk size {}", chunk);
        }
    }

    #[test]
    fn test_hash_stream_zero_chunk_size() {
        assert_eq!(hash_stream(&b"abc"[..], 0).unwrap().to_hex(), ABC);
    }

    #[test]
    fn test_hash_record_ignores_key_order() {
        let a = json!({"name": "deed", "pages": 3, "tags": ["x", "y"]});
        let b = json!({"tags": ["x", "y"], "pages": 3, "name": "deed"});
        assert_eq!(hash_record(&a).unwrap(), hash_record(&b).unwrap());
    }

    #[test]
    fn test_hash_record_rejects_nan() {
        #[derive(Serialize)]
        struct Reading {
            value: f64,
        }
        let err = hash_record(&Reading { value: f64::NAN }).unwrap_err();
        assert!(matches!(err, CoreError::EncodingError(_)));
    }

    #[test]
    fn test_from_hex_validation() {
        assert!(Sha256Digest::from_hex(ABC).is_ok());
        assert!(Sha256Digest::from_hex(&ABC.to_uppercase()).is_ok());
        assert!(Sha256Digest::from_hex(&ABC[..63]).is_err());
        assert!(Sha256Digest::from_hex(&format!("{}0", ABC)).is_err());
        let bad = format!("zz{}", &ABC[2..]);
        assert!(matches!(
            Sha256Digest::from_hex(&bad),
            Err(CoreError::InvalidHash(_))
        ));
    }

    #[test]
    fn test_uppercase_normalizes_to_lowercase() {
        let d = Sha256Digest::from_hex(&ABC.to_uppercase()).unwrap();
        assert_eq!(d.to_hex(), ABC);
    }

    #[test]
    fn test_leading_zero_nibbles() {
        let mut bytes = [0xffu8; 32];
        assert_eq!(Sha256Digest(bytes).leading_zero_nibbles(), 0);
        bytes[0] = 0x0f;
        assert_eq!(Sha256Digest(bytes).leading_zero_nibbles(), 1);
        bytes[0] = 0x00;
        bytes[1] = 0x01;
        assert_eq!(Sha256Digest(bytes).leading_zero_nibbles(), 3);
        assert_eq!(Sha256Digest::ZERO.leading_zero_nibbles(), 64);
    }

    #[test]
    fn test_serde_as_hex_string() {
        let d = hash_bytes(b"abc");
        let encoded = serde_json::to_string(&d).unwrap();
        assert_eq!(encoded, format!("\"{}\"", ABC));
        let decoded: Sha256Digest = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, d);
    }

    proptest! {
        #[test]
        fn hex_roundtrip(bytes in any::<[u8; 32]>()) {
            let d = Sha256Digest(bytes);
            let hex = d.to_hex();
            prop_assert_eq!(hex.len(), 64);
            prop_assert_eq!(Sha256Digest::from_hex(&hex).unwrap(), d);
        }
    }
}
