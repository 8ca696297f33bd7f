//! Content hashing for interned mapping blobs
//!
//! Mapping bodies are deduplicated by their SHA-256. The digest is the
//! identity of the blob: two mappings with equal digests are the same
//! mapping, and the hash-keyed pool stores exactly one instance per digest.
//!
//! SHA-256 is used (rather than a fast non-cryptographic hash) because the
//! digest travels on the wire as a lookup key between nodes; it must be
//! deterministic cross-platform and collision-resistant across arbitrary
//! user-supplied mapping bodies.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{MetadataError, Result};

/// SHA-256 digest identifying a mapping body
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MappingHash([u8; 32]);

impl MappingHash {
    /// Digest the given mapping source bytes
    pub fn of(source: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source);
        MappingHash(hasher.finalize().into())
    }

    /// Raw digest bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Construct from raw digest bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        MappingHash(bytes)
    }

    /// Lowercase hex rendering of the digest
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a lowercase hex digest
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| MetadataError::CorruptMetadata(format!("invalid mapping hash: {}", e)))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            MetadataError::CorruptMetadata("mapping hash must be 32 bytes".to_string())
        })?;
        Ok(MappingHash(bytes))
    }
}

impl std::fmt::Display for MappingHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for MappingHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MappingHash({})", self.to_hex())
    }
}

impl TryFrom<String> for MappingHash {
    type Error = MetadataError;

    fn try_from(s: String) -> Result<Self> {
        MappingHash::from_hex(&s)
    }
}

impl From<MappingHash> for String {
    fn from(h: MappingHash) -> String {
        h.to_hex()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_content_equal_hash() {
        let a = MappingHash::of(br#"{"properties":{"f":{"type":"keyword"}}}"#);
        let b = MappingHash::of(br#"{"properties":{"f":{"type":"keyword"}}}"#);
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_content_different_hash() {
        let a = MappingHash::of(b"{}");
        let b = MappingHash::of(b"{ }");
        assert_ne!(a, b);
    }

    #[test]
    fn test_hex_roundtrip() {
        let h = MappingHash::of(b"mapping body");
        let parsed = MappingHash::from_hex(&h.to_hex()).unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn test_hex_length() {
        let h = MappingHash::of(b"x");
        assert_eq!(h.to_hex().len(), 64);
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        assert!(MappingHash::from_hex("zz").is_err());
        assert!(MappingHash::from_hex("abcd").is_err());
    }

    #[test]
    fn test_known_digest() {
        // sha-256 of the empty string
        let h = MappingHash::of(b"");
        assert_eq!(
            h.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
