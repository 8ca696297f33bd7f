//! Mapping metadata and the hash-keyed mapping pool
//!
//! A mapping is the schema describing how documents in an index are indexed.
//! The body is opaque to this crate (an arbitrary JSON document); its
//! identity is its sha-256. Identical bodies are interned: every
//! `IndexMetadata` carrying the same mapping content references the single
//! [`MappingMetadata`] instance stored in the pool under that hash.
//!
//! ## Pool guarantees (post-build)
//!
//! - Any two indices of one `Metadata` whose mappings hash equal share the
//!   same `Arc<MappingMetadata>` by identity
//! - Every hash in the pool is referenced by at least one live index
//!   (garbage is purged at build time)
//!
//! The pool is carried forward into the next builder to avoid churn; the
//! purge runs only when a mutation could have orphaned a mapping.

use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use clustermeta_core::error::{MetadataError, Result};
use clustermeta_core::hash::MappingHash;
use clustermeta_core::wire::{WireReadable, WireReader, WireWritable, WireWriter};

/// An immutable mapping body with its content hash
#[derive(Clone, Serialize, Deserialize)]
pub struct MappingMetadata {
    source: serde_json::Value,
    hash: MappingHash,
}

impl MappingMetadata {
    /// Intern a parsed mapping body
    ///
    /// The hash is computed over the compact serialization of the parsed
    /// value, so two bodies that differ only in formatting share a hash.
    pub fn new(source: serde_json::Value) -> MappingMetadata {
        let bytes = serde_json::to_vec(&source).expect("JSON value serializes");
        let hash = MappingHash::of(&bytes);
        MappingMetadata { source, hash }
    }

    /// Parse raw mapping source bytes
    pub fn from_source_bytes(bytes: &[u8]) -> Result<MappingMetadata> {
        let source: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| MetadataError::CorruptMetadata(format!("invalid mapping source: {}", e)))?;
        Ok(MappingMetadata::new(source))
    }

    /// The mapping body
    pub fn source(&self) -> &serde_json::Value {
        &self.source
    }

    /// Content identity
    pub fn hash(&self) -> MappingHash {
        self.hash
    }

    /// Compact serialization of the body
    pub fn source_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.source).expect("JSON value serializes")
    }
}

impl PartialEq for MappingMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for MappingMetadata {}

impl std::fmt::Debug for MappingMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MappingMetadata({})", self.hash)
    }
}

impl WireWritable for MappingMetadata {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_bytes(&self.source_bytes())
    }
}

impl WireReadable for MappingMetadata {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        let bytes = input.read_bytes()?;
        MappingMetadata::from_source_bytes(&bytes)
    }
}

/// Content-addressed pool of interned mapping bodies
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingPool {
    by_hash: BTreeMap<MappingHash, Arc<MappingMetadata>>,
}

impl MappingPool {
    /// The empty pool
    pub fn new() -> MappingPool {
        MappingPool::default()
    }

    /// Intern a candidate mapping
    ///
    /// If a mapping with the same hash is already pooled, the stored
    /// instance is returned (the candidate is dropped); otherwise the
    /// candidate is inserted and returned.
    pub fn dedupe(&mut self, candidate: Arc<MappingMetadata>) -> Arc<MappingMetadata> {
        if let Some(existing) = self.by_hash.get(&candidate.hash()) {
            return Arc::clone(existing);
        }
        self.by_hash.insert(candidate.hash(), Arc::clone(&candidate));
        candidate
    }

    /// Drop every entry whose hash is not in `live`
    pub fn purge(&mut self, live: &HashSet<MappingHash>) {
        let before = self.by_hash.len();
        self.by_hash.retain(|hash, _| live.contains(hash));
        let purged = before - self.by_hash.len();
        if purged > 0 {
            tracing::debug!(purged, remaining = self.by_hash.len(), "purged unreferenced mappings");
        }
    }

    /// Look up a pooled mapping by hash
    pub fn get(&self, hash: &MappingHash) -> Option<&Arc<MappingMetadata>> {
        self.by_hash.get(hash)
    }

    /// Whether a hash is pooled
    pub fn contains(&self, hash: &MappingHash) -> bool {
        self.by_hash.contains_key(hash)
    }

    /// Number of distinct mappings
    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    /// Iterate pooled mappings in hash order
    pub fn iter(&self) -> impl Iterator<Item = (&MappingHash, &Arc<MappingMetadata>)> {
        self.by_hash.iter()
    }

    /// The set of pooled hashes
    pub fn hashes(&self) -> impl Iterator<Item = &MappingHash> {
        self.by_hash.keys()
    }
}

impl WireWritable for MappingPool {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_vint(self.by_hash.len() as u32)?;
        for mapping in self.by_hash.values() {
            mapping.write_to(out)?;
        }
        Ok(())
    }
}

impl WireReadable for MappingPool {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        let count = input.read_vint()? as usize;
        let mut pool = MappingPool::new();
        for _ in 0..count {
            let mapping = Arc::new(MappingMetadata::read_from(input)?);
            pool.by_hash.insert(mapping.hash(), mapping);
        }
        Ok(pool)
    }
}

// ============================================================================
// Tests
// ============================================================================
