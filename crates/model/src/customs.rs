//! Registered custom metadata fragments
//!
//! A custom is a pluggable fragment of cluster metadata with its own wire
//! name, minimum supported version, and context set. The known variants are
//! a closed enum; variants written by newer peers that this build does not
//! recognize are preserved byte-for-byte as [`Custom::Unknown`] and
//! forwarded, never rejected; a reader that cannot use them logs a warning
//! and skips them.
//!
//! The wire framing is `name, vint payload length, payload bytes`, so a
//! reader can always carry an unrecognized payload without understanding
//! it.

use std::collections::VecDeque;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use clustermeta_core::error::Result;
use clustermeta_core::simple_diffable;
use clustermeta_core::version::TransportVersion;
use clustermeta_core::wire::{WireReadable, WireReader, WireWritable, WireWriter};

use crate::doc::ContextMode;
use crate::index::Index;
use crate::snapshots::SnapshotsInProgress;

/// Wire name of the index graveyard custom
pub const INDEX_GRAVEYARD_NAME: &str = "index-graveyard";

/// Wire name of the snapshots-in-progress custom
pub const SNAPSHOTS_NAME: &str = "snapshots";

/// Maximum tombstones retained in the graveyard
pub const GRAVEYARD_CAP: usize = 500;

/// A deleted index remembered so late-joining nodes drop local copies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tombstone {
    /// The deleted index
    pub index: Index,
    /// Deletion time, epoch millis
    pub delete_date_millis: i64,
}

impl WireWritable for Tombstone {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        self.index.write_to(out)?;
        out.write_i64(self.delete_date_millis)
    }
}

impl WireReadable for Tombstone {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        Ok(Tombstone {
            index: Index::read_from(input)?,
            delete_date_millis: input.read_i64()?,
        })
    }
}

/// Bounded ring of index tombstones
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexGraveyard {
    tombstones: VecDeque<Tombstone>,
}

impl IndexGraveyard {
    /// The empty graveyard
    pub fn new() -> IndexGraveyard {
        IndexGraveyard::default()
    }

    /// Tombstones, oldest first
    pub fn tombstones(&self) -> impl Iterator<Item = &Tombstone> {
        self.tombstones.iter()
    }

    /// Number of tombstones
    pub fn len(&self) -> usize {
        self.tombstones.len()
    }

    /// Whether the graveyard is empty
    pub fn is_empty(&self) -> bool {
        self.tombstones.is_empty()
    }

    /// Bury an index; the oldest tombstone falls out past the cap
    pub fn with_tombstone(&self, index: Index, delete_date_millis: i64) -> IndexGraveyard {
        let mut next = self.clone();
        next.tombstones.push_back(Tombstone {
            index,
            delete_date_millis,
        });
        while next.tombstones.len() > GRAVEYARD_CAP {
            next.tombstones.pop_front();
        }
        next
    }

    /// Whether an index uuid is buried here
    pub fn contains(&self, index_uuid: &str) -> bool {
        self.tombstones.iter().any(|t| t.index.uuid() == index_uuid)
    }
}

impl WireWritable for IndexGraveyard {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_vint(self.tombstones.len() as u32)?;
        for tombstone in &self.tombstones {
            tombstone.write_to(out)?;
        }
        Ok(())
    }
}

impl WireReadable for IndexGraveyard {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        let count = input.read_vint()? as usize;
        let mut tombstones = VecDeque::with_capacity(count.min(GRAVEYARD_CAP));
        for _ in 0..count {
            tombstones.push_back(Tombstone::read_from(input)?);
        }
        Ok(IndexGraveyard { tombstones })
    }
}

/// A registered cluster-metadata fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Custom {
    /// Tombstones of deleted indices
    IndexGraveyard(IndexGraveyard),
    /// In-flight snapshot and clone operations
    SnapshotsInProgress(SnapshotsInProgress),
    /// A fragment from a newer peer, carried verbatim
    Unknown {
        /// Wire name as received
        name: String,
        /// Raw payload as received
        payload: Vec<u8>,
        /// Minimum version the writer declared
        min_version: TransportVersion,
    },
}

simple_diffable!(Custom);

impl Custom {
    /// The wire name
    pub fn name(&self) -> &str {
        match self {
            Custom::IndexGraveyard(_) => INDEX_GRAVEYARD_NAME,
            Custom::SnapshotsInProgress(_) => SNAPSHOTS_NAME,
            Custom::Unknown { name, .. } => name,
        }
    }

    /// Oldest peer version that understands this fragment
    pub fn min_version(&self) -> TransportVersion {
        match self {
            Custom::IndexGraveyard(_) => TransportVersion::V_BASE,
            Custom::SnapshotsInProgress(_) => TransportVersion::V_BASE,
            Custom::Unknown { min_version, .. } => *min_version,
        }
    }

    /// Contexts this fragment is emitted in
    pub fn contexts(&self) -> &'static [ContextMode] {
        match self {
            Custom::IndexGraveyard(_) => &[ContextMode::Gateway],
            // Transient by nature: never persisted, never snapshotted.
            Custom::SnapshotsInProgress(_) => &[ContextMode::Api],
            // An unknown fragment's contexts are unknowable; it is carried
            // on the wire only and never emitted into documents.
            Custom::Unknown { .. } => &[],
        }
    }

    /// Whether a peer at `version` should receive this fragment
    pub fn supported_by(&self, version: TransportVersion) -> bool {
        version.supports(self.min_version())
    }
}

impl WireWritable for Custom {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_string(self.name())?;
        out.write_vint(self.min_version().id())?;
        match self {
            Custom::IndexGraveyard(graveyard) => {
                let mut payload = WireWriter::new(Vec::new(), out.version());
                graveyard.write_to(&mut payload)?;
                out.write_bytes(&payload.into_inner())
            }
            Custom::SnapshotsInProgress(snapshots) => {
                let mut payload = WireWriter::new(Vec::new(), out.version());
                snapshots.write_to(&mut payload)?;
                out.write_bytes(&payload.into_inner())
            }
            Custom::Unknown { payload, .. } => out.write_bytes(payload),
        }
    }
}

impl WireReadable for Custom {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        let name = input.read_string()?;
        let min_version = TransportVersion(input.read_vint()?);
        let payload = input.read_bytes()?;
        match name.as_str() {
            INDEX_GRAVEYARD_NAME => {
                let mut payload_reader = WireReader::new(payload.as_slice(), input.version());
                Ok(Custom::IndexGraveyard(IndexGraveyard::read_from(
                    &mut payload_reader,
                )?))
            }
            SNAPSHOTS_NAME => {
                let mut payload_reader = WireReader::new(payload.as_slice(), input.version());
                Ok(Custom::SnapshotsInProgress(SnapshotsInProgress::read_from(
                    &mut payload_reader,
                )?))
            }
            _ => {
                tracing::warn!(
                    custom = name.as_str(),
                    "skipping unrecognized metadata custom from a newer peer; payload preserved"
                );
                Ok(Custom::Unknown {
                    name,
                    payload,
                    min_version,
                })
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clustermeta_core::wire::{from_bytes, to_bytes};

    #[test]
    fn test_graveyard_cap() {
        let mut graveyard = IndexGraveyard::new();
        for i in 0..(GRAVEYARD_CAP + 10) {
            graveyard = graveyard.with_tombstone(Index::new(format!("idx-{}", i), "u"), i as i64);
        }
        assert_eq!(graveyard.len(), GRAVEYARD_CAP);
        // Oldest fell out
        assert_eq!(
            graveyard.tombstones().next().unwrap().index.name(),
            "idx-10"
        );
    }

    #[test]
    fn test_graveyard_contains_by_uuid() {
        let graveyard =
            IndexGraveyard::new().with_tombstone(Index::new("gone", "gone-uuid"), 1000);
        assert!(graveyard.contains("gone-uuid"));
        assert!(!graveyard.contains("other"));
    }

    #[test]
    fn test_graveyard_custom_wire_roundtrip() {
        let custom = Custom::IndexGraveyard(
            IndexGraveyard::new().with_tombstone(Index::new("gone", "u"), 5),
        );
        let bytes = to_bytes(&custom, TransportVersion::CURRENT).unwrap();
        let decoded: Custom = from_bytes(&bytes, TransportVersion::CURRENT).unwrap();
        assert_eq!(decoded, custom);
    }

    #[test]
    fn test_unknown_custom_preserved_verbatim() {
        let unknown = Custom::Unknown {
            name: "future-feature".to_string(),
            payload: vec![1, 2, 3, 4],
            min_version: TransportVersion::CURRENT,
        };
        let bytes = to_bytes(&unknown, TransportVersion::CURRENT).unwrap();
        let decoded: Custom = from_bytes(&bytes, TransportVersion::CURRENT).unwrap();
        assert_eq!(decoded, unknown);

        // Re-encoding forwards the exact same bytes
        let bytes_again = to_bytes(&decoded, TransportVersion::CURRENT).unwrap();
        assert_eq!(bytes_again, bytes);
    }

    #[test]
    fn test_supported_by() {
        let custom = Custom::Unknown {
            name: "x".to_string(),
            payload: vec![],
            min_version: TransportVersion::V_MAPPINGS_AS_HASH,
        };
        assert!(custom.supported_by(TransportVersion::CURRENT));
        assert!(!custom.supported_by(TransportVersion::V_BASE));
    }

    #[test]
    fn test_graveyard_context_is_gateway_only() {
        let custom = Custom::IndexGraveyard(IndexGraveyard::new());
        assert_eq!(custom.contexts(), &[ContextMode::Gateway]);
    }
}
