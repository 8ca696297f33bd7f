//! Coordination metadata
//!
//! The consensus layer's durable footprint in the catalog: the current
//! term, the last committed and last accepted voting configurations, and
//! standing voting exclusions. This core carries and serializes the blob;
//! it does not interpret it.

use std::collections::BTreeSet;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use clustermeta_core::error::Result;
use clustermeta_core::simple_diffable;
use clustermeta_core::wire::{WireReadable, WireReader, WireWritable, WireWriter};

/// A node barred from voting configurations
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VotingConfigExclusion {
    /// Persistent node id
    pub node_id: String,
    /// Node name at exclusion time
    pub node_name: String,
}

impl WireWritable for VotingConfigExclusion {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_string(&self.node_id)?;
        out.write_string(&self.node_name)
    }
}

impl WireReadable for VotingConfigExclusion {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        Ok(VotingConfigExclusion {
            node_id: input.read_string()?,
            node_name: input.read_string()?,
        })
    }
}

/// The consensus layer's footprint in the catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinationMetadata {
    /// Current election term
    pub term: u64,
    /// Node ids of the last committed voting configuration
    pub last_committed_config: BTreeSet<String>,
    /// Node ids of the last accepted voting configuration
    pub last_accepted_config: BTreeSet<String>,
    /// Standing exclusions
    pub voting_config_exclusions: Vec<VotingConfigExclusion>,
}

simple_diffable!(CoordinationMetadata);

impl CoordinationMetadata {
    /// The empty blob (term 0, no configurations)
    pub fn new() -> CoordinationMetadata {
        CoordinationMetadata::default()
    }
}

impl WireWritable for CoordinationMetadata {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_vlong(self.term)?;
        let committed: Vec<String> = self.last_committed_config.iter().cloned().collect();
        out.write_string_collection(&committed)?;
        let accepted: Vec<String> = self.last_accepted_config.iter().cloned().collect();
        out.write_string_collection(&accepted)?;
        out.write_collection(&self.voting_config_exclusions, |out, e| e.write_to(out))
    }
}

impl WireReadable for CoordinationMetadata {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        Ok(CoordinationMetadata {
            term: input.read_vlong()?,
            last_committed_config: input.read_string_collection()?.into_iter().collect(),
            last_accepted_config: input.read_string_collection()?.into_iter().collect(),
            voting_config_exclusions: input.read_collection(VotingConfigExclusion::read_from)?,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clustermeta_core::version::TransportVersion;
    use clustermeta_core::wire::{from_bytes, to_bytes};

    #[test]
    fn test_wire_roundtrip() {
        let cm = CoordinationMetadata {
            term: 42,
            last_committed_config: ["n1".to_string(), "n2".to_string()].into_iter().collect(),
            last_accepted_config: ["n1".to_string(), "n2".to_string(), "n3".to_string()]
                .into_iter()
                .collect(),
            voting_config_exclusions: vec![VotingConfigExclusion {
                node_id: "old".to_string(),
                node_name: "old-name".to_string(),
            }],
        };
        let bytes = to_bytes(&cm, TransportVersion::CURRENT).unwrap();
        let decoded: CoordinationMetadata = from_bytes(&bytes, TransportVersion::CURRENT).unwrap();
        assert_eq!(decoded, cm);
    }

    #[test]
    fn test_default_is_empty() {
        let cm = CoordinationMetadata::new();
        assert_eq!(cm.term, 0);
        assert!(cm.last_committed_config.is_empty());
    }
}
