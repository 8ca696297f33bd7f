//! Cluster member descriptors
//!
//! A [`DiscoveryNode`] is the immutable identity of one cluster member.
//! Equality is by **ephemeral id only**: the ephemeral id is minted once
//! per process lifetime, so a restarted node is a distinct peer even when
//! its persistent id matches. This keeps stale connections from being
//! silently routed to a new process.
//!
//! Roles travel on the wire as `(name, abbreviation, can_contain_data)`
//! triples. Role names received from newer peers that this build does not
//! know decode to [`DiscoveryNodeRole::Unknown`] and re-encode verbatim, so
//! a mixed-version cluster keeps operating.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use clustermeta_core::error::{MetadataError, Result};
use clustermeta_core::version::TransportVersion;
use clustermeta_core::wire::{WireReadable, WireReader, WireWritable, WireWriter};

/// A node role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DiscoveryNodeRole {
    /// Eligible to be elected master
    Master,
    /// General-purpose data node
    Data,
    /// Content-tier data node
    DataContent,
    /// Hot-tier data node
    DataHot,
    /// Warm-tier data node
    DataWarm,
    /// Cold-tier data node
    DataCold,
    /// Ingest pipeline execution
    Ingest,
    /// Remote-cluster client
    RemoteClusterClient,
    /// Transform execution
    Transform,
    /// Machine-learning jobs
    Ml,
    /// Master-eligible but never holds data or state
    VotingOnly,
    /// A role from a newer peer; preserved verbatim
    Unknown {
        /// Role name as received
        name: String,
        /// Abbreviation as received
        abbreviation: String,
        /// Data-bearing flag as received
        can_contain_data: bool,
    },
}

impl DiscoveryNodeRole {
    /// The role name
    pub fn role_name(&self) -> &str {
        match self {
            DiscoveryNodeRole::Master => "master",
            DiscoveryNodeRole::Data => "data",
            DiscoveryNodeRole::DataContent => "data_content",
            DiscoveryNodeRole::DataHot => "data_hot",
            DiscoveryNodeRole::DataWarm => "data_warm",
            DiscoveryNodeRole::DataCold => "data_cold",
            DiscoveryNodeRole::Ingest => "ingest",
            DiscoveryNodeRole::RemoteClusterClient => "remote_cluster_client",
            DiscoveryNodeRole::Transform => "transform",
            DiscoveryNodeRole::Ml => "ml",
            DiscoveryNodeRole::VotingOnly => "voting_only",
            DiscoveryNodeRole::Unknown { name, .. } => name,
        }
    }

    /// Single-character abbreviation used in compact renderings
    pub fn abbreviation(&self) -> &str {
        match self {
            DiscoveryNodeRole::Master => "m",
            DiscoveryNodeRole::Data => "d",
            DiscoveryNodeRole::DataContent => "s",
            DiscoveryNodeRole::DataHot => "h",
            DiscoveryNodeRole::DataWarm => "w",
            DiscoveryNodeRole::DataCold => "c",
            DiscoveryNodeRole::Ingest => "i",
            DiscoveryNodeRole::RemoteClusterClient => "r",
            DiscoveryNodeRole::Transform => "t",
            DiscoveryNodeRole::Ml => "l",
            DiscoveryNodeRole::VotingOnly => "v",
            DiscoveryNodeRole::Unknown { abbreviation, .. } => abbreviation,
        }
    }

    /// Whether shards may be allocated to a node with this role
    pub fn can_contain_data(&self) -> bool {
        match self {
            DiscoveryNodeRole::Data
            | DiscoveryNodeRole::DataContent
            | DiscoveryNodeRole::DataHot
            | DiscoveryNodeRole::DataWarm
            | DiscoveryNodeRole::DataCold => true,
            DiscoveryNodeRole::Unknown {
                can_contain_data, ..
            } => *can_contain_data,
            _ => false,
        }
    }

    /// Resolve a role name; unrecognized names become [`Unknown`]
    ///
    /// [`Unknown`]: DiscoveryNodeRole::Unknown
    pub fn resolve(name: &str, abbreviation: &str, can_contain_data: bool) -> DiscoveryNodeRole {
        match name {
            "master" => DiscoveryNodeRole::Master,
            "data" => DiscoveryNodeRole::Data,
            "data_content" => DiscoveryNodeRole::DataContent,
            "data_hot" => DiscoveryNodeRole::DataHot,
            "data_warm" => DiscoveryNodeRole::DataWarm,
            "data_cold" => DiscoveryNodeRole::DataCold,
            "ingest" => DiscoveryNodeRole::Ingest,
            "remote_cluster_client" => DiscoveryNodeRole::RemoteClusterClient,
            "transform" => DiscoveryNodeRole::Transform,
            "ml" => DiscoveryNodeRole::Ml,
            "voting_only" => DiscoveryNodeRole::VotingOnly,
            other => {
                tracing::warn!(role = other, "preserving unknown node role from a newer peer");
                DiscoveryNodeRole::Unknown {
                    name: other.to_string(),
                    abbreviation: abbreviation.to_string(),
                    can_contain_data,
                }
            }
        }
    }
}

impl PartialEq for DiscoveryNodeRole {
    /// A role is its wire triple; an `Unknown` carrying a known triple is
    /// the same role
    fn eq(&self, other: &Self) -> bool {
        self.role_name() == other.role_name()
            && self.abbreviation() == other.abbreviation()
            && self.can_contain_data() == other.can_contain_data()
    }
}

impl Eq for DiscoveryNodeRole {}

impl PartialOrd for DiscoveryNodeRole {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DiscoveryNodeRole {
    /// Roles sort by name so role sets serialize deterministically
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.role_name()
            .cmp(other.role_name())
            .then_with(|| self.abbreviation().cmp(other.abbreviation()))
            .then_with(|| self.can_contain_data().cmp(&other.can_contain_data()))
    }
}

impl WireWritable for DiscoveryNodeRole {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_string(self.role_name())?;
        out.write_string(self.abbreviation())?;
        out.write_bool(self.can_contain_data())
    }
}

impl WireReadable for DiscoveryNodeRole {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        let name = input.read_string()?;
        let abbreviation = input.read_string()?;
        let can_contain_data = input.read_bool()?;
        Ok(DiscoveryNodeRole::resolve(
            &name,
            &abbreviation,
            can_contain_data,
        ))
    }
}

/// A transport endpoint: published host name, ip literal, and port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportAddress {
    /// Published host name
    pub host: String,
    /// IP literal the transport is bound to
    pub address: String,
    /// Transport port
    pub port: u16,
}

impl TransportAddress {
    /// Create a transport address
    pub fn new(host: impl Into<String>, address: impl Into<String>, port: u16) -> TransportAddress {
        TransportAddress {
            host: host.into(),
            address: address.into(),
            port,
        }
    }
}

impl std::fmt::Display for TransportAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

impl WireWritable for TransportAddress {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_string(&self.host)?;
        out.write_string(&self.address)?;
        out.write_vint(u32::from(self.port))
    }
}

impl WireReadable for TransportAddress {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        let host = input.read_string()?;
        let address = input.read_string()?;
        let port = input.read_vint()?;
        let port = u16::try_from(port).map_err(|_| {
            MetadataError::CorruptMetadata(format!("transport port [{}] out of range", port))
        })?;
        Ok(TransportAddress {
            host,
            address,
            port,
        })
    }
}

/// Immutable descriptor of a cluster member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryNode {
    name: String,
    id: String,
    ephemeral_id: String,
    host_name: String,
    host_address: String,
    address: TransportAddress,
    attributes: BTreeMap<String, String>,
    roles: BTreeSet<DiscoveryNodeRole>,
    version: TransportVersion,
}

impl DiscoveryNode {
    /// Create a node descriptor
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        id: impl Into<String>,
        ephemeral_id: impl Into<String>,
        host_name: impl Into<String>,
        host_address: impl Into<String>,
        address: TransportAddress,
        attributes: BTreeMap<String, String>,
        roles: BTreeSet<DiscoveryNodeRole>,
        version: TransportVersion,
    ) -> DiscoveryNode {
        DiscoveryNode {
            name: name.into(),
            id: id.into(),
            ephemeral_id: ephemeral_id.into(),
            host_name: host_name.into(),
            host_address: host_address.into(),
            address,
            attributes,
            roles,
            version,
        }
    }

    /// Human-assigned node name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Persistent node id (survives restarts)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Per-process ephemeral id; the identity used for equality
    pub fn ephemeral_id(&self) -> &str {
        &self.ephemeral_id
    }

    /// Published host name
    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    /// Published host address
    pub fn host_address(&self) -> &str {
        &self.host_address
    }

    /// Transport endpoint
    pub fn address(&self) -> &TransportAddress {
        &self.address
    }

    /// Node attributes
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Sorted role set
    pub fn roles(&self) -> &BTreeSet<DiscoveryNodeRole> {
        &self.roles
    }

    /// Protocol version the node speaks
    pub fn version(&self) -> TransportVersion {
        self.version
    }

    /// Whether this node can hold shard data
    pub fn can_contain_data(&self) -> bool {
        self.roles.iter().any(|r| r.can_contain_data())
    }

    /// Whether this node is master-eligible
    pub fn is_master_eligible(&self) -> bool {
        self.roles.contains(&DiscoveryNodeRole::Master)
    }
}

impl PartialEq for DiscoveryNode {
    /// Ephemeral-id equality: a restarted process is a different peer
    fn eq(&self, other: &Self) -> bool {
        self.ephemeral_id == other.ephemeral_id
    }
}

impl Eq for DiscoveryNode {}

impl std::hash::Hash for DiscoveryNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ephemeral_id.hash(state);
    }
}

impl std::fmt::Display for DiscoveryNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}{{{}}}{{{}}}", self.name, self.id, self.address)
    }
}

impl WireWritable for DiscoveryNode {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_string(&self.name)?;
        out.write_string(&self.id)?;
        out.write_string(&self.ephemeral_id)?;
        out.write_string(&self.host_name)?;
        out.write_string(&self.host_address)?;
        self.address.write_to(out)?;
        out.write_string_map(&self.attributes)?;
        out.write_vint(self.roles.len() as u32)?;
        for role in &self.roles {
            role.write_to(out)?;
        }
        out.write_vint(self.version.id())
    }
}

impl WireReadable for DiscoveryNode {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        let name = input.read_string()?;
        let id = input.read_string()?;
        let ephemeral_id = input.read_string()?;
        let host_name = input.read_string()?;
        let host_address = input.read_string()?;
        let address = TransportAddress::read_from(input)?;
        let attributes = input.read_string_map()?;
        let role_count = input.read_vint()? as usize;
        let mut roles = BTreeSet::new();
        for _ in 0..role_count {
            roles.insert(DiscoveryNodeRole::read_from(input)?);
        }
        let version = TransportVersion(input.read_vint()?);
        Ok(DiscoveryNode {
            name,
            id,
            ephemeral_id,
            host_name,
            host_address,
            address,
            attributes,
            roles,
            version,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
