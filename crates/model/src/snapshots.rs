//! In-flight snapshot and clone state
//!
//! [`SnapshotsInProgress`] tracks every backup operation the cluster is
//! currently running, keyed per repository, with per-shard sub-states. The
//! shard-snapshot coordinator walks the entry list in order; the
//! per-repository invariant (queued work is strictly later than active
//! work) is what lets it know it has seen all prior in-flight work for a
//! shard by the time it reaches a queued entry.
//!
//! ## Shard states
//!
//! | state   | completed | failed | wire byte |
//! |---------|-----------|--------|-----------|
//! | INIT    | no        | no     | 0         |
//! | SUCCESS | yes       | no     | 2         |
//! | FAILED  | yes       | yes    | 3         |
//! | ABORTED | no        | yes    | 4         |
//! | MISSING | yes       | yes    | 5         |
//! | WAITING | no        | no     | 6         |
//! | QUEUED  | no        | no     | 7         |
//!
//! The gap at 1 is preserved for wire compatibility.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use clustermeta_core::error::{MetadataError, Result};
use clustermeta_core::version::TransportVersion;
use clustermeta_core::wire::{WireReadable, WireReader, WireWritable, WireWriter};

use crate::index::Index;

/// Failure message set on aborted entries
pub const ABORTED_BY_DELETION: &str = "Snapshot was aborted by deletion";

const ABORTED_SHARD_REASON: &str = "aborted by snapshot deletion";

// ============================================================================
// Identities
// ============================================================================

/// A snapshot identity: user-visible name plus uuid
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotId {
    /// User-visible snapshot name
    pub name: String,
    /// Uuid minted when the snapshot started
    pub uuid: String,
}

impl SnapshotId {
    /// Create a snapshot id
    pub fn new(name: impl Into<String>, uuid: impl Into<String>) -> SnapshotId {
        SnapshotId {
            name: name.into(),
            uuid: uuid.into(),
        }
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.name, self.uuid)
    }
}

impl WireWritable for SnapshotId {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_string(&self.name)?;
        out.write_string(&self.uuid)
    }
}

impl WireReadable for SnapshotId {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        Ok(SnapshotId {
            name: input.read_string()?,
            uuid: input.read_string()?,
        })
    }
}

/// A snapshot within a repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Snapshot {
    /// Repository name
    pub repository: String,
    /// The snapshot id
    pub snapshot_id: SnapshotId,
}

impl Snapshot {
    /// Create a repository-qualified snapshot identity
    pub fn new(repository: impl Into<String>, snapshot_id: SnapshotId) -> Snapshot {
        Snapshot {
            repository: repository.into(),
            snapshot_id,
        }
    }
}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repository, self.snapshot_id)
    }
}

impl WireWritable for Snapshot {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_string(&self.repository)?;
        self.snapshot_id.write_to(out)
    }
}

impl WireReadable for Snapshot {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        Ok(Snapshot {
            repository: input.read_string()?,
            snapshot_id: SnapshotId::read_from(input)?,
        })
    }
}

/// An index as known to a repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexId {
    /// The index name at snapshot time
    pub name: String,
    /// Stable repository-side id
    pub id: String,
}

impl IndexId {
    /// Create an index id
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> IndexId {
        IndexId {
            name: name.into(),
            id: id.into(),
        }
    }
}

impl WireWritable for IndexId {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_string(&self.name)?;
        out.write_string(&self.id)
    }
}

impl WireReadable for IndexId {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        Ok(IndexId {
            name: input.read_string()?,
            id: input.read_string()?,
        })
    }
}

/// A shard coordinate on the local cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardId {
    /// The owning index
    pub index: Index,
    /// Shard number within the index
    pub shard: u32,
}

impl ShardId {
    /// Create a shard id
    pub fn new(index: Index, shard: u32) -> ShardId {
        ShardId { index, shard }
    }
}

impl std::fmt::Display for ShardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.index, self.shard)
    }
}

impl WireWritable for ShardId {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        self.index.write_to(out)?;
        out.write_vint(self.shard)
    }
}

impl WireReadable for ShardId {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        Ok(ShardId {
            index: Index::read_from(input)?,
            shard: input.read_vint()?,
        })
    }
}

/// A repository-relative shard coordinate
///
/// Clone work runs entirely against the repository, so its shard keys are
/// repository index ids, not local shard ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryShardId {
    /// The index as the repository knows it
    pub index: IndexId,
    /// Shard number within the index
    pub shard: u32,
}

impl RepositoryShardId {
    /// Create a repository shard id
    pub fn new(index: IndexId, shard: u32) -> RepositoryShardId {
        RepositoryShardId { index, shard }
    }
}

impl std::fmt::Display for RepositoryShardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{}][{}]", self.index.name, self.index.id, self.shard)
    }
}

impl WireWritable for RepositoryShardId {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        self.index.write_to(out)?;
        out.write_vint(self.shard)
    }
}

impl WireReadable for RepositoryShardId {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        Ok(RepositoryShardId {
            index: IndexId::read_from(input)?,
            shard: input.read_vint()?,
        })
    }
}

/// A feature state captured by a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFeatureState {
    /// Feature name
    pub feature_name: String,
    /// System indices owned by the feature
    pub indices: Vec<String>,
}

impl WireWritable for SnapshotFeatureState {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_string(&self.feature_name)?;
        out.write_string_collection(&self.indices)
    }
}

impl WireReadable for SnapshotFeatureState {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        Ok(SnapshotFeatureState {
            feature_name: input.read_string()?,
            indices: input.read_string_collection()?,
        })
    }
}

// ============================================================================
// Shard states
// ============================================================================

/// Per-shard snapshot state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShardState {
    /// Assigned to a node, not yet started
    Init,
    /// Shard data written to the repository
    Success,
    /// Terminally failed
    Failed,
    /// Abort requested, node not yet confirmed
    Aborted,
    /// Shard disappeared before it could be snapshotted
    Missing,
    /// Waiting for the shard to become available
    Waiting,
    /// Held behind earlier in-flight work on the same shard
    Queued,
}

impl ShardState {
    /// Terminal states
    pub fn completed(&self) -> bool {
        matches!(self, ShardState::Success | ShardState::Failed | ShardState::Missing)
    }

    /// States that count as failures
    pub fn failed(&self) -> bool {
        matches!(self, ShardState::Failed | ShardState::Aborted | ShardState::Missing)
    }

    /// Fixed wire byte (gap at 1 preserved)
    pub fn as_byte(&self) -> u8 {
        match self {
            ShardState::Init => 0,
            ShardState::Success => 2,
            ShardState::Failed => 3,
            ShardState::Aborted => 4,
            ShardState::Missing => 5,
            ShardState::Waiting => 6,
            ShardState::Queued => 7,
        }
    }

    /// Decode the wire byte
    pub fn from_byte(byte: u8) -> Result<ShardState> {
        match byte {
            0 => Ok(ShardState::Init),
            2 => Ok(ShardState::Success),
            3 => Ok(ShardState::Failed),
            4 => Ok(ShardState::Aborted),
            5 => Ok(ShardState::Missing),
            6 => Ok(ShardState::Waiting),
            7 => Ok(ShardState::Queued),
            b => Err(MetadataError::CorruptMetadata(format!(
                "unexpected shard snapshot state byte [{}]",
                b
            ))),
        }
    }
}

/// Result of a successfully snapshotted shard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardSnapshotResult {
    /// Repository generation token written by this shard
    pub generation: String,
    /// Total size of the shard snapshot in bytes
    pub size_in_bytes: u64,
    /// Number of segments in the shard snapshot
    pub segment_count: u32,
}

impl WireWritable for ShardSnapshotResult {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_string(&self.generation)?;
        out.write_vlong(self.size_in_bytes)?;
        out.write_vint(self.segment_count)
    }
}

impl WireReadable for ShardSnapshotResult {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        Ok(ShardSnapshotResult {
            generation: input.read_string()?,
            size_in_bytes: input.read_vlong()?,
            segment_count: input.read_vint()?,
        })
    }
}

/// Status of one shard within an in-flight snapshot
///
/// ## Invariants
///
/// - `result` is present only in SUCCESS
/// - failed states carry a `reason`
/// - QUEUED carries no node id, generation, or reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardSnapshotStatus {
    node_id: Option<String>,
    state: ShardState,
    generation: Option<String>,
    reason: Option<String>,
    result: Option<ShardSnapshotResult>,
}

impl ShardSnapshotStatus {
    /// INIT on a node
    pub fn init(node_id: impl Into<String>, generation: Option<String>) -> ShardSnapshotStatus {
        ShardSnapshotStatus {
            node_id: Some(node_id.into()),
            state: ShardState::Init,
            generation,
            reason: None,
            result: None,
        }
    }

    /// WAITING on a node
    pub fn waiting(node_id: impl Into<String>, generation: Option<String>) -> ShardSnapshotStatus {
        ShardSnapshotStatus {
            node_id: Some(node_id.into()),
            state: ShardState::Waiting,
            generation,
            reason: None,
            result: None,
        }
    }

    /// SUCCESS with its result
    pub fn success(node_id: Option<String>, result: ShardSnapshotResult) -> ShardSnapshotStatus {
        ShardSnapshotStatus {
            node_id,
            state: ShardState::Success,
            generation: Some(result.generation.clone()),
            reason: None,
            result: Some(result),
        }
    }

    /// A terminal failure with a reason
    pub fn failed(
        node_id: Option<String>,
        state: ShardState,
        reason: impl Into<String>,
        generation: Option<String>,
    ) -> Result<ShardSnapshotStatus> {
        if !state.failed() {
            return Err(MetadataError::InvalidInput(format!(
                "state [{:?}] is not a failure state",
                state
            )));
        }
        Ok(ShardSnapshotStatus {
            node_id,
            state,
            generation,
            reason: Some(reason.into()),
            result: None,
        })
    }

    /// MISSING with a reason
    pub fn missing(reason: impl Into<String>) -> ShardSnapshotStatus {
        ShardSnapshotStatus {
            node_id: None,
            state: ShardState::Missing,
            generation: None,
            reason: Some(reason.into()),
            result: None,
        }
    }

    /// The QUEUED sentinel: no node, no generation, no reason
    pub fn queued() -> ShardSnapshotStatus {
        ShardSnapshotStatus {
            node_id: None,
            state: ShardState::Queued,
            generation: None,
            reason: None,
            result: None,
        }
    }

    /// The node assigned to the shard, if any
    pub fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }

    /// The shard state
    pub fn state(&self) -> ShardState {
        self.state
    }

    /// The repository generation token
    pub fn generation(&self) -> Option<&str> {
        self.generation.as_deref()
    }

    /// The failure reason
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// The shard result (SUCCESS only)
    pub fn result(&self) -> Option<&ShardSnapshotResult> {
        self.result.as_ref()
    }
}

impl WireWritable for ShardSnapshotStatus {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_byte(self.state.as_byte())?;
        out.write_optional_string(self.node_id.as_deref())?;
        out.write_optional_string(self.generation.as_deref())?;
        out.write_optional_string(self.reason.as_deref())?;
        if self.state == ShardState::Success {
            self.result
                .as_ref()
                .ok_or_else(|| {
                    MetadataError::InvalidState(
                        "successful shard snapshot status without a result".to_string(),
                    )
                })?
                .write_to(out)?;
        }
        Ok(())
    }
}

impl WireReadable for ShardSnapshotStatus {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        let state = ShardState::from_byte(input.read_byte()?)?;
        let node_id = input.read_optional_string()?;
        let generation = input.read_optional_string()?;
        let reason = input.read_optional_string()?;
        let result = if state == ShardState::Success {
            Some(ShardSnapshotResult::read_from(input)?)
        } else {
            None
        };
        Ok(ShardSnapshotStatus {
            node_id,
            state,
            generation,
            reason,
            result,
        })
    }
}

// ============================================================================
// Entries
// ============================================================================

/// Top-level state of an in-flight snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryState {
    /// Created, no shards assigned yet
    Init,
    /// Shard work in progress
    Started,
    /// Every shard completed without failure
    Success,
    /// Completed with failures
    Failed,
    /// Abort requested
    Aborted,
}

impl EntryState {
    /// Whether the entry is in a terminal state
    pub fn completed(&self) -> bool {
        matches!(self, EntryState::Success | EntryState::Failed)
    }

    /// Fixed wire byte
    pub fn as_byte(&self) -> u8 {
        match self {
            EntryState::Init => 0,
            EntryState::Started => 1,
            EntryState::Success => 2,
            EntryState::Failed => 3,
            EntryState::Aborted => 4,
        }
    }

    /// Decode the wire byte
    pub fn from_byte(byte: u8) -> Result<EntryState> {
        match byte {
            0 => Ok(EntryState::Init),
            1 => Ok(EntryState::Started),
            2 => Ok(EntryState::Success),
            3 => Ok(EntryState::Failed),
            4 => Ok(EntryState::Aborted),
            b => Err(MetadataError::CorruptMetadata(format!(
                "unexpected snapshot state byte [{}]",
                b
            ))),
        }
    }
}

/// Whether every status in a shard map is completed
pub fn completed<'a, I: IntoIterator<Item = &'a ShardSnapshotStatus>>(shards: I) -> bool {
    shards.into_iter().all(|s| s.state().completed())
}

/// Whether any status in a shard map failed
pub fn has_failures<'a, I: IntoIterator<Item = &'a ShardSnapshotStatus>>(shards: I) -> bool {
    shards.into_iter().any(|s| s.state().failed())
}

/// One in-flight snapshot or clone operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    snapshot: Snapshot,
    include_global_state: bool,
    partial: bool,
    state: EntryState,
    indices: Vec<IndexId>,
    data_streams: Vec<String>,
    feature_states: Vec<SnapshotFeatureState>,
    start_time_millis: i64,
    repository_state_id: i64,
    shards: BTreeMap<ShardId, ShardSnapshotStatus>,
    failure: Option<String>,
    user_metadata: Option<BTreeMap<String, serde_json::Value>>,
    version: TransportVersion,
    source: Option<SnapshotId>,
    clones: BTreeMap<RepositoryShardId, ShardSnapshotStatus>,
}

impl Entry {
    /// A started backup entry; state derives from the shard map
    #[allow(clippy::too_many_arguments)]
    pub fn started(
        snapshot: Snapshot,
        include_global_state: bool,
        partial: bool,
        indices: Vec<IndexId>,
        data_streams: Vec<String>,
        feature_states: Vec<SnapshotFeatureState>,
        start_time_millis: i64,
        repository_state_id: i64,
        shards: BTreeMap<ShardId, ShardSnapshotStatus>,
        user_metadata: Option<BTreeMap<String, serde_json::Value>>,
        version: TransportVersion,
    ) -> Entry {
        let state = if completed(shards.values()) {
            EntryState::Success
        } else {
            EntryState::Started
        };
        Entry {
            snapshot,
            include_global_state,
            partial,
            state,
            indices,
            data_streams,
            feature_states,
            start_time_millis,
            repository_state_id,
            shards,
            failure: None,
            user_metadata,
            version,
            source: None,
            clones: BTreeMap::new(),
        }
    }

    /// A clone entry: repository-to-repository copy of `source`
    ///
    /// Clone work never lands on data nodes; the clone shard map is keyed
    /// by repository shard coordinates and starts empty.
    pub fn clone_entry(
        snapshot: Snapshot,
        source: SnapshotId,
        indices: Vec<IndexId>,
        start_time_millis: i64,
        repository_state_id: i64,
        version: TransportVersion,
    ) -> Entry {
        Entry {
            snapshot,
            include_global_state: false,
            partial: false,
            state: EntryState::Started,
            indices,
            data_streams: Vec::new(),
            feature_states: Vec::new(),
            start_time_millis,
            repository_state_id,
            shards: BTreeMap::new(),
            failure: None,
            user_metadata: None,
            version,
            source: Some(source),
            clones: BTreeMap::new(),
        }
    }

    /// The repository-qualified snapshot identity
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// The repository this entry belongs to
    pub fn repository(&self) -> &str {
        &self.snapshot.repository
    }

    /// Whether the global cluster state is included
    pub fn include_global_state(&self) -> bool {
        self.include_global_state
    }

    /// Whether missing shards are tolerated
    pub fn partial(&self) -> bool {
        self.partial
    }

    /// The top-level state
    pub fn state(&self) -> EntryState {
        self.state
    }

    /// Snapshotted indices
    pub fn indices(&self) -> &[IndexId] {
        &self.indices
    }

    /// Snapshotted data streams
    pub fn data_streams(&self) -> &[String] {
        &self.data_streams
    }

    /// Captured feature states
    pub fn feature_states(&self) -> &[SnapshotFeatureState] {
        &self.feature_states
    }

    /// Start time, epoch millis
    pub fn start_time_millis(&self) -> i64 {
        self.start_time_millis
    }

    /// Repository state id the entry was planned against
    pub fn repository_state_id(&self) -> i64 {
        self.repository_state_id
    }

    /// Per-shard status (backup entries; empty for clones)
    pub fn shards(&self) -> &BTreeMap<ShardId, ShardSnapshotStatus> {
        &self.shards
    }

    /// The failure message, if any
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Opaque user metadata
    pub fn user_metadata(&self) -> Option<&BTreeMap<String, serde_json::Value>> {
        self.user_metadata.as_ref()
    }

    /// Target snapshot format version
    pub fn version(&self) -> TransportVersion {
        self.version
    }

    /// The clone source, when this is a clone entry
    pub fn source(&self) -> Option<&SnapshotId> {
        self.source.as_ref()
    }

    /// Per-shard clone status (clone entries; empty for backups)
    pub fn clones(&self) -> &BTreeMap<RepositoryShardId, ShardSnapshotStatus> {
        &self.clones
    }

    /// Whether this is a clone entry
    pub fn is_clone(&self) -> bool {
        self.source.is_some()
    }

    /// Replace the shard map; completion promotes the entry to SUCCESS
    pub fn with_shard_states(&self, shards: BTreeMap<ShardId, ShardSnapshotStatus>) -> Entry {
        let mut next = self.clone();
        if completed(shards.values()) {
            next.state = EntryState::Success;
        }
        next.shards = shards;
        next
    }

    /// Replace the clone map; completion derives SUCCESS or FAILED
    pub fn with_clones(&self, clones: BTreeMap<RepositoryShardId, ShardSnapshotStatus>) -> Entry {
        let mut next = self.clone();
        if completed(clones.values()) {
            next.state = if has_failures(clones.values()) {
                EntryState::Failed
            } else {
                EntryState::Success
            };
        }
        next.clones = clones;
        next
    }

    /// Abort the entry
    ///
    /// Every incomplete shard with an assigned node transitions to ABORTED
    /// (the node will receive the abort); an incomplete shard without a node
    /// is failed directly. Queued shards stay queued: nothing has started
    /// for them. Returns `None` when every shard was queued, in which case
    /// the caller removes the entry outright.
    pub fn abort(&self) -> Option<Entry> {
        let mut all_queued = true;
        let mut shards = BTreeMap::new();
        for (shard_id, status) in &self.shards {
            all_queued &= status.state() == ShardState::Queued;
            let next_status = if status.state().completed() || status.state() == ShardState::Queued
            {
                status.clone()
            } else {
                match status.node_id() {
                    Some(node) => ShardSnapshotStatus {
                        node_id: Some(node.to_string()),
                        state: ShardState::Aborted,
                        generation: status.generation.clone(),
                        reason: Some(ABORTED_SHARD_REASON.to_string()),
                        result: None,
                    },
                    None => ShardSnapshotStatus {
                        node_id: None,
                        state: ShardState::Failed,
                        generation: status.generation.clone(),
                        reason: Some(ABORTED_SHARD_REASON.to_string()),
                        result: None,
                    },
                }
            };
            shards.insert(shard_id.clone(), next_status);
        }
        if all_queued {
            return None;
        }
        let mut next = self.clone();
        next.state = if completed(shards.values()) {
            EntryState::Success
        } else {
            EntryState::Aborted
        };
        next.shards = shards;
        next.failure = Some(ABORTED_BY_DELETION.to_string());
        Some(next)
    }
}

impl WireWritable for Entry {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        self.snapshot.write_to(out)?;
        out.write_bool(self.include_global_state)?;
        out.write_bool(self.partial)?;
        out.write_byte(self.state.as_byte())?;
        out.write_collection(&self.indices, |out, i| i.write_to(out))?;
        out.write_i64(self.start_time_millis)?;
        out.write_vint(self.shards.len() as u32)?;
        for (shard_id, status) in &self.shards {
            shard_id.write_to(out)?;
            status.write_to(out)?;
        }
        out.write_i64(self.repository_state_id)?;
        out.write_optional_string(self.failure.as_deref())?;
        out.write_optional(self.user_metadata.as_ref(), |out, m| {
            out.write_map(m, |out, v| {
                let bytes = serde_json::to_vec(v).expect("JSON value serializes");
                out.write_bytes(&bytes)
            })
        })?;
        out.write_vint(self.version.id())?;
        out.write_string_collection(&self.data_streams)?;
        if out.version().supports(TransportVersion::V_CLONE_SOURCE) {
            out.write_optional(self.source.as_ref(), |out, s| s.write_to(out))?;
            out.write_vint(self.clones.len() as u32)?;
            for (shard_id, status) in &self.clones {
                shard_id.write_to(out)?;
                status.write_to(out)?;
            }
        }
        if out.version().supports(TransportVersion::V_FEATURE_STATES) {
            out.write_collection(&self.feature_states, |out, f| f.write_to(out))?;
        }
        Ok(())
    }
}

impl WireReadable for Entry {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        let snapshot = Snapshot::read_from(input)?;
        let include_global_state = input.read_bool()?;
        let partial = input.read_bool()?;
        let state = EntryState::from_byte(input.read_byte()?)?;
        let indices = input.read_collection(IndexId::read_from)?;
        let start_time_millis = input.read_i64()?;
        let shard_count = input.read_vint()? as usize;
        let mut shards = BTreeMap::new();
        for _ in 0..shard_count {
            let shard_id = ShardId::read_from(input)?;
            let status = ShardSnapshotStatus::read_from(input)?;
            shards.insert(shard_id, status);
        }
        let repository_state_id = input.read_i64()?;
        let failure = input.read_optional_string()?;
        let user_metadata = input.read_optional(|input| {
            input.read_map(|input| {
                let bytes = input.read_bytes()?;
                serde_json::from_slice(&bytes).map_err(|e| {
                    MetadataError::CorruptMetadata(format!("invalid user metadata: {}", e))
                })
            })
        })?;
        let version = TransportVersion(input.read_vint()?);
        let data_streams = input.read_string_collection()?;
        let (source, clones) = if input.version().supports(TransportVersion::V_CLONE_SOURCE) {
            let source = input.read_optional(SnapshotId::read_from)?;
            let clone_count = input.read_vint()? as usize;
            let mut clones = BTreeMap::new();
            for _ in 0..clone_count {
                let shard_id = RepositoryShardId::read_from(input)?;
                let status = ShardSnapshotStatus::read_from(input)?;
                clones.insert(shard_id, status);
            }
            (source, clones)
        } else {
            (None, BTreeMap::new())
        };
        let feature_states = if input.version().supports(TransportVersion::V_FEATURE_STATES) {
            input.read_collection(SnapshotFeatureState::read_from)?
        } else {
            Vec::new()
        };
        Ok(Entry {
            snapshot,
            include_global_state,
            partial,
            state,
            indices,
            data_streams,
            feature_states,
            start_time_millis,
            repository_state_id,
            shards,
            failure,
            user_metadata,
            version,
            source,
            clones,
        })
    }
}

// ============================================================================
// SnapshotsInProgress
// ============================================================================

/// The ordered list of in-flight snapshot entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotsInProgress {
    entries: Vec<Entry>,
}

impl SnapshotsInProgress {
    /// No snapshots running
    pub fn empty() -> SnapshotsInProgress {
        SnapshotsInProgress::default()
    }

    /// Build from entries, checking the per-repository invariants
    pub fn new(entries: Vec<Entry>) -> Result<SnapshotsInProgress> {
        let sip = SnapshotsInProgress { entries };
        sip.assert_consistency()?;
        Ok(sip)
    }

    /// All entries in insertion order
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Whether any snapshot is in flight
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries of one repository, in list order
    pub fn for_repository<'a>(&'a self, repository: &'a str) -> impl Iterator<Item = &'a Entry> {
        self.entries
            .iter()
            .filter(move |e| e.repository() == repository)
    }

    /// Append an entry, re-checking invariants
    pub fn with_entry_added(&self, entry: Entry) -> Result<SnapshotsInProgress> {
        let mut entries = self.entries.clone();
        entries.push(entry);
        SnapshotsInProgress::new(entries)
    }

    /// Replace all entries of one repository
    ///
    /// Entries of other repositories keep their relative order; the new
    /// entries for `repository` are appended after them.
    pub fn with_repository_entries(
        &self,
        repository: &str,
        new_entries: Vec<Entry>,
    ) -> Result<SnapshotsInProgress> {
        let mut entries: Vec<Entry> = self
            .entries
            .iter()
            .filter(|e| e.repository() != repository)
            .cloned()
            .collect();
        entries.extend(new_entries);
        SnapshotsInProgress::new(entries)
    }

    /// Per-repository invariants
    ///
    /// Walking a repository's entries in order, once a shard has appeared
    /// QUEUED, no later entry may hold that shard in an active state; and a
    /// completed entry must have every shard completed.
    fn assert_consistency(&self) -> Result<()> {
        use std::collections::{HashMap, HashSet};
        // repository -> shards seen QUEUED in earlier entries
        let mut queued: HashMap<&str, HashSet<(&str, u32)>> = HashMap::new();
        for entry in &self.entries {
            let repo_queued = queued.entry(entry.repository()).or_default();
            let statuses: Vec<((&str, u32), &ShardSnapshotStatus)> = entry
                .shards
                .iter()
                .map(|(k, v)| ((k.index.name(), k.shard), v))
                .chain(
                    entry
                        .clones
                        .iter()
                        .map(|(k, v)| ((k.index.name.as_str(), k.shard), v)),
                )
                .collect();
            if entry.state().completed() && !completed(statuses.iter().map(|(_, s)| *s)) {
                return Err(MetadataError::InvalidState(format!(
                    "snapshot [{}] is in state [{:?}] but has incomplete shards",
                    entry.snapshot(),
                    entry.state()
                )));
            }
            for (coord, status) in &statuses {
                let active = matches!(
                    status.state(),
                    ShardState::Init | ShardState::Aborted | ShardState::Waiting
                );
                if active && repo_queued.contains(coord) {
                    return Err(MetadataError::InvalidState(format!(
                        "snapshot [{}] has active shard [{}/{}] behind a queued entry of the same repository",
                        entry.snapshot(),
                        coord.0,
                        coord.1
                    )));
                }
            }
            for (coord, status) in &statuses {
                if status.state() == ShardState::Queued {
                    repo_queued.insert(*coord);
                }
            }
        }
        Ok(())
    }
}

impl WireWritable for SnapshotsInProgress {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_collection(&self.entries, |out, e| e.write_to(out))
    }
}

impl WireReadable for SnapshotsInProgress {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        let entries = input.read_collection(Entry::read_from)?;
        SnapshotsInProgress::new(entries)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clustermeta_core::wire::{from_bytes, to_bytes};

    fn shard(name: &str, n: u32) -> ShardId {
        ShardId::new(Index::new(name, format!("{}-uuid", name)), n)
    }

    fn snapshot(repo: &str, name: &str) -> Snapshot {
        Snapshot::new(repo, SnapshotId::new(name, format!("{}-uuid", name)))
    }

    fn started_entry(repo: &str, name: &str, shards: BTreeMap<ShardId, ShardSnapshotStatus>) -> Entry {
        Entry::started(
            snapshot(repo, name),
            true,
            false,
            vec![IndexId::new("idx", "idx-id")],
            vec![],
            vec![],
            1_700_000_000_000,
            7,
            shards,
            None,
            TransportVersion::CURRENT,
        )
    }

    fn success_status() -> ShardSnapshotStatus {
        ShardSnapshotStatus::success(
            Some("node-1".to_string()),
            ShardSnapshotResult {
                generation: "gen-1".to_string(),
                size_in_bytes: 1024,
                segment_count: 3,
            },
        )
    }

    #[test]
    fn test_shard_state_wire_bytes() {
        assert_eq!(ShardState::Init.as_byte(), 0);
        assert_eq!(ShardState::Success.as_byte(), 2);
        assert_eq!(ShardState::Failed.as_byte(), 3);
        assert_eq!(ShardState::Aborted.as_byte(), 4);
        assert_eq!(ShardState::Missing.as_byte(), 5);
        assert_eq!(ShardState::Waiting.as_byte(), 6);
        assert_eq!(ShardState::Queued.as_byte(), 7);
        // The gap at 1 stays unassigned
        assert!(ShardState::from_byte(1).is_err());
    }

    #[test]
    fn test_shard_state_predicates() {
        assert!(ShardState::Success.completed());
        assert!(ShardState::Failed.completed());
        assert!(ShardState::Missing.completed());
        assert!(!ShardState::Aborted.completed());
        assert!(!ShardState::Queued.completed());

        assert!(ShardState::Failed.failed());
        assert!(ShardState::Aborted.failed());
        assert!(ShardState::Missing.failed());
        assert!(!ShardState::Success.failed());
        assert!(!ShardState::Init.failed());
    }

    #[test]
    fn test_queued_sentinel_carries_nothing() {
        let q = ShardSnapshotStatus::queued();
        assert_eq!(q.node_id(), None);
        assert_eq!(q.generation(), None);
        assert_eq!(q.reason(), None);
        assert_eq!(q.result(), None);
    }

    #[test]
    fn test_started_entry_state_derivation() {
        let mut shards = BTreeMap::new();
        shards.insert(shard("i", 0), success_status());
        let entry = started_entry("repo", "snap", shards);
        assert_eq!(entry.state(), EntryState::Success);

        let mut shards = BTreeMap::new();
        shards.insert(shard("i", 0), ShardSnapshotStatus::init("n1", None));
        let entry = started_entry("repo", "snap", shards);
        assert_eq!(entry.state(), EntryState::Started);
    }

    #[test]
    fn test_with_shard_states_promotes_to_success() {
        let mut shards = BTreeMap::new();
        shards.insert(shard("i", 0), ShardSnapshotStatus::init("n1", None));
        let entry = started_entry("repo", "snap", shards);

        let mut done = BTreeMap::new();
        done.insert(shard("i", 0), success_status());
        let updated = entry.with_shard_states(done);
        assert_eq!(updated.state(), EntryState::Success);
    }

    #[test]
    fn test_with_clones_derives_failed_on_failures() {
        let entry = Entry::clone_entry(
            snapshot("repo", "clone-snap"),
            SnapshotId::new("source", "source-uuid"),
            vec![IndexId::new("idx", "idx-id")],
            0,
            1,
            TransportVersion::CURRENT,
        );
        let coord = RepositoryShardId::new(IndexId::new("idx", "idx-id"), 0);

        let mut clones = BTreeMap::new();
        clones.insert(
            coord.clone(),
            ShardSnapshotStatus::failed(None, ShardState::Failed, "io error", None).unwrap(),
        );
        let failed = entry.with_clones(clones);
        assert_eq!(failed.state(), EntryState::Failed);

        // Clone work runs against the repository: no node id
        let mut clones = BTreeMap::new();
        clones.insert(
            coord,
            ShardSnapshotStatus::success(
                None,
                ShardSnapshotResult {
                    generation: "gen-2".to_string(),
                    size_in_bytes: 64,
                    segment_count: 1,
                },
            ),
        );
        let ok = entry.with_clones(clones);
        assert_eq!(ok.state(), EntryState::Success);
        assert_eq!(ok.clones().values().next().unwrap().node_id(), None);
    }

    #[test]
    fn test_abort_mixed_shard_states() {
        let mut shards = BTreeMap::new();
        shards.insert(
            shard("i", 1),
            ShardSnapshotStatus::init("n1", Some("g".to_string())),
        );
        shards.insert(
            shard("i", 2),
            ShardSnapshotStatus::waiting("n2", Some("g".to_string())),
        );
        shards.insert(shard("i", 3), ShardSnapshotStatus::queued());
        let entry = started_entry("repo", "snap", shards);

        let aborted = entry.abort().expect("not all queued");
        assert_eq!(aborted.state(), EntryState::Aborted);
        assert_eq!(aborted.failure(), Some(ABORTED_BY_DELETION));

        let s1 = &aborted.shards()[&shard("i", 1)];
        assert_eq!(s1.state(), ShardState::Aborted);
        assert_eq!(s1.node_id(), Some("n1"));

        let s2 = &aborted.shards()[&shard("i", 2)];
        assert_eq!(s2.state(), ShardState::Aborted);

        let s3 = &aborted.shards()[&shard("i", 3)];
        assert_eq!(s3.state(), ShardState::Queued);
        assert_eq!(s3.reason(), None);
    }

    #[test]
    fn test_abort_all_queued_returns_none() {
        let mut shards = BTreeMap::new();
        shards.insert(shard("i", 0), ShardSnapshotStatus::queued());
        shards.insert(shard("i", 1), ShardSnapshotStatus::queued());
        let entry = started_entry("repo", "snap", shards);
        assert!(entry.abort().is_none());
    }

    #[test]
    fn test_abort_unassigned_shard_fails_directly() {
        let mut shards = BTreeMap::new();
        // WAITING with no node cannot receive an abort
        shards.insert(
            shard("i", 0),
            ShardSnapshotStatus {
                node_id: None,
                state: ShardState::Waiting,
                generation: None,
                reason: None,
                result: None,
            },
        );
        let entry = started_entry("repo", "snap", shards);
        let aborted = entry.abort().unwrap();
        assert_eq!(aborted.shards()[&shard("i", 0)].state(), ShardState::Failed);
    }

    #[test]
    fn test_abort_all_completed_promotes_success() {
        let mut shards = BTreeMap::new();
        shards.insert(shard("i", 0), success_status());
        shards.insert(shard("i", 1), ShardSnapshotStatus::queued());
        // one queued, one success: queued stays, so entry stays ABORTED
        let entry = started_entry("repo", "snap", shards);
        let aborted = entry.abort().unwrap();
        assert_eq!(aborted.state(), EntryState::Aborted);

        let mut shards = BTreeMap::new();
        shards.insert(shard("i", 0), success_status());
        shards.insert(shard("i", 1), ShardSnapshotStatus::missing("gone"));
        let entry = started_entry("repo", "snap", shards);
        // Already complete before the abort walks it
        assert_eq!(entry.state(), EntryState::Success);
    }

    #[test]
    fn test_entry_wire_roundtrip() {
        let mut shards = BTreeMap::new();
        shards.insert(shard("i", 0), success_status());
        shards.insert(shard("i", 1), ShardSnapshotStatus::init("n1", None));
        let mut user_metadata = BTreeMap::new();
        user_metadata.insert("who".to_string(), serde_json::json!("ops"));
        let entry = Entry::started(
            snapshot("repo", "snap"),
            true,
            true,
            vec![IndexId::new("idx", "idx-id")],
            vec!["stream".to_string()],
            vec![SnapshotFeatureState {
                feature_name: "security".to_string(),
                indices: vec![".security".to_string()],
            }],
            1_700_000_000_000,
            42,
            shards,
            Some(user_metadata),
            TransportVersion::CURRENT,
        );
        let bytes = to_bytes(&entry, TransportVersion::CURRENT).unwrap();
        let decoded: Entry = from_bytes(&bytes, TransportVersion::CURRENT).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_clone_entry_wire_roundtrip() {
        let entry = Entry::clone_entry(
            snapshot("repo", "clone"),
            SnapshotId::new("src", "src-uuid"),
            vec![IndexId::new("idx", "idx-id")],
            5,
            9,
            TransportVersion::CURRENT,
        );
        let coord = RepositoryShardId::new(IndexId::new("idx", "idx-id"), 0);
        let mut clones = BTreeMap::new();
        clones.insert(coord, ShardSnapshotStatus::queued());
        let entry = entry.with_clones(clones);

        let bytes = to_bytes(&entry, TransportVersion::CURRENT).unwrap();
        let decoded: Entry = from_bytes(&bytes, TransportVersion::CURRENT).unwrap();
        assert_eq!(decoded, entry);
        assert!(decoded.is_clone());
    }

    #[test]
    fn test_entry_old_peer_drops_clone_fields() {
        let mut shards = BTreeMap::new();
        shards.insert(shard("i", 0), ShardSnapshotStatus::init("n1", None));
        let entry = started_entry("repo", "snap", shards);

        let old = TransportVersion::V_DATA_STREAMS;
        let bytes = to_bytes(&entry, old).unwrap();
        let decoded: Entry = from_bytes(&bytes, old).unwrap();

        assert_eq!(decoded.source(), None);
        assert!(decoded.clones().is_empty());
        assert!(decoded.feature_states().is_empty());
        assert_eq!(decoded.snapshot(), entry.snapshot());
        assert_eq!(decoded.shards(), entry.shards());
        assert_eq!(decoded.state(), entry.state());
    }

    #[test]
    fn test_consistency_queued_then_active_rejected() {
        let mut early = BTreeMap::new();
        early.insert(shard("i", 0), ShardSnapshotStatus::queued());
        let first = started_entry("repo", "first", early);

        let mut late = BTreeMap::new();
        late.insert(shard("i", 0), ShardSnapshotStatus::init("n1", None));
        let second = started_entry("repo", "second", late);

        let err = SnapshotsInProgress::new(vec![first, second]).unwrap_err();
        assert!(err.to_string().contains("behind a queued entry"));
    }

    #[test]
    fn test_consistency_other_repository_unaffected() {
        let mut early = BTreeMap::new();
        early.insert(shard("i", 0), ShardSnapshotStatus::queued());
        let first = started_entry("repo-a", "first", early);

        let mut late = BTreeMap::new();
        late.insert(shard("i", 0), ShardSnapshotStatus::init("n1", None));
        let second = started_entry("repo-b", "second", late);

        SnapshotsInProgress::new(vec![first, second]).unwrap();
    }

    #[test]
    fn test_consistency_queued_after_active_allowed() {
        let mut early = BTreeMap::new();
        early.insert(shard("i", 0), ShardSnapshotStatus::init("n1", None));
        let first = started_entry("repo", "first", early);

        let mut late = BTreeMap::new();
        late.insert(shard("i", 0), ShardSnapshotStatus::queued());
        let second = started_entry("repo", "second", late);

        SnapshotsInProgress::new(vec![first, second]).unwrap();
    }

    #[test]
    fn test_completed_entry_with_incomplete_shards_rejected() {
        let mut shards = BTreeMap::new();
        shards.insert(shard("i", 0), ShardSnapshotStatus::init("n1", None));
        let mut entry = started_entry("repo", "snap", shards);
        entry.state = EntryState::Success;
        let err = SnapshotsInProgress::new(vec![entry]).unwrap_err();
        assert!(err.to_string().contains("incomplete shards"));
    }

    #[test]
    fn test_with_repository_entries_preserves_others() {
        let mut s1 = BTreeMap::new();
        s1.insert(shard("i", 0), success_status());
        let a = started_entry("repo-a", "a", s1.clone());
        let b = started_entry("repo-b", "b", s1.clone());
        let sip = SnapshotsInProgress::new(vec![a.clone(), b.clone()]).unwrap();

        let replaced = sip.with_repository_entries("repo-a", vec![]).unwrap();
        assert_eq!(replaced.entries().len(), 1);
        assert_eq!(replaced.entries()[0].repository(), "repo-b");
    }

    #[test]
    fn test_for_repository_filters_in_order() {
        let mut s = BTreeMap::new();
        s.insert(shard("i", 0), success_status());
        let a1 = started_entry("repo-a", "one", s.clone());
        let b = started_entry("repo-b", "two", s.clone());
        let a2 = started_entry("repo-a", "three", s);
        let sip = SnapshotsInProgress::new(vec![a1, b, a2]).unwrap();

        let names: Vec<&str> = sip
            .for_repository("repo-a")
            .map(|e| e.snapshot().snapshot_id.name.as_str())
            .collect();
        assert_eq!(names, vec!["one", "three"]);
    }
}
