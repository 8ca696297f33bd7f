//! Per-index metadata
//!
//! An index is identified by its name plus a uuid minted at creation; the
//! uuid survives closes and setting changes, so a deleted-and-recreated
//! index with the same name is a different index.
//!
//! `IndexMetadata` is immutable; every mutation goes through
//! [`IndexMetadataBuilder`] and produces a new value. Three facet versions
//! (`settings_version`, `mapping_version`, `aliases_version`) plus the
//! top-level `version` are strictly non-decreasing along any updating path,
//! which lets the replication layer detect staleness per facet without
//! comparing payloads.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use clustermeta_core::diff::{Diff, Diffable, MapDiff, SimpleDiff};
use clustermeta_core::error::{MetadataError, Result};
use clustermeta_core::hash::MappingHash;
use clustermeta_core::simple_diffable;
use clustermeta_core::version::TransportVersion;
use clustermeta_core::wire::{WireReadable, WireReader, WireWritable, WireWriter};

use crate::mapping::{MappingMetadata, MappingPool};
use crate::settings::{keys, Settings};

/// Reserved per-index custom key carrying lifecycle execution state
pub const LIFECYCLE_CUSTOM_KEY: &str = "index.lifecycle";

/// Uuid used before an index has been assigned one
pub const UNKNOWN_UUID: &str = "_na_";

/// An index identity: name plus creation uuid
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Index {
    name: String,
    uuid: String,
}

impl Index {
    /// Create an index identity
    pub fn new(name: impl Into<String>, uuid: impl Into<String>) -> Index {
        Index {
            name: name.into(),
            uuid: uuid.into(),
        }
    }

    /// The index name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The creation uuid
    pub fn uuid(&self) -> &str {
        &self.uuid
    }
}

impl std::fmt::Display for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{}]", self.name, self.uuid)
    }
}

impl WireWritable for Index {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_string(&self.name)?;
        out.write_string(&self.uuid)
    }
}

impl WireReadable for Index {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        let name = input.read_string()?;
        let uuid = input.read_string()?;
        Ok(Index { name, uuid })
    }
}

/// A named alias on one index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasMetadata {
    /// The alias name
    pub alias: String,
    /// Optional filter applied when searching through the alias
    pub filter: Option<serde_json::Value>,
    /// Optional routing used for writes through the alias
    pub index_routing: Option<String>,
    /// Optional routing used for reads through the alias
    pub search_routing: Option<String>,
    /// Whether this index is the alias's write index (tri-state: unset means
    /// "not declared")
    pub is_write_index: Option<bool>,
    /// Whether the alias is hidden (tri-state)
    pub is_hidden: Option<bool>,
}

simple_diffable!(AliasMetadata);

impl AliasMetadata {
    /// A plain alias with no filter or routing
    pub fn new(alias: impl Into<String>) -> AliasMetadata {
        AliasMetadata {
            alias: alias.into(),
            filter: None,
            index_routing: None,
            search_routing: None,
            is_write_index: None,
            is_hidden: None,
        }
    }

    /// Set the filter
    pub fn with_filter(mut self, filter: serde_json::Value) -> AliasMetadata {
        self.filter = Some(filter);
        self
    }

    /// Set the write-index flag
    pub fn with_write_index(mut self, write_index: bool) -> AliasMetadata {
        self.is_write_index = Some(write_index);
        self
    }

    /// Set the hidden flag
    pub fn with_hidden(mut self, hidden: bool) -> AliasMetadata {
        self.is_hidden = Some(hidden);
        self
    }

    /// Set the index routing
    pub fn with_index_routing(mut self, routing: impl Into<String>) -> AliasMetadata {
        self.index_routing = Some(routing.into());
        self
    }

    /// Set the search routing
    pub fn with_search_routing(mut self, routing: impl Into<String>) -> AliasMetadata {
        self.search_routing = Some(routing.into());
        self
    }
}

impl WireWritable for AliasMetadata {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_string(&self.alias)?;
        match &self.filter {
            Some(filter) => {
                out.write_bool(true)?;
                let bytes = serde_json::to_vec(filter).expect("JSON value serializes");
                out.write_bytes(&bytes)?;
            }
            None => out.write_bool(false)?,
        }
        out.write_optional_string(self.index_routing.as_deref())?;
        out.write_optional_string(self.search_routing.as_deref())?;
        out.write_optional_bool(self.is_write_index)?;
        out.write_optional_bool(self.is_hidden)
    }
}

impl WireReadable for AliasMetadata {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        let alias = input.read_string()?;
        let filter = if input.read_bool()? {
            let bytes = input.read_bytes()?;
            Some(serde_json::from_slice(&bytes).map_err(|e| {
                MetadataError::CorruptMetadata(format!("invalid alias filter: {}", e))
            })?)
        } else {
            None
        };
        let index_routing = input.read_optional_string()?;
        let search_routing = input.read_optional_string()?;
        let is_write_index = input.read_optional_bool()?;
        let is_hidden = input.read_optional_bool()?;
        Ok(AliasMetadata {
            alias,
            filter,
            index_routing,
            search_routing,
            is_write_index,
            is_hidden,
        })
    }
}

/// Open or closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexState {
    /// Accepting reads and writes
    Open,
    /// Closed to reads and writes; metadata retained
    Closed,
}

impl IndexState {
    /// Fixed wire byte
    pub fn as_byte(&self) -> u8 {
        match self {
            IndexState::Open => 0,
            IndexState::Closed => 1,
        }
    }

    /// Decode the wire byte
    pub fn from_byte(byte: u8) -> Result<IndexState> {
        match byte {
            0 => Ok(IndexState::Open),
            1 => Ok(IndexState::Closed),
            b => Err(MetadataError::CorruptMetadata(format!(
                "unexpected index state byte [{}]",
                b
            ))),
        }
    }
}

/// Per-index custom fragments (opaque string maps under a registered key)
pub type IndexCustoms = BTreeMap<String, BTreeMap<String, String>>;

/// Immutable per-index metadata
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMetadata {
    index: Index,
    version: u64,
    mapping_version: u64,
    settings_version: u64,
    aliases_version: u64,
    state: IndexState,
    settings: Settings,
    number_of_shards: u32,
    number_of_replicas: u32,
    mapping: Option<Arc<MappingMetadata>>,
    aliases: BTreeMap<String, AliasMetadata>,
    customs: IndexCustoms,
    hidden: bool,
    system: bool,
    creation_version: TransportVersion,
    compatibility_version: TransportVersion,
}

impl IndexMetadata {
    /// Start building metadata for a new index
    pub fn builder(name: impl Into<String>) -> IndexMetadataBuilder {
        IndexMetadataBuilder::new(name)
    }

    /// Rebuild from an existing value
    pub fn builder_from(existing: &IndexMetadata) -> IndexMetadataBuilder {
        IndexMetadataBuilder::from_existing(existing)
    }

    /// The index identity
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// The index name
    pub fn name(&self) -> &str {
        self.index.name()
    }

    /// Top-level version, bumped on every published mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Mapping facet version
    pub fn mapping_version(&self) -> u64 {
        self.mapping_version
    }

    /// Settings facet version
    pub fn settings_version(&self) -> u64 {
        self.settings_version
    }

    /// Aliases facet version
    pub fn aliases_version(&self) -> u64 {
        self.aliases_version
    }

    /// Open or closed
    pub fn state(&self) -> IndexState {
        self.state
    }

    /// The settings bag
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Number of primary shards
    pub fn number_of_shards(&self) -> u32 {
        self.number_of_shards
    }

    /// Number of replicas per primary
    pub fn number_of_replicas(&self) -> u32 {
        self.number_of_replicas
    }

    /// Primaries plus all replica copies
    pub fn total_number_of_shards(&self) -> u32 {
        self.number_of_shards * (1 + self.number_of_replicas)
    }

    /// The interned mapping, if any
    pub fn mapping(&self) -> Option<&Arc<MappingMetadata>> {
        self.mapping.as_ref()
    }

    /// Aliases on this index, keyed by alias name
    pub fn aliases(&self) -> &BTreeMap<String, AliasMetadata> {
        &self.aliases
    }

    /// Per-index custom fragments
    pub fn customs(&self) -> &IndexCustoms {
        &self.customs
    }

    /// Lifecycle execution state, persisted under the reserved custom key
    pub fn lifecycle_execution_state(&self) -> Option<&BTreeMap<String, String>> {
        self.customs.get(LIFECYCLE_CUSTOM_KEY)
    }

    /// Hidden from wildcard resolution
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// System index
    pub fn is_system(&self) -> bool {
        self.system
    }

    /// Transport version the index was created at
    pub fn creation_version(&self) -> TransportVersion {
        self.creation_version
    }

    /// Oldest transport version the index is compatible with
    pub fn compatibility_version(&self) -> TransportVersion {
        self.compatibility_version
    }

    /// Copy with `version + 1`, identical otherwise
    pub fn with_incremented_version(&self) -> IndexMetadata {
        let mut next = self.clone();
        next.version += 1;
        next
    }

    /// Copy pointing at a different (interned) mapping instance
    ///
    /// Used by the pool dedupe step; content is equal by hash, only the
    /// shared instance changes.
    pub fn with_mapping_instance(&self, mapping: Arc<MappingMetadata>) -> IndexMetadata {
        let mut next = self.clone();
        next.mapping = Some(mapping);
        next
    }

    /// Write, inlining the full mapping body or only its hash
    ///
    /// Hash-only form is valid only after the mapping pool has been written
    /// to the same stream (the root metadata writer does this).
    pub fn write_to_with<W: Write>(
        &self,
        out: &mut WireWriter<W>,
        mappings_as_hash: bool,
    ) -> Result<()> {
        self.index.write_to(out)?;
        out.write_vlong(self.version)?;
        out.write_vlong(self.mapping_version)?;
        out.write_vlong(self.settings_version)?;
        out.write_vlong(self.aliases_version)?;
        out.write_byte(self.state.as_byte())?;
        self.settings.write_to(out)?;
        match &self.mapping {
            Some(mapping) => {
                out.write_bool(true)?;
                if mappings_as_hash {
                    out.write_bytes(mapping.hash().as_bytes())?;
                } else {
                    mapping.write_to(out)?;
                }
            }
            None => out.write_bool(false)?,
        }
        out.write_map(&self.aliases, |out, alias| alias.write_to(out))?;
        out.write_map(&self.customs, |out, custom| out.write_string_map(custom))?;
        out.write_bool(self.hidden)?;
        out.write_bool(self.system)?;
        out.write_vint(self.creation_version.id())?;
        out.write_vint(self.compatibility_version.id())
    }

    /// Read the form written by [`IndexMetadata::write_to_with`]
    ///
    /// `pool` resolves hash-only mappings; pass `None` when the stream
    /// carries inline bodies.
    pub fn read_from_with<R: Read>(
        input: &mut WireReader<R>,
        pool: Option<&MappingPool>,
    ) -> Result<IndexMetadata> {
        let index = Index::read_from(input)?;
        let version = input.read_vlong()?;
        let mapping_version = input.read_vlong()?;
        let settings_version = input.read_vlong()?;
        let aliases_version = input.read_vlong()?;
        let state = IndexState::from_byte(input.read_byte()?)?;
        let settings = Settings::read_from(input)?;
        let mapping = if input.read_bool()? {
            match pool {
                Some(pool) => {
                    let bytes = input.read_bytes()?;
                    let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                        MetadataError::CorruptMetadata(
                            "mapping hash must be 32 bytes".to_string(),
                        )
                    })?;
                    let hash = MappingHash::from_bytes(bytes);
                    Some(Arc::clone(pool.get(&hash).ok_or_else(|| {
                        MetadataError::CorruptMetadata(format!(
                            "index {} references mapping [{}] absent from the pool",
                            index, hash
                        ))
                    })?))
                }
                None => Some(Arc::new(MappingMetadata::read_from(input)?)),
            }
        } else {
            None
        };
        let aliases = input.read_map(AliasMetadata::read_from)?;
        let customs = input.read_map(|input| input.read_string_map())?;
        let hidden = input.read_bool()?;
        let system = input.read_bool()?;
        let creation_version = TransportVersion(input.read_vint()?);
        let compatibility_version = TransportVersion(input.read_vint()?);

        let number_of_shards = settings.get_as_u32(keys::NUMBER_OF_SHARDS, 1)?;
        let number_of_replicas = settings.get_as_u32(keys::NUMBER_OF_REPLICAS, 0)?;

        Ok(IndexMetadata {
            index,
            version,
            mapping_version,
            settings_version,
            aliases_version,
            state,
            settings,
            number_of_shards,
            number_of_replicas,
            mapping,
            aliases,
            customs,
            hidden,
            system,
            creation_version,
            compatibility_version,
        })
    }
}

impl WireWritable for IndexMetadata {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        self.write_to_with(out, false)
    }
}

impl WireReadable for IndexMetadata {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        IndexMetadata::read_from_with(input, None)
    }
}

// ============================================================================
// Diff
// ============================================================================

/// Delta between two `IndexMetadata` values with the same name
#[derive(Debug, Clone, PartialEq)]
pub enum IndexMetadataDiff {
    /// Nothing changed
    Unchanged,
    /// Field-level patch
    Patch {
        /// New top-level version
        version: u64,
        /// New mapping facet version
        mapping_version: u64,
        /// New settings facet version
        settings_version: u64,
        /// New aliases facet version
        aliases_version: u64,
        /// New state
        state: IndexState,
        /// New hidden flag
        hidden: bool,
        /// New system flag
        system: bool,
        /// Settings delta
        settings: SimpleDiff<Settings>,
        /// Mapping delta (whole-reference replacement)
        mapping: SimpleDiff<Option<Arc<MappingMetadata>>>,
        /// Alias map delta
        aliases: MapDiff<String, AliasMetadata, SimpleDiff<AliasMetadata>>,
        /// Per-index customs delta
        customs: SimpleDiff<IndexCustoms>,
    },
}

impl Diffable for IndexMetadata {
    type Diff = IndexMetadataDiff;

    fn diff_from(&self, prev: &Self) -> IndexMetadataDiff {
        if self == prev {
            return IndexMetadataDiff::Unchanged;
        }
        IndexMetadataDiff::Patch {
            version: self.version,
            mapping_version: self.mapping_version,
            settings_version: self.settings_version,
            aliases_version: self.aliases_version,
            state: self.state,
            hidden: self.hidden,
            system: self.system,
            settings: SimpleDiff::of(&prev.settings, &self.settings),
            mapping: SimpleDiff::of(&prev.mapping, &self.mapping),
            aliases: MapDiff::of(&prev.aliases, &self.aliases),
            customs: SimpleDiff::of(&prev.customs, &self.customs),
        }
    }
}

impl Diff for IndexMetadataDiff {
    type Target = IndexMetadata;

    fn apply_to(&self, prev: &IndexMetadata) -> Result<IndexMetadata> {
        match self {
            IndexMetadataDiff::Unchanged => Ok(prev.clone()),
            IndexMetadataDiff::Patch {
                version,
                mapping_version,
                settings_version,
                aliases_version,
                state,
                hidden,
                system,
                settings,
                mapping,
                aliases,
                customs,
            } => {
                let settings = settings.apply_to(&prev.settings)?;
                let number_of_shards = settings.get_as_u32(keys::NUMBER_OF_SHARDS, 1)?;
                let number_of_replicas = settings.get_as_u32(keys::NUMBER_OF_REPLICAS, 0)?;
                Ok(IndexMetadata {
                    index: prev.index.clone(),
                    version: *version,
                    mapping_version: *mapping_version,
                    settings_version: *settings_version,
                    aliases_version: *aliases_version,
                    state: *state,
                    settings,
                    number_of_shards,
                    number_of_replicas,
                    mapping: mapping.apply_to(&prev.mapping)?,
                    aliases: aliases.apply_to(&prev.aliases)?,
                    customs: customs.apply_to(&prev.customs)?,
                    hidden: *hidden,
                    system: *system,
                    creation_version: prev.creation_version,
                    compatibility_version: prev.compatibility_version,
                })
            }
        }
    }

    fn has_changes(&self) -> bool {
        matches!(self, IndexMetadataDiff::Patch { .. })
    }
}

impl IndexMetadataDiff {
    /// Wire encoding: changed flag, then the patch fields
    pub fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        match self {
            IndexMetadataDiff::Unchanged => out.write_bool(false),
            IndexMetadataDiff::Patch {
                version,
                mapping_version,
                settings_version,
                aliases_version,
                state,
                hidden,
                system,
                settings,
                mapping,
                aliases,
                customs,
            } => {
                out.write_bool(true)?;
                out.write_vlong(*version)?;
                out.write_vlong(*mapping_version)?;
                out.write_vlong(*settings_version)?;
                out.write_vlong(*aliases_version)?;
                out.write_byte(state.as_byte())?;
                out.write_bool(*hidden)?;
                out.write_bool(*system)?;
                settings.write_to(out, |out, s| s.write_to(out))?;
                mapping.write_to(out, |out, m| {
                    out.write_optional(m.as_ref(), |out, m| m.write_to(out))
                })?;
                aliases.write_to(
                    out,
                    |out, k| out.write_string(k),
                    |out, v| v.write_to(out),
                    |out, d| d.write_to(out, |out, v| v.write_to(out)),
                )?;
                customs.write_to(out, |out, c| {
                    out.write_map(c, |out, inner| out.write_string_map(inner))
                })
            }
        }
    }

    /// Read the form written by [`IndexMetadataDiff::write_to`]
    pub fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<IndexMetadataDiff> {
        if !input.read_bool()? {
            return Ok(IndexMetadataDiff::Unchanged);
        }
        let version = input.read_vlong()?;
        let mapping_version = input.read_vlong()?;
        let settings_version = input.read_vlong()?;
        let aliases_version = input.read_vlong()?;
        let state = IndexState::from_byte(input.read_byte()?)?;
        let hidden = input.read_bool()?;
        let system = input.read_bool()?;
        let settings = SimpleDiff::read_from(input, Settings::read_from)?;
        let mapping = SimpleDiff::read_from(input, |input| {
            input.read_optional(|input| Ok(Arc::new(MappingMetadata::read_from(input)?)))
        })?;
        let aliases = MapDiff::read_from(
            input,
            |input| input.read_string(),
            AliasMetadata::read_from,
            |input| SimpleDiff::read_from(input, AliasMetadata::read_from),
        )?;
        let customs = SimpleDiff::read_from(input, |input| {
            input.read_map(|input| input.read_string_map())
        })?;
        Ok(IndexMetadataDiff::Patch {
            version,
            mapping_version,
            settings_version,
            aliases_version,
            state,
            hidden,
            system,
            settings,
            mapping,
            aliases,
            customs,
        })
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`IndexMetadata`]
///
/// When built from an existing value, facet versions bump automatically for
/// the facets that changed; the top-level version is bumped by the root
/// metadata builder on publication.
#[derive(Debug, Clone)]
pub struct IndexMetadataBuilder {
    base: Option<IndexMetadata>,
    name: String,
    uuid: String,
    version: u64,
    mapping_version: Option<u64>,
    settings_version: Option<u64>,
    aliases_version: Option<u64>,
    state: IndexState,
    settings: Settings,
    mapping: Option<Arc<MappingMetadata>>,
    aliases: BTreeMap<String, AliasMetadata>,
    customs: IndexCustoms,
    system: bool,
    creation_version: TransportVersion,
    compatibility_version: TransportVersion,
}

impl IndexMetadataBuilder {
    /// Builder for a brand-new index
    pub fn new(name: impl Into<String>) -> IndexMetadataBuilder {
        IndexMetadataBuilder {
            base: None,
            name: name.into(),
            uuid: UNKNOWN_UUID.to_string(),
            version: 1,
            mapping_version: None,
            settings_version: None,
            aliases_version: None,
            state: IndexState::Open,
            settings: Settings::empty(),
            mapping: None,
            aliases: BTreeMap::new(),
            customs: BTreeMap::new(),
            system: false,
            creation_version: TransportVersion::CURRENT,
            compatibility_version: TransportVersion::CURRENT,
        }
    }

    /// Builder seeded from an existing value
    pub fn from_existing(existing: &IndexMetadata) -> IndexMetadataBuilder {
        IndexMetadataBuilder {
            base: Some(existing.clone()),
            name: existing.index.name().to_string(),
            uuid: existing.index.uuid().to_string(),
            version: existing.version,
            mapping_version: None,
            settings_version: None,
            aliases_version: None,
            state: existing.state,
            settings: existing.settings.clone(),
            mapping: existing.mapping.clone(),
            aliases: existing.aliases.clone(),
            customs: existing.customs.clone(),
            system: existing.system,
            creation_version: existing.creation_version,
            compatibility_version: existing.compatibility_version,
        }
    }

    /// Set the index uuid
    pub fn uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }

    /// Set the top-level version explicitly (wire reads, tests)
    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Pin the mapping facet version (overrides the automatic bump)
    pub fn mapping_version(mut self, version: u64) -> Self {
        self.mapping_version = Some(version);
        self
    }

    /// Pin the settings facet version (overrides the automatic bump)
    pub fn settings_version(mut self, version: u64) -> Self {
        self.settings_version = Some(version);
        self
    }

    /// Pin the aliases facet version (overrides the automatic bump)
    pub fn aliases_version(mut self, version: u64) -> Self {
        self.aliases_version = Some(version);
        self
    }

    /// Replace the settings bag
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Convenience: set the replica count in settings
    pub fn number_of_replicas(mut self, replicas: u32) -> Self {
        let mut b = Settings::builder();
        b.put_all(&self.settings)
            .put_u32(keys::NUMBER_OF_REPLICAS, replicas);
        self.settings = b.build();
        self
    }

    /// Convenience: set the shard count in settings
    pub fn number_of_shards(mut self, shards: u32) -> Self {
        let mut b = Settings::builder();
        b.put_all(&self.settings)
            .put_u32(keys::NUMBER_OF_SHARDS, shards);
        self.settings = b.build();
        self
    }

    /// Open or close the index
    pub fn state(mut self, state: IndexState) -> Self {
        self.state = state;
        self
    }

    /// Attach a mapping body
    pub fn mapping(mut self, mapping: Arc<MappingMetadata>) -> Self {
        self.mapping = Some(mapping);
        self
    }

    /// Add or replace an alias
    pub fn put_alias(mut self, alias: AliasMetadata) -> Self {
        self.aliases.insert(alias.alias.clone(), alias);
        self
    }

    /// Remove an alias
    pub fn remove_alias(mut self, alias: &str) -> Self {
        self.aliases.remove(alias);
        self
    }

    /// Add or replace a per-index custom fragment
    pub fn put_custom(mut self, key: impl Into<String>, value: BTreeMap<String, String>) -> Self {
        self.customs.insert(key.into(), value);
        self
    }

    /// Store lifecycle execution state under the reserved custom key
    pub fn lifecycle_execution_state(self, state: BTreeMap<String, String>) -> Self {
        self.put_custom(LIFECYCLE_CUSTOM_KEY, state)
    }

    /// Mark as a system index
    pub fn system(mut self, system: bool) -> Self {
        self.system = system;
        self
    }

    /// Set the creation transport version
    pub fn creation_version(mut self, version: TransportVersion) -> Self {
        self.creation_version = version;
        self
    }

    /// Set the compatibility transport version
    pub fn compatibility_version(mut self, version: TransportVersion) -> Self {
        self.compatibility_version = version;
        self
    }

    /// Validate and freeze
    pub fn build(self) -> Result<IndexMetadata> {
        let number_of_shards = self.settings.get_as_u32(keys::NUMBER_OF_SHARDS, 1)?;
        let number_of_replicas = self.settings.get_as_u32(keys::NUMBER_OF_REPLICAS, 0)?;
        if number_of_shards == 0 {
            return Err(MetadataError::InvalidInput(format!(
                "index [{}] must have at least one shard",
                self.name
            )));
        }
        if self.creation_version > TransportVersion::CURRENT {
            return Err(MetadataError::InvalidInput(format!(
                "index [{}] was created at [{}], newer than this node [{}]",
                self.name,
                self.creation_version,
                TransportVersion::CURRENT
            )));
        }
        for alias in self.aliases.keys() {
            if alias.is_empty() {
                return Err(MetadataError::InvalidInput(format!(
                    "index [{}] has an alias with an empty name",
                    self.name
                )));
            }
        }
        let hidden = self.settings.get_as_bool(keys::INDEX_HIDDEN, false)?;

        // Automatic facet-version bumps against the base value. A pinned
        // version always wins (wire reads reconstruct exact values).
        let (mapping_version, settings_version, aliases_version) = match &self.base {
            None => (
                self.mapping_version.unwrap_or(1),
                self.settings_version.unwrap_or(1),
                self.aliases_version.unwrap_or(1),
            ),
            Some(base) => {
                let mapping_changed = base.mapping != self.mapping;
                let settings_changed = base.settings != self.settings || base.state != self.state;
                let aliases_changed = base.aliases != self.aliases;
                (
                    self.mapping_version.unwrap_or(if mapping_changed {
                        base.mapping_version + 1
                    } else {
                        base.mapping_version
                    }),
                    self.settings_version.unwrap_or(if settings_changed {
                        base.settings_version + 1
                    } else {
                        base.settings_version
                    }),
                    self.aliases_version.unwrap_or(if aliases_changed {
                        base.aliases_version + 1
                    } else {
                        base.aliases_version
                    }),
                )
            }
        };

        Ok(IndexMetadata {
            index: Index::new(self.name, self.uuid),
            version: self.version,
            mapping_version,
            settings_version,
            aliases_version,
            state: self.state,
            settings: self.settings,
            number_of_shards,
            number_of_replicas,
            mapping: self.mapping,
            aliases: self.aliases,
            customs: self.customs,
            hidden,
            system: self.system,
            creation_version: self.creation_version,
            compatibility_version: self.compatibility_version,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
