//! The metadata root aggregate
//!
//! [`Metadata`] is the immutable, versioned catalog every node agrees on:
//! indices, templates, data streams, aliases, registered customs, and the
//! interned mapping pool, plus cluster-wide settings and coordination
//! state. Every committed change produces a new value; readers holding an
//! older reference keep a consistent snapshot.
//!
//! Mutation goes through [`MetadataBuilder`], which shares unchanged
//! entries with its source value (`Arc`-backed maps, no deep copies) and
//! revalidates the global invariants on `build`:
//!
//! 1. index, alias, and data-stream names are pairwise disjoint
//! 2. one write index per alias
//! 3. hidden/system flags coherent across multi-index aliases
//! 4. backing indices carry no aliases
//! 5. every backing index exists
//! 6. the mapping pool holds only referenced hashes
//!
//! Validation failures are accumulated and surfaced as a single
//! `InvalidState` enumerating every conflict.
//!
//! The `indices_lookup` (name → abstraction) is built lazily and memoized
//! in a once-cell; the cell is carried into the successor when no
//! name-visible facet changed. Computing it twice concurrently is benign:
//! the cell stores one fully-built map, and the computation is pure.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::{Read, Write};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use clustermeta_core::diff::{ArcDiff, Diff, Diffable, MapDiff, SimpleDiff};
use clustermeta_core::error::{MetadataError, Result};
use clustermeta_core::hash::MappingHash;
use clustermeta_core::version::TransportVersion;
use clustermeta_core::wire::{WireReadable, WireReader, WireWritable, WireWriter};

use crate::coordination::CoordinationMetadata;
use crate::customs::{Custom, IndexGraveyard, INDEX_GRAVEYARD_NAME, SNAPSHOTS_NAME};
use crate::datastream::{DataStream, DataStreamAlias};
use crate::immutable_state::ImmutableStateMetadata;
use crate::index::{IndexMetadata, IndexMetadataBuilder, IndexMetadataDiff};
use crate::lookup::{IndexAbstraction, IndicesLookup};
use crate::mapping::MappingPool;
use crate::settings::Settings;
use crate::snapshots::SnapshotsInProgress;
use crate::template::{ComponentTemplate, ComposableIndexTemplate, IndexTemplateMetadata};

/// Cluster uuid before the first committed state
pub const UNKNOWN_CLUSTER_UUID: &str = "_na_";

type StringDiff = SimpleDiff<String>;

/// The immutable cluster metadata catalog
#[derive(Debug, Clone)]
pub struct Metadata {
    cluster_uuid: String,
    cluster_uuid_committed: bool,
    version: u64,
    coordination: CoordinationMetadata,
    persistent_settings: Settings,
    transient_settings: Settings,
    settings: Settings,
    hashes_of_consistent_settings: BTreeMap<String, String>,
    indices: BTreeMap<String, Arc<IndexMetadata>>,
    templates: BTreeMap<String, IndexTemplateMetadata>,
    component_templates: BTreeMap<String, ComponentTemplate>,
    composable_templates: BTreeMap<String, ComposableIndexTemplate>,
    data_streams: BTreeMap<String, DataStream>,
    data_stream_aliases: BTreeMap<String, DataStreamAlias>,
    customs: BTreeMap<String, Custom>,
    immutable_states: BTreeMap<String, ImmutableStateMetadata>,
    mappings_by_hash: MappingPool,

    // Derived, memoized at build time
    aliased_indices: BTreeMap<String, BTreeSet<String>>,
    all_indices: Vec<String>,
    visible_indices: Vec<String>,
    all_open_indices: Vec<String>,
    visible_open_indices: Vec<String>,
    all_closed_indices: Vec<String>,
    visible_closed_indices: Vec<String>,
    total_number_of_shards: u64,
    total_open_index_shards: u64,
    oldest_index_version: TransportVersion,
    indices_lookup: OnceCell<IndicesLookup>,
}

impl Metadata {
    /// The empty catalog
    pub fn empty() -> Metadata {
        MetadataBuilder::new().build().expect("empty metadata is valid")
    }

    /// Start a builder from scratch
    pub fn builder() -> MetadataBuilder {
        MetadataBuilder::new()
    }

    /// Start a builder seeded from this value
    pub fn builder_from(&self) -> MetadataBuilder {
        MetadataBuilder::from_metadata(self)
    }

    /// Cluster uuid
    pub fn cluster_uuid(&self) -> &str {
        &self.cluster_uuid
    }

    /// Whether the cluster uuid has been committed by consensus
    pub fn cluster_uuid_committed(&self) -> bool {
        self.cluster_uuid_committed
    }

    /// Catalog version; strictly increasing across committed states
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Consensus-layer footprint
    pub fn coordination(&self) -> &CoordinationMetadata {
        &self.coordination
    }

    /// Settings surviving full-cluster restarts
    pub fn persistent_settings(&self) -> &Settings {
        &self.persistent_settings
    }

    /// Settings cleared on full-cluster restart
    pub fn transient_settings(&self) -> &Settings {
        &self.transient_settings
    }

    /// Merged view; transient wins over persistent
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Hashes of secure settings that must agree across nodes
    pub fn hashes_of_consistent_settings(&self) -> &BTreeMap<String, String> {
        &self.hashes_of_consistent_settings
    }

    /// All indices, keyed by name
    pub fn indices(&self) -> &BTreeMap<String, Arc<IndexMetadata>> {
        &self.indices
    }

    /// One index by name
    pub fn index(&self, name: &str) -> Option<&Arc<IndexMetadata>> {
        self.indices.get(name)
    }

    /// Whether an index exists
    pub fn has_index(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    /// Legacy templates
    pub fn templates(&self) -> &BTreeMap<String, IndexTemplateMetadata> {
        &self.templates
    }

    /// Component templates
    pub fn component_templates(&self) -> &BTreeMap<String, ComponentTemplate> {
        &self.component_templates
    }

    /// Composable templates
    pub fn composable_templates(&self) -> &BTreeMap<String, ComposableIndexTemplate> {
        &self.composable_templates
    }

    /// Data streams, keyed by name
    pub fn data_streams(&self) -> &BTreeMap<String, DataStream> {
        &self.data_streams
    }

    /// Data stream aliases, keyed by alias name
    pub fn data_stream_aliases(&self) -> &BTreeMap<String, DataStreamAlias> {
        &self.data_stream_aliases
    }

    /// Registered custom fragments
    pub fn customs(&self) -> &BTreeMap<String, Custom> {
        &self.customs
    }

    /// One custom by wire name
    pub fn custom(&self, name: &str) -> Option<&Custom> {
        self.customs.get(name)
    }

    /// The index graveyard, empty if absent
    pub fn index_graveyard(&self) -> IndexGraveyard {
        match self.customs.get(INDEX_GRAVEYARD_NAME) {
            Some(Custom::IndexGraveyard(graveyard)) => graveyard.clone(),
            _ => IndexGraveyard::new(),
        }
    }

    /// In-flight snapshots, empty if none
    pub fn snapshots_in_progress(&self) -> SnapshotsInProgress {
        match self.customs.get(SNAPSHOTS_NAME) {
            Some(Custom::SnapshotsInProgress(snapshots)) => snapshots.clone(),
            _ => SnapshotsInProgress::empty(),
        }
    }

    /// Immutable-state namespaces
    pub fn immutable_states(&self) -> &BTreeMap<String, ImmutableStateMetadata> {
        &self.immutable_states
    }

    /// The interned mapping pool
    pub fn mappings_by_hash(&self) -> &MappingPool {
        &self.mappings_by_hash
    }

    /// Alias name → names of indices carrying it
    pub fn aliased_indices(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.aliased_indices
    }

    /// All index names, sorted
    pub fn all_indices(&self) -> &[String] {
        &self.all_indices
    }

    /// Non-hidden index names
    pub fn visible_indices(&self) -> &[String] {
        &self.visible_indices
    }

    /// Open index names
    pub fn all_open_indices(&self) -> &[String] {
        &self.all_open_indices
    }

    /// Non-hidden open index names
    pub fn visible_open_indices(&self) -> &[String] {
        &self.visible_open_indices
    }

    /// Closed index names
    pub fn all_closed_indices(&self) -> &[String] {
        &self.all_closed_indices
    }

    /// Non-hidden closed index names
    pub fn visible_closed_indices(&self) -> &[String] {
        &self.visible_closed_indices
    }

    /// Primaries plus replicas across all indices
    pub fn total_number_of_shards(&self) -> u64 {
        self.total_number_of_shards
    }

    /// Primaries plus replicas across open indices
    pub fn total_open_index_shards(&self) -> u64 {
        self.total_open_index_shards
    }

    /// Oldest compatibility version across all indices
    pub fn oldest_index_version(&self) -> TransportVersion {
        self.oldest_index_version
    }

    /// The lazily built name → abstraction map
    pub fn indices_lookup(&self) -> &IndicesLookup {
        self.indices_lookup.get_or_init(|| self.build_lookup())
    }

    /// Check that a name is free for a new index, alias, or data stream
    ///
    /// Reports the kind of the existing abstraction, the way create-index
    /// callers expect it.
    pub fn validate_name_available(&self, name: &str) -> Result<()> {
        if let Some(existing) = self.indices_lookup().get(name) {
            return Err(MetadataError::Conflict {
                kind: existing.kind_name().to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// The data stream owning an index, if any
    pub fn parent_data_stream(&self, index_name: &str) -> Option<&str> {
        match self.indices_lookup().get(index_name) {
            Some(IndexAbstraction::ConcreteIndex {
                parent_data_stream, ..
            }) => parent_data_stream.as_deref(),
            _ => None,
        }
    }

    /// Validate a proposed alias against the current lookup
    ///
    /// Standalone name and routing checks, plus the rule that an alias may
    /// not share a name with a concrete index.
    pub fn validate_new_alias(
        &self,
        alias: &str,
        index_name: &str,
        index_routing: Option<&str>,
    ) -> Result<()> {
        crate::alias_validator::validate_alias(alias, index_name, index_routing, |name| {
            self.indices_lookup().get(name)
        })
    }

    /// Deterministic lookup construction: data-stream aliases and streams
    /// first, then concrete indices with their parents, then index aliases.
    fn build_lookup(&self) -> IndicesLookup {
        let mut lookup = IndicesLookup::new();

        for (name, alias) in &self.data_stream_aliases {
            lookup.insert(
                name.clone(),
                IndexAbstraction::Alias {
                    name: name.clone(),
                    indices: alias.data_streams().iter().cloned().collect(),
                    write_index: alias.write_data_stream().map(str::to_string),
                    hidden: false,
                    data_stream_alias: true,
                },
            );
        }

        let mut parents: HashMap<&str, &str> = HashMap::new();
        for (name, stream) in &self.data_streams {
            lookup.insert(
                name.clone(),
                IndexAbstraction::DataStream { name: name.clone() },
            );
            for index in stream.indices() {
                parents.insert(index.name(), name);
            }
        }

        for name in self.indices.keys() {
            lookup.insert(
                name.clone(),
                IndexAbstraction::ConcreteIndex {
                    name: name.clone(),
                    parent_data_stream: parents.get(name.as_str()).map(|s| s.to_string()),
                },
            );
        }

        for (alias, index_names) in &self.aliased_indices {
            let mut write_index = None;
            let mut hidden = false;
            for index_name in index_names {
                if let Some(index) = self.indices.get(index_name) {
                    if let Some(meta) = index.aliases().get(alias) {
                        if meta.is_write_index == Some(true) {
                            write_index = Some(index_name.clone());
                        }
                        hidden = meta.is_hidden.unwrap_or(false);
                    }
                }
            }
            if write_index.is_none() && index_names.len() == 1 {
                let only = index_names.iter().next().expect("non-empty alias set");
                let declared_not_write = self
                    .indices
                    .get(only)
                    .and_then(|i| i.aliases().get(alias))
                    .map(|m| m.is_write_index == Some(false))
                    .unwrap_or(false);
                if !declared_not_write {
                    write_index = Some(only.clone());
                }
            }
            lookup.insert(
                alias.clone(),
                IndexAbstraction::Alias {
                    name: alias.clone(),
                    indices: index_names.iter().cloned().collect(),
                    write_index,
                    hidden,
                    data_stream_alias: false,
                },
            );
        }

        lookup
    }
}

impl PartialEq for Metadata {
    /// Value equality over the authoritative fields; derived state and the
    /// lookup cache are deterministic functions of them
    fn eq(&self, other: &Self) -> bool {
        self.cluster_uuid == other.cluster_uuid
            && self.cluster_uuid_committed == other.cluster_uuid_committed
            && self.version == other.version
            && self.coordination == other.coordination
            && self.persistent_settings == other.persistent_settings
            && self.transient_settings == other.transient_settings
            && self.hashes_of_consistent_settings == other.hashes_of_consistent_settings
            && self.indices == other.indices
            && self.templates == other.templates
            && self.component_templates == other.component_templates
            && self.composable_templates == other.composable_templates
            && self.data_streams == other.data_streams
            && self.data_stream_aliases == other.data_stream_aliases
            && self.customs == other.customs
            && self.immutable_states == other.immutable_states
            && self.mappings_by_hash == other.mappings_by_hash
    }
}

// ============================================================================
// Wire format
// ============================================================================

impl WireWritable for Metadata {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        let peer = out.version();
        out.write_i64(self.version as i64)?;
        out.write_string(&self.cluster_uuid)?;
        out.write_bool(self.cluster_uuid_committed)?;
        self.coordination.write_to(out)?;
        self.transient_settings.write_to(out)?;
        self.persistent_settings.write_to(out)?;
        if peer.supports(TransportVersion::V_CONSISTENT_SETTINGS) {
            out.write_string_map(&self.hashes_of_consistent_settings)?;
        }
        let pooled = peer.supports(TransportVersion::V_MAPPINGS_AS_HASH);
        if pooled {
            self.mappings_by_hash.write_to(out)?;
        }
        out.write_vint(self.indices.len() as u32)?;
        for index in self.indices.values() {
            index.write_to_with(out, pooled)?;
        }
        out.write_vint(self.templates.len() as u32)?;
        for template in self.templates.values() {
            template.write_to(out)?;
        }
        if peer.supports(TransportVersion::V_DATA_STREAMS) {
            out.write_map(&self.component_templates, |out, t| t.write_to(out))?;
            out.write_map(&self.composable_templates, |out, t| t.write_to(out))?;
            out.write_map(&self.data_streams, |out, d| d.write_to(out))?;
            out.write_map(&self.data_stream_aliases, |out, a| a.write_to(out))?;
        }
        let wired_customs: Vec<&Custom> = self
            .customs
            .values()
            .filter(|c| c.supported_by(peer))
            .collect();
        out.write_vint(wired_customs.len() as u32)?;
        for custom in wired_customs {
            custom.write_to(out)?;
        }
        if peer.supports(TransportVersion::V_IMMUTABLE_STATE) {
            out.write_vint(self.immutable_states.len() as u32)?;
            for state in self.immutable_states.values() {
                state.write_to(out)?;
            }
        }
        Ok(())
    }
}

impl WireReadable for Metadata {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        let peer = input.version();
        let version = input.read_i64()? as u64;
        let cluster_uuid = input.read_string()?;
        let cluster_uuid_committed = input.read_bool()?;
        let coordination = CoordinationMetadata::read_from(input)?;
        let transient_settings = Settings::read_from(input)?;
        let persistent_settings = Settings::read_from(input)?;
        let hashes = if peer.supports(TransportVersion::V_CONSISTENT_SETTINGS) {
            input.read_string_map()?
        } else {
            BTreeMap::new()
        };
        let pooled = peer.supports(TransportVersion::V_MAPPINGS_AS_HASH);
        let pool = if pooled {
            MappingPool::read_from(input)?
        } else {
            MappingPool::new()
        };

        let mut builder = MetadataBuilder::new();
        builder
            .version(version)
            .cluster_uuid(cluster_uuid)
            .cluster_uuid_committed(cluster_uuid_committed)
            .coordination_metadata(coordination)
            .transient_settings(transient_settings)
            .persistent_settings(persistent_settings)
            .hashes_of_consistent_settings(hashes);

        let index_count = input.read_vint()? as usize;
        for _ in 0..index_count {
            let index =
                IndexMetadata::read_from_with(input, if pooled { Some(&pool) } else { None })?;
            builder.put_shared(Arc::new(index), false)?;
        }
        let template_count = input.read_vint()? as usize;
        for _ in 0..template_count {
            builder.put_template(IndexTemplateMetadata::read_from(input)?);
        }
        if peer.supports(TransportVersion::V_DATA_STREAMS) {
            for (name, t) in input.read_map(ComponentTemplate::read_from)? {
                builder.put_component_template(name, t);
            }
            for (name, t) in input.read_map(ComposableIndexTemplate::read_from)? {
                builder.put_composable_template(name, t);
            }
            for (_, stream) in input.read_map(DataStream::read_from)? {
                builder.put_data_stream(stream);
            }
            for (_, alias) in input.read_map(DataStreamAlias::read_from)? {
                builder.put_data_stream_alias_value(alias);
            }
        }
        let custom_count = input.read_vint()? as usize;
        for _ in 0..custom_count {
            builder.put_custom(Custom::read_from(input)?);
        }
        if peer.supports(TransportVersion::V_IMMUTABLE_STATE) {
            let state_count = input.read_vint()? as usize;
            for _ in 0..state_count {
                builder.put_immutable_state(ImmutableStateMetadata::read_from(input)?);
            }
        }
        builder.build()
    }
}

// ============================================================================
// Diff
// ============================================================================

/// Delta between two metadata values
///
/// The header (version, cluster uuid, committed bit) is carried in full;
/// everything else is a structural diff. Unknown customs from newer writers
/// ride the customs map diff verbatim.
pub struct MetadataDiff {
    changed: bool,
    version: u64,
    cluster_uuid: String,
    cluster_uuid_committed: bool,
    coordination: SimpleDiff<CoordinationMetadata>,
    transient_settings: SimpleDiff<Settings>,
    persistent_settings: SimpleDiff<Settings>,
    hashes_of_consistent_settings: MapDiff<String, String, StringDiff>,
    indices: MapDiff<String, Arc<IndexMetadata>, ArcDiff<IndexMetadataDiff>>,
    templates: MapDiff<String, IndexTemplateMetadata, SimpleDiff<IndexTemplateMetadata>>,
    component_templates: MapDiff<String, ComponentTemplate, SimpleDiff<ComponentTemplate>>,
    composable_templates:
        MapDiff<String, ComposableIndexTemplate, SimpleDiff<ComposableIndexTemplate>>,
    data_streams: MapDiff<String, DataStream, SimpleDiff<DataStream>>,
    data_stream_aliases: MapDiff<String, DataStreamAlias, SimpleDiff<DataStreamAlias>>,
    customs: MapDiff<String, Custom, SimpleDiff<Custom>>,
    immutable_states: MapDiff<String, ImmutableStateMetadata, SimpleDiff<ImmutableStateMetadata>>,
}

impl Diffable for Metadata {
    type Diff = MetadataDiff;

    fn diff_from(&self, prev: &Self) -> MetadataDiff {
        MetadataDiff {
            changed: self != prev,
            version: self.version,
            cluster_uuid: self.cluster_uuid.clone(),
            cluster_uuid_committed: self.cluster_uuid_committed,
            coordination: SimpleDiff::of(&prev.coordination, &self.coordination),
            transient_settings: SimpleDiff::of(&prev.transient_settings, &self.transient_settings),
            persistent_settings: SimpleDiff::of(
                &prev.persistent_settings,
                &self.persistent_settings,
            ),
            hashes_of_consistent_settings: MapDiff::of(
                &prev.hashes_of_consistent_settings,
                &self.hashes_of_consistent_settings,
            ),
            indices: MapDiff::of(&prev.indices, &self.indices),
            templates: MapDiff::of(&prev.templates, &self.templates),
            component_templates: MapDiff::of(
                &prev.component_templates,
                &self.component_templates,
            ),
            composable_templates: MapDiff::of(
                &prev.composable_templates,
                &self.composable_templates,
            ),
            data_streams: MapDiff::of(&prev.data_streams, &self.data_streams),
            data_stream_aliases: MapDiff::of(
                &prev.data_stream_aliases,
                &self.data_stream_aliases,
            ),
            customs: MapDiff::of(&prev.customs, &self.customs),
            immutable_states: MapDiff::of(&prev.immutable_states, &self.immutable_states),
        }
    }
}

impl Diff for MetadataDiff {
    type Target = Metadata;

    fn apply_to(&self, prev: &Metadata) -> Result<Metadata> {
        if !self.changed {
            return Ok(prev.clone());
        }
        let indices = self.indices.apply_to(&prev.indices)?;

        let mut builder = MetadataBuilder::new();
        builder
            .version(self.version)
            .cluster_uuid(self.cluster_uuid.clone())
            .cluster_uuid_committed(self.cluster_uuid_committed)
            .coordination_metadata(self.coordination.apply_to(&prev.coordination)?)
            .transient_settings(self.transient_settings.apply_to(&prev.transient_settings)?)
            .persistent_settings(
                self.persistent_settings
                    .apply_to(&prev.persistent_settings)?,
            )
            .hashes_of_consistent_settings(
                self.hashes_of_consistent_settings
                    .apply_to(&prev.hashes_of_consistent_settings)?,
            );
        for index in indices.into_values() {
            builder.put_shared(index, false)?;
        }
        for template in self.templates.apply_to(&prev.templates)?.into_values() {
            builder.put_template(template);
        }
        for (name, t) in self
            .component_templates
            .apply_to(&prev.component_templates)?
        {
            builder.put_component_template(name, t);
        }
        for (name, t) in self
            .composable_templates
            .apply_to(&prev.composable_templates)?
        {
            builder.put_composable_template(name, t);
        }
        for (_, stream) in self.data_streams.apply_to(&prev.data_streams)? {
            builder.put_data_stream(stream);
        }
        for (_, alias) in self
            .data_stream_aliases
            .apply_to(&prev.data_stream_aliases)?
        {
            builder.put_data_stream_alias_value(alias);
        }
        for (_, custom) in self.customs.apply_to(&prev.customs)? {
            builder.put_custom(custom);
        }
        for (_, state) in self.immutable_states.apply_to(&prev.immutable_states)? {
            builder.put_immutable_state(state);
        }
        builder.build()
    }

    fn has_changes(&self) -> bool {
        self.changed
    }
}

impl MetadataDiff {
    /// Wire encoding of the diff
    pub fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_bool(self.changed)?;
        out.write_i64(self.version as i64)?;
        out.write_string(&self.cluster_uuid)?;
        out.write_bool(self.cluster_uuid_committed)?;
        self.coordination.write_to(out, |out, c| c.write_to(out))?;
        self.transient_settings.write_to(out, |out, s| s.write_to(out))?;
        self.persistent_settings.write_to(out, |out, s| s.write_to(out))?;
        self.hashes_of_consistent_settings.write_to(
            out,
            |out, k| out.write_string(k),
            |out, v| out.write_string(v),
            |out, d| d.write_to(out, |out, v| out.write_string(v)),
        )?;
        self.indices.write_to(
            out,
            |out, k| out.write_string(k),
            |out, v| v.write_to_with(out, false),
            |out, d| d.0.write_to(out),
        )?;
        self.templates.write_to(
            out,
            |out, k| out.write_string(k),
            |out, v| v.write_to(out),
            |out, d| d.write_to(out, |out, v| v.write_to(out)),
        )?;
        self.component_templates.write_to(
            out,
            |out, k| out.write_string(k),
            |out, v| v.write_to(out),
            |out, d| d.write_to(out, |out, v| v.write_to(out)),
        )?;
        self.composable_templates.write_to(
            out,
            |out, k| out.write_string(k),
            |out, v| v.write_to(out),
            |out, d| d.write_to(out, |out, v| v.write_to(out)),
        )?;
        self.data_streams.write_to(
            out,
            |out, k| out.write_string(k),
            |out, v| v.write_to(out),
            |out, d| d.write_to(out, |out, v| v.write_to(out)),
        )?;
        self.data_stream_aliases.write_to(
            out,
            |out, k| out.write_string(k),
            |out, v| v.write_to(out),
            |out, d| d.write_to(out, |out, v| v.write_to(out)),
        )?;
        self.customs.write_to(
            out,
            |out, k| out.write_string(k),
            |out, v| v.write_to(out),
            |out, d| d.write_to(out, |out, v| v.write_to(out)),
        )?;
        self.immutable_states.write_to(
            out,
            |out, k| out.write_string(k),
            |out, v| v.write_to(out),
            |out, d| d.write_to(out, |out, v| v.write_to(out)),
        )
    }

    /// Read a diff written by [`MetadataDiff::write_to`]
    pub fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<MetadataDiff> {
        let changed = input.read_bool()?;
        let version = input.read_i64()? as u64;
        let cluster_uuid = input.read_string()?;
        let cluster_uuid_committed = input.read_bool()?;
        let coordination = SimpleDiff::read_from(input, CoordinationMetadata::read_from)?;
        let transient_settings = SimpleDiff::read_from(input, Settings::read_from)?;
        let persistent_settings = SimpleDiff::read_from(input, Settings::read_from)?;
        let hashes_of_consistent_settings = MapDiff::read_from(
            input,
            |input| input.read_string(),
            |input| input.read_string(),
            |input| SimpleDiff::read_from(input, |input| input.read_string()),
        )?;
        let indices = MapDiff::read_from(
            input,
            |input| input.read_string(),
            |input| Ok(Arc::new(IndexMetadata::read_from_with(input, None)?)),
            |input| Ok(ArcDiff(IndexMetadataDiff::read_from(input)?)),
        )?;
        let templates = MapDiff::read_from(
            input,
            |input| input.read_string(),
            IndexTemplateMetadata::read_from,
            |input| SimpleDiff::read_from(input, IndexTemplateMetadata::read_from),
        )?;
        let component_templates = MapDiff::read_from(
            input,
            |input| input.read_string(),
            ComponentTemplate::read_from,
            |input| SimpleDiff::read_from(input, ComponentTemplate::read_from),
        )?;
        let composable_templates = MapDiff::read_from(
            input,
            |input| input.read_string(),
            ComposableIndexTemplate::read_from,
            |input| SimpleDiff::read_from(input, ComposableIndexTemplate::read_from),
        )?;
        let data_streams = MapDiff::read_from(
            input,
            |input| input.read_string(),
            DataStream::read_from,
            |input| SimpleDiff::read_from(input, DataStream::read_from),
        )?;
        let data_stream_aliases = MapDiff::read_from(
            input,
            |input| input.read_string(),
            DataStreamAlias::read_from,
            |input| SimpleDiff::read_from(input, DataStreamAlias::read_from),
        )?;
        let customs = MapDiff::read_from(
            input,
            |input| input.read_string(),
            Custom::read_from,
            |input| SimpleDiff::read_from(input, Custom::read_from),
        )?;
        let immutable_states = MapDiff::read_from(
            input,
            |input| input.read_string(),
            ImmutableStateMetadata::read_from,
            |input| SimpleDiff::read_from(input, ImmutableStateMetadata::read_from),
        )?;
        Ok(MetadataDiff {
            changed,
            version,
            cluster_uuid,
            cluster_uuid_committed,
            coordination,
            transient_settings,
            persistent_settings,
            hashes_of_consistent_settings,
            indices,
            templates,
            component_templates,
            composable_templates,
            data_streams,
            data_stream_aliases,
            customs,
            immutable_states,
        })
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder over a source [`Metadata`]
///
/// Maps share their entries with the source value; single-index edits touch
/// one `Arc`, not the whole catalog. The mapping pool is carried forward
/// verbatim and purged only when a mutation could have orphaned a mapping.
#[derive(Debug)]
pub struct MetadataBuilder {
    previous_lookup: Option<IndicesLookup>,
    cluster_uuid: String,
    cluster_uuid_committed: bool,
    version: u64,
    coordination: CoordinationMetadata,
    persistent_settings: Settings,
    transient_settings: Settings,
    hashes_of_consistent_settings: BTreeMap<String, String>,
    indices: BTreeMap<String, Arc<IndexMetadata>>,
    templates: BTreeMap<String, IndexTemplateMetadata>,
    component_templates: BTreeMap<String, ComponentTemplate>,
    composable_templates: BTreeMap<String, ComposableIndexTemplate>,
    data_streams: BTreeMap<String, DataStream>,
    data_stream_aliases: BTreeMap<String, DataStreamAlias>,
    customs: BTreeMap<String, Custom>,
    immutable_states: BTreeMap<String, ImmutableStateMetadata>,
    mapping_pool: MappingPool,
    aliased_indices: BTreeMap<String, BTreeSet<String>>,
    check_for_unused_mappings: bool,
    lookup_invalidated: bool,
}

impl Default for MetadataBuilder {
    fn default() -> Self {
        MetadataBuilder::new()
    }
}

impl MetadataBuilder {
    /// Fresh empty builder
    pub fn new() -> MetadataBuilder {
        MetadataBuilder {
            previous_lookup: None,
            cluster_uuid: UNKNOWN_CLUSTER_UUID.to_string(),
            cluster_uuid_committed: false,
            version: 0,
            coordination: CoordinationMetadata::new(),
            persistent_settings: Settings::empty(),
            transient_settings: Settings::empty(),
            hashes_of_consistent_settings: BTreeMap::new(),
            indices: BTreeMap::new(),
            templates: BTreeMap::new(),
            component_templates: BTreeMap::new(),
            composable_templates: BTreeMap::new(),
            data_streams: BTreeMap::new(),
            data_stream_aliases: BTreeMap::new(),
            customs: BTreeMap::new(),
            immutable_states: BTreeMap::new(),
            mapping_pool: MappingPool::new(),
            aliased_indices: BTreeMap::new(),
            check_for_unused_mappings: false,
            lookup_invalidated: true,
        }
    }

    /// Builder seeded from an existing value
    pub fn from_metadata(metadata: &Metadata) -> MetadataBuilder {
        MetadataBuilder {
            previous_lookup: metadata.indices_lookup.get().cloned(),
            cluster_uuid: metadata.cluster_uuid.clone(),
            cluster_uuid_committed: metadata.cluster_uuid_committed,
            version: metadata.version,
            coordination: metadata.coordination.clone(),
            persistent_settings: metadata.persistent_settings.clone(),
            transient_settings: metadata.transient_settings.clone(),
            hashes_of_consistent_settings: metadata.hashes_of_consistent_settings.clone(),
            indices: metadata.indices.clone(),
            templates: metadata.templates.clone(),
            component_templates: metadata.component_templates.clone(),
            composable_templates: metadata.composable_templates.clone(),
            data_streams: metadata.data_streams.clone(),
            data_stream_aliases: metadata.data_stream_aliases.clone(),
            customs: metadata.customs.clone(),
            immutable_states: metadata.immutable_states.clone(),
            mapping_pool: metadata.mappings_by_hash.clone(),
            aliased_indices: metadata.aliased_indices.clone(),
            check_for_unused_mappings: false,
            lookup_invalidated: false,
        }
    }

    /// Set the catalog version
    pub fn version(&mut self, version: u64) -> &mut Self {
        self.version = version;
        self
    }

    /// Bump the catalog version by one
    pub fn with_incremented_version(&mut self) -> &mut Self {
        self.version += 1;
        self
    }

    /// Set the cluster uuid
    pub fn cluster_uuid(&mut self, uuid: impl Into<String>) -> &mut Self {
        self.cluster_uuid = uuid.into();
        self
    }

    /// Set the committed flag
    pub fn cluster_uuid_committed(&mut self, committed: bool) -> &mut Self {
        self.cluster_uuid_committed = committed;
        self
    }

    /// Mint a cluster uuid unless one is already set
    pub fn generate_cluster_uuid_if_needed(&mut self) -> &mut Self {
        if self.cluster_uuid == UNKNOWN_CLUSTER_UUID {
            self.cluster_uuid = uuid::Uuid::new_v4().to_string();
        }
        self
    }

    /// Set coordination metadata
    pub fn coordination_metadata(&mut self, coordination: CoordinationMetadata) -> &mut Self {
        self.coordination = coordination;
        self
    }

    /// Set persistent settings
    pub fn persistent_settings(&mut self, settings: Settings) -> &mut Self {
        self.persistent_settings = settings;
        self
    }

    /// Set transient settings
    pub fn transient_settings(&mut self, settings: Settings) -> &mut Self {
        self.transient_settings = settings;
        self
    }

    /// Set consistent-settings hashes
    pub fn hashes_of_consistent_settings(
        &mut self,
        hashes: BTreeMap<String, String>,
    ) -> &mut Self {
        self.hashes_of_consistent_settings = hashes;
        self
    }

    /// Intern the index's mapping into the pool
    ///
    /// Returns the instance to store: either the incoming one (its mapping
    /// was new to the pool) or a rebuild pointing at the pooled instance.
    fn dedupe_mapping(&mut self, index: Arc<IndexMetadata>) -> Arc<IndexMetadata> {
        let mapping = match index.mapping() {
            Some(mapping) => Arc::clone(mapping),
            None => return index,
        };
        match self.mapping_pool.get(&mapping.hash()) {
            Some(pooled) if Arc::ptr_eq(pooled, &mapping) => index,
            Some(pooled) => Arc::new(index.with_mapping_instance(Arc::clone(pooled))),
            None => {
                self.mapping_pool.dedupe(mapping);
                index
            }
        }
    }

    /// Add or replace an index
    pub fn put(&mut self, index: IndexMetadata, increment_version: bool) -> Result<&mut Self> {
        self.put_shared(Arc::new(index), increment_version)
    }

    /// Build and add an index in one step
    pub fn put_index_builder(
        &mut self,
        builder: IndexMetadataBuilder,
        increment_version: bool,
    ) -> Result<&mut Self> {
        let index = builder.build()?;
        self.put(index, increment_version)
    }

    /// Add or replace an index, sharing the instance
    ///
    /// Steps: reference-identity fast path, mapping dedupe, optional
    /// version bump, store, aliased-indices reconciliation, lookup
    /// invalidation when a name-visible facet changed.
    pub fn put_shared(
        &mut self,
        index: Arc<IndexMetadata>,
        increment_version: bool,
    ) -> Result<&mut Self> {
        let name = index.name().to_string();
        if let Some(existing) = self.indices.get(&name) {
            if Arc::ptr_eq(existing, &index) {
                return Ok(self);
            }
        }
        let index = self.dedupe_mapping(index);
        let index = if increment_version {
            Arc::new(index.with_incremented_version())
        } else {
            index
        };
        let previous = self.indices.insert(name.clone(), Arc::clone(&index));
        match &previous {
            Some(previous) => {
                let previous_hash = previous.mapping().map(|m| m.hash());
                let new_hash = index.mapping().map(|m| m.hash());
                if previous_hash != new_hash {
                    self.check_for_unused_mappings = true;
                }
                if previous.aliases() != index.aliases()
                    || previous.is_hidden() != index.is_hidden()
                    || previous.is_system() != index.is_system()
                    || previous.state() != index.state()
                {
                    self.lookup_invalidated = true;
                }
            }
            None => self.lookup_invalidated = true,
        }
        if let Some(previous) = previous {
            for alias in previous.aliases().keys() {
                if let Some(set) = self.aliased_indices.get_mut(alias) {
                    set.remove(&name);
                    if set.is_empty() {
                        self.aliased_indices.remove(alias);
                    }
                }
            }
        }
        for alias in index.aliases().keys() {
            self.aliased_indices
                .entry(alias.clone())
                .or_default()
                .insert(name.clone());
        }
        Ok(self)
    }

    /// Remove an index
    pub fn remove(&mut self, index_name: &str) -> &mut Self {
        if let Some(removed) = self.indices.remove(index_name) {
            if removed.mapping().is_some() {
                self.check_for_unused_mappings = true;
            }
            self.lookup_invalidated = true;
            for alias in removed.aliases().keys() {
                if let Some(set) = self.aliased_indices.get_mut(alias) {
                    set.remove(index_name);
                    if set.is_empty() {
                        self.aliased_indices.remove(alias);
                    }
                }
            }
        }
        self
    }

    /// Add or replace a data stream
    pub fn put_data_stream(&mut self, stream: DataStream) -> &mut Self {
        self.lookup_invalidated = true;
        self.data_streams.insert(stream.name().to_string(), stream);
        self
    }

    /// Remove a data stream
    pub fn remove_data_stream(&mut self, name: &str) -> &mut Self {
        if self.data_streams.remove(name).is_some() {
            self.lookup_invalidated = true;
        }
        self
    }

    /// Add a data stream to an alias (creating the alias if absent)
    pub fn put_data_stream_alias(
        &mut self,
        alias: &str,
        data_stream: &str,
        is_write: Option<bool>,
        filter: Option<serde_json::Value>,
    ) -> Result<&mut Self> {
        crate::alias_validator::validate_alias_standalone(alias, None)?;
        if let Some(filter) = &filter {
            crate::alias_validator::validate_alias_filter(alias, filter)?;
        }
        if !self.data_streams.contains_key(data_stream) {
            return Err(MetadataError::NotFound(format!(
                "data stream [{}]",
                data_stream
            )));
        }
        let updated = match self.data_stream_aliases.get(alias) {
            Some(existing) => existing.update(data_stream, is_write, filter),
            None => DataStreamAlias::new(alias, data_stream, is_write == Some(true), filter),
        };
        self.lookup_invalidated = true;
        self.data_stream_aliases.insert(alias.to_string(), updated);
        Ok(self)
    }

    /// Store an already-built data stream alias (wire reads, diff apply)
    pub fn put_data_stream_alias_value(&mut self, alias: DataStreamAlias) -> &mut Self {
        self.lookup_invalidated = true;
        self.data_stream_aliases
            .insert(alias.name().to_string(), alias);
        self
    }

    /// Remove a data stream from an alias, or the whole alias
    ///
    /// With `data_stream = None` the alias is removed outright. Removing
    /// the last member also removes the alias.
    pub fn remove_data_stream_alias(
        &mut self,
        alias: &str,
        data_stream: Option<&str>,
    ) -> Result<&mut Self> {
        let existing = self.data_stream_aliases.get(alias).ok_or_else(|| {
            MetadataError::NotFound(format!("data stream alias [{}]", alias))
        })?;
        self.lookup_invalidated = true;
        match data_stream {
            None => {
                self.data_stream_aliases.remove(alias);
            }
            Some(stream) => match existing.remove_data_stream(stream) {
                Some(updated) => {
                    self.data_stream_aliases.insert(alias.to_string(), updated);
                }
                None => {
                    self.data_stream_aliases.remove(alias);
                }
            },
        }
        Ok(self)
    }

    /// Add or replace a legacy template
    pub fn put_template(&mut self, template: IndexTemplateMetadata) -> &mut Self {
        self.templates.insert(template.name.clone(), template);
        self
    }

    /// Remove a legacy template
    pub fn remove_template(&mut self, name: &str) -> &mut Self {
        self.templates.remove(name);
        self
    }

    /// Add or replace a component template
    pub fn put_component_template(
        &mut self,
        name: impl Into<String>,
        template: ComponentTemplate,
    ) -> &mut Self {
        self.component_templates.insert(name.into(), template);
        self
    }

    /// Remove a component template
    pub fn remove_component_template(&mut self, name: &str) -> &mut Self {
        self.component_templates.remove(name);
        self
    }

    /// Add or replace a composable template
    pub fn put_composable_template(
        &mut self,
        name: impl Into<String>,
        template: ComposableIndexTemplate,
    ) -> &mut Self {
        self.composable_templates.insert(name.into(), template);
        self
    }

    /// Remove a composable template
    pub fn remove_composable_template(&mut self, name: &str) -> &mut Self {
        self.composable_templates.remove(name);
        self
    }

    /// Add or replace a custom fragment
    pub fn put_custom(&mut self, custom: Custom) -> &mut Self {
        self.customs.insert(custom.name().to_string(), custom);
        self
    }

    /// Remove a custom fragment by name
    pub fn remove_custom(&mut self, name: &str) -> &mut Self {
        self.customs.remove(name);
        self
    }

    /// Remove every custom matching the predicate
    pub fn remove_custom_if(&mut self, mut predicate: impl FnMut(&str, &Custom) -> bool) -> &mut Self {
        self.customs.retain(|name, custom| !predicate(name, custom));
        self
    }

    /// Replace the index graveyard
    pub fn index_graveyard(&mut self, graveyard: IndexGraveyard) -> &mut Self {
        self.put_custom(Custom::IndexGraveyard(graveyard))
    }

    /// Replace the in-flight snapshots
    pub fn snapshots_in_progress(&mut self, snapshots: SnapshotsInProgress) -> &mut Self {
        if snapshots.is_empty() {
            self.remove_custom(SNAPSHOTS_NAME)
        } else {
            self.put_custom(Custom::SnapshotsInProgress(snapshots))
        }
    }

    /// Add or replace an immutable-state namespace
    pub fn put_immutable_state(&mut self, state: ImmutableStateMetadata) -> &mut Self {
        self.immutable_states.insert(state.namespace.clone(), state);
        self
    }

    /// Remove an immutable-state namespace
    pub fn remove_immutable_state(&mut self, namespace: &str) -> &mut Self {
        self.immutable_states.remove(namespace);
        self
    }

    /// Merge settings into the named indices (all indices when empty)
    pub fn update_settings(&mut self, settings: &Settings, indices: &[&str]) -> Result<&mut Self> {
        let targets: Vec<String> = if indices.is_empty() {
            self.indices.keys().cloned().collect()
        } else {
            indices.iter().map(|s| s.to_string()).collect()
        };
        for name in &targets {
            let existing = self
                .indices
                .get(name)
                .ok_or_else(|| MetadataError::NotFound(format!("index [{}]", name)))?;
            let merged = existing.settings().merged_with(settings);
            let updated = IndexMetadata::builder_from(existing).settings(merged).build()?;
            self.put(updated, true)?;
        }
        Ok(self)
    }

    /// Set the replica count on the named indices
    pub fn update_number_of_replicas(
        &mut self,
        replicas: u32,
        indices: &[&str],
    ) -> Result<&mut Self> {
        let targets: Vec<String> = if indices.is_empty() {
            self.indices.keys().cloned().collect()
        } else {
            indices.iter().map(|s| s.to_string()).collect()
        };
        for name in &targets {
            let existing = self
                .indices
                .get(name)
                .ok_or_else(|| MetadataError::NotFound(format!("index [{}]", name)))?;
            let updated = IndexMetadata::builder_from(existing)
                .number_of_replicas(replicas)
                .build()?;
            self.put(updated, true)?;
        }
        Ok(self)
    }

    /// Validate the global invariants and freeze
    pub fn build(self) -> Result<Metadata> {
        let mut errors: Vec<String> = Vec::new();

        // Multi-index alias coherence
        for (alias, index_names) in &self.aliased_indices {
            if index_names.len() < 2 {
                continue;
            }
            let mut write_indices: Vec<&str> = Vec::new();
            let mut hidden_flags: BTreeSet<bool> = BTreeSet::new();
            let mut system_flags: BTreeSet<bool> = BTreeSet::new();
            let mut newest_mixed_system = false;
            for index_name in index_names {
                let Some(index) = self.indices.get(index_name) else {
                    continue;
                };
                if let Some(meta) = index.aliases().get(alias) {
                    if meta.is_write_index == Some(true) {
                        write_indices.push(index_name);
                    }
                    hidden_flags.insert(meta.is_hidden.unwrap_or(false));
                }
                system_flags.insert(index.is_system());
                if index
                    .creation_version()
                    .supports(TransportVersion::V_FEATURE_STATES)
                {
                    newest_mixed_system = true;
                }
            }
            if write_indices.len() > 1 {
                errors.push(format!(
                    "alias [{}] has more than one write index [{}]",
                    alias,
                    write_indices.join(", ")
                ));
            }
            if hidden_flags.len() > 1 {
                errors.push(format!(
                    "alias [{}] has is_hidden set inconsistently across its indices",
                    alias
                ));
            }
            if system_flags.len() > 1 && newest_mixed_system {
                errors.push(format!(
                    "alias [{}] refers to both system and non-system indices",
                    alias
                ));
            }
        }

        // Data stream integrity
        for (name, stream) in &self.data_streams {
            for index in stream.indices() {
                match self.indices.get(index.name()) {
                    None => errors.push(format!(
                        "data stream [{}] references missing backing index [{}]",
                        name,
                        index.name()
                    )),
                    Some(backing) => {
                        if !backing.aliases().is_empty() {
                            errors.push(format!(
                                "data stream [{}] backing index [{}] must not have aliases",
                                name,
                                index.name()
                            ));
                        }
                    }
                }
            }
        }
        for (alias, ds_alias) in &self.data_stream_aliases {
            for member in ds_alias.data_streams() {
                if !self.data_streams.contains_key(member) {
                    errors.push(format!(
                        "data stream alias [{}] references missing data stream [{}]",
                        alias, member
                    ));
                }
            }
        }

        // Name collision detection runs only when the cached lookup is
        // stale; an unchanged name set cannot have grown a collision.
        let reuse_lookup = !self.lookup_invalidated && self.previous_lookup.is_some();
        if !reuse_lookup {
            for alias in self.aliased_indices.keys() {
                if self.indices.contains_key(alias) {
                    errors.push(format!("alias [{}] conflicts with index [{}]", alias, alias));
                }
                if self.data_streams.contains_key(alias) {
                    errors.push(format!(
                        "alias [{}] conflicts with data stream [{}]",
                        alias, alias
                    ));
                }
                if self.data_stream_aliases.contains_key(alias) {
                    errors.push(format!(
                        "alias [{}] conflicts with data stream alias [{}]",
                        alias, alias
                    ));
                }
            }
            for stream in self.data_streams.keys() {
                if self.indices.contains_key(stream) {
                    errors.push(format!(
                        "data stream [{}] conflicts with index [{}]",
                        stream, stream
                    ));
                }
            }
            for ds_alias in self.data_stream_aliases.keys() {
                if self.indices.contains_key(ds_alias) {
                    errors.push(format!(
                        "data stream alias [{}] conflicts with index [{}]",
                        ds_alias, ds_alias
                    ));
                }
                if self.data_streams.contains_key(ds_alias) {
                    errors.push(format!(
                        "data stream alias [{}] conflicts with data stream [{}]",
                        ds_alias, ds_alias
                    ));
                }
            }
        }

        if !errors.is_empty() {
            return Err(MetadataError::InvalidState(errors.join("; ")));
        }

        let mut mapping_pool = self.mapping_pool;
        if self.check_for_unused_mappings {
            let live: HashSet<MappingHash> = self
                .indices
                .values()
                .filter_map(|i| i.mapping().map(|m| m.hash()))
                .collect();
            mapping_pool.purge(&live);
        }

        // Flat name arrays and shard totals
        let mut all_indices = Vec::with_capacity(self.indices.len());
        let mut visible_indices = Vec::new();
        let mut all_open_indices = Vec::new();
        let mut visible_open_indices = Vec::new();
        let mut all_closed_indices = Vec::new();
        let mut visible_closed_indices = Vec::new();
        let mut total_number_of_shards: u64 = 0;
        let mut total_open_index_shards: u64 = 0;
        let mut oldest_index_version = TransportVersion::CURRENT;
        for (name, index) in &self.indices {
            all_indices.push(name.clone());
            let open = index.state() == crate::index::IndexState::Open;
            let visible = !index.is_hidden();
            if visible {
                visible_indices.push(name.clone());
            }
            if open {
                all_open_indices.push(name.clone());
                if visible {
                    visible_open_indices.push(name.clone());
                }
                total_open_index_shards += u64::from(index.total_number_of_shards());
            } else {
                all_closed_indices.push(name.clone());
                if visible {
                    visible_closed_indices.push(name.clone());
                }
            }
            total_number_of_shards += u64::from(index.total_number_of_shards());
            oldest_index_version = oldest_index_version.min(index.compatibility_version());
        }

        let indices_lookup = OnceCell::new();
        if reuse_lookup {
            if let Some(lookup) = self.previous_lookup {
                let _ = indices_lookup.set(lookup);
            }
        }

        Ok(Metadata {
            cluster_uuid: self.cluster_uuid,
            cluster_uuid_committed: self.cluster_uuid_committed,
            version: self.version,
            coordination: self.coordination,
            persistent_settings: self.persistent_settings.clone(),
            transient_settings: self.transient_settings.clone(),
            settings: self
                .persistent_settings
                .merged_with(&self.transient_settings),
            hashes_of_consistent_settings: self.hashes_of_consistent_settings,
            indices: self.indices,
            templates: self.templates,
            component_templates: self.component_templates,
            composable_templates: self.composable_templates,
            data_streams: self.data_streams,
            data_stream_aliases: self.data_stream_aliases,
            customs: self.customs,
            immutable_states: self.immutable_states,
            mappings_by_hash: mapping_pool,
            aliased_indices: self.aliased_indices,
            all_indices,
            visible_indices,
            all_open_indices,
            visible_open_indices,
            all_closed_indices,
            visible_closed_indices,
            total_number_of_shards,
            total_open_index_shards,
            oldest_index_version,
            indices_lookup,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{AliasMetadata, IndexState};
    use crate::mapping::MappingMetadata;
    use crate::settings::keys;

    fn index_settings(shards: u32, replicas: u32) -> Settings {
        let mut b = Settings::builder();
        b.put_u32(keys::NUMBER_OF_SHARDS, shards)
            .put_u32(keys::NUMBER_OF_REPLICAS, replicas);
        b.build()
    }

    fn index(name: &str) -> IndexMetadata {
        IndexMetadata::builder(name)
            .uuid(format!("{}-uuid", name))
            .settings(index_settings(1, 0))
            .build()
            .unwrap()
    }

    fn index_with_mapping(name: &str, mapping: serde_json::Value) -> IndexMetadata {
        IndexMetadata::builder(name)
            .uuid(format!("{}-uuid", name))
            .settings(index_settings(1, 0))
            .mapping(Arc::new(MappingMetadata::new(mapping)))
            .build()
            .unwrap()
    }

    fn stream(name: &str, backing: &[&str]) -> DataStream {
        let indices = backing
            .iter()
            .map(|n| crate::index::Index::new(*n, format!("{}-uuid", n)))
            .collect();
        DataStream::new(name, indices, backing.len() as u64).unwrap()
    }

    #[test]
    fn test_empty_metadata() {
        let m = Metadata::empty();
        assert_eq!(m.version(), 0);
        assert_eq!(m.cluster_uuid(), UNKNOWN_CLUSTER_UUID);
        assert!(m.indices().is_empty());
        assert!(m.indices_lookup().is_empty());
    }

    #[test]
    fn test_mapping_dedup_on_put() {
        let mapping = serde_json::json!({"properties": {"f": {"type": "keyword"}}});
        let mut builder = Metadata::builder();
        builder.put(index_with_mapping("a", mapping.clone()), false).unwrap();
        builder.put(index_with_mapping("b", mapping), false).unwrap();
        let m = builder.build().unwrap();

        assert_eq!(m.mappings_by_hash().len(), 1);
        let a = m.index("a").unwrap().mapping().unwrap();
        let b = m.index("b").unwrap().mapping().unwrap();
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn test_pool_purged_on_remove() {
        let mut builder = Metadata::builder();
        builder
            .put(index_with_mapping("a", serde_json::json!({"a": 1})), false)
            .unwrap();
        builder
            .put(index_with_mapping("b", serde_json::json!({"b": 2})), false)
            .unwrap();
        let m = builder.build().unwrap();
        assert_eq!(m.mappings_by_hash().len(), 2);

        let mut builder = m.builder_from();
        builder.remove("b");
        let m2 = builder.build().unwrap();
        assert_eq!(m2.mappings_by_hash().len(), 1);
        assert!(m2
            .mappings_by_hash()
            .contains(&m2.index("a").unwrap().mapping().unwrap().hash()));
    }

    #[test]
    fn test_pool_purged_on_mapping_change() {
        let mut builder = Metadata::builder();
        builder
            .put(index_with_mapping("a", serde_json::json!({"v": 1})), false)
            .unwrap();
        let m = builder.build().unwrap();

        let replaced = IndexMetadata::builder_from(m.index("a").unwrap())
            .mapping(Arc::new(MappingMetadata::new(serde_json::json!({"v": 2}))))
            .build()
            .unwrap();
        let mut builder = m.builder_from();
        builder.put(replaced, true).unwrap();
        let m2 = builder.build().unwrap();

        assert_eq!(m2.mappings_by_hash().len(), 1);
        assert_eq!(
            m2.mappings_by_hash().hashes().next().copied().unwrap(),
            m2.index("a").unwrap().mapping().unwrap().hash()
        );
    }

    #[test]
    fn test_put_increment_version() {
        let mut builder = Metadata::builder();
        builder.put(index("a"), false).unwrap();
        let m = builder.build().unwrap();
        assert_eq!(m.index("a").unwrap().version(), 1);

        let mut builder = m.builder_from();
        let updated = IndexMetadata::builder_from(m.index("a").unwrap())
            .number_of_replicas(2)
            .build()
            .unwrap();
        builder.put(updated, true).unwrap();
        let m2 = builder.build().unwrap();
        assert_eq!(m2.index("a").unwrap().version(), 2);
    }

    #[test]
    fn test_put_shared_identity_fast_path() {
        let mut builder = Metadata::builder();
        builder.put(index("a"), false).unwrap();
        let m = builder.build().unwrap();

        let shared = Arc::clone(m.index("a").unwrap());
        let mut builder = m.builder_from();
        builder.put_shared(shared, true).unwrap();
        let m2 = builder.build().unwrap();
        // No-op: the version was not bumped
        assert_eq!(m2.index("a").unwrap().version(), 1);
    }

    #[test]
    fn test_name_collision_stream_vs_index() {
        let mut builder = Metadata::builder();
        builder.put(index("orders"), false).unwrap();
        builder.put(index(".ds-orders-2024.01.01-000001"), false).unwrap();
        builder.put_data_stream(stream("orders", &[".ds-orders-2024.01.01-000001"]));
        let err = builder.build().unwrap_err();
        assert!(err
            .to_string()
            .contains("data stream [orders] conflicts with index"));
    }

    #[test]
    fn test_name_collision_alias_vs_index() {
        let mut builder = Metadata::builder();
        builder.put(index("a"), false).unwrap();
        let aliased = IndexMetadata::builder("b")
            .uuid("b-uuid")
            .settings(index_settings(1, 0))
            .put_alias(AliasMetadata::new("a"))
            .build()
            .unwrap();
        builder.put(aliased, false).unwrap();
        let err = builder.build().unwrap_err();
        assert!(err.to_string().contains("alias [a] conflicts with index [a]"));
    }

    #[test]
    fn test_collisions_reported_together() {
        let mut builder = Metadata::builder();
        builder.put(index("orders"), false).unwrap();
        builder.put(index("metrics"), false).unwrap();
        builder.put(index(".ds-orders-2024.01.01-000001"), false).unwrap();
        builder.put(index(".ds-metrics-2024.01.01-000001"), false).unwrap();
        builder.put_data_stream(stream("orders", &[".ds-orders-2024.01.01-000001"]));
        builder.put_data_stream(stream("metrics", &[".ds-metrics-2024.01.01-000001"]));
        let err = builder.build().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("data stream [orders] conflicts with index"));
        assert!(message.contains("data stream [metrics] conflicts with index"));
    }

    #[test]
    fn test_two_write_indices_rejected() {
        let mut builder = Metadata::builder();
        for name in ["a", "b"] {
            let aliased = IndexMetadata::builder(name)
                .uuid(format!("{}-uuid", name))
                .settings(index_settings(1, 0))
                .put_alias(AliasMetadata::new("shared").with_write_index(true))
                .build()
                .unwrap();
            builder.put(aliased, false).unwrap();
        }
        let err = builder.build().unwrap_err();
        assert!(err
            .to_string()
            .contains("alias [shared] has more than one write index"));
    }

    #[test]
    fn test_single_write_index_accepted() {
        let mut builder = Metadata::builder();
        let a = IndexMetadata::builder("a")
            .uuid("a-uuid")
            .settings(index_settings(1, 0))
            .put_alias(AliasMetadata::new("shared").with_write_index(true))
            .build()
            .unwrap();
        let b = IndexMetadata::builder("b")
            .uuid("b-uuid")
            .settings(index_settings(1, 0))
            .put_alias(AliasMetadata::new("shared"))
            .build()
            .unwrap();
        builder.put(a, false).unwrap();
        builder.put(b, false).unwrap();
        let m = builder.build().unwrap();
        match m.indices_lookup().get("shared").unwrap() {
            IndexAbstraction::Alias { write_index, .. } => {
                assert_eq!(write_index.as_deref(), Some("a"));
            }
            other => panic!("expected alias, got {:?}", other),
        }
    }

    #[test]
    fn test_mixed_hidden_alias_rejected() {
        let mut builder = Metadata::builder();
        let a = IndexMetadata::builder("a")
            .uuid("a-uuid")
            .settings(index_settings(1, 0))
            .put_alias(AliasMetadata::new("shared").with_hidden(true))
            .build()
            .unwrap();
        let b = IndexMetadata::builder("b")
            .uuid("b-uuid")
            .settings(index_settings(1, 0))
            .put_alias(AliasMetadata::new("shared").with_hidden(false))
            .build()
            .unwrap();
        builder.put(a, false).unwrap();
        builder.put(b, false).unwrap();
        let err = builder.build().unwrap_err();
        assert!(err.to_string().contains("is_hidden set inconsistently"));
    }

    #[test]
    fn test_backing_index_with_alias_rejected() {
        let mut builder = Metadata::builder();
        let backing = IndexMetadata::builder(".ds-s-2024.01.01-000001")
            .uuid("b-uuid")
            .settings(index_settings(1, 0))
            .put_alias(AliasMetadata::new("bad"))
            .build()
            .unwrap();
        builder.put(backing, false).unwrap();
        builder.put_data_stream(stream("s", &[".ds-s-2024.01.01-000001"]));
        let err = builder.build().unwrap_err();
        assert!(err.to_string().contains("must not have aliases"));
    }

    #[test]
    fn test_missing_backing_index_rejected() {
        let mut builder = Metadata::builder();
        builder.put_data_stream(stream("s", &[".ds-s-2024.01.01-000001"]));
        let err = builder.build().unwrap_err();
        assert!(err.to_string().contains("missing backing index"));
    }

    #[test]
    fn test_flat_arrays_and_totals() {
        let mut builder = Metadata::builder();
        let mut hidden_settings = Settings::builder();
        hidden_settings
            .put_u32(keys::NUMBER_OF_SHARDS, 2)
            .put_u32(keys::NUMBER_OF_REPLICAS, 1)
            .put_bool(keys::INDEX_HIDDEN, true);
        let hidden = IndexMetadata::builder("hidden-open")
            .uuid("h-uuid")
            .settings(hidden_settings.build())
            .build()
            .unwrap();
        let closed = IndexMetadata::builder("visible-closed")
            .uuid("c-uuid")
            .settings(index_settings(3, 0))
            .state(IndexState::Closed)
            .build()
            .unwrap();
        builder.put(index("visible-open"), false).unwrap();
        builder.put(hidden, false).unwrap();
        builder.put(closed, false).unwrap();
        let m = builder.build().unwrap();

        assert_eq!(m.all_indices().len(), 3);
        assert_eq!(m.visible_indices(), &["visible-closed", "visible-open"]);
        assert_eq!(m.all_open_indices(), &["hidden-open", "visible-open"]);
        assert_eq!(m.visible_open_indices(), &["visible-open"]);
        assert_eq!(m.all_closed_indices(), &["visible-closed"]);
        assert_eq!(m.visible_closed_indices(), &["visible-closed"]);
        // hidden-open: 2 shards * 2 copies = 4; visible-open: 1; closed: 3
        assert_eq!(m.total_number_of_shards(), 8);
        assert_eq!(m.total_open_index_shards(), 5);
        assert_eq!(
            m.all_open_indices().len() + m.all_closed_indices().len(),
            m.all_indices().len()
        );
    }

    #[test]
    fn test_lookup_contains_all_abstractions() {
        let mut builder = Metadata::builder();
        builder.put(index(".ds-s-2024.01.01-000001"), false).unwrap();
        let aliased = IndexMetadata::builder("plain")
            .uuid("p-uuid")
            .settings(index_settings(1, 0))
            .put_alias(AliasMetadata::new("my-alias"))
            .build()
            .unwrap();
        builder.put(aliased, false).unwrap();
        builder.put_data_stream(stream("s", &[".ds-s-2024.01.01-000001"]));
        builder
            .put_data_stream_alias("stream-alias", "s", Some(true), None)
            .unwrap();
        let m = builder.build().unwrap();
        let lookup = m.indices_lookup();

        assert!(matches!(
            lookup.get("plain"),
            Some(IndexAbstraction::ConcreteIndex { .. })
        ));
        assert!(matches!(
            lookup.get("s"),
            Some(IndexAbstraction::DataStream { .. })
        ));
        assert!(matches!(
            lookup.get("my-alias"),
            Some(IndexAbstraction::Alias { .. })
        ));
        match lookup.get("stream-alias").unwrap() {
            IndexAbstraction::Alias {
                data_stream_alias,
                write_index,
                ..
            } => {
                assert!(data_stream_alias);
                assert_eq!(write_index.as_deref(), Some("s"));
            }
            other => panic!("expected alias, got {:?}", other),
        }
        assert_eq!(
            m.parent_data_stream(".ds-s-2024.01.01-000001"),
            Some("s")
        );
    }

    #[test]
    fn test_lookup_reused_when_no_name_facet_changed() {
        let mut builder = Metadata::builder();
        builder.put(index("a"), false).unwrap();
        let m = builder.build().unwrap();
        let lookup_before = m.indices_lookup() as *const IndicesLookup;
        let _ = lookup_before;

        // settings-only change keeps names intact
        let mut builder = m.builder_from();
        builder
            .update_settings(
                &{
                    let mut b = Settings::builder();
                    b.put("index.refresh_interval", "5s");
                    b.build()
                },
                &["a"],
            )
            .unwrap();
        let m2 = builder.build().unwrap();
        assert!(m2.indices_lookup.get().is_some(), "lookup carried forward");
        assert_eq!(m2.indices_lookup().len(), 1);
    }

    #[test]
    fn test_builder_without_mutation_builds_equal() {
        let mut builder = Metadata::builder();
        builder.put(index("a"), false).unwrap();
        builder.put_data_stream_alias_value(DataStreamAlias::new("dsa", "s", false, None));
        builder.remove_data_stream_alias("dsa", None).unwrap();
        let m = builder.build().unwrap();

        let m2 = m.builder_from().build().unwrap();
        assert_eq!(m2, m);
    }

    #[test]
    fn test_generate_cluster_uuid_if_needed() {
        let mut builder = Metadata::builder();
        builder.generate_cluster_uuid_if_needed();
        let m = builder.build().unwrap();
        assert_ne!(m.cluster_uuid(), UNKNOWN_CLUSTER_UUID);

        let uuid = m.cluster_uuid().to_string();
        let mut builder = m.builder_from();
        builder.generate_cluster_uuid_if_needed();
        assert_eq!(builder.build().unwrap().cluster_uuid(), uuid);
    }

    #[test]
    fn test_update_number_of_replicas() {
        let mut builder = Metadata::builder();
        builder.put(index("a"), false).unwrap();
        builder.put(index("b"), false).unwrap();
        let m = builder.build().unwrap();

        let mut builder = m.builder_from();
        builder.update_number_of_replicas(3, &["a"]).unwrap();
        let m2 = builder.build().unwrap();
        assert_eq!(m2.index("a").unwrap().number_of_replicas(), 3);
        assert_eq!(m2.index("b").unwrap().number_of_replicas(), 0);
    }

    #[test]
    fn test_update_settings_missing_index() {
        let mut builder = Metadata::builder();
        let err = builder
            .update_settings(&Settings::empty(), &["ghost"])
            .unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)));
    }

    #[test]
    fn test_merged_settings_transient_wins() {
        let mut persistent = Settings::builder();
        persistent.put("cluster.key", "persistent").put("only.persistent", "1");
        let mut transient = Settings::builder();
        transient.put("cluster.key", "transient");

        let mut builder = Metadata::builder();
        builder
            .persistent_settings(persistent.build())
            .transient_settings(transient.build());
        let m = builder.build().unwrap();
        assert_eq!(m.settings().get("cluster.key"), Some("transient"));
        assert_eq!(m.settings().get("only.persistent"), Some("1"));
    }

    #[test]
    fn test_put_index_builder() {
        let mut builder = Metadata::builder();
        builder
            .put_index_builder(
                IndexMetadata::builder("via-builder")
                    .uuid("vb-uuid")
                    .settings(index_settings(1, 0)),
                false,
            )
            .unwrap();
        let m = builder.build().unwrap();
        assert!(m.has_index("via-builder"));
    }

    #[test]
    fn test_validate_name_available() {
        let m = sample_metadata();
        m.validate_name_available("free-name").unwrap();

        let err = m.validate_name_available("plain").unwrap_err();
        assert_eq!(err.to_string(), "index [plain] already exists");
        let err = m.validate_name_available("s").unwrap_err();
        assert_eq!(err.to_string(), "data stream [s] already exists");
        let err = m.validate_name_available("al").unwrap_err();
        assert_eq!(err.to_string(), "alias [al] already exists");
    }

    #[test]
    fn test_validate_new_alias() {
        let m = sample_metadata();
        m.validate_new_alias("fresh-alias", "plain", None).unwrap();

        // "plain" is a concrete index; it cannot double as an alias name
        let err = m.validate_new_alias("plain", "a", None).unwrap_err();
        assert!(matches!(err, MetadataError::InvalidAliasName { .. }));

        let err = m
            .validate_new_alias("fresh-alias", "plain", Some("r1,r2"))
            .unwrap_err();
        assert!(err.to_string().contains("several index routing values"));
    }

    #[test]
    fn test_put_data_stream_alias_validates() {
        let m = sample_metadata();
        let mut builder = m.builder_from();
        let err = builder
            .put_data_stream_alias("UPPER", "s", None, None)
            .unwrap_err();
        assert!(matches!(err, MetadataError::InvalidAliasName { .. }));

        let err = builder
            .put_data_stream_alias("ok-alias", "s", None, Some(serde_json::json!([])))
            .unwrap_err();
        assert!(err.to_string().contains("failed to parse filter"));

        let err = builder
            .put_data_stream_alias("ok-alias", "ghost-stream", None, None)
            .unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)));
    }

    #[test]
    fn test_remove_custom_if() {
        let mut builder = Metadata::builder();
        builder.put_custom(Custom::Unknown {
            name: "keep".to_string(),
            payload: vec![],
            min_version: TransportVersion::V_BASE,
        });
        builder.put_custom(Custom::Unknown {
            name: "drop".to_string(),
            payload: vec![],
            min_version: TransportVersion::V_BASE,
        });
        builder.remove_custom_if(|name, _| name == "drop");
        let m = builder.build().unwrap();
        assert!(m.custom("keep").is_some());
        assert!(m.custom("drop").is_none());
    }

    #[test]
    fn test_wire_roundtrip_current() {
        let m = sample_metadata();
        let bytes = clustermeta_core::wire::to_bytes(&m, TransportVersion::CURRENT).unwrap();
        let decoded: Metadata =
            clustermeta_core::wire::from_bytes(&bytes, TransportVersion::CURRENT).unwrap();
        assert_eq!(decoded, m);
    }

    #[test]
    fn test_wire_roundtrip_old_peer() {
        let m = sample_metadata();
        let old = TransportVersion::V_DATA_STREAMS;
        let bytes = clustermeta_core::wire::to_bytes(&m, old).unwrap();
        let decoded: Metadata = clustermeta_core::wire::from_bytes(&bytes, old).unwrap();
        // Pre-pool peers still agree on the indices and their mappings
        assert_eq!(decoded.indices(), m.indices());
        assert_eq!(decoded.data_streams(), m.data_streams());
        assert!(decoded.immutable_states().is_empty());
    }

    #[test]
    fn test_wire_pool_shares_identity() {
        let mapping = serde_json::json!({"properties": {"f": {"type": "long"}}});
        let mut builder = Metadata::builder();
        builder.put(index_with_mapping("a", mapping.clone()), false).unwrap();
        builder.put(index_with_mapping("b", mapping), false).unwrap();
        let m = builder.build().unwrap();

        let bytes = clustermeta_core::wire::to_bytes(&m, TransportVersion::CURRENT).unwrap();
        let decoded: Metadata =
            clustermeta_core::wire::from_bytes(&bytes, TransportVersion::CURRENT).unwrap();
        assert_eq!(decoded.mappings_by_hash().len(), 1);
        assert!(Arc::ptr_eq(
            decoded.index("a").unwrap().mapping().unwrap(),
            decoded.index("b").unwrap().mapping().unwrap()
        ));
    }

    #[test]
    fn test_diff_roundtrip_with_replacement() {
        // prev: {a, b, c}; curr: {a, b' (mapping changed), d}
        let shared = serde_json::json!({"shared": true});
        let mut builder = Metadata::builder();
        builder.put(index_with_mapping("a", shared.clone()), false).unwrap();
        builder.put(index_with_mapping("b", serde_json::json!({"b": 1})), false).unwrap();
        builder.put(index_with_mapping("c", serde_json::json!({"c": 1})), false).unwrap();
        let prev = builder.build().unwrap();

        let mut builder = prev.builder_from();
        let b_replaced = IndexMetadata::builder_from(prev.index("b").unwrap())
            .mapping(Arc::new(MappingMetadata::new(serde_json::json!({"b": 2}))))
            .build()
            .unwrap();
        builder.put(b_replaced, true).unwrap();
        builder.remove("c");
        builder.put(index_with_mapping("d", serde_json::json!({"d": 1})), false).unwrap();
        builder.with_incremented_version();
        let curr = builder.build().unwrap();

        let diff = curr.diff_from(&prev);
        assert!(diff.has_changes());
        let applied = diff.apply_to(&prev).unwrap();
        assert_eq!(applied, curr);

        // The pool holds exactly the mappings of a, b', d
        assert_eq!(applied.mappings_by_hash().len(), 3);
        let c_hash = MappingMetadata::new(serde_json::json!({"c": 1})).hash();
        assert!(!applied.mappings_by_hash().contains(&c_hash));
        // a's unchanged mapping is identity-shared with prev
        assert!(Arc::ptr_eq(
            applied.index("a").unwrap().mapping().unwrap(),
            prev.index("a").unwrap().mapping().unwrap()
        ));
    }

    #[test]
    fn test_diff_no_change_is_identity() {
        let m = sample_metadata();
        let diff = m.diff_from(&m.clone());
        assert!(!diff.has_changes());
        assert_eq!(diff.apply_to(&m).unwrap(), m);
    }

    #[test]
    fn test_diff_wire_roundtrip() {
        let mut builder = Metadata::builder();
        builder.put(index("a"), false).unwrap();
        let prev = builder.build().unwrap();

        let mut builder = prev.builder_from();
        builder.put(index("b"), false).unwrap();
        builder.remove("a");
        builder.with_incremented_version();
        let curr = builder.build().unwrap();

        let diff = curr.diff_from(&prev);
        let mut writer =
            WireWriter::new(Vec::new(), TransportVersion::CURRENT);
        diff.write_to(&mut writer).unwrap();
        let bytes = writer.into_inner();
        let mut reader =
            WireReader::new(bytes.as_slice(), TransportVersion::CURRENT);
        let decoded = MetadataDiff::read_from(&mut reader).unwrap();
        assert_eq!(decoded.apply_to(&prev).unwrap(), curr);
    }

    #[test]
    fn test_unknown_custom_forwarded_through_diff() {
        let mut builder = Metadata::builder();
        builder.put_custom(Custom::Unknown {
            name: "future".to_string(),
            payload: vec![9, 9, 9],
            min_version: TransportVersion::V_BASE,
        });
        let curr = builder.build().unwrap();
        let prev = Metadata::empty();

        let diff = curr.diff_from(&prev);
        let applied = diff.apply_to(&prev).unwrap();
        assert_eq!(
            applied.custom("future"),
            Some(&Custom::Unknown {
                name: "future".to_string(),
                payload: vec![9, 9, 9],
                min_version: TransportVersion::V_BASE,
            })
        );
    }

    #[test]
    fn test_customs_gated_by_min_version() {
        let mut builder = Metadata::builder();
        builder.put_custom(Custom::Unknown {
            name: "newfangled".to_string(),
            payload: vec![1],
            min_version: TransportVersion::V_IMMUTABLE_STATE,
        });
        let m = builder.build().unwrap();

        let old = TransportVersion::V_DATA_STREAMS;
        let bytes = clustermeta_core::wire::to_bytes(&m, old).unwrap();
        let decoded: Metadata = clustermeta_core::wire::from_bytes(&bytes, old).unwrap();
        assert!(decoded.custom("newfangled").is_none());
    }

    fn sample_metadata() -> Metadata {
        let mut builder = Metadata::builder();
        builder
            .cluster_uuid("cluster-uuid-1")
            .cluster_uuid_committed(true)
            .version(12);
        builder.put(index_with_mapping("a", serde_json::json!({"a": 1})), false).unwrap();
        let aliased = IndexMetadata::builder("plain")
            .uuid("p-uuid")
            .settings(index_settings(2, 1))
            .put_alias(AliasMetadata::new("al").with_write_index(true))
            .build()
            .unwrap();
        builder.put(aliased, false).unwrap();
        builder.put(index(".ds-s-2024.01.01-000001"), false).unwrap();
        builder.put_data_stream(stream("s", &[".ds-s-2024.01.01-000001"]));
        builder
            .put_data_stream_alias("dsa", "s", Some(true), None)
            .unwrap();
        builder.put_template(IndexTemplateMetadata::new("t", vec!["t-*".to_string()]));
        builder.put_composable_template(
            "ct",
            ComposableIndexTemplate::new(vec!["ct-*".to_string()]),
        );
        builder.put_component_template(
            "comp",
            ComponentTemplate {
                template: crate::template::Template::default(),
                version: Some(1),
                metadata: None,
            },
        );
        builder.index_graveyard(
            IndexGraveyard::new().with_tombstone(crate::index::Index::new("dead", "dead-uuid"), 1),
        );
        builder.put_immutable_state(ImmutableStateMetadata::new("file_settings", 3));
        builder.build().unwrap()
    }
}
