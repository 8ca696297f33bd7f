//! Data streams
//!
//! A data stream is a virtual, append-only collection of backing indices
//! with a guaranteed timestamp field. The backing list is ordered oldest
//! first; the last element is the write index. The generation counter
//! increments on every rollover and is embedded in backing-index names.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::{Read, Write};

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use clustermeta_core::error::{MetadataError, Result};
use clustermeta_core::simple_diffable;
use clustermeta_core::version::TransportVersion;
use clustermeta_core::wire::{WireReadable, WireReader, WireWritable, WireWriter};

use crate::alias_validator::validate_index_or_alias_name;
use crate::index::Index;

/// The timestamp field every data stream guarantees
pub const TIMESTAMP_FIELD: &str = "@timestamp";

/// Prefix of all backing-index names
pub const BACKING_INDEX_PREFIX: &str = ".ds-";

/// Compute the conventional backing-index name
///
/// `.ds-<stream>-<yyyy.MM.dd of epoch_millis, UTC>-<generation zero-padded
/// to 6 digits>`
pub fn default_backing_index_name(stream: &str, generation: u64, epoch_millis: i64) -> String {
    let date = Utc
        .timestamp_millis_opt(epoch_millis)
        .single()
        .unwrap_or_else(|| Utc.timestamp_millis_opt(0).unwrap());
    format!(
        "{}{}-{}-{:06}",
        BACKING_INDEX_PREFIX,
        stream,
        date.format("%Y.%m.%d"),
        generation
    )
}

/// Validate a proposed data-stream name
///
/// The shared name rule applies, plus the stream must not collide with the
/// backing-index namespace.
pub fn validate_data_stream_name(name: &str) -> Result<()> {
    validate_index_or_alias_name("data stream", name)?;
    if name.starts_with(BACKING_INDEX_PREFIX) {
        return Err(MetadataError::InvalidInput(format!(
            "data stream name [{}] must not start with [{}]",
            name, BACKING_INDEX_PREFIX
        )));
    }
    Ok(())
}

/// An append-only collection of backing indices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataStream {
    name: String,
    timestamp_field: String,
    indices: Vec<Index>,
    generation: u64,
    metadata: Option<BTreeMap<String, serde_json::Value>>,
    hidden: bool,
    replicated: bool,
    system: bool,
    allow_custom_routing: bool,
}

simple_diffable!(DataStream);

impl DataStream {
    /// Create a data stream over existing backing indices
    ///
    /// The list must be non-empty; its last element is the write index.
    pub fn new(name: impl Into<String>, indices: Vec<Index>, generation: u64) -> Result<DataStream> {
        let name = name.into();
        if indices.is_empty() {
            return Err(MetadataError::InvalidInput(format!(
                "data stream [{}] must have at least one backing index",
                name
            )));
        }
        Ok(DataStream {
            name,
            timestamp_field: TIMESTAMP_FIELD.to_string(),
            indices,
            generation,
            metadata: None,
            hidden: false,
            replicated: false,
            system: false,
            allow_custom_routing: false,
        })
    }

    /// The stream name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The guaranteed timestamp field (always `@timestamp`)
    pub fn timestamp_field(&self) -> &str {
        &self.timestamp_field
    }

    /// Backing indices, oldest first, write index last
    pub fn indices(&self) -> &[Index] {
        &self.indices
    }

    /// The current write index
    pub fn write_index(&self) -> &Index {
        self.indices.last().expect("backing index list is non-empty")
    }

    /// Rollover count
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Opaque user metadata
    pub fn metadata(&self) -> Option<&BTreeMap<String, serde_json::Value>> {
        self.metadata.as_ref()
    }

    /// Hidden from wildcard resolution
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Replicated from a remote cluster (read-only locally)
    pub fn is_replicated(&self) -> bool {
        self.replicated
    }

    /// System stream
    pub fn is_system(&self) -> bool {
        self.system
    }

    /// Whether documents may carry custom routing
    pub fn allows_custom_routing(&self) -> bool {
        self.allow_custom_routing
    }

    /// Copy with metadata attached
    pub fn with_metadata(mut self, metadata: BTreeMap<String, serde_json::Value>) -> DataStream {
        self.metadata = Some(metadata);
        self
    }

    /// Copy with the hidden flag set
    pub fn with_hidden(mut self, hidden: bool) -> DataStream {
        self.hidden = hidden;
        self
    }

    /// Copy with the replicated flag set
    pub fn with_replicated(mut self, replicated: bool) -> DataStream {
        self.replicated = replicated;
        self
    }

    /// Copy with the system flag set
    pub fn with_system(mut self, system: bool) -> DataStream {
        self.system = system;
        self
    }

    /// Copy with the custom-routing flag set
    pub fn with_allow_custom_routing(mut self, allow: bool) -> DataStream {
        self.allow_custom_routing = allow;
        self
    }

    /// Whether the given index name is one of the backing indices
    pub fn contains_index(&self, index_name: &str) -> bool {
        self.indices.iter().any(|i| i.name() == index_name)
    }

    /// Roll over to a new write index
    ///
    /// `name_taken` reports whether a candidate backing-index name is
    /// already present in the indices lookup; the generation keeps
    /// incrementing past collisions so the returned stream's write index
    /// always has a free name.
    pub fn rollover(
        &self,
        name_taken: impl Fn(&str) -> bool,
        write_index_uuid: &str,
        epoch_millis: i64,
    ) -> Result<DataStream> {
        if self.replicated {
            return Err(MetadataError::InvalidInput(format!(
                "data stream [{}] cannot be rolled over, because it is a replicated data stream",
                self.name
            )));
        }
        let mut generation = self.generation;
        let new_name = loop {
            generation += 1;
            let candidate = default_backing_index_name(&self.name, generation, epoch_millis);
            if !name_taken(&candidate) {
                break candidate;
            }
        };
        let mut next = self.clone();
        next.indices.push(Index::new(new_name, write_index_uuid));
        next.generation = generation;
        Ok(next)
    }

    /// Remove a backing index
    ///
    /// Fails if the index is not part of the stream or is the current write
    /// index.
    pub fn remove_backing_index(&self, index_name: &str) -> Result<DataStream> {
        let position = self.indices.iter().position(|i| i.name() == index_name);
        match position {
            None => Err(MetadataError::InvalidInput(format!(
                "index [{}] is not part of data stream [{}]",
                index_name, self.name
            ))),
            Some(pos) if pos == self.indices.len() - 1 => {
                Err(MetadataError::InvalidInput(format!(
                    "cannot remove backing index [{}] of data stream [{}] because it is the write index",
                    index_name, self.name
                )))
            }
            Some(pos) => {
                let mut next = self.clone();
                next.indices.remove(pos);
                Ok(next)
            }
        }
    }

    /// Replace a backing index in place
    ///
    /// Same constraints as removal; the write index cannot be replaced.
    pub fn replace_backing_index(&self, existing: &str, replacement: Index) -> Result<DataStream> {
        let position = self.indices.iter().position(|i| i.name() == existing);
        match position {
            None => Err(MetadataError::InvalidInput(format!(
                "index [{}] is not part of data stream [{}]",
                existing, self.name
            ))),
            Some(pos) if pos == self.indices.len() - 1 => {
                Err(MetadataError::InvalidInput(format!(
                    "cannot replace backing index [{}] of data stream [{}] because it is the write index",
                    existing, self.name
                )))
            }
            Some(pos) => {
                let mut next = self.clone();
                next.indices[pos] = replacement;
                next.generation += 1;
                Ok(next)
            }
        }
    }

    /// Adopt an existing index as the new oldest backing index
    ///
    /// The caller supplies what the metadata knows about the index: the
    /// stream currently owning it (if any) and its aliases. Both forbid
    /// adoption.
    pub fn add_backing_index(
        &self,
        index: Index,
        owning_stream: Option<&str>,
        aliases: &[String],
    ) -> Result<DataStream> {
        if let Some(owner) = owning_stream {
            if owner != self.name {
                return Err(MetadataError::InvalidInput(format!(
                    "cannot add index [{}] to data stream [{}] because it is already a backing index on data stream [{}]",
                    index.name(),
                    self.name,
                    owner
                )));
            }
            // Already one of ours.
            return Ok(self.clone());
        }
        if !aliases.is_empty() {
            return Err(MetadataError::InvalidInput(format!(
                "cannot add index [{}] to data stream [{}] until its alias(es) [{}] are removed",
                index.name(),
                self.name,
                aliases.join(", ")
            )));
        }
        let mut next = self.clone();
        next.indices.insert(0, index);
        next.generation += 1;
        Ok(next)
    }

    /// Reconcile against the indices actually captured by a snapshot
    ///
    /// Retains only backing indices named in `indices_in_snapshot`. Returns
    /// `Some(self)` unchanged when everything was captured, `None` when
    /// nothing was (the stream drops out of the snapshot), and a filtered
    /// copy otherwise.
    pub fn snapshot(&self, indices_in_snapshot: &HashSet<String>) -> Option<DataStream> {
        let retained: Vec<Index> = self
            .indices
            .iter()
            .filter(|i| indices_in_snapshot.contains(i.name()))
            .cloned()
            .collect();
        if retained.len() == self.indices.len() {
            return Some(self.clone());
        }
        if retained.is_empty() {
            return None;
        }
        let mut next = self.clone();
        next.indices = retained;
        next.metadata = self.metadata.clone();
        Some(next)
    }
}

impl WireWritable for DataStream {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_string(&self.name)?;
        out.write_string(&self.timestamp_field)?;
        out.write_collection(&self.indices, |out, i| i.write_to(out))?;
        out.write_vlong(self.generation)?;
        out.write_optional(self.metadata.as_ref(), |out, m| {
            out.write_map(m, |out, v| {
                let bytes = serde_json::to_vec(v).expect("JSON value serializes");
                out.write_bytes(&bytes)
            })
        })?;
        out.write_bool(self.hidden)?;
        out.write_bool(self.replicated)?;
        out.write_bool(self.system)?;
        if out.version().supports(TransportVersion::V_CUSTOM_ROUTING) {
            out.write_bool(self.allow_custom_routing)?;
        }
        Ok(())
    }
}

impl WireReadable for DataStream {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        let name = input.read_string()?;
        let timestamp_field = input.read_string()?;
        let indices = input.read_collection(Index::read_from)?;
        if indices.is_empty() {
            return Err(MetadataError::CorruptMetadata(format!(
                "data stream [{}] has no backing indices",
                name
            )));
        }
        let generation = input.read_vlong()?;
        let metadata = input.read_optional(|input| {
            input.read_map(|input| {
                let bytes = input.read_bytes()?;
                serde_json::from_slice(&bytes).map_err(|e| {
                    MetadataError::CorruptMetadata(format!("invalid stream metadata: {}", e))
                })
            })
        })?;
        let hidden = input.read_bool()?;
        let replicated = input.read_bool()?;
        let system = input.read_bool()?;
        let allow_custom_routing = if input.version().supports(TransportVersion::V_CUSTOM_ROUTING) {
            input.read_bool()?
        } else {
            false
        };
        Ok(DataStream {
            name,
            timestamp_field,
            indices,
            generation,
            metadata,
            hidden,
            replicated,
            system,
            allow_custom_routing,
        })
    }
}

// ============================================================================
// Data stream aliases
// ============================================================================

/// A secondary name over one or more data streams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataStreamAlias {
    name: String,
    data_streams: BTreeSet<String>,
    write_data_stream: Option<String>,
    filter: Option<serde_json::Value>,
}

simple_diffable!(DataStreamAlias);

impl DataStreamAlias {
    /// A fresh alias over a single stream
    pub fn new(
        name: impl Into<String>,
        data_stream: impl Into<String>,
        is_write: bool,
        filter: Option<serde_json::Value>,
    ) -> DataStreamAlias {
        let data_stream = data_stream.into();
        DataStreamAlias {
            name: name.into(),
            write_data_stream: is_write.then(|| data_stream.clone()),
            data_streams: [data_stream].into_iter().collect(),
            filter,
        }
    }

    /// The alias name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Member stream names, sorted
    pub fn data_streams(&self) -> &BTreeSet<String> {
        &self.data_streams
    }

    /// The write stream, if declared
    pub fn write_data_stream(&self) -> Option<&str> {
        self.write_data_stream.as_deref()
    }

    /// The filter, if any
    pub fn filter(&self) -> Option<&serde_json::Value> {
        self.filter.as_ref()
    }

    /// Add (or update) a member stream
    ///
    /// `is_write = Some(true)` makes the stream the write target;
    /// `Some(false)` demotes it if it was. Returns the updated alias, or
    /// `self` unchanged when the call is a no-op.
    pub fn update(
        &self,
        data_stream: &str,
        is_write: Option<bool>,
        filter: Option<serde_json::Value>,
    ) -> DataStreamAlias {
        let mut next = self.clone();
        next.data_streams.insert(data_stream.to_string());
        match is_write {
            Some(true) => next.write_data_stream = Some(data_stream.to_string()),
            Some(false) => {
                if next.write_data_stream.as_deref() == Some(data_stream) {
                    next.write_data_stream = None;
                }
            }
            None => {}
        }
        if filter.is_some() {
            next.filter = filter;
        }
        next
    }

    /// Remove a member stream
    ///
    /// Returns `None` when the last member is removed (the alias dies).
    /// Removing the write stream demotes the pointer.
    pub fn remove_data_stream(&self, data_stream: &str) -> Option<DataStreamAlias> {
        if !self.data_streams.contains(data_stream) {
            return Some(self.clone());
        }
        let mut next = self.clone();
        next.data_streams.remove(data_stream);
        if next.data_streams.is_empty() {
            return None;
        }
        if next.write_data_stream.as_deref() == Some(data_stream) {
            next.write_data_stream = None;
        }
        Some(next)
    }

    /// Restrict members to the given set (snapshot reconciliation)
    pub fn restricted_to(&self, streams: &HashSet<String>) -> Option<DataStreamAlias> {
        let retained: BTreeSet<String> = self
            .data_streams
            .iter()
            .filter(|s| streams.contains(*s))
            .cloned()
            .collect();
        if retained.is_empty() {
            return None;
        }
        let mut next = self.clone();
        if let Some(write) = &next.write_data_stream {
            if !retained.contains(write) {
                next.write_data_stream = None;
            }
        }
        next.data_streams = retained;
        Some(next)
    }
}

impl WireWritable for DataStreamAlias {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_string(&self.name)?;
        let streams: Vec<String> = self.data_streams.iter().cloned().collect();
        out.write_string_collection(&streams)?;
        out.write_optional_string(self.write_data_stream.as_deref())?;
        out.write_optional(self.filter.as_ref(), |out, f| {
            let bytes = serde_json::to_vec(f).expect("JSON value serializes");
            out.write_bytes(&bytes)
        })
    }
}

impl WireReadable for DataStreamAlias {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        let name = input.read_string()?;
        let data_streams = input.read_string_collection()?.into_iter().collect();
        let write_data_stream = input.read_optional_string()?;
        let filter = input.read_optional(|input| {
            let bytes = input.read_bytes()?;
            serde_json::from_slice(&bytes).map_err(|e| {
                MetadataError::CorruptMetadata(format!("invalid alias filter: {}", e))
            })
        })?;
        Ok(DataStreamAlias {
            name,
            data_streams,
            write_data_stream,
            filter,
        })
    }
}

// ============================================================================
// Timestamp sort
// ============================================================================

/// Per-segment reader summary used for read-time sorting
#[derive(Debug, Clone, PartialEq)]
pub struct LeafReaderInfo {
    /// Opaque segment identifier
    pub segment: String,
    /// Maximum `@timestamp` point value in the segment, if the field exists
    pub max_timestamp: Option<i64>,
}

/// Order segment readers by descending maximum `@timestamp`
///
/// Readers without the point field sort last. Ties keep their relative
/// order (the sort used with this comparator must be stable).
pub fn compare_by_max_timestamp(a: &LeafReaderInfo, b: &LeafReaderInfo) -> std::cmp::Ordering {
    match (a.max_timestamp, b.max_timestamp) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    }
}

// ============================================================================
// Tests
// ============================================================================
