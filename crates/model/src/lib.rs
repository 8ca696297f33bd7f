//! The clustermeta data model
//!
//! Everything a node needs to describe the cluster's catalog:
//! - Settings: flat cluster-wide and per-index configuration bags
//! - MappingMetadata / MappingPool: content-addressed mapping interning
//! - IndexMetadata: per-index settings, aliases, state, and mapping
//! - Templates: legacy and composable index templates
//! - DataStream / DataStreamAlias: append-only backing-index collections
//! - SnapshotsInProgress: the in-flight snapshot state machine
//! - DiscoveryNode: cluster member descriptors
//! - Metadata + MetadataBuilder: the immutable root aggregate
//! - Document serialization with API / GATEWAY / SNAPSHOT context modes
//!
//! All value types are immutable after construction; mutation produces a
//! new value through a builder. See [`metadata::Metadata`] for the global
//! invariants.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod alias_validator;
pub mod coordination;
pub mod customs;
pub mod datastream;
pub mod doc;
pub mod immutable_state;
pub mod index;
pub mod lookup;
pub mod mapping;
pub mod metadata;
pub mod node;
pub mod settings;
pub mod snapshots;
pub mod template;

pub use coordination::{CoordinationMetadata, VotingConfigExclusion};
pub use customs::{Custom, IndexGraveyard, Tombstone};
pub use datastream::{
    compare_by_max_timestamp, default_backing_index_name, validate_data_stream_name, DataStream,
    DataStreamAlias, LeafReaderInfo, BACKING_INDEX_PREFIX, TIMESTAMP_FIELD,
};
pub use doc::{from_gateway_document, to_document, ContextMode, GATEWAY_ROOT};
pub use immutable_state::{ImmutableStateHandlerMetadata, ImmutableStateMetadata};
pub use index::{
    AliasMetadata, Index, IndexMetadata, IndexMetadataBuilder, IndexState, UNKNOWN_UUID,
};
pub use lookup::{IndexAbstraction, IndicesLookup};
pub use mapping::{MappingMetadata, MappingPool};
pub use metadata::{Metadata, MetadataBuilder, MetadataDiff, UNKNOWN_CLUSTER_UUID};
pub use node::{DiscoveryNode, DiscoveryNodeRole, TransportAddress};
pub use settings::{Settings, SettingsBuilder};
pub use snapshots::{
    Entry, EntryState, IndexId, RepositoryShardId, ShardId, ShardSnapshotResult,
    ShardSnapshotStatus, ShardState, Snapshot, SnapshotFeatureState, SnapshotId,
    SnapshotsInProgress,
};
pub use template::{
    ComponentTemplate, ComposableIndexTemplate, DataStreamTemplate, IndexTemplateMetadata,
    Template,
};
