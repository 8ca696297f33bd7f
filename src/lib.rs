//! # Clustermeta
//!
//! The immutable, versioned cluster metadata core of a distributed search
//! cluster: the in-memory catalog every node agrees on, describing indices,
//! index templates, data streams, aliases, in-progress snapshots, and the
//! set of known nodes.
//!
//! Every committed change produces a new catalog version, travels to
//! followers as a structural diff, and deserializes identically on every
//! node, including older nodes speaking a previous wire version.
//!
//! # Quick Start
//!
//! ```no_run
//! use clustermeta::{IndexMetadata, Metadata, Settings};
//!
//! fn main() -> clustermeta::Result<()> {
//!     let mut settings = Settings::builder();
//!     settings
//!         .put_u32("index.number_of_shards", 3)
//!         .put_u32("index.number_of_replicas", 1);
//!
//!     let mut builder = Metadata::builder();
//!     builder.generate_cluster_uuid_if_needed();
//!     builder.put(
//!         IndexMetadata::builder("orders")
//!             .uuid("orders-uuid")
//!             .settings(settings.build())
//!             .build()?,
//!         false,
//!     )?;
//!     let metadata = builder.build()?;
//!
//!     // Mutate copy-on-write; the source value stays intact
//!     let mut next = metadata.builder_from();
//!     next.update_number_of_replicas(2, &["orders"])?;
//!     next.with_incremented_version();
//!     let successor = next.build()?;
//!     assert_eq!(successor.version(), metadata.version() + 1);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! | Crate | Responsibility |
//! |-------|----------------|
//! | `clustermeta-core` | errors, transport versions, wire codec, diff framework, content hashes |
//! | `clustermeta-model` | the data model and the [`Metadata`] root aggregate |
//! | `clustermeta-gateway` | persisted `global-<version>` state files |
//!
//! This facade re-exports the public surface; the member crates are not
//! meant to be depended on directly.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use clustermeta_core::{
    Diff, Diffable, MappingHash, MetadataError, Result, TransportVersion, WireReadable,
    WireReader, WireWritable, WireWriter,
};

pub use clustermeta_model::{
    alias_validator, compare_by_max_timestamp, default_backing_index_name, from_gateway_document,
    to_document, validate_data_stream_name, AliasMetadata, ComponentTemplate,
    ComposableIndexTemplate, ContextMode, CoordinationMetadata, Custom, DataStream,
    DataStreamAlias, DiscoveryNode, DiscoveryNodeRole, Entry, EntryState, Index, IndexAbstraction,
    IndexGraveyard, IndexId, IndexMetadata, IndexState, IndexTemplateMetadata,
    ImmutableStateMetadata, MappingMetadata, MappingPool, Metadata, MetadataBuilder, MetadataDiff,
    RepositoryShardId, Settings, SettingsBuilder, ShardId, ShardSnapshotResult,
    ShardSnapshotStatus, ShardState, Snapshot, SnapshotFeatureState, SnapshotId,
    SnapshotsInProgress, Template, TransportAddress,
};

pub use clustermeta_gateway::{read_global_state, write_global_state};
