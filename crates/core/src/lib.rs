//! Foundational types for the clustermeta catalog
//!
//! This crate defines the pieces every other crate builds on:
//! - MetadataError: the unified error hierarchy
//! - TransportVersion: wire-format version gating
//! - WireWriter / WireReader: the binary stream codec
//! - Diffable / SimpleDiff / MapDiff: the diff-and-patch framework
//! - MappingHash: sha-256 content identity for interned mapping blobs

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod diff;
pub mod error;
pub mod hash;
pub mod version;
pub mod wire;

pub use diff::{ArcDiff, CompositePathKey, Diff, Diffable, MapDiff, SimpleDiff};
pub use error::{MetadataError, Result};
pub use hash::MappingHash;
pub use version::TransportVersion;
pub use wire::{from_bytes, to_bytes, WireReadable, WireReader, WireWritable, WireWriter};
