//! Immutable-state namespaces
//!
//! Operator-managed state files can claim ownership of parts of the cluster
//! configuration. Each namespace records a version and, per handler, the
//! set of keys it owns; API-driven writes to owned keys are rejected
//! elsewhere in the system. This module only carries the bookkeeping.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use clustermeta_core::error::Result;
use clustermeta_core::simple_diffable;
use clustermeta_core::wire::{WireReadable, WireReader, WireWritable, WireWriter};

/// Keys owned by one handler within a namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmutableStateHandlerMetadata {
    /// Handler name
    pub name: String,
    /// Keys the handler owns
    pub keys: BTreeSet<String>,
}

impl WireWritable for ImmutableStateHandlerMetadata {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_string(&self.name)?;
        let keys: Vec<String> = self.keys.iter().cloned().collect();
        out.write_string_collection(&keys)
    }
}

impl WireReadable for ImmutableStateHandlerMetadata {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        Ok(ImmutableStateHandlerMetadata {
            name: input.read_string()?,
            keys: input.read_string_collection()?.into_iter().collect(),
        })
    }
}

/// One immutable-state namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmutableStateMetadata {
    /// Namespace name
    pub namespace: String,
    /// Version of the state file that produced this namespace
    pub version: i64,
    /// Handlers keyed by name
    pub handlers: BTreeMap<String, ImmutableStateHandlerMetadata>,
}

simple_diffable!(ImmutableStateMetadata);

impl ImmutableStateMetadata {
    /// An empty namespace at the given version
    pub fn new(namespace: impl Into<String>, version: i64) -> ImmutableStateMetadata {
        ImmutableStateMetadata {
            namespace: namespace.into(),
            version,
            handlers: BTreeMap::new(),
        }
    }

    /// Copy with a handler added
    pub fn with_handler(mut self, handler: ImmutableStateHandlerMetadata) -> ImmutableStateMetadata {
        self.handlers.insert(handler.name.clone(), handler);
        self
    }

    /// Every key owned by any handler in this namespace
    pub fn owned_keys(&self) -> impl Iterator<Item = &String> {
        self.handlers.values().flat_map(|h| h.keys.iter())
    }
}

impl WireWritable for ImmutableStateMetadata {
    fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_string(&self.namespace)?;
        out.write_i64(self.version)?;
        out.write_map(&self.handlers, |out, h| h.write_to(out))
    }
}

impl WireReadable for ImmutableStateMetadata {
    fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        Ok(ImmutableStateMetadata {
            namespace: input.read_string()?,
            version: input.read_i64()?,
            handlers: input.read_map(ImmutableStateHandlerMetadata::read_from)?,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
