//! The indices lookup
//!
//! A sorted map resolving any user-visible name (concrete index, alias, or
//! data stream) to its abstraction. Cross-references are carried as names
//! resolved through the map, never as owning back-pointers; the immutable
//! graph stays cycle-free.
//!
//! The map is built lazily by the metadata root and memoized; two metadata
//! values with identical contents produce identical lookup maps (the
//! deterministic insertion protocol is part of the diff-equality contract).

use std::collections::BTreeMap;

/// What a user-visible name resolves to
#[derive(Debug, Clone, PartialEq)]
pub enum IndexAbstraction {
    /// A concrete index, possibly a backing index of a data stream
    ConcreteIndex {
        /// The index name
        name: String,
        /// The owning data stream, when the index is a backing index
        parent_data_stream: Option<String>,
    },
    /// An index alias (or data-stream alias) over one or more members
    Alias {
        /// The alias name
        name: String,
        /// Member names, sorted
        indices: Vec<String>,
        /// The declared write member, if any
        write_index: Option<String>,
        /// Whether the alias is hidden
        hidden: bool,
        /// Whether the members are data streams rather than indices
        data_stream_alias: bool,
    },
    /// A data stream
    DataStream {
        /// The stream name
        name: String,
    },
}

impl IndexAbstraction {
    /// Construct a concrete-index entry
    pub fn concrete_index(name: String, parent_data_stream: Option<String>) -> IndexAbstraction {
        IndexAbstraction::ConcreteIndex {
            name,
            parent_data_stream,
        }
    }

    /// The resolved name
    pub fn name(&self) -> &str {
        match self {
            IndexAbstraction::ConcreteIndex { name, .. } => name,
            IndexAbstraction::Alias { name, .. } => name,
            IndexAbstraction::DataStream { name } => name,
        }
    }

    /// Whether this is a concrete index
    pub fn is_concrete_index(&self) -> bool {
        matches!(self, IndexAbstraction::ConcreteIndex { .. })
    }

    /// Human-readable kind, used in conflict messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            IndexAbstraction::ConcreteIndex { .. } => "index",
            IndexAbstraction::Alias { .. } => "alias",
            IndexAbstraction::DataStream { .. } => "data stream",
        }
    }
}

/// The sorted name-to-abstraction map
pub type IndicesLookup = BTreeMap<String, IndexAbstraction>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_accessor() {
        let c = IndexAbstraction::concrete_index("idx".to_string(), None);
        assert_eq!(c.name(), "idx");
        assert!(c.is_concrete_index());

        let d = IndexAbstraction::DataStream {
            name: "stream".to_string(),
        };
        assert_eq!(d.name(), "stream");
        assert!(!d.is_concrete_index());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(
            IndexAbstraction::concrete_index("i".to_string(), None).kind_name(),
            "index"
        );
        assert_eq!(
            IndexAbstraction::DataStream {
                name: "d".to_string()
            }
            .kind_name(),
            "data stream"
        );
    }
}
