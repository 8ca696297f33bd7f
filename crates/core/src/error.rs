//! Error types for the cluster metadata core
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Error Categories
//!
//! - **InvalidInput**: An operation was called with arguments violating a
//!   declared precondition (empty alias name, routing containing commas,
//!   removing the write index of a data stream, ...)
//! - **InvalidState**: Global invariants violated at build time (name
//!   collisions, two write indices behind one alias, mixed hidden flags)
//! - **NotFound**: An index, data stream, or alias named in an operation
//!   does not exist
//! - **Conflict**: A create-like operation targets a name that already
//!   exists in some abstraction
//! - **CorruptMetadata**: Deserialization observed a structural
//!   inconsistency (a diff referencing a missing key, a bad checksum)
//!
//! Validation errors raised inside `Metadata::Builder::build` are collected
//! and surfaced as a single `InvalidState` enumerating every detected
//! conflict, not one per call. Error messages name the offending entity;
//! message stability is a contract because clients pattern-match on them.

use std::io;
use thiserror::Error;

/// Result type alias for metadata operations
pub type Result<T> = std::result::Result<T, MetadataError>;

/// Error type for the cluster metadata core
#[derive(Debug, Error)]
pub enum MetadataError {
    /// An argument violates a declared precondition
    #[error("{0}")]
    InvalidInput(String),

    /// A global invariant was violated at build time
    #[error("{0}")]
    InvalidState(String),

    /// A named index, data stream, or alias does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// The target name already exists in some abstraction
    #[error("{kind} [{name}] already exists")]
    Conflict {
        /// Kind of the existing abstraction (index, alias, data stream)
        kind: String,
        /// Name that collided
        name: String,
    },

    /// An alias name failed validation
    #[error("invalid alias name [{name}]: {reason}")]
    InvalidAliasName {
        /// The rejected alias name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// Deserialization observed a structural inconsistency
    #[error("corrupt metadata: {0}")]
    CorruptMetadata(String),

    /// I/O error (persisted state files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl MetadataError {
    /// Check if this error is a build-time validation failure
    ///
    /// Used by callers that retry with adjusted inputs: the previous
    /// immutable value is untouched by a failed build.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            MetadataError::InvalidState(_)
                | MetadataError::InvalidInput(_)
                | MetadataError::InvalidAliasName { .. }
        )
    }

    /// Check if this error indicates corrupted wire or on-disk data
    ///
    /// A corrupt diff is fatal for that replication round; the follower
    /// must fetch the full metadata instead.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, MetadataError::CorruptMetadata(_))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message() {
        let err = MetadataError::Conflict {
            kind: "alias".to_string(),
            name: "orders".to_string(),
        };
        assert_eq!(err.to_string(), "alias [orders] already exists");
    }

    #[test]
    fn test_invalid_alias_name_message() {
        let err = MetadataError::InvalidAliasName {
            name: "_hidden".to_string(),
            reason: "must not start with '_'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid alias name [_hidden]: must not start with '_'"
        );
    }

    #[test]
    fn test_is_validation() {
        assert!(MetadataError::InvalidState("x".into()).is_validation());
        assert!(MetadataError::InvalidInput("x".into()).is_validation());
        assert!(!MetadataError::NotFound("x".into()).is_validation());
        assert!(!MetadataError::CorruptMetadata("x".into()).is_validation());
    }

    #[test]
    fn test_is_corrupt() {
        assert!(MetadataError::CorruptMetadata("bad vint".into()).is_corrupt());
        assert!(!MetadataError::InvalidState("x".into()).is_corrupt());
    }

    #[test]
    fn test_io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        let err: MetadataError = io_err.into();
        assert!(matches!(err, MetadataError::Io(_)));
    }
}
