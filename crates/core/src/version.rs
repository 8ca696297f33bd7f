//! Transport version gating
//!
//! Every wire write targets a negotiated peer version. Fields introduced
//! after that version are simply not written; readers mirror the same gates.
//! Both ends always know the peer version (the transport handshake
//! negotiates it before any metadata moves), so the gates never have to be
//! inferred from the payload itself.
//!
//! ## Ordering
//!
//! Versions are totally ordered `u32`s. The named constants below are the
//! points where the wire layout changed; they must stay monotone. A peer
//! `supports` a feature when its version is at or above the feature's gate.

use serde::{Deserialize, Serialize};

/// A negotiated transport protocol version
///
/// ## Invariants
///
/// - Ordering is numeric; a higher value understands every layout a lower
///   value does
/// - `CURRENT` is what this build writes to itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransportVersion(pub u32);

impl TransportVersion {
    /// Oldest version this build can still read and write
    pub const V_BASE: TransportVersion = TransportVersion(7_00_00);

    /// Added the consistent-settings hash map to the metadata root
    pub const V_CONSISTENT_SETTINGS: TransportVersion = TransportVersion(7_03_00);

    /// Added data streams and data stream aliases
    pub const V_DATA_STREAMS: TransportVersion = TransportVersion(7_09_00);

    /// Added the allow-custom-routing flag on data streams
    pub const V_CUSTOM_ROUTING: TransportVersion = TransportVersion(7_13_00);

    /// Added the clone source and clone shard map to snapshot entries
    pub const V_CLONE_SOURCE: TransportVersion = TransportVersion(7_14_00);

    /// Added feature states to snapshot entries; system-index enforcement
    pub const V_FEATURE_STATES: TransportVersion = TransportVersion(7_16_00);

    /// Mappings are written once as a hash-keyed pool; indices reference
    /// their mapping by sha-256 instead of carrying the full body
    pub const V_MAPPINGS_AS_HASH: TransportVersion = TransportVersion(8_01_00);

    /// Added immutable-state namespaces to the metadata root
    pub const V_IMMUTABLE_STATE: TransportVersion = TransportVersion(8_04_00);

    /// The version this build speaks natively
    pub const CURRENT: TransportVersion = TransportVersion(8_06_00);

    /// Minimum version accepted on the wire
    pub const MINIMUM_COMPATIBLE: TransportVersion = TransportVersion::V_BASE;

    /// Check whether a peer at this version understands a layout gated at
    /// `gate`
    #[inline]
    pub const fn supports(&self, gate: TransportVersion) -> bool {
        self.0 >= gate.0
    }

    /// Numeric id, for the wire
    #[inline]
    pub const fn id(&self) -> u32 {
        self.0
    }

    /// Smaller of two versions
    pub fn min(self, other: TransportVersion) -> TransportVersion {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }
}

impl std::fmt::Display for TransportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let major = self.0 / 10_000;
        let minor = (self.0 / 100) % 100;
        let patch = self.0 % 100;
        write!(f, "{}.{}.{}", major, minor, patch)
    }
}

impl Default for TransportVersion {
    fn default() -> Self {
        TransportVersion::CURRENT
    }
}

impl From<u32> for TransportVersion {
    fn from(id: u32) -> Self {
        TransportVersion(id)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gates_are_monotone() {
        let gates = [
            TransportVersion::V_BASE,
            TransportVersion::V_CONSISTENT_SETTINGS,
            TransportVersion::V_DATA_STREAMS,
            TransportVersion::V_CUSTOM_ROUTING,
            TransportVersion::V_CLONE_SOURCE,
            TransportVersion::V_FEATURE_STATES,
            TransportVersion::V_MAPPINGS_AS_HASH,
            TransportVersion::V_IMMUTABLE_STATE,
            TransportVersion::CURRENT,
        ];
        for pair in gates.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_supports() {
        assert!(TransportVersion::CURRENT.supports(TransportVersion::V_MAPPINGS_AS_HASH));
        assert!(!TransportVersion::V_BASE.supports(TransportVersion::V_DATA_STREAMS));
        assert!(TransportVersion::V_DATA_STREAMS.supports(TransportVersion::V_DATA_STREAMS));
    }

    #[test]
    fn test_display() {
        assert_eq!(TransportVersion(8_06_00).to_string(), "8.6.0");
        assert_eq!(TransportVersion(7_13_02).to_string(), "7.13.2");
    }

    #[test]
    fn test_min() {
        let a = TransportVersion(7_00_00);
        let b = TransportVersion(8_00_00);
        assert_eq!(a.min(b), a);
        assert_eq!(b.min(a), a);
    }

    #[test]
    fn test_default_is_current() {
        assert_eq!(TransportVersion::default(), TransportVersion::CURRENT);
    }
}
