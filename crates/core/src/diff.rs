//! Structural diff-and-patch framework
//!
//! A value can produce a delta against a predecessor, and a delta can be
//! applied to a predecessor to produce the successor. The same deltas are
//! used for wire replication (a leader ships the diff of two committed
//! catalogs to its followers) and for on-disk persistence.
//!
//! ## Contract
//!
//! For all `prev, curr` of compatible shape:
//!
//! ```text
//! curr.diff_from(prev).has_changes() == false   iff   prev == curr
//! curr.diff_from(prev).apply_to(prev)           ==    curr
//! ```
//!
//! ## Shapes
//!
//! - [`SimpleDiff`]: unchanged, or a full replacement. For small or opaque
//!   values.
//! - [`MapDiff`]: deletes (key-ordered), full upserts for new keys, and
//!   delta upserts for changed keys. Serialization order is deletes, then
//!   full upserts, then delta upserts.
//! - Named variants (the `customs` registry) are handled where the variant
//!   enum lives; unknown names from newer writers are carried as opaque
//!   payloads, never rejected.
//!
//! Map keys come in two wire encodings: plain strings, and
//! [`CompositePathKey`] (a path of integers, used for shard coordinates).

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{MetadataError, Result};
use crate::wire::{WireReader, WireWriter};

/// A delta that can be applied to a predecessor value
pub trait Diff {
    /// The value type this delta applies to
    type Target;

    /// Apply to the predecessor, producing the successor
    ///
    /// A delta referencing a key absent from `prev` is corrupt; the caller
    /// falls back to fetching the full value.
    fn apply_to(&self, prev: &Self::Target) -> Result<Self::Target>;

    /// Whether applying would change anything
    fn has_changes(&self) -> bool;
}

/// A value that can diff itself against a predecessor
pub trait Diffable: Sized {
    /// The delta type this value produces
    type Diff: Diff<Target = Self>;

    /// Produce the delta that takes `prev` to `self`
    fn diff_from(&self, prev: &Self) -> Self::Diff;
}

// ============================================================================
// SimpleDiff
// ============================================================================

/// Unchanged, or a full replacement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimpleDiff<T> {
    /// The value did not change
    Unchanged,
    /// The value is replaced wholesale
    Replace(T),
}

impl<T: Clone + PartialEq> SimpleDiff<T> {
    /// Diff two values by equality
    pub fn of(prev: &T, curr: &T) -> SimpleDiff<T> {
        if prev == curr {
            SimpleDiff::Unchanged
        } else {
            SimpleDiff::Replace(curr.clone())
        }
    }
}

impl<T> SimpleDiff<T> {
    /// Write with a closure for the payload
    pub fn write_to<W: Write, F>(&self, out: &mut WireWriter<W>, write: F) -> Result<()>
    where
        F: FnOnce(&mut WireWriter<W>, &T) -> Result<()>,
    {
        match self {
            SimpleDiff::Unchanged => out.write_bool(false),
            SimpleDiff::Replace(value) => {
                out.write_bool(true)?;
                write(out, value)
            }
        }
    }

    /// Read with a closure for the payload
    pub fn read_from<R: Read, F>(input: &mut WireReader<R>, read: F) -> Result<SimpleDiff<T>>
    where
        F: FnOnce(&mut WireReader<R>) -> Result<T>,
    {
        if input.read_bool()? {
            Ok(SimpleDiff::Replace(read(input)?))
        } else {
            Ok(SimpleDiff::Unchanged)
        }
    }
}

impl<T: Clone + PartialEq> Diff for SimpleDiff<T> {
    type Target = T;

    fn apply_to(&self, prev: &T) -> Result<T> {
        match self {
            SimpleDiff::Unchanged => Ok(prev.clone()),
            SimpleDiff::Replace(value) => Ok(value.clone()),
        }
    }

    fn has_changes(&self) -> bool {
        matches!(self, SimpleDiff::Replace(_))
    }
}

/// Implement [`Diffable`] as whole-value replacement for the given types
///
/// For types that carry a structural diff of their own, implement
/// [`Diffable`] by hand instead.
#[macro_export]
macro_rules! simple_diffable {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::diff::Diffable for $ty {
                type Diff = $crate::diff::SimpleDiff<$ty>;

                fn diff_from(&self, prev: &Self) -> Self::Diff {
                    $crate::diff::SimpleDiff::of(prev, self)
                }
            }
        )*
    };
}

simple_diffable!(String, bool, u64, i64);

// ============================================================================
// Arc transparency
// ============================================================================

/// Delta over an `Arc`-shared value
///
/// Applying an unchanged delta returns the predecessor `Arc` itself, so
/// identity-based sharing (the interned mapping pool) survives diff
/// application.
#[derive(Debug, Clone, PartialEq)]
pub struct ArcDiff<D>(pub D);

impl<D: Diff> Diff for ArcDiff<D>
where
    D::Target: Clone,
{
    type Target = Arc<D::Target>;

    fn apply_to(&self, prev: &Arc<D::Target>) -> Result<Arc<D::Target>> {
        if !self.0.has_changes() {
            return Ok(Arc::clone(prev));
        }
        Ok(Arc::new(self.0.apply_to(prev)?))
    }

    fn has_changes(&self) -> bool {
        self.0.has_changes()
    }
}

impl<T> Diffable for Arc<T>
where
    T: Diffable + Clone,
{
    type Diff = ArcDiff<T::Diff>;

    fn diff_from(&self, prev: &Self) -> ArcDiff<T::Diff> {
        ArcDiff((**self).diff_from(prev))
    }
}

// ============================================================================
// MapDiff
// ============================================================================

/// Delta between two key-ordered maps
///
/// Three parts, serialized in this order:
/// 1. deleted keys, ascending
/// 2. full upserts `(key, value)` for keys new to the map
/// 3. delta upserts `(key, diff)` for keys whose value changed
#[derive(Debug, Clone, PartialEq)]
pub struct MapDiff<K, V, D> {
    deletes: Vec<K>,
    upserts_full: Vec<(K, V)>,
    upserts_diff: Vec<(K, D)>,
}

impl<K: Ord + Clone, V: Clone + PartialEq, D: Diff<Target = V>> MapDiff<K, V, D> {
    /// Diff two maps, producing delta upserts for changed values
    pub fn of(prev: &BTreeMap<K, V>, curr: &BTreeMap<K, V>) -> MapDiff<K, V, D>
    where
        V: Diffable<Diff = D>,
    {
        let mut deletes = Vec::new();
        let mut upserts_full = Vec::new();
        let mut upserts_diff = Vec::new();

        for key in prev.keys() {
            if !curr.contains_key(key) {
                deletes.push(key.clone());
            }
        }
        for (key, value) in curr {
            match prev.get(key) {
                None => upserts_full.push((key.clone(), value.clone())),
                Some(prev_value) if prev_value != value => {
                    upserts_diff.push((key.clone(), value.diff_from(prev_value)));
                }
                Some(_) => {}
            }
        }

        MapDiff {
            deletes,
            upserts_full,
            upserts_diff,
        }
    }

    /// Deleted keys, ascending
    pub fn deletes(&self) -> &[K] {
        &self.deletes
    }

    /// Full upserts for new keys
    pub fn upserts_full(&self) -> &[(K, V)] {
        &self.upserts_full
    }

    /// Delta upserts for changed keys
    pub fn upserts_diff(&self) -> &[(K, D)] {
        &self.upserts_diff
    }

    /// Construct from raw parts (wire reading)
    pub fn from_parts(
        deletes: Vec<K>,
        upserts_full: Vec<(K, V)>,
        upserts_diff: Vec<(K, D)>,
    ) -> Self {
        MapDiff {
            deletes,
            upserts_full,
            upserts_diff,
        }
    }
}

impl<K, V, D> MapDiff<K, V, D> {
    /// Write with closures for keys, values, and value-diffs
    pub fn write_to<W: Write>(
        &self,
        out: &mut WireWriter<W>,
        mut write_key: impl FnMut(&mut WireWriter<W>, &K) -> Result<()>,
        mut write_value: impl FnMut(&mut WireWriter<W>, &V) -> Result<()>,
        mut write_diff: impl FnMut(&mut WireWriter<W>, &D) -> Result<()>,
    ) -> Result<()> {
        out.write_vint(self.deletes.len() as u32)?;
        for key in &self.deletes {
            write_key(out, key)?;
        }
        out.write_vint(self.upserts_full.len() as u32)?;
        for (key, value) in &self.upserts_full {
            write_key(out, key)?;
            write_value(out, value)?;
        }
        out.write_vint(self.upserts_diff.len() as u32)?;
        for (key, diff) in &self.upserts_diff {
            write_key(out, key)?;
            write_diff(out, diff)?;
        }
        Ok(())
    }

    /// Read with closures for keys, values, and value-diffs
    pub fn read_from<R: Read>(
        input: &mut WireReader<R>,
        mut read_key: impl FnMut(&mut WireReader<R>) -> Result<K>,
        mut read_value: impl FnMut(&mut WireReader<R>) -> Result<V>,
        mut read_diff: impl FnMut(&mut WireReader<R>) -> Result<D>,
    ) -> Result<Self> {
        let delete_count = input.read_vint()? as usize;
        let mut deletes = Vec::with_capacity(delete_count.min(1024));
        for _ in 0..delete_count {
            deletes.push(read_key(input)?);
        }
        let full_count = input.read_vint()? as usize;
        let mut upserts_full = Vec::with_capacity(full_count.min(1024));
        for _ in 0..full_count {
            let key = read_key(input)?;
            let value = read_value(input)?;
            upserts_full.push((key, value));
        }
        let diff_count = input.read_vint()? as usize;
        let mut upserts_diff = Vec::with_capacity(diff_count.min(1024));
        for _ in 0..diff_count {
            let key = read_key(input)?;
            let diff = read_diff(input)?;
            upserts_diff.push((key, diff));
        }
        Ok(MapDiff {
            deletes,
            upserts_full,
            upserts_diff,
        })
    }
}

impl<K, V, D> Diff for MapDiff<K, V, D>
where
    K: Ord + Clone + std::fmt::Display,
    V: Clone,
    D: Diff<Target = V>,
{
    type Target = BTreeMap<K, V>;

    fn apply_to(&self, prev: &BTreeMap<K, V>) -> Result<BTreeMap<K, V>> {
        let mut next = prev.clone();
        for key in &self.deletes {
            if next.remove(key).is_none() {
                return Err(MetadataError::CorruptMetadata(format!(
                    "diff deletes unknown key [{}]",
                    key
                )));
            }
        }
        for (key, diff) in &self.upserts_diff {
            let prev_value = next.get(key).ok_or_else(|| {
                MetadataError::CorruptMetadata(format!("diff patches unknown key [{}]", key))
            })?;
            let value = diff.apply_to(prev_value)?;
            next.insert(key.clone(), value);
        }
        for (key, value) in &self.upserts_full {
            next.insert(key.clone(), value.clone());
        }
        Ok(next)
    }

    fn has_changes(&self) -> bool {
        !self.deletes.is_empty()
            || !self.upserts_full.is_empty()
            || !self.upserts_diff.is_empty()
    }
}

// ============================================================================
// Composite integer-path keys
// ============================================================================

/// A map key encoded as a path of integers
///
/// Used where keys are coordinates rather than names, e.g. a shard position
/// inside a repository index. Ordering is lexicographic over the path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompositePathKey(pub Vec<u32>);

impl CompositePathKey {
    /// Write as vint count then vint components
    pub fn write_to<W: Write>(&self, out: &mut WireWriter<W>) -> Result<()> {
        out.write_vint(self.0.len() as u32)?;
        for part in &self.0 {
            out.write_vint(*part)?;
        }
        Ok(())
    }

    /// Read a path written by [`CompositePathKey::write_to`]
    pub fn read_from<R: Read>(input: &mut WireReader<R>) -> Result<Self> {
        let count = input.read_vint()? as usize;
        let mut parts = Vec::with_capacity(count.min(16));
        for _ in 0..count {
            parts.push(input.read_vint()?);
        }
        Ok(CompositePathKey(parts))
    }
}

impl std::fmt::Display for CompositePathKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
