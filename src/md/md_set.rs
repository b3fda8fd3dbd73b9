//! Sets of memory descriptors
//!
//! [`MdSet`] is a [`SparseSet`] of MD ids with queries that understand the sentinel descriptors.
//! Plain algebra (`union`, `diff`) works on ids and never drops a sentinel bit. Queries that would
//! otherwise have to enumerate "all memory" test the sentinel bits first.

use super::descriptor::{Md, MdId};
use super::system::MdSystem;
use crate::sparse_set::SparseSet;

/// Owner-mutated set of MD ids
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MdSet(SparseSet);

/// Resolves a member id; dangling ids are a programming error
fn lookup(sys: &MdSystem, id: MdId) -> Option<&Md> {
    let md = sys.md(id);
    debug_assert!(md.is_some(), "dangling {} in MdSet", id);
    md
}

impl MdSet {
    /// Creates an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// The set holding only [`MdId::FULL_MEM`]
    pub fn full_mem() -> Self {
        Self(SparseSet::singleton(MdId::FULL_MEM.0))
    }

    /// Returns true if the set has no members
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of member ids (a sentinel counts as one)
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Adds an id; returns true if it was new
    pub fn insert(&mut self, md: MdId) -> bool {
        self.0.insert(md.0)
    }

    /// Removes an id; returns true if it was present
    pub fn remove(&mut self, md: MdId) -> bool {
        self.0.remove(md.0)
    }

    /// Id membership, no aliasing reasoning
    pub fn contains(&self, md: MdId) -> bool {
        self.0.contains(md.0)
    }

    /// Returns true if the "all memory" sentinel is a member
    pub fn contains_full_mem(&self) -> bool {
        self.contains(MdId::FULL_MEM)
    }

    /// Member ids in ascending order (sentinels first)
    pub fn iter(&self) -> impl Iterator<Item = MdId> + '_ {
        self.0.iter().map(MdId)
    }

    /// The underlying id set
    pub fn as_sparse(&self) -> &SparseSet {
        &self.0
    }

    /// `self ∪= other`; returns true if `self` changed
    pub fn union(&mut self, other: &MdSet) -> bool {
        self.0.union_with(&other.0)
    }

    /// `self −= other` by id; returns true if `self` changed
    pub fn diff(&mut self, other: &MdSet) -> bool {
        self.0.subtract(&other.0)
    }

    /// `self ∩= other`, where a side holding [`MdId::FULL_MEM`] stands for all memory
    pub fn intersect(&mut self, other: &MdSet) -> bool {
        if other.contains_full_mem() {
            return false;
        }
        if self.contains_full_mem() {
            let changed = self != other;
            *self = other.clone();
            return changed;
        }
        self.0.intersect_with(&other.0)
    }

    /// Same member ids
    pub fn is_exact_equal(&self, other: &MdSet) -> bool {
        self == other
    }

    /// Returns true if some member may touch the same bytes as `md`
    pub fn is_overlap(&self, md: MdId, sys: &MdSystem) -> bool {
        if self.is_empty() {
            return false;
        }
        if self.contains_full_mem() || md == MdId::FULL_MEM {
            return true;
        }
        let Some(target) = lookup(sys, md) else {
            return true;
        };
        self.iter()
            .any(|id| lookup(sys, id).map_or(true, |m| m.overlaps(target)))
    }

    /// Returns true if some member of `self` may touch the same bytes as some member of `other`
    pub fn is_overlap_set(&self, other: &MdSet, sys: &MdSystem) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        if self.contains_full_mem() || other.contains_full_mem() {
            return true;
        }
        if self.0.is_intersect(&other.0) {
            return true;
        }
        other.iter().any(|md| self.is_overlap(md, sys))
    }

    /// Returns true if `md` is a member or is covered by a sentinel member
    pub fn is_contain(&self, md: MdId, sys: &MdSystem) -> bool {
        if self.contains(md) || self.contains_full_mem() {
            return true;
        }
        let Some(target) = lookup(sys, md) else {
            return true;
        };
        self.iter()
            .take_while(|id| id.is_sentinel())
            .any(|id| lookup(sys, id).map_or(true, |s| s.covers(target)))
    }

    /// Returns true if any member is a sentinel or lives in global storage
    pub fn contains_global(&self, sys: &MdSystem) -> bool {
        self.iter().any(|id| {
            id.is_sentinel() || lookup(sys, id).map_or(true, |m| m.storage().is_global())
        })
    }
}

impl FromIterator<MdId> for MdSet {
    fn from_iter<T: IntoIterator<Item = MdId>>(iter: T) -> Self {
        Self(iter.into_iter().map(|md| md.0).collect())
    }
}

impl Extend<MdId> for MdSet {
    fn extend<T: IntoIterator<Item = MdId>>(&mut self, iter: T) {
        self.0.extend(iter.into_iter().map(|md| md.0));
    }
}
