//! Sparse integer sets
//!
//! [`SparseSet`] stores non-negative integers as a sorted run of 64-bit words, keeping only the
//! words that have at least one bit set. The word vector sits behind an [`Arc`], so cloning a set
//! is a pointer copy and the first mutation of a shared set copies it (copy-on-write).
//!
//! The dataflow engine uses one representation for every id domain it tracks: MD ids (wrapped by
//! [`crate::md::MdSet`]), statement ids, expression ids and block ids.

use std::fmt;
use std::sync::Arc;

const WORD_BITS: u32 = u64::BITS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Word {
    index: u32,
    bits: u64,
}

#[inline]
fn split(value: u32) -> (u32, u64) {
    (value / WORD_BITS, 1_u64 << (value % WORD_BITS))
}

/// Which side's unmatched words survive a merge.
#[derive(Clone, Copy)]
struct Keep {
    lhs_only: bool,
    rhs_only: bool,
}

fn merge(lhs: &[Word], rhs: &[Word], keep: Keep, op: impl Fn(u64, u64) -> u64) -> Vec<Word> {
    let mut out = Vec::with_capacity(lhs.len().max(rhs.len()));
    let (mut i, mut j) = (0, 0);

    while i < lhs.len() && j < rhs.len() {
        let (a, b) = (lhs[i], rhs[j]);
        if a.index < b.index {
            if keep.lhs_only {
                out.push(a);
            }
            i += 1;
        } else if b.index < a.index {
            if keep.rhs_only {
                out.push(b);
            }
            j += 1;
        } else {
            let bits = op(a.bits, b.bits);
            if bits != 0 {
                out.push(Word {
                    index: a.index,
                    bits,
                });
            }
            i += 1;
            j += 1;
        }
    }
    if keep.lhs_only {
        out.extend_from_slice(&lhs[i..]);
    }
    if keep.rhs_only {
        out.extend_from_slice(&rhs[j..]);
    }
    out
}

/// Copy-on-write sparse set of `u32` values.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct SparseSet {
    words: Arc<Vec<Word>>,
}

impl SparseSet {
    /// Creates an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set holding exactly `value`
    pub fn singleton(value: u32) -> Self {
        let (index, bits) = split(value);
        Self {
            words: Arc::new(vec![Word { index, bits }]),
        }
    }

    /// Returns true if the set has no members
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.bits.count_ones() as usize).sum()
    }

    /// Returns true if `value` is a member
    pub fn contains(&self, value: u32) -> bool {
        let (index, mask) = split(value);
        match self.words.binary_search_by_key(&index, |w| w.index) {
            Ok(pos) => self.words[pos].bits & mask != 0,
            Err(_) => false,
        }
    }

    /// Adds `value`, returning true if it was not already present
    pub fn insert(&mut self, value: u32) -> bool {
        let (index, mask) = split(value);
        match self.words.binary_search_by_key(&index, |w| w.index) {
            Ok(pos) => {
                if self.words[pos].bits & mask != 0 {
                    return false;
                }
                Arc::make_mut(&mut self.words)[pos].bits |= mask;
            }
            Err(pos) => {
                Arc::make_mut(&mut self.words).insert(pos, Word { index, bits: mask });
            }
        }
        true
    }

    /// Removes `value`, returning true if it was present
    pub fn remove(&mut self, value: u32) -> bool {
        let (index, mask) = split(value);
        let Ok(pos) = self.words.binary_search_by_key(&index, |w| w.index) else {
            return false;
        };
        if self.words[pos].bits & mask == 0 {
            return false;
        }
        let words = Arc::make_mut(&mut self.words);
        words[pos].bits &= !mask;
        if words[pos].bits == 0 {
            words.remove(pos);
        }
        true
    }

    /// Removes every member
    pub fn clear(&mut self) {
        if !self.is_empty() {
            self.words = Arc::default();
        }
    }

    /// `self = self ∪ other`; returns true if `self` changed
    pub fn union_with(&mut self, other: &Self) -> bool {
        if other.is_empty() || Arc::ptr_eq(&self.words, &other.words) {
            return false;
        }
        if self.is_empty() {
            self.words = Arc::clone(&other.words);
            return true;
        }
        let merged = merge(
            &self.words,
            &other.words,
            Keep {
                lhs_only: true,
                rhs_only: true,
            },
            |a, b| a | b,
        );
        self.replace(merged)
    }

    /// `self = self ∩ other`; returns true if `self` changed
    pub fn intersect_with(&mut self, other: &Self) -> bool {
        if self.is_empty() || Arc::ptr_eq(&self.words, &other.words) {
            return false;
        }
        if other.is_empty() {
            self.clear();
            return true;
        }
        let merged = merge(
            &self.words,
            &other.words,
            Keep {
                lhs_only: false,
                rhs_only: false,
            },
            |a, b| a & b,
        );
        self.replace(merged)
    }

    /// `self = self − other`; returns true if `self` changed
    pub fn subtract(&mut self, other: &Self) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        if Arc::ptr_eq(&self.words, &other.words) {
            self.clear();
            return true;
        }
        let merged = merge(
            &self.words,
            &other.words,
            Keep {
                lhs_only: true,
                rhs_only: false,
            },
            |a, b| a & !b,
        );
        self.replace(merged)
    }

    /// Returns true if the two sets share at least one member
    pub fn is_intersect(&self, other: &Self) -> bool {
        let (mut i, mut j) = (0, 0);
        while i < self.words.len() && j < other.words.len() {
            let (a, b) = (self.words[i], other.words[j]);
            if a.index < b.index {
                i += 1;
            } else if b.index < a.index {
                j += 1;
            } else if a.bits & b.bits != 0 {
                return true;
            } else {
                i += 1;
                j += 1;
            }
        }
        false
    }

    /// Returns true if every member of `self` is a member of `other`
    pub fn is_subset(&self, other: &Self) -> bool {
        let mut j = 0;
        for a in self.words.iter() {
            while j < other.words.len() && other.words[j].index < a.index {
                j += 1;
            }
            match other.words.get(j) {
                Some(b) if b.index == a.index && a.bits & !b.bits == 0 => {}
                _ => return false,
            }
        }
        true
    }

    /// Returns true if both handles point at the same storage (no copy has happened yet)
    pub fn shares_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.words, &other.words)
    }

    /// Iterates members in ascending order
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            words: self.words.iter(),
            current: None,
        }
    }

    fn replace(&mut self, merged: Vec<Word>) -> bool {
        if merged == *self.words {
            return false;
        }
        self.words = Arc::new(merged);
        true
    }
}

/// Ascending iterator over a [`SparseSet`]
pub struct Iter<'a> {
    words: std::slice::Iter<'a, Word>,
    current: Option<(u32, u64)>,
}

impl Iterator for Iter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        loop {
            if let Some((index, bits)) = &mut self.current {
                if *bits != 0 {
                    let bit = bits.trailing_zeros();
                    *bits &= *bits - 1;
                    return Some(*index * WORD_BITS + bit);
                }
            }
            let word = self.words.next()?;
            self.current = Some((word.index, word.bits));
        }
    }
}

impl<'a> IntoIterator for &'a SparseSet {
    type Item = u32;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

impl FromIterator<u32> for SparseSet {
    fn from_iter<T: IntoIterator<Item = u32>>(iter: T) -> Self {
        let mut set = SparseSet::new();
        set.extend(iter);
        set
    }
}

impl Extend<u32> for SparseSet {
    fn extend<T: IntoIterator<Item = u32>>(&mut self, iter: T) {
        for value in iter {
            self.insert(value);
        }
    }
}

impl fmt::Debug for SparseSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
