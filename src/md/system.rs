//! MD registry
//!
//! [`MdSystem`] owns the universe of memory descriptors for one optimization scope (a function or
//! region). It interns descriptors so structurally identical specs share one id, and computes
//! overlap closures. Ids are dense per scope, handed out by a per-instance counter, and never
//! reused while the registry lives.
//!
//! The registry is mutated only while descriptors are registered. Dataflow passes take it by
//! shared reference, so one registry can serve concurrently analyzed blocks.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use super::descriptor::{Md, MdFlags, MdId, MdKind, MdSpec, Storage, VarId};
use super::md_set::MdSet;
use crate::error::MdError;

/// A declared storage identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarInfo {
    /// Source-level or synthetic name
    pub name: String,
    /// Storage class
    pub storage: Storage,
}

/// Interning key: `(base, kind, offset, size, flags)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MdKey {
    base: VarId,
    kind: MdKind,
    offset: u64,
    size: u64,
    flags: MdFlags,
}

impl From<&Md> for MdKey {
    fn from(md: &Md) -> Self {
        MdKey {
            base: md.base(),
            kind: md.kind(),
            offset: md.offset(),
            size: md.size(),
            flags: md.flags(),
        }
    }
}

/// Registry of memory descriptors for one scope
#[derive(Debug, Clone)]
pub struct MdSystem {
    /// Indexed by `VarId`; the first three are the sentinel bases
    vars: Vec<VarInfo>,
    /// Indexed by `MdId`; the first three are the sentinels
    mds: Vec<Md>,
    interned: HashMap<MdKey, MdId>,
    /// Non-sentinel descriptors grouped by base
    by_base: HashMap<VarId, Vec<MdId>>,
}

impl MdSystem {
    /// Creates a registry holding only the sentinel descriptors
    pub fn new() -> Self {
        let sentinels = [
            (VarId::ALL_MEM, MdId::FULL_MEM, "<all-mem>"),
            (VarId::GLOBAL_MEM, MdId::GLOBAL_MEM, "<global-mem>"),
            (VarId::IMPORT_MEM, MdId::IMPORT_MEM, "<import-mem>"),
        ];
        let mut sys = MdSystem {
            vars: Vec::new(),
            mds: Vec::new(),
            interned: HashMap::new(),
            by_base: HashMap::new(),
        };
        for (base, id, name) in sentinels {
            let storage = if base == VarId::IMPORT_MEM {
                Storage::Imported
            } else {
                Storage::Global
            };
            sys.vars.push(VarInfo {
                name: name.to_string(),
                storage,
            });
            let md = Md::new(id, &MdSpec::unbound(base), storage);
            sys.interned.insert(MdKey::from(&md), id);
            sys.mds.push(md);
        }
        sys
    }

    /// Declares a storage identity that descriptors may be registered against
    pub fn declare_var(&mut self, name: impl Into<String>, storage: Storage) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(VarInfo {
            name: name.into(),
            storage,
        });
        id
    }

    /// Looks up a declared storage identity
    pub fn var(&self, id: VarId) -> Option<&VarInfo> {
        self.vars.get(id.0 as usize)
    }

    /// Returns the id of the descriptor matching `spec`, registering it on first sight
    ///
    /// A spec whose base is one of the sentinel bases resolves to that sentinel.
    pub fn register_md(&mut self, spec: MdSpec) -> Result<MdId, MdError> {
        let storage = self
            .var(spec.base)
            .map(|v| v.storage)
            .ok_or(MdError::UnknownBase(spec.base))?;

        match spec.base {
            VarId::ALL_MEM => return Ok(MdId::FULL_MEM),
            VarId::GLOBAL_MEM => return Ok(MdId::GLOBAL_MEM),
            VarId::IMPORT_MEM => return Ok(MdId::IMPORT_MEM),
            _ => {}
        }

        if spec.kind != MdKind::Unbound
            && (spec.size == 0 || spec.offset.checked_add(spec.size).is_none())
        {
            return Err(MdError::InvalidExtent {
                base: spec.base,
                offset: spec.offset,
                size: spec.size,
            });
        }

        let id = MdId(self.mds.len() as u32);
        let md = Md::new(id, &spec, storage);
        match self.interned.entry(MdKey::from(&md)) {
            Entry::Occupied(existing) => Ok(*existing.get()),
            Entry::Vacant(slot) => {
                slot.insert(id);
                self.by_base.entry(md.base()).or_default().push(id);
                tracing::trace!(md = %md, "registered memory descriptor");
                self.mds.push(md);
                Ok(id)
            }
        }
    }

    /// Looks up a registered descriptor
    pub fn md(&self, id: MdId) -> Option<&Md> {
        self.mds.get(id.index())
    }

    /// Looks up a registered descriptor, failing with `UnknownMd`
    pub fn get(&self, id: MdId) -> Result<&Md, MdError> {
        self.md(id).ok_or(MdError::UnknownMd(id))
    }

    /// Returns true if `id` was handed out by this registry
    pub fn is_registered(&self, id: MdId) -> bool {
        id.index() < self.mds.len()
    }

    /// Number of registered descriptors, sentinels included
    pub fn md_count(&self) -> usize {
        self.mds.len()
    }

    /// All registered descriptors in id order
    pub fn iter(&self) -> impl Iterator<Item = &Md> {
        self.mds.iter()
    }

    /// Appends to `out` every registered descriptor overlapping `md`
    ///
    /// `strict` also adds the global and import sentinels even when `md` is a purely local
    /// variable, for callers that must assume an unknown callee touches globals.
    pub fn compute_overlap(&self, md: MdId, out: &mut MdSet, strict: bool) -> Result<(), MdError> {
        let target = self.get(md)?;

        if target.sentinel().is_some() {
            out.extend(self.mds.iter().filter(|m| m.overlaps(target)).map(Md::id));
        } else {
            let same_base = self.by_base.get(&target.base()).into_iter().flatten();
            for &id in same_base {
                if self.mds[id.index()].overlaps(target) {
                    out.insert(id);
                }
            }
            for sentinel in &self.mds[..MdId::FIRST_USER as usize] {
                if sentinel.overlaps(target) {
                    out.insert(sentinel.id());
                }
            }
        }

        if strict {
            out.insert(MdId::GLOBAL_MEM);
            out.insert(MdId::IMPORT_MEM);
        }
        Ok(())
    }

    /// Appends to `out` every registered descriptor overlapping some member of `set`
    pub fn compute_set_overlap(
        &self,
        set: &MdSet,
        out: &mut MdSet,
        strict: bool,
    ) -> Result<(), MdError> {
        if set.contains_full_mem() {
            return self.compute_overlap(MdId::FULL_MEM, out, strict);
        }

        let mut members = set
            .iter()
            .map(|id| self.get(id))
            .collect::<Result<Vec<_>, _>>()?;
        // Whole-object members first; their closure contains every other member's of that base.
        members.sort_by_key(|m| m.kind() != MdKind::Unbound);

        let mut closed_bases: HashSet<VarId> = HashSet::new();
        for member in members {
            if member.sentinel().is_none() {
                if closed_bases.contains(&member.base()) {
                    continue;
                }
                if member.kind() == MdKind::Unbound {
                    closed_bases.insert(member.base());
                }
            }
            self.compute_overlap(member.id(), out, strict)?;
        }
        Ok(())
    }

    /// Overlap closure of a single descriptor
    pub fn overlap_of(&self, md: MdId, strict: bool) -> Result<MdSet, MdError> {
        let mut out = MdSet::new();
        self.compute_overlap(md, &mut out, strict)?;
        Ok(out)
    }

    /// Overlap closure of a set of descriptors
    pub fn overlap_of_set(&self, set: &MdSet, strict: bool) -> Result<MdSet, MdError> {
        let mut out = MdSet::new();
        self.compute_set_overlap(set, &mut out, strict)?;
        Ok(out)
    }
}

impl Default for MdSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-pass memo of overlap closures keyed by MD, for a fixed `strict` setting
#[derive(Debug)]
pub struct OverlapCache<'a> {
    sys: &'a MdSystem,
    strict: bool,
    closures: HashMap<MdId, MdSet>,
}

impl<'a> OverlapCache<'a> {
    /// Creates an empty cache over `sys`
    pub fn new(sys: &'a MdSystem, strict: bool) -> Self {
        Self {
            sys,
            strict,
            closures: HashMap::new(),
        }
    }

    /// Overlap closure of `md`, computed at most once
    pub fn closure(&mut self, md: MdId) -> Result<&MdSet, MdError> {
        match self.closures.entry(md) {
            Entry::Occupied(hit) => Ok(hit.into_mut()),
            Entry::Vacant(slot) => {
                let mut out = MdSet::new();
                self.sys.compute_overlap(md, &mut out, self.strict)?;
                Ok(slot.insert(out))
            }
        }
    }

    /// Union of the closures of every member of `set`
    pub fn closure_of_set(&mut self, set: &MdSet) -> Result<MdSet, MdError> {
        let mut out = MdSet::new();
        for md in set.iter() {
            out.union(self.closure(md)?);
        }
        Ok(out)
    }

    /// Number of memoized closures
    pub fn len(&self) -> usize {
        self.closures.len()
    }

    /// Returns true if nothing has been memoized yet
    pub fn is_empty(&self) -> bool {
        self.closures.is_empty()
    }
}
