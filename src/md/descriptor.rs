//! Memory descriptors and their pure overlap/cover relations
//!
//! An [`Md`] names one abstract memory location: a storage identity (`base`), and, when known,
//! the byte extent `[offset, offset + size)` inside it. Relations between descriptors are total,
//! O(1), and depend only on the two descriptors involved:
//!
//! - [`Md::overlaps`] is symmetric
//! - [`Md::covers`] implies [`Md::overlaps`]
//! - [`Md::exactly_covers`] only holds between `Exact` descriptors and is what must-kill uses
//!
//! Three sentinel descriptors are registered in every `MdSystem` to summarize memory without
//! enumerating it: [`MdId::FULL_MEM`], [`MdId::GLOBAL_MEM`] and [`MdId::IMPORT_MEM`].

use std::fmt;

/// Dense id of a registered memory descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MdId(pub u32);

impl MdId {
    /// Sentinel for "all memory"
    pub const FULL_MEM: MdId = MdId(0);
    /// Sentinel for "every global variable"
    pub const GLOBAL_MEM: MdId = MdId(1);
    /// Sentinel for "every imported (external) variable"
    pub const IMPORT_MEM: MdId = MdId(2);
    /// First id handed out to a user descriptor
    pub(crate) const FIRST_USER: u32 = 3;

    /// Creates an MD id from its raw value
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Position of this MD in its registry
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns true for the three pre-registered sentinels
    pub fn is_sentinel(self) -> bool {
        self.0 < Self::FIRST_USER
    }
}

impl fmt::Display for MdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "md{}", self.0)
    }
}

/// Storage identity underlying a descriptor (variable or synthetic register)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub u32);

impl VarId {
    /// Base of [`MdId::FULL_MEM`]
    pub const ALL_MEM: VarId = VarId(0);
    /// Base of [`MdId::GLOBAL_MEM`]
    pub const GLOBAL_MEM: VarId = VarId(1);
    /// Base of [`MdId::IMPORT_MEM`]
    pub const IMPORT_MEM: VarId = VarId(2);

    /// Creates a var id from its raw value
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "var{}", self.0)
    }
}

/// Where a storage identity lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Storage {
    /// Function-local variable or register
    Local,
    /// Global variable defined in this module
    Global,
    /// Global variable imported from another module
    Imported,
}

impl Storage {
    /// Globals and imports are both visible to unknown callees
    pub fn is_global(self) -> bool {
        matches!(self, Storage::Global | Storage::Imported)
    }
}

/// Exactness classification of a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MdKind {
    /// Extent unknown; stands for the whole base object
    Unbound,
    /// Address and size statically known
    Exact,
    /// Some byte inside `[offset, offset + size)` is accessed
    Range,
}

/// Descriptor flags; part of interning identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MdFlags {
    /// The access may not happen (e.g. a write through a maybe-aliasing pointer)
    pub is_may: bool,
    /// The base's address escapes
    pub is_addr_taken: bool,
}

/// Which summary a sentinel descriptor stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    /// All memory
    FullMem,
    /// Every global and imported variable
    GlobalMem,
    /// Every imported variable
    ImportMem,
}

impl Sentinel {
    fn reaches(self, storage: Storage) -> bool {
        match self {
            Sentinel::FullMem => true,
            Sentinel::GlobalMem => storage.is_global(),
            Sentinel::ImportMem => storage == Storage::Imported,
        }
    }
}

/// Candidate descriptor passed to `MdSystem::register_md`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MdSpec {
    /// Storage identity
    pub base: VarId,
    /// Exactness
    pub kind: MdKind,
    /// Byte offset (ignored for `Unbound`)
    pub offset: u64,
    /// Byte size (ignored for `Unbound`)
    pub size: u64,
    /// Flags
    pub flags: MdFlags,
}

impl MdSpec {
    /// Exact access of `size` bytes at `offset`
    pub fn exact(base: VarId, offset: u64, size: u64) -> Self {
        Self {
            base,
            kind: MdKind::Exact,
            offset,
            size,
            flags: MdFlags::default(),
        }
    }

    /// Access somewhere inside `[offset, offset + size)`
    pub fn range(base: VarId, offset: u64, size: u64) -> Self {
        Self {
            kind: MdKind::Range,
            ..Self::exact(base, offset, size)
        }
    }

    /// Access with unknown extent inside `base`
    pub fn unbound(base: VarId) -> Self {
        Self {
            kind: MdKind::Unbound,
            ..Self::exact(base, 0, 0)
        }
    }

    /// Marks the access as possibly not happening
    pub fn may(mut self) -> Self {
        self.flags.is_may = true;
        self
    }

    /// Marks the base as address-taken
    pub fn addr_taken(mut self) -> Self {
        self.flags.is_addr_taken = true;
        self
    }
}

/// A registered memory descriptor; immutable once created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Md {
    id: MdId,
    base: VarId,
    storage: Storage,
    kind: MdKind,
    offset: u64,
    size: u64,
    flags: MdFlags,
}

impl Md {
    /// `Unbound` specs are normalized to offset 0, size 0
    pub(crate) fn new(id: MdId, spec: &MdSpec, storage: Storage) -> Self {
        let (offset, size) = match spec.kind {
            MdKind::Unbound => (0, 0),
            MdKind::Exact | MdKind::Range => (spec.offset, spec.size),
        };
        Md {
            id,
            base: spec.base,
            storage,
            kind: spec.kind,
            offset,
            size,
            flags: spec.flags,
        }
    }

    /// Registry id
    pub fn id(&self) -> MdId {
        self.id
    }

    /// Storage identity
    pub fn base(&self) -> VarId {
        self.base
    }

    /// Storage class of the base, captured at registration
    pub fn storage(&self) -> Storage {
        self.storage
    }

    /// Exactness
    pub fn kind(&self) -> MdKind {
        self.kind
    }

    /// Byte offset (0 for `Unbound`)
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Byte size (0 for `Unbound`)
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Flags
    pub fn flags(&self) -> MdFlags {
        self.flags
    }

    /// Returns true for `Exact` descriptors
    pub fn is_exact(&self) -> bool {
        self.kind == MdKind::Exact
    }

    /// `Exact` and not flagged `is_may`: a write through it always lands on every byte
    pub fn is_definite(&self) -> bool {
        self.is_exact() && !self.flags.is_may
    }

    /// One past the last byte
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }

    /// Which summary this descriptor stands for, if it is a sentinel
    pub fn sentinel(&self) -> Option<Sentinel> {
        match self.base {
            VarId::ALL_MEM => Some(Sentinel::FullMem),
            VarId::GLOBAL_MEM => Some(Sentinel::GlobalMem),
            VarId::IMPORT_MEM => Some(Sentinel::ImportMem),
            _ => None,
        }
    }

    /// Returns true if the two footprints share at least one byte
    pub fn overlaps(&self, other: &Md) -> bool {
        match (self.sentinel(), other.sentinel()) {
            (Some(_), Some(_)) => true,
            (Some(s), None) => s.reaches(other.storage),
            (None, Some(s)) => s.reaches(self.storage),
            (None, None) => {
                self.base == other.base
                    && (self.kind == MdKind::Unbound
                        || other.kind == MdKind::Unbound
                        || (self.offset < other.end() && other.offset < self.end()))
            }
        }
    }

    /// Returns true if `self`'s footprint contains `other`'s
    pub fn covers(&self, other: &Md) -> bool {
        match (self.sentinel(), other.sentinel()) {
            (Some(Sentinel::FullMem), _) => true,
            (_, Some(Sentinel::FullMem)) => false,
            (Some(Sentinel::GlobalMem), Some(_)) => true,
            (Some(Sentinel::ImportMem), Some(s)) => s == Sentinel::ImportMem,
            (Some(s), None) => s.reaches(other.storage),
            (None, Some(_)) => false,
            (None, None) => {
                self.base == other.base
                    && (self.kind == MdKind::Unbound
                        || (other.kind != MdKind::Unbound
                            && self.offset <= other.offset
                            && other.end() <= self.end()))
            }
        }
    }

    /// Byte-identical or strictly larger footprint, both sides `Exact` and definite
    pub fn exactly_covers(&self, other: &Md) -> bool {
        self.is_definite()
            && other.is_definite()
            && self.base == other.base
            && self.offset <= other.offset
            && other.end() <= self.end()
    }
}

impl fmt::Display for Md {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.sentinel(), self.kind) {
            (Some(s), _) => write!(f, "{}({:?})", self.id, s),
            (None, MdKind::Unbound) => write!(f, "{}({} unbound)", self.id, self.base),
            (None, kind) => write!(
                f,
                "{}({}[{}..{}] {:?})",
                self.id,
                self.base,
                self.offset,
                self.end(),
                kind
            ),
        }
    }
}
