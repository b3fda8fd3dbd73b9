//! # Control-flow collaborator interface
//!
//! The solver does not own an IR. It reads blocks, edges, statements and memory-reference
//! summaries through the [`FlowGraph`] trait, which a compiler implements over its own CFG.
//! [`Cfg`] is a small arena-indexed implementation used by the tests and benchmarks.
//!
//! Ids for blocks, statements and expressions are plain dense integers assigned by the
//! collaborator; the solver only requires them to be stable for the duration of one `solve()`.

mod graph;

pub use graph::{BasicBlock, Cfg};

use crate::md::{MdId, MdSet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Basic block id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

/// Statement id, unique across the whole graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StmtId(pub u32);

/// Expression id, unique across the whole graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExprId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

impl fmt::Display for StmtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stmt{}", self.0)
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expr{}", self.0)
    }
}

/// Order in which the collaborator enumerates blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockOrder {
    /// Reverse postorder from the entry; unreachable blocks are absent
    ReversePostorder,
    /// Every block, in whatever order the collaborator stores them
    Arbitrary,
}

/// Memory references of one statement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefSummary {
    /// The single location this statement certainly writes; must be an `Exact` MD
    pub must_def: Option<MdId>,
    /// Locations this statement may write
    pub may_def: MdSet,
    /// Locations this statement may read
    pub may_use: MdSet,
}

impl RefSummary {
    /// A statement that certainly writes `md` and nothing else
    pub fn must(md: MdId) -> Self {
        Self {
            must_def: Some(md),
            ..Self::default()
        }
    }

    /// A statement that may write any of `mds`
    pub fn may(mds: MdSet) -> Self {
        Self {
            may_def: mds,
            ..Self::default()
        }
    }

    /// Adds read locations
    pub fn with_uses(mut self, uses: MdSet) -> Self {
        self.may_use = uses;
        self
    }

    /// Returns true if the statement writes anything
    pub fn defines(&self) -> bool {
        self.must_def.is_some() || !self.may_def.is_empty()
    }

    /// Full write footprint, `may_def ∪ {must_def}`
    pub fn def_footprint(&self) -> MdSet {
        let mut all = self.may_def.clone();
        if let Some(md) = self.must_def {
            all.insert(md);
        }
        all
    }

    /// Every MD id the summary mentions
    pub fn mentioned(&self) -> impl Iterator<Item = MdId> + '_ {
        self.must_def
            .into_iter()
            .chain(self.may_def.iter())
            .chain(self.may_use.iter())
    }
}

/// Memory read by one expression
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExprSummary {
    /// Locations the expression's value depends on
    pub used_md: MdSet,
}

/// Read-only view of a control-flow graph and its memory-reference summaries
///
/// Accessors given an id the graph does not know return an empty slice or `None`; the solver
/// reports such ids as `SolveError::MalformedCfg` instead of skipping them.
pub trait FlowGraph {
    /// Entry block
    fn entry(&self) -> BlockId;

    /// Blocks in the requested order
    fn block_order(&self, order: BlockOrder) -> Vec<BlockId>;

    /// Predecessor blocks
    fn predecessors(&self, block: BlockId) -> &[BlockId];

    /// Successor blocks
    fn successors(&self, block: BlockId) -> &[BlockId];

    /// Statements of a block in execution order
    fn statements(&self, block: BlockId) -> &[StmtId];

    /// Memory references of a statement; `None` when it touches no memory
    fn ref_summary(&self, stmt: StmtId) -> Option<&RefSummary>;

    /// Expressions evaluated by a statement
    fn computed_exprs(&self, stmt: StmtId) -> &[ExprId];

    /// Memory read by an expression
    fn expr_summary(&self, expr: ExprId) -> Option<&ExprSummary>;
}
