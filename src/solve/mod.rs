//! # Dataflow engine
//!
//! One analysis run moves through three types, so no query can reach sets that have not
//! converged:
//!
//! ```text
//! SolveSet ──compute_gen_kill()──▶ GenKill ──solve(strategy)──▶ Solution
//! (uninitialized)                  (per-block local sets)       (converged, queryable)
//! ```
//!
//! Re-running after the CFG changed means building a new [`SolveSet`]; nothing is updated
//! incrementally.
//!
//! ## Systems
//!
//! | System | Meet | Gen | Kill |
//! |--------|------|-----|------|
//! | reaching definitions | ∪ | `may_gen_def` | `must_killed_def` |
//! | available reaching definitions | ∩ | `must_gen_def` | `may_killed_def` |
//! | available expressions | ∩ | `gen_expr` | `killed_expr` |
//! | live-in blocks | ∪ | `{block}` | ∅ |

mod driver;
mod equations;
mod gen_kill;
mod options;

pub use driver::SolveStats;
pub use gen_kill::LocalSets;
pub use options::{SolveOptions, Strategy};

use driver::Fixpoint;
use equations::{Equations, Meet, Topology};
use gen_kill::Universe;

use crate::cfg::{BlockId, FlowGraph};
use crate::error::SolveError;
use crate::md::MdSystem;
use crate::sparse_set::SparseSet;

/// An analysis run that has not started yet
#[derive(Debug)]
pub struct SolveSet<'a, G> {
    graph: &'a G,
    mds: &'a MdSystem,
    options: SolveOptions,
}

impl<'a, G: FlowGraph + Sync> SolveSet<'a, G> {
    /// Prepares a run over `graph`, whose summaries refer to MDs registered in `mds`
    pub fn new(graph: &'a G, mds: &'a MdSystem) -> Self {
        Self {
            graph,
            mds,
            options: SolveOptions::default(),
        }
    }

    /// Replaces the run options
    pub fn with_options(mut self, options: SolveOptions) -> Self {
        self.options = options;
        self
    }

    /// Current run options
    pub fn options(&self) -> &SolveOptions {
        &self.options
    }

    /// Validates the graph and its summaries, then computes every block's local sets
    pub fn compute_gen_kill(self) -> Result<GenKill, SolveError> {
        let topo = Topology::build(self.graph)?;
        let universe = Universe::collect(self.graph, &topo, self.mds)?;
        let locals = gen_kill::compute_all(
            self.graph,
            &topo,
            &universe,
            self.mds,
            self.options.strict_overlap,
            self.options.parallel_gen_kill,
        )?;

        tracing::debug!(
            blocks = topo.len(),
            defs = universe.def_count(),
            exprs = universe.expr_count(),
            parallel = self.options.parallel_gen_kill,
            "gen/kill sets computed"
        );
        Ok(GenKill {
            options: self.options,
            topo,
            universe,
            locals,
        })
    }

    /// Runs both steps and returns the converged sets
    pub fn solve(self, strategy: Strategy) -> Result<Solution, SolveError> {
        self.compute_gen_kill()?.solve(strategy)
    }
}

/// Local sets of every block, ready for propagation
#[derive(Debug, Clone)]
pub struct GenKill {
    options: SolveOptions,
    topo: Topology,
    universe: Universe,
    locals: Vec<LocalSets>,
}

impl GenKill {
    /// Local sets of `block`, or `None` for a block outside the graph
    pub fn local_sets(&self, block: BlockId) -> Option<&LocalSets> {
        self.topo.index_of(block).map(|i| &self.locals[i])
    }

    /// Blocks in the collaborator's arbitrary order
    pub fn blocks(&self) -> &[BlockId] {
        self.topo.blocks()
    }

    /// Ids of every statement that writes memory
    pub fn defining_stmts(&self) -> &SparseSet {
        &self.universe.def_ids
    }

    /// Ids of every expression some statement evaluates
    pub fn exprs(&self) -> &SparseSet {
        &self.universe.expr_ids
    }

    fn equations(
        &self,
        name: &'static str,
        meet: Meet,
        universe: &SparseSet,
        pick: impl Fn(&LocalSets) -> (SparseSet, SparseSet),
    ) -> Equations {
        let (gen, kill) = self.locals.iter().map(pick).unzip();
        Equations {
            name,
            meet,
            gen,
            kill,
            universe: universe.clone(),
        }
    }

    /// Propagates the local sets to a fixpoint with the chosen driver
    ///
    /// Fails with [`SolveError::MalformedCfg`] only when `strategy` sweeps in reverse postorder
    /// and the graph's reverse postorder does not cover every block once, entry first.
    pub fn solve(self, strategy: Strategy) -> Result<Solution, SolveError> {
        let limit = self.options.max_rpo_sweeps;

        let reach = self.equations("reach", Meet::Union, &self.universe.def_ids, |l| {
            (l.may_gen_def.clone(), l.must_killed_def.clone())
        });
        let avail_reach = self.equations(
            "avail_reach",
            Meet::Intersect,
            &self.universe.def_ids,
            |l| (l.must_gen_def.clone(), l.may_killed_def.clone()),
        );
        let avail_expr = self.equations(
            "avail_expr",
            Meet::Intersect,
            &self.universe.expr_ids,
            |l| (l.gen_expr.clone(), l.killed_expr.clone()),
        );
        let live_in = Equations {
            name: "live_in_bb",
            meet: Meet::Union,
            gen: self
                .topo
                .blocks()
                .iter()
                .map(|b| SparseSet::singleton(b.0))
                .collect(),
            kill: vec![SparseSet::new(); self.topo.len()],
            universe: self.topo.blocks().iter().map(|b| b.0).collect(),
        };

        let reach = driver::solve(&reach, &self.topo, strategy, limit)?;
        let avail_reach = driver::solve(&avail_reach, &self.topo, strategy, limit)?;
        let avail_expr = driver::solve(&avail_expr, &self.topo, strategy, limit)?;
        let live_in = driver::solve(&live_in, &self.topo, strategy, limit)?;

        Ok(Solution {
            strategy,
            topo: self.topo,
            locals: self.locals,
            reach,
            avail_reach,
            avail_expr,
            live_in,
        })
    }
}

/// Converged dataflow sets of one run
///
/// Statement sets hold `StmtId` values, expression sets `ExprId` values and the live-in set
/// `BlockId` values. Every accessor returns `None` for a block outside the graph.
#[derive(Debug, Clone)]
pub struct Solution {
    strategy: Strategy,
    topo: Topology,
    locals: Vec<LocalSets>,
    reach: Fixpoint,
    avail_reach: Fixpoint,
    avail_expr: Fixpoint,
    live_in: Fixpoint,
}

impl Solution {
    fn pick<'s>(&'s self, block: BlockId, sets: &'s [SparseSet]) -> Option<&'s SparseSet> {
        self.topo.index_of(block).map(|i| &sets[i])
    }

    /// Definitions that may reach the start of `block`
    pub fn reach_in(&self, block: BlockId) -> Option<&SparseSet> {
        self.pick(block, &self.reach.ins)
    }

    /// Definitions that may reach the end of `block`
    pub fn reach_out(&self, block: BlockId) -> Option<&SparseSet> {
        self.pick(block, &self.reach.outs)
    }

    /// Definitions that are the last writer on every path to the start of `block`
    pub fn avail_reach_in(&self, block: BlockId) -> Option<&SparseSet> {
        self.pick(block, &self.avail_reach.ins)
    }

    /// Definitions that are the last writer on every path to the end of `block`
    pub fn avail_reach_out(&self, block: BlockId) -> Option<&SparseSet> {
        self.pick(block, &self.avail_reach.outs)
    }

    /// Expressions computed and not invalidated on every path to the start of `block`
    pub fn avail_expr_in(&self, block: BlockId) -> Option<&SparseSet> {
        self.pick(block, &self.avail_expr.ins)
    }

    /// Expressions computed and not invalidated on every path to the end of `block`
    pub fn avail_expr_out(&self, block: BlockId) -> Option<&SparseSet> {
        self.pick(block, &self.avail_expr.outs)
    }

    /// Blocks from which `block` can be entered along at least one edge
    pub fn live_in_bb(&self, block: BlockId) -> Option<&SparseSet> {
        self.pick(block, &self.live_in.ins)
    }

    /// Local sets the run propagated
    pub fn local_sets(&self, block: BlockId) -> Option<&LocalSets> {
        self.topo.index_of(block).map(|i| &self.locals[i])
    }

    /// Blocks in the collaborator's arbitrary order
    pub fn blocks(&self) -> &[BlockId] {
        self.topo.blocks()
    }

    /// Driver the run was solved with
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Iteration counts per system: reach, avail_reach, avail_expr, live_in_bb
    pub fn stats(&self) -> [&SolveStats; 4] {
        [
            &self.reach.stats,
            &self.avail_reach.stats,
            &self.avail_expr.stats,
            &self.live_in.stats,
        ]
    }
}
