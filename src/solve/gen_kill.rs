//! Step 1: per-block gen and kill sets
//!
//! Every block is analyzed on its own against a read-only table of the graph's definitions and
//! expressions. Kill sets range over the whole statement universe, so `in − kill` also removes
//! definitions flowing in from predecessors.
//!
//! - `must_kill(s, d)`: both have a must-def and `s`'s exactly covers `d`'s
//! - `may_kill(s, d)`: the overlap closure of `s`'s write footprint meets `d`'s write footprint

use std::collections::HashMap;

use rayon::prelude::*;

use super::equations::Topology;
use crate::cfg::{BlockId, ExprId, FlowGraph, StmtId};
use crate::error::{MdError, SolveError};
use crate::md::{MdId, MdSet, MdSystem, OverlapCache};
use crate::sparse_set::SparseSet;

/// Sets derived from one block's statements alone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalSets {
    /// Statements whose write may survive to the block exit
    pub may_gen_def: SparseSet,
    /// Statements with an exact must-def that no later statement of the block may overwrite
    pub must_gen_def: SparseSet,
    /// Statements whose must-def some statement of the block exactly overwrites
    pub must_killed_def: SparseSet,
    /// Statements whose write some statement of the block may overwrite
    pub may_killed_def: SparseSet,
    /// Expressions evaluated in the block and not invalidated afterwards
    pub gen_expr: SparseSet,
    /// Expressions whose operands some write of the block may change
    pub killed_expr: SparseSet,
}

#[derive(Debug, Clone)]
struct Def {
    stmt: StmtId,
    must: Option<MdId>,
    all: MdSet,
}

/// Every definition and expression of the graph, validated against the registry
#[derive(Debug, Clone, Default)]
pub(crate) struct Universe {
    defs: Vec<Def>,
    by_stmt: HashMap<StmtId, usize>,
    exprs: Vec<(ExprId, MdSet)>,
    pub(crate) def_ids: SparseSet,
    pub(crate) expr_ids: SparseSet,
}

impl Universe {
    /// Collects definitions and expressions, failing on the first summary that breaks an
    /// upstream invariant
    pub(crate) fn collect<G: FlowGraph>(
        graph: &G,
        topo: &Topology,
        mds: &MdSystem,
    ) -> Result<Self, SolveError> {
        let mut universe = Universe::default();

        for &block in topo.blocks() {
            for &stmt in graph.statements(block) {
                if let Some(summary) = graph.ref_summary(stmt) {
                    if let Some(md) = summary.mentioned().find(|&md| !mds.is_registered(md)) {
                        return Err(SolveError::UnknownMd { stmt, md });
                    }
                    if let Some(md) = summary.must_def {
                        if !mds.md(md).is_some_and(|m| m.is_definite()) {
                            return Err(SolveError::InexactMustDef { stmt, md });
                        }
                    }
                    if summary.defines() && !universe.by_stmt.contains_key(&stmt) {
                        universe.by_stmt.insert(stmt, universe.defs.len());
                        universe.def_ids.insert(stmt.0);
                        universe.defs.push(Def {
                            stmt,
                            must: summary.must_def,
                            all: summary.def_footprint(),
                        });
                    }
                }

                for &expr in graph.computed_exprs(stmt) {
                    let summary = graph
                        .expr_summary(expr)
                        .ok_or(SolveError::UnknownExpr { stmt, expr })?;
                    if let Some(md) = summary.used_md.iter().find(|&md| !mds.is_registered(md)) {
                        return Err(SolveError::UnknownMd { stmt, md });
                    }
                    if universe.expr_ids.insert(expr.0) {
                        universe.exprs.push((expr, summary.used_md.clone()));
                    }
                }
            }
        }

        Ok(universe)
    }

    pub(crate) fn def_count(&self) -> usize {
        self.defs.len()
    }

    pub(crate) fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    fn def(&self, stmt: u32) -> Option<&Def> {
        self.by_stmt.get(&StmtId(stmt)).map(|&i| &self.defs[i])
    }
}

/// Computes the local sets of every block, in the topology's dense order
pub(crate) fn compute_all<G: FlowGraph + Sync>(
    graph: &G,
    topo: &Topology,
    universe: &Universe,
    mds: &MdSystem,
    strict: bool,
    parallel: bool,
) -> Result<Vec<LocalSets>, SolveError> {
    if parallel {
        topo.blocks()
            .par_iter()
            .map_init(
                || OverlapCache::new(mds, strict),
                |cache, &block| compute_block(graph, block, universe, mds, cache),
            )
            .collect()
    } else {
        let mut cache = OverlapCache::new(mds, strict);
        topo.blocks()
            .iter()
            .map(|&block| compute_block(graph, block, universe, mds, &mut cache))
            .collect()
    }
}

fn registry_error(stmt: StmtId) -> impl Fn(MdError) -> SolveError {
    move |err| match err {
        MdError::UnknownMd(md) => SolveError::UnknownMd { stmt, md },
        source => SolveError::Registry { stmt, source },
    }
}

fn must_kill(mds: &MdSystem, killer: &Def, victim: &Def) -> Result<bool, SolveError> {
    let (Some(k), Some(v)) = (killer.must, victim.must) else {
        return Ok(false);
    };
    let k = mds.get(k).map_err(registry_error(killer.stmt))?;
    let v = mds.get(v).map_err(registry_error(victim.stmt))?;
    Ok(k.exactly_covers(v))
}

fn may_kill(closure: &MdSet, victim: &Def) -> bool {
    closure.as_sparse().is_intersect(victim.all.as_sparse())
}

fn compute_block<G: FlowGraph>(
    graph: &G,
    block: BlockId,
    universe: &Universe,
    mds: &MdSystem,
    cache: &mut OverlapCache<'_>,
) -> Result<LocalSets, SolveError> {
    let mut sets = LocalSets::default();

    for &stmt in graph.statements(block) {
        for expr in graph.computed_exprs(stmt) {
            sets.gen_expr.insert(expr.0);
        }

        let Some(def) = universe.def(stmt.0) else {
            continue;
        };
        let closure = cache
            .closure_of_set(&def.all)
            .map_err(registry_error(stmt))?;

        let mut lost_must = Vec::new();
        for d in sets.must_gen_def.iter() {
            if universe.def(d).is_some_and(|victim| may_kill(&closure, victim)) {
                lost_must.push(d);
            }
        }
        let mut lost_may = Vec::new();
        for d in sets.may_gen_def.iter() {
            if let Some(victim) = universe.def(d) {
                if must_kill(mds, def, victim)? {
                    lost_may.push(d);
                }
            }
        }
        for d in lost_must {
            sets.must_gen_def.remove(d);
        }
        for d in lost_may {
            sets.may_gen_def.remove(d);
        }

        if def.must.is_some() {
            sets.must_gen_def.insert(stmt.0);
        }
        sets.may_gen_def.insert(stmt.0);

        for victim in universe.defs.iter().filter(|d| d.stmt != stmt) {
            if must_kill(mds, def, victim)? {
                sets.must_killed_def.insert(victim.stmt.0);
            }
            if may_kill(&closure, victim) {
                sets.may_killed_def.insert(victim.stmt.0);
            }
        }

        for (expr, used) in &universe.exprs {
            if closure.as_sparse().is_intersect(used.as_sparse()) {
                sets.gen_expr.remove(expr.0);
                sets.killed_expr.insert(expr.0);
            }
        }
    }

    tracing::trace!(
        %block,
        must_gen = sets.must_gen_def.len(),
        may_gen = sets.may_gen_def.len(),
        must_killed = sets.must_killed_def.len(),
        may_killed = sets.may_killed_def.len(),
        "local sets computed"
    );
    Ok(sets)
}
