//! Fixpoint drivers
//!
//! Both drivers iterate the same monotone equations from the same initial state, so they reach
//! the same fixpoint; only the number of block visits differs. Each run ends with one pass that
//! recomputes every `in` from the final `out`s.

use std::collections::VecDeque;

use serde::Serialize;

use super::equations::{Equations, Topology};
use super::options::Strategy;
use crate::error::SolveError;
use crate::sparse_set::SparseSet;

/// Iteration counts for one equation system
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SolveStats {
    /// Which system these counts belong to
    pub system: &'static str,
    /// Full reverse-postorder sweeps performed
    pub sweeps: usize,
    /// Block recomputations, across sweeps and worklist pops
    pub visits: usize,
    /// True if the RPO driver hit its sweep limit and the worklist finished the run
    pub fell_back: bool,
}

impl SolveStats {
    fn new(system: &'static str) -> Self {
        Self {
            system,
            sweeps: 0,
            visits: 0,
            fell_back: false,
        }
    }
}

/// Converged `in`/`out` sets of one system, indexed densely
#[derive(Debug, Clone)]
pub(crate) struct Fixpoint {
    pub(crate) ins: Vec<SparseSet>,
    pub(crate) outs: Vec<SparseSet>,
    pub(crate) stats: SolveStats,
}

pub(crate) fn solve(
    eq: &Equations,
    topo: &Topology,
    strategy: Strategy,
    max_rpo_sweeps: Option<usize>,
) -> Result<Fixpoint, SolveError> {
    let mut outs = eq.initial_outs(topo);
    let mut stats = SolveStats::new(eq.name);

    match strategy {
        Strategy::ReversePostorder => {
            let rpo = topo.rpo()?;
            sweep(eq, topo, rpo, &mut outs, &mut stats, max_rpo_sweeps)
        }
        Strategy::Worklist => worklist(eq, topo, &mut outs, &mut stats),
    }

    let ins = (0..topo.len())
        .map(|b| eq.meet_in(topo, b, &outs))
        .collect();

    tracing::debug!(
        system = eq.name,
        ?strategy,
        sweeps = stats.sweeps,
        visits = stats.visits,
        fell_back = stats.fell_back,
        "dataflow system converged"
    );
    Ok(Fixpoint { ins, outs, stats })
}

fn sweep(
    eq: &Equations,
    topo: &Topology,
    rpo: &[usize],
    outs: &mut [SparseSet],
    stats: &mut SolveStats,
    limit: Option<usize>,
) {
    loop {
        if limit.is_some_and(|max| stats.sweeps >= max) {
            tracing::warn!(
                system = eq.name,
                sweeps = stats.sweeps,
                "RPO sweep limit reached, continuing with worklist"
            );
            stats.fell_back = true;
            worklist(eq, topo, outs, stats);
            return;
        }

        stats.sweeps += 1;
        let mut changed = false;
        for &b in rpo {
            stats.visits += 1;
            if eq.update(topo, b, outs) {
                tracing::trace!(system = eq.name, block = %topo.block(b), "out changed");
                changed = true;
            }
        }
        if !changed {
            return;
        }
    }
}

fn worklist(eq: &Equations, topo: &Topology, outs: &mut [SparseSet], stats: &mut SolveStats) {
    let mut queue: VecDeque<usize> = (0..topo.len()).collect();
    let mut queued = vec![true; topo.len()];

    while let Some(b) = queue.pop_front() {
        queued[b] = false;
        stats.visits += 1;
        if !eq.update(topo, b, outs) {
            continue;
        }
        tracing::trace!(system = eq.name, block = %topo.block(b), "out changed");
        for &s in topo.succs(b) {
            if !queued[s] {
                queued[s] = true;
                queue.push_back(s);
            }
        }
    }
}
