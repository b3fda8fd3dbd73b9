//! Validated block topology and the generic meet-driven equation system
//!
//! Blocks are renumbered densely by their position in the collaborator's `Arbitrary` order. All
//! per-block vectors in the solver are indexed by that dense index; block ids only appear at the
//! public accessors.

use std::collections::HashMap;

use crate::cfg::{BlockId, BlockOrder, FlowGraph};
use crate::error::SolveError;
use crate::sparse_set::SparseSet;

/// Dense view of a validated CFG
#[derive(Debug, Clone)]
pub(crate) struct Topology {
    blocks: Vec<BlockId>,
    index: HashMap<BlockId, usize>,
    preds: Vec<Vec<usize>>,
    succs: Vec<Vec<usize>>,
    /// The collaborator's reverse postorder, or why it cannot be used
    rpo: Result<Vec<usize>, SolveError>,
    entry: usize,
}

impl Topology {
    /// Reads the graph once and rejects anything the drivers could not visit
    ///
    /// Reachability is taken from the edges, so a stale reverse postorder only fails the runs
    /// that sweep in that order.
    pub(crate) fn build<G: FlowGraph>(graph: &G) -> Result<Self, SolveError> {
        let blocks = graph.block_order(BlockOrder::Arbitrary);
        let mut index = HashMap::with_capacity(blocks.len());
        for (i, &block) in blocks.iter().enumerate() {
            if index.insert(block, i).is_some() {
                return Err(SolveError::MalformedCfg(block));
            }
        }

        let entry_id = graph.entry();
        let entry = *index
            .get(&entry_id)
            .ok_or(SolveError::MalformedCfg(entry_id))?;

        let lookup = |edges: &[BlockId]| -> Result<Vec<usize>, SolveError> {
            edges
                .iter()
                .map(|b| index.get(b).copied().ok_or(SolveError::MalformedCfg(*b)))
                .collect()
        };
        let mut preds = Vec::with_capacity(blocks.len());
        let mut succs = Vec::with_capacity(blocks.len());
        for &block in &blocks {
            preds.push(lookup(graph.predecessors(block))?);
            succs.push(lookup(graph.successors(block))?);
        }

        // Both edge lists must describe the same graph
        for (b, out_edges) in succs.iter().enumerate() {
            if out_edges.iter().any(|&s| !preds[s].contains(&b)) {
                return Err(SolveError::MalformedCfg(blocks[b]));
            }
        }
        for (b, in_edges) in preds.iter().enumerate() {
            if in_edges.iter().any(|&p| !succs[p].contains(&b)) {
                return Err(SolveError::MalformedCfg(blocks[b]));
            }
        }

        let mut reached = vec![false; blocks.len()];
        reached[entry] = true;
        let mut stack = vec![entry];
        while let Some(b) = stack.pop() {
            for &s in &succs[b] {
                if !std::mem::replace(&mut reached[s], true) {
                    stack.push(s);
                }
            }
        }
        if let Some(i) = reached.iter().position(|&r| !r) {
            return Err(SolveError::MalformedCfg(blocks[i]));
        }

        let rpo = Self::check_rpo(
            graph.block_order(BlockOrder::ReversePostorder),
            &blocks,
            &index,
            entry,
        );
        if let Err(err) = &rpo {
            tracing::debug!(%err, "reverse postorder unusable, only the worklist can run");
        }

        Ok(Self {
            blocks,
            index,
            preds,
            succs,
            rpo,
            entry,
        })
    }

    /// The order must visit every block exactly once, starting at the entry
    fn check_rpo(
        rpo_ids: Vec<BlockId>,
        blocks: &[BlockId],
        index: &HashMap<BlockId, usize>,
        entry: usize,
    ) -> Result<Vec<usize>, SolveError> {
        let mut seen = vec![false; blocks.len()];
        let mut rpo = Vec::with_capacity(blocks.len());
        for block in rpo_ids {
            let i = *index.get(&block).ok_or(SolveError::MalformedCfg(block))?;
            if std::mem::replace(&mut seen[i], true) {
                return Err(SolveError::MalformedCfg(block));
            }
            rpo.push(i);
        }
        if let Some(i) = seen.iter().position(|&s| !s) {
            return Err(SolveError::MalformedCfg(blocks[i]));
        }
        if rpo.first() != Some(&entry) {
            return Err(SolveError::MalformedCfg(blocks[entry]));
        }
        Ok(rpo)
    }

    pub(crate) fn len(&self) -> usize {
        self.blocks.len()
    }

    pub(crate) fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    pub(crate) fn block(&self, i: usize) -> BlockId {
        self.blocks[i]
    }

    pub(crate) fn index_of(&self, block: BlockId) -> Option<usize> {
        self.index.get(&block).copied()
    }

    pub(crate) fn entry(&self) -> usize {
        self.entry
    }

    pub(crate) fn preds(&self, i: usize) -> &[usize] {
        &self.preds[i]
    }

    pub(crate) fn succs(&self, i: usize) -> &[usize] {
        &self.succs[i]
    }

    /// Visit order of the sweep driver; fails if the collaborator's order was unusable
    pub(crate) fn rpo(&self) -> Result<&[usize], SolveError> {
        self.rpo.as_deref().map_err(Clone::clone)
    }
}

/// Join operator over predecessors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Meet {
    /// May-analysis: least fixpoint, `out` starts empty
    Union,
    /// Must-analysis: greatest fixpoint, `out` starts at the universe
    Intersect,
}

/// One forward problem `out = gen ∪ (in − kill)`
#[derive(Debug, Clone)]
pub(crate) struct Equations {
    pub(crate) name: &'static str,
    pub(crate) meet: Meet,
    pub(crate) gen: Vec<SparseSet>,
    pub(crate) kill: Vec<SparseSet>,
    pub(crate) universe: SparseSet,
}

impl Equations {
    pub(crate) fn transfer(&self, b: usize, input: &SparseSet) -> SparseSet {
        let mut out = input.clone();
        out.subtract(&self.kill[b]);
        out.union_with(&self.gen[b]);
        out
    }

    /// Joins the predecessors' `out`s
    ///
    /// The entry has an extra boundary predecessor whose `out` is empty, so an intersection
    /// system always sees `∅` there.
    pub(crate) fn meet_in(&self, topo: &Topology, b: usize, outs: &[SparseSet]) -> SparseSet {
        let preds = topo.preds(b);
        match self.meet {
            Meet::Union => {
                let mut acc = SparseSet::new();
                for &p in preds {
                    acc.union_with(&outs[p]);
                }
                acc
            }
            Meet::Intersect => {
                let Some((&first, rest)) = preds.split_first() else {
                    return SparseSet::new();
                };
                if b == topo.entry() {
                    return SparseSet::new();
                }
                let mut acc = outs[first].clone();
                for &p in rest {
                    if acc.is_empty() {
                        break;
                    }
                    acc.intersect_with(&outs[p]);
                }
                acc
            }
        }
    }

    pub(crate) fn initial_outs(&self, topo: &Topology) -> Vec<SparseSet> {
        match self.meet {
            Meet::Union => vec![SparseSet::new(); topo.len()],
            Meet::Intersect => (0..topo.len())
                .map(|b| {
                    if b == topo.entry() {
                        self.transfer(b, &SparseSet::new())
                    } else {
                        self.universe.clone()
                    }
                })
                .collect(),
        }
    }

    /// Recomputes `out[b]`; returns true if it changed
    pub(crate) fn update(&self, topo: &Topology, b: usize, outs: &mut [SparseSet]) -> bool {
        let input = self.meet_in(topo, b, outs);
        let out = self.transfer(b, &input);
        if out == outs[b] {
            return false;
        }
        outs[b] = out;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::Cfg;
    use proptest::collection::vec;
    use proptest::prelude::*;

    fn set(values: &[u32]) -> SparseSet {
        values.iter().copied().collect()
    }

    #[test]
    fn test_topology_indexes_by_arbitrary_order() {
        let mut cfg = Cfg::new();
        let entry = cfg.add_block();
        let body = cfg.add_block();
        cfg.add_edge(entry, body);
        cfg.add_edge(body, body);

        let topo = Topology::build(&cfg).unwrap();
        assert_eq!(topo.len(), 2);
        assert_eq!(topo.entry(), 0);
        assert_eq!(topo.index_of(body), Some(1));
        assert_eq!(topo.preds(1), &[0, 1]);
        assert_eq!(topo.rpo().unwrap(), &[0, 1]);
    }

    #[test]
    fn test_unreachable_block_is_malformed() {
        let mut cfg = Cfg::new();
        let entry = cfg.add_block();
        let dead = cfg.add_block();
        cfg.add_edge(dead, entry);
        assert_eq!(
            Topology::build(&cfg).unwrap_err(),
            SolveError::MalformedCfg(dead)
        );
    }

    #[test]
    fn test_dangling_edge_is_malformed() {
        let mut cfg = Cfg::new();
        let entry = cfg.add_block();
        cfg.add_edge(entry, BlockId(9));
        assert_eq!(
            Topology::build(&cfg).unwrap_err(),
            SolveError::MalformedCfg(BlockId(9))
        );
    }

    #[test]
    fn test_empty_graph_is_malformed() {
        assert_eq!(
            Topology::build(&Cfg::new()).unwrap_err(),
            SolveError::MalformedCfg(BlockId(0))
        );
    }

    /// entry -> {1, 2} -> join (3)
    fn diamond() -> Cfg {
        let mut cfg = Cfg::new();
        let entry = cfg.add_block();
        let a = cfg.add_block();
        let b = cfg.add_block();
        let join = cfg.add_block();
        cfg.add_edge(entry, a);
        cfg.add_edge(entry, b);
        cfg.add_edge(a, join);
        cfg.add_edge(b, join);
        cfg
    }

    #[test]
    fn test_intersect_meet_and_init() {
        let topo = Topology::build(&diamond()).unwrap();

        let eq = Equations {
            name: "test",
            meet: Meet::Intersect,
            gen: vec![set(&[0]), set(&[1]), set(&[2]), set(&[])],
            kill: vec![set(&[]), set(&[2]), set(&[1]), set(&[])],
            universe: set(&[0, 1, 2]),
        };
        let outs = eq.initial_outs(&topo);
        assert_eq!(outs[0], set(&[0]));
        assert_eq!(outs[3], set(&[0, 1, 2]));

        let outs = vec![set(&[0]), set(&[0, 1]), set(&[0, 2]), set(&[0, 1, 2])];
        assert_eq!(eq.meet_in(&topo, 3, &outs), set(&[0]));
        assert!(eq.meet_in(&topo, 0, &outs).is_empty());
    }

    #[test]
    fn test_update_reports_change() {
        let mut cfg = Cfg::new();
        let entry = cfg.add_block();
        let next = cfg.add_block();
        cfg.add_edge(entry, next);
        let topo = Topology::build(&cfg).unwrap();

        let eq = Equations {
            name: "test",
            meet: Meet::Union,
            gen: vec![set(&[7]), set(&[])],
            kill: vec![set(&[]), set(&[])],
            universe: SparseSet::new(),
        };
        let mut outs = eq.initial_outs(&topo);
        assert!(eq.update(&topo, 0, &mut outs));
        assert!(eq.update(&topo, 1, &mut outs));
        assert!(!eq.update(&topo, 1, &mut outs));
        assert_eq!(outs[1], set(&[7]));
    }

    proptest! {
        /// A larger `in` never yields a smaller `out`
        #[test]
        fn transfer_is_monotone(
            gen in vec(0u32..96, 0..8),
            kill in vec(0u32..96, 0..8),
            base in vec(0u32..96, 0..12),
            extra in vec(0u32..96, 0..12),
        ) {
            let eq = Equations {
                name: "prop",
                meet: Meet::Union,
                gen: vec![gen.into_iter().collect()],
                kill: vec![kill.into_iter().collect()],
                universe: SparseSet::new(),
            };
            let small: SparseSet = base.into_iter().collect();
            let mut large = small.clone();
            large.extend(extra);
            prop_assert!(eq.transfer(0, &small).is_subset(&eq.transfer(0, &large)));
        }

        /// Pointwise smaller predecessor `out`s never yield a larger `out` at a join, for either
        /// meet
        #[test]
        fn join_is_monotone(
            intersect in any::<bool>(),
            gen in vec(0u32..48, 0..6),
            kill in vec(0u32..48, 0..6),
            base in vec(vec(0u32..48, 0..10), 4),
            extra in vec(vec(0u32..48, 0..10), 4),
        ) {
            let topo = Topology::build(&diamond()).unwrap();
            let eq = Equations {
                name: "prop",
                meet: if intersect { Meet::Intersect } else { Meet::Union },
                gen: vec![set(&[]), set(&[]), set(&[]), gen.into_iter().collect()],
                kill: vec![set(&[]), set(&[]), set(&[]), kill.into_iter().collect()],
                universe: (0..48).collect(),
            };
            let small: Vec<SparseSet> = base.into_iter().map(|b| b.into_iter().collect()).collect();
            let large: Vec<SparseSet> = small
                .iter()
                .zip(extra)
                .map(|(s, e)| {
                    let mut l = s.clone();
                    l.extend(e);
                    l
                })
                .collect();

            let in_small = eq.meet_in(&topo, 3, &small);
            let in_large = eq.meet_in(&topo, 3, &large);
            prop_assert!(in_small.is_subset(&in_large));
            prop_assert!(eq.transfer(3, &in_small).is_subset(&eq.transfer(3, &in_large)));
        }
    }
}
