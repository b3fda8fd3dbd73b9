//! Property-based tests for the MD model and the dataflow engine
//!
//! These tests use proptest to generate random registries and CFGs and verify that:
//! 1. MD relations are symmetric and consistent with each other
//! 2. Interning is idempotent
//! 3. Step 1 never leaves a must-killed definition in the must-gen set
//! 4. Every driver, including the RPO run that falls back to the worklist, reaches the same
//!    fixpoint on arbitrary (also irreducible) CFGs

use mdsolve::cfg::{BlockId, Cfg, FlowGraph, RefSummary};
use mdsolve::md::{MdId, MdSet, MdSpec, MdSystem, Storage, VarId};
use mdsolve::solve::{SolveOptions, SolveSet, Solution, Strategy as Driver};
use mdsolve::SparseSet;
use proptest::prelude::*;
use proptest::sample::Index;

// =============================================================================
// STRATEGY GENERATORS
// =============================================================================

/// (variable, kind, offset, size, is_may)
type SpecPlan = (usize, u8, u64, u64, bool);

/// (block, must-def, may-defs, evaluated expressions)
type StmtPlan = (usize, Option<Index>, Vec<Index>, Vec<Index>);

#[derive(Debug, Clone)]
struct GraphPlan {
    specs: Vec<SpecPlan>,
    parents: Vec<Index>,
    extra_edges: Vec<(usize, usize)>,
    stmts: Vec<StmtPlan>,
    exprs: Vec<Vec<Index>>,
}

fn spec_plans() -> impl Strategy<Value = Vec<SpecPlan>> {
    prop::collection::vec(
        (0usize..4, 0u8..3, 0u64..16, 1u64..16, prop::bool::weighted(0.2)),
        1..12,
    )
}

fn stmt_plan(blocks: usize) -> impl Strategy<Value = StmtPlan> {
    (
        0..blocks,
        prop::option::weighted(0.7, any::<Index>()),
        prop::collection::vec(any::<Index>(), 0..3),
        prop::collection::vec(any::<Index>(), 0..2),
    )
}

/// Random CFGs where every block is reachable from block 0; extra edges add back edges and
/// irreducible loops
fn graph_plan() -> impl Strategy<Value = GraphPlan> {
    (spec_plans(), 1usize..10).prop_flat_map(|(specs, blocks)| {
        (
            Just(specs),
            prop::collection::vec(any::<Index>(), blocks - 1),
            prop::collection::vec((0..blocks, 0..blocks), 0..blocks * 2),
            prop::collection::vec(stmt_plan(blocks), 0..16),
            prop::collection::vec(prop::collection::vec(any::<Index>(), 1..3), 0..4),
        )
            .prop_map(|(specs, parents, extra_edges, stmts, exprs)| GraphPlan {
                specs,
                parents,
                extra_edges,
                stmts,
                exprs,
            })
    })
}

// =============================================================================
// BUILDERS
// =============================================================================

fn register(specs: &[SpecPlan]) -> (MdSystem, Vec<MdId>, Vec<MdId>) {
    let mut mds = MdSystem::new();
    let vars: [VarId; 4] = [
        mds.declare_var("a", Storage::Local),
        mds.declare_var("b", Storage::Local),
        mds.declare_var("g", Storage::Global),
        mds.declare_var("i", Storage::Imported),
    ];

    let mut all = vec![MdId::FULL_MEM, MdId::GLOBAL_MEM, MdId::IMPORT_MEM];
    let mut exact = Vec::new();
    for &(var, kind, offset, size, is_may) in specs {
        let base = vars[var];
        let mut spec = match kind {
            0 => MdSpec::exact(base, offset, size),
            1 => MdSpec::range(base, offset, size),
            _ => MdSpec::unbound(base),
        };
        if is_may {
            spec = spec.may();
        }
        let id = mds.register_md(spec).unwrap();
        all.push(id);
        if mds.md(id).unwrap().is_definite() {
            exact.push(id);
        }
    }
    (mds, all, exact)
}

fn build(plan: &GraphPlan) -> (Cfg, MdSystem) {
    let (mds, all, exact) = register(&plan.specs);

    let mut cfg = Cfg::new();
    let blocks: Vec<BlockId> = (0..=plan.parents.len()).map(|_| cfg.add_block()).collect();
    for (i, parent) in plan.parents.iter().enumerate() {
        let child = i + 1;
        cfg.add_edge(blocks[parent.index(child)], blocks[child]);
    }
    for &(from, to) in &plan.extra_edges {
        cfg.add_edge(blocks[from], blocks[to]);
    }

    let exprs: Vec<_> = plan
        .exprs
        .iter()
        .map(|used| cfg.add_expr(used.iter().map(|ix| *ix.get(&all)).collect()))
        .collect();

    for (block, must, may, evaluated) in &plan.stmts {
        let summary = RefSummary {
            must_def: must
                .as_ref()
                .filter(|_| !exact.is_empty())
                .map(|ix| *ix.get(&exact)),
            may_def: may.iter().map(|ix| *ix.get(&all)).collect(),
            may_use: MdSet::new(),
        };
        let evaluated: Vec<_> = if exprs.is_empty() {
            Vec::new()
        } else {
            evaluated.iter().map(|ix| *ix.get(&exprs)).collect()
        };
        cfg.add_stmt_with_exprs(blocks[*block], Some(summary), &evaluated);
    }
    (cfg, mds)
}

fn solve_with(cfg: &Cfg, mds: &MdSystem, strategy: Driver, options: SolveOptions) -> Solution {
    SolveSet::new(cfg, mds)
        .with_options(options)
        .solve(strategy)
        .unwrap()
}

fn same_sets(lhs: &Solution, rhs: &Solution) -> Result<(), TestCaseError> {
    for &block in lhs.blocks() {
        prop_assert_eq!(lhs.reach_in(block), rhs.reach_in(block));
        prop_assert_eq!(lhs.reach_out(block), rhs.reach_out(block));
        prop_assert_eq!(lhs.avail_reach_in(block), rhs.avail_reach_in(block));
        prop_assert_eq!(lhs.avail_reach_out(block), rhs.avail_reach_out(block));
        prop_assert_eq!(lhs.avail_expr_in(block), rhs.avail_expr_in(block));
        prop_assert_eq!(lhs.avail_expr_out(block), rhs.avail_expr_out(block));
        prop_assert_eq!(lhs.live_in_bb(block), rhs.live_in_bb(block));
    }
    Ok(())
}

// =============================================================================
// MD MODEL PROPERTIES
// =============================================================================

proptest! {
    /// overlaps(a, b) == overlaps(b, a), covers ⟹ overlaps, exactly_covers ⟹ covers
    #[test]
    fn md_relations_are_consistent(specs in spec_plans()) {
        let (mds, _, _) = register(&specs);
        for a in mds.iter() {
            for b in mds.iter() {
                prop_assert_eq!(a.overlaps(b), b.overlaps(a), "{} vs {}", a, b);
                if a.covers(b) {
                    prop_assert!(a.overlaps(b), "{} covers {} without overlap", a, b);
                }
                if a.exactly_covers(b) {
                    prop_assert!(a.covers(b), "{} exactly covers {} only", a, b);
                }
            }
        }
    }

    /// Overlap closures list exactly the registered MDs the pure relation says overlap
    #[test]
    fn overlap_closure_matches_relation(specs in spec_plans()) {
        let (mds, _, _) = register(&specs);
        for a in mds.iter() {
            let closure = mds.overlap_of(a.id(), false).unwrap();
            for b in mds.iter() {
                prop_assert_eq!(closure.contains(b.id()), a.overlaps(b), "{} vs {}", a, b);
            }
        }
    }

    /// Registering the same specs again hands out the same ids
    #[test]
    fn registration_is_idempotent(specs in spec_plans()) {
        let (mut mds, all, _) = register(&specs);
        let before = mds.md_count();
        let vars = [VarId(3), VarId(4), VarId(5), VarId(6)];
        for (&(var, kind, offset, size, is_may), &id) in specs.iter().zip(&all[3..]) {
            let mut spec = match kind {
                0 => MdSpec::exact(vars[var], offset, size),
                1 => MdSpec::range(vars[var], offset, size),
                _ => MdSpec::unbound(vars[var]),
            };
            if is_may {
                spec = spec.may();
            }
            prop_assert_eq!(mds.register_md(spec).unwrap(), id);
        }
        prop_assert_eq!(mds.md_count(), before);
    }

    /// The full-memory sentinel overlaps every registered MD
    #[test]
    fn full_mem_overlaps_everything(specs in spec_plans()) {
        let (mds, all, _) = register(&specs);
        let full = MdSet::full_mem();
        for md in all {
            prop_assert!(full.is_overlap(md, &mds));
        }
    }
}

// =============================================================================
// DATAFLOW PROPERTIES
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// A definition must-killed by a later statement of its block is not in must-gen
    #[test]
    fn kill_soundness(plan in graph_plan()) {
        let (cfg, mds) = build(&plan);
        let gen_kill = SolveSet::new(&cfg, &mds).compute_gen_kill().unwrap();

        for &block in gen_kill.blocks() {
            let local = gen_kill.local_sets(block).unwrap();
            let stmts = cfg.statements(block);
            for (i, &victim) in stmts.iter().enumerate() {
                let Some(v) = cfg.ref_summary(victim).and_then(|s| s.must_def) else {
                    continue;
                };
                for &killer in &stmts[i + 1..] {
                    let Some(k) = cfg.ref_summary(killer).and_then(|s| s.must_def) else {
                        continue;
                    };
                    if mds.md(k).unwrap().exactly_covers(mds.md(v).unwrap()) {
                        prop_assert!(!local.must_gen_def.contains(victim.0));
                        prop_assert!(!local.may_gen_def.contains(victim.0));
                        prop_assert!(local.must_killed_def.contains(victim.0));
                    }
                }
            }
            prop_assert!(local.must_gen_def.is_subset(&local.may_gen_def));
            prop_assert!(local.must_killed_def.is_subset(&local.may_killed_def));
        }
    }

    /// RPO sweeps and the worklist reach identical sets
    #[test]
    fn drivers_agree(plan in graph_plan()) {
        let (cfg, mds) = build(&plan);
        let rpo = solve_with(&cfg, &mds, Driver::ReversePostorder, SolveOptions::default());
        let worklist = solve_with(&cfg, &mds, Driver::Worklist, SolveOptions::default());
        same_sets(&rpo, &worklist)?;
    }

    /// An RPO run cut short by its sweep limit and finished by the worklist changes nothing
    #[test]
    fn rpo_fallback_agrees(plan in graph_plan(), limit in 0usize..3) {
        let (cfg, mds) = build(&plan);
        let full = solve_with(&cfg, &mds, Driver::ReversePostorder, SolveOptions::default());
        let limited = solve_with(
            &cfg,
            &mds,
            Driver::ReversePostorder,
            SolveOptions::default().rpo_sweep_limit(limit),
        );
        same_sets(&full, &limited)?;
        for stats in limited.stats() {
            prop_assert!(stats.sweeps <= limit);
        }
    }

    /// Parallel Step 1 publishes the same solution as the sequential one
    #[test]
    fn parallel_gen_kill_agrees(plan in graph_plan()) {
        let (cfg, mds) = build(&plan);
        let sequential = solve_with(&cfg, &mds, Driver::Worklist, SolveOptions::default());
        let parallel = solve_with(
            &cfg,
            &mds,
            Driver::Worklist,
            SolveOptions::default().parallel(true),
        );
        same_sets(&sequential, &parallel)?;
    }

    /// The published sets satisfy the equations, and availability implies reachability
    #[test]
    fn solution_is_a_fixpoint(plan in graph_plan()) {
        let (cfg, mds) = build(&plan);
        let solution = solve_with(&cfg, &mds, Driver::ReversePostorder, SolveOptions::default());

        for &block in solution.blocks() {
            let local = solution.local_sets(block).unwrap();

            let mut reach_in = SparseSet::new();
            for &pred in cfg.predecessors(block) {
                reach_in.union_with(solution.reach_out(pred).unwrap());
            }
            prop_assert_eq!(solution.reach_in(block).unwrap(), &reach_in);

            let mut reach_out = reach_in.clone();
            reach_out.subtract(&local.must_killed_def);
            reach_out.union_with(&local.may_gen_def);
            prop_assert_eq!(solution.reach_out(block).unwrap(), &reach_out);

            let mut avail_out = solution.avail_reach_in(block).unwrap().clone();
            avail_out.subtract(&local.may_killed_def);
            avail_out.union_with(&local.must_gen_def);
            prop_assert_eq!(solution.avail_reach_out(block).unwrap(), &avail_out);

            prop_assert!(solution
                .avail_reach_in(block)
                .unwrap()
                .is_subset(solution.reach_in(block).unwrap()));
        }
    }
}

// =============================================================================
// SPECIFIC REGRESSION TESTS
// =============================================================================

/// Irreducible loop: two entries into the cycle {1, 2}
#[test]
fn regression_irreducible_loop() {
    let (mut mds, _, _) = register(&[]);
    let x = mds.declare_var("x", Storage::Local);
    let m = mds.register_md(MdSpec::exact(x, 0, 4)).unwrap();

    let mut cfg = Cfg::new();
    let entry = cfg.add_block();
    let left = cfg.add_block();
    let right = cfg.add_block();
    cfg.add_edge(entry, left);
    cfg.add_edge(entry, right);
    cfg.add_edge(left, right);
    cfg.add_edge(right, left);
    let init = cfg.add_stmt(entry, RefSummary::must(m));
    let redef = cfg.add_stmt(left, RefSummary::must(m));

    let rpo = solve_with(&cfg, &mds, Driver::ReversePostorder, SolveOptions::default());
    let worklist = solve_with(&cfg, &mds, Driver::Worklist, SolveOptions::default());
    same_sets(&rpo, &worklist).unwrap();

    let at_right = rpo.reach_in(right).unwrap();
    assert!(at_right.contains(init.0) && at_right.contains(redef.0));
    assert!(rpo.avail_reach_in(right).unwrap().is_empty());
}

/// A block with only statements that define nothing
#[test]
fn regression_no_definitions() {
    let (mds, _, _) = register(&[]);
    let mut cfg = Cfg::new();
    let entry = cfg.add_block();
    cfg.add_stmt(entry, RefSummary::default());

    let solution = solve_with(&cfg, &mds, Driver::Worklist, SolveOptions::default());
    assert!(solution.reach_out(entry).unwrap().is_empty());
    assert!(solution.avail_reach_out(entry).unwrap().is_empty());
}
