//! Parallel executor for independent analysis scopes
//!
//! Uses Rayon for work-stealing parallelism with configurable limits. Scopes share nothing
//! mutable, so no locking is needed between them.

use crate::cfg::FlowGraph;
use crate::error::{Error, Result, SolveError};
use crate::md::MdSystem;
use crate::solve::{SolveOptions, SolveSet, Solution, Strategy};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Configuration for parallel execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Maximum number of worker threads (default: num_cpus)
    pub max_parallelism: usize,
    /// Fail fast on first error vs collect all results
    pub fail_fast: bool,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            max_parallelism: num_cpus::get(),
            fail_fast: false,
        }
    }
}

/// One function or region to analyze
#[derive(Debug)]
pub struct ScopeInput<'a, G> {
    /// The scope's control-flow graph
    pub graph: &'a G,
    /// Registry the graph's summaries refer to
    pub mds: &'a MdSystem,
    /// Run options for this scope
    pub options: SolveOptions,
}

impl<'a, G> ScopeInput<'a, G> {
    /// Scope with default options
    pub fn new(graph: &'a G, mds: &'a MdSystem) -> Self {
        Self {
            graph,
            mds,
            options: SolveOptions::default(),
        }
    }
}

/// Solves every scope on a dedicated thread pool
///
/// # Returns
/// * `Ok(results)` - One entry per scope, in input order
/// * `Err(Error::Solve)` - First failing scope (only with `fail_fast`)
/// * `Err(Error::ThreadPool)` - The pool could not be created
///
/// # Example
/// ```ignore
/// let scopes = vec![ScopeInput::new(&cfg_a, &mds_a), ScopeInput::new(&cfg_b, &mds_b)];
/// let results = solve_scopes(&scopes, Strategy::Worklist, &ParallelConfig::default())?;
/// ```
pub fn solve_scopes<G>(
    scopes: &[ScopeInput<'_, G>],
    strategy: Strategy,
    config: &ParallelConfig,
) -> Result<Vec<std::result::Result<Solution, SolveError>>>
where
    G: FlowGraph + Sync,
{
    let run = |scope: &ScopeInput<'_, G>| {
        SolveSet::new(scope.graph, scope.mds)
            .with_options(scope.options.clone())
            .solve(strategy)
    };

    // Empty array fast path
    if scopes.is_empty() {
        return Ok(Vec::new());
    }

    // Single scope - no parallelism needed
    if scopes.len() == 1 {
        let result = run(&scopes[0]);
        if let (true, Err(err)) = (config.fail_fast, &result) {
            return Err(Error::Solve(err.clone()));
        }
        return Ok(vec![result]);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.max_parallelism.clamp(1, scopes.len()))
        .build()
        .map_err(|e| Error::ThreadPool(e.to_string()))?;

    tracing::debug!(
        scopes = scopes.len(),
        threads = pool.current_num_threads(),
        "solving scopes in parallel"
    );

    pool.install(|| {
        if config.fail_fast {
            scopes
                .par_iter()
                .map(|scope| run(scope).map(Ok))
                .collect::<std::result::Result<Vec<_>, SolveError>>()
                .map_err(Error::Solve)
        } else {
            Ok(scopes.par_iter().map(run).collect())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{BlockId, Cfg, RefSummary};
    use crate::md::{MdId, MdSpec, Storage};

    fn scope(defs: usize) -> (Cfg, MdSystem) {
        let mut sys = MdSystem::new();
        let x = sys.declare_var("x", Storage::Local);
        let x0 = sys.register_md(MdSpec::exact(x, 0, 4)).unwrap();
        let mut cfg = Cfg::new();
        let mut prev = cfg.add_block();
        for _ in 0..defs {
            let bb = cfg.add_block();
            cfg.add_edge(prev, bb);
            cfg.add_stmt(bb, RefSummary::must(x0));
            prev = bb;
        }
        (cfg, sys)
    }

    #[test]
    fn test_solve_scopes_basic() {
        let built: Vec<_> = (1..=4).map(scope).collect();
        let scopes: Vec<_> = built.iter().map(|(cfg, sys)| ScopeInput::new(cfg, sys)).collect();

        let results =
            solve_scopes(&scopes, Strategy::ReversePostorder, &ParallelConfig::default()).unwrap();
        assert_eq!(results.len(), 4);
        for (n, result) in results.iter().enumerate() {
            let solution = result.as_ref().unwrap();
            // Only the last definition of the chain reaches its exit
            let last = BlockId(n as u32 + 1);
            assert_eq!(solution.reach_out(last).unwrap().len(), 1);
        }
    }

    #[test]
    fn test_solve_scopes_empty() {
        let scopes: Vec<ScopeInput<'_, Cfg>> = vec![];
        let results = solve_scopes(&scopes, Strategy::Worklist, &ParallelConfig::default()).unwrap();
        assert!(results.is_empty());
    }

    fn with_bad_scope() -> Vec<(Cfg, MdSystem)> {
        let mut built: Vec<_> = (1..=3).map(scope).collect();
        let (cfg, _) = &mut built[1];
        cfg.add_stmt(BlockId(0), RefSummary::must(MdId(40)));
        built
    }

    #[test]
    fn test_solve_scopes_fail_fast() {
        let built = with_bad_scope();
        let scopes: Vec<_> = built.iter().map(|(cfg, sys)| ScopeInput::new(cfg, sys)).collect();
        let config = ParallelConfig {
            fail_fast: true,
            ..Default::default()
        };

        let err = solve_scopes(&scopes, Strategy::Worklist, &config).unwrap_err();
        assert_eq!(err.implicated().as_deref(), Some("md40"));
    }

    #[test]
    fn test_solve_scopes_collect_all() {
        let built = with_bad_scope();
        let scopes: Vec<_> = built.iter().map(|(cfg, sys)| ScopeInput::new(cfg, sys)).collect();
        let config = ParallelConfig {
            max_parallelism: 2,
            fail_fast: false,
        };

        let results = solve_scopes(&scopes, Strategy::Worklist, &config).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(SolveError::UnknownMd { md: MdId(40), .. })
        ));
        assert!(results[2].is_ok());
    }
}
