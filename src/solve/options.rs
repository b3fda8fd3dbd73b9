//! Solver configuration

use serde::{Deserialize, Serialize};

/// Fixpoint driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Strategy {
    /// Sweep the blocks in reverse postorder until a sweep changes nothing
    #[default]
    ReversePostorder,
    /// FIFO worklist seeded with every block; a changed block enqueues its successors
    Worklist,
}

/// Knobs for one `solve()` run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Treat every write as possibly touching globals and imports when computing kills
    pub strict_overlap: bool,
    /// Compute per-block gen/kill sets on the rayon pool
    pub parallel_gen_kill: bool,
    /// RPO sweeps allowed before the run continues with the worklist driver
    pub max_rpo_sweeps: Option<usize>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            strict_overlap: false,
            parallel_gen_kill: false,
            max_rpo_sweeps: None,
        }
    }
}

impl SolveOptions {
    /// Sets `strict_overlap`
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_overlap = strict;
        self
    }

    /// Sets `parallel_gen_kill`
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel_gen_kill = parallel;
        self
    }

    /// Sets `max_rpo_sweeps`
    pub fn rpo_sweep_limit(mut self, limit: usize) -> Self {
        self.max_rpo_sweeps = Some(limit);
        self
    }
}
