//! Per-scope parallel analysis
//!
//! Each scope owns its `MdSystem` and graph, so whole scopes can be solved concurrently.

mod executor;

pub use executor::{solve_scopes, ParallelConfig, ScopeInput};
