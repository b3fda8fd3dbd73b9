//! # mdsolve - Memory descriptors and reaching-definition dataflow
//!
//! [![License: MIT](https://img.shields.io/badge/License-MIT-yellow.svg)](https://opensource.org/licenses/MIT)
//!
//! The memory-aliasing model and dataflow solver of a compiler middle end. For every basic block
//! it answers "which prior writes to memory may still be visible here" and "which expressions are
//! guaranteed already computed here", the facts dead-store elimination, copy propagation, CSE and
//! code motion are built on.
//!
//! ## Features
//!
//! - **Memory descriptors** - Exact, range and unbound locations with O(1) overlap/cover relations
//! - **Interning** - Structurally identical descriptors share one id per scope
//! - **Sentinels** - "all memory", "all globals" and "all imports" without enumerating members
//! - **Four systems** - Reaching definitions, available definitions, available expressions,
//!   live-in blocks
//! - **Two drivers** - Reverse-postorder sweep and worklist, with identical results
//! - **Parallelism** - Per-block gen/kill and per-scope solving on rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use mdsolve::cfg::{Cfg, RefSummary};
//! use mdsolve::md::{MdSpec, MdSystem, Storage};
//! use mdsolve::solve::{SolveSet, Strategy};
//!
//! # fn main() -> mdsolve::Result<()> {
//! // Register the locations the function touches
//! let mut mds = MdSystem::new();
//! let x = mds.declare_var("x", Storage::Local);
//! let m = mds.register_md(MdSpec::exact(x, 0, 4))?;
//!
//! // entry -> a -> exit, entry -> b -> exit; only `a` writes m
//! let mut cfg = Cfg::new();
//! let entry = cfg.add_block();
//! let a = cfg.add_block();
//! let b = cfg.add_block();
//! let exit = cfg.add_block();
//! cfg.add_edge(entry, a);
//! cfg.add_edge(entry, b);
//! cfg.add_edge(a, exit);
//! cfg.add_edge(b, exit);
//! let def = cfg.add_stmt(a, RefSummary::must(m));
//!
//! let solution = SolveSet::new(&cfg, &mds).solve(Strategy::ReversePostorder)?;
//!
//! // Reaches the exit along one path, so it is not available there
//! assert!(solution.reach_in(exit).unwrap().contains(def.0));
//! assert!(!solution.avail_reach_in(exit).unwrap().contains(def.0));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! FlowGraph + MdSystem → SolveSet → GenKill (per-block sets) → Solution (fixpoint)
//! ```
//!
//! ### Main Components
//!
//! - [`SparseSet`] - Copy-on-write integer set shared by every id domain
//! - [`md`] - [`Md`], [`MdSet`], [`MdSystem`] and the overlap cache
//! - [`cfg`] - The [`FlowGraph`] collaborator trait and the reference [`Cfg`]
//! - [`solve`] - Gen/kill computation, equation systems and fixpoint drivers
//! - [`parallel`] - Solving independent scopes on a thread pool
//!
//! ## Error Handling
//!
//! Failures mean an upstream invariant was already broken. They abort the run and name the
//! implicated id:
//!
//! ```rust
//! use mdsolve::cfg::{BlockId, Cfg};
//! use mdsolve::md::MdSystem;
//! use mdsolve::solve::{SolveSet, Strategy};
//! use mdsolve::Error;
//!
//! let mut cfg = Cfg::new();
//! let entry = cfg.add_block();
//! cfg.add_edge(entry, BlockId(9)); // dangling edge
//!
//! let mds = MdSystem::new();
//! let err: Error = SolveSet::new(&cfg, &mds)
//!     .solve(Strategy::Worklist)
//!     .unwrap_err()
//!     .into();
//! assert_eq!(err.implicated().as_deref(), Some("bb9"));
//! ```
//!
//! ## License
//!
//! Licensed under the [MIT License](https://opensource.org/licenses/MIT).

/// Version of the mdsolve crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cfg;
pub mod error;
pub mod md;
pub mod parallel;
pub mod solve;
pub mod sparse_set;

// Re-export main types
pub use cfg::{BlockId, BlockOrder, Cfg, ExprId, ExprSummary, FlowGraph, RefSummary, StmtId};
pub use error::{Error, MdError, Result, SolveError};
pub use md::{Md, MdId, MdKind, MdSet, MdSpec, MdSystem, Storage, VarId};
pub use parallel::{solve_scopes, ParallelConfig, ScopeInput};
pub use solve::{GenKill, LocalSets, SolveOptions, SolveSet, SolveStats, Solution, Strategy};
pub use sparse_set::SparseSet;
