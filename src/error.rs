//! Error types for mdsolve

use crate::cfg::{BlockId, ExprId, StmtId};
use crate::md::{MdId, VarId};
use thiserror::Error;

/// Errors raised by the MD registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MdError {
    /// MD registration referenced a storage identity that was never declared
    ///
    /// **Triggered by:** `MdSystem::register_md` with a `VarId` not returned by `declare_var`
    /// **Effect:** nothing is registered
    #[error("unknown base {0}")]
    UnknownBase(VarId),

    /// An MD id that this registry never handed out
    #[error("unknown memory descriptor {0}")]
    UnknownMd(MdId),

    /// An exact or range MD with an empty or overflowing extent
    #[error("invalid extent for base {base}: offset {offset}, size {size}")]
    InvalidExtent {
        /// Storage identity of the rejected spec
        base: VarId,
        /// Requested byte offset
        offset: u64,
        /// Requested byte size
        size: u64,
    },
}

/// Errors that abort a `solve()` call
///
/// Every variant means an upstream invariant (interning, CFG validity, reference summaries) was
/// already broken. The solver never retries or degrades.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolveError {
    /// A block is referenced but missing from the collaborator's order (or unreachable)
    #[error("malformed CFG at {0}")]
    MalformedCfg(BlockId),

    /// A reference summary names an MD that is not registered
    #[error("{stmt} references unregistered {md}")]
    UnknownMd {
        /// Statement carrying the summary
        stmt: StmtId,
        /// The dangling MD id
        md: MdId,
    },

    /// A must-def that is not an `Exact` MD, or one flagged `is_may`
    #[error("{stmt} must-defines {md}, which is not an exact definite write")]
    InexactMustDef {
        /// Statement carrying the summary
        stmt: StmtId,
        /// The offending MD
        md: MdId,
    },

    /// A statement evaluates an expression that has no reference summary
    #[error("{stmt} evaluates {expr}, which has no reference summary")]
    UnknownExpr {
        /// Statement evaluating the expression
        stmt: StmtId,
        /// The expression with no summary
        expr: ExprId,
    },

    /// The registry rejected an overlap query while the statement was analyzed
    #[error("{stmt}: {source}")]
    Registry {
        /// Statement being analyzed
        stmt: StmtId,
        /// Underlying registry error
        source: MdError,
    },
}

/// Crate-level error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// MD registry failure
    #[error(transparent)]
    Md(#[from] MdError),

    /// Dataflow solve failure
    #[error(transparent)]
    Solve(#[from] SolveError),

    /// Worker pool could not be created
    #[error("failed to create thread pool: {0}")]
    ThreadPool(String),
}

impl Error {
    /// The id an aborted pass should report, if the failure names one
    pub fn implicated(&self) -> Option<String> {
        match self {
            Error::Md(MdError::UnknownBase(var)) => Some(var.to_string()),
            Error::Md(MdError::UnknownMd(md)) => Some(md.to_string()),
            Error::Md(MdError::InvalidExtent { base, .. }) => Some(base.to_string()),
            Error::Solve(SolveError::MalformedCfg(block)) => Some(block.to_string()),
            Error::Solve(SolveError::UnknownMd { md, .. })
            | Error::Solve(SolveError::InexactMustDef { md, .. }) => Some(md.to_string()),
            Error::Solve(SolveError::UnknownExpr { expr, .. }) => Some(expr.to_string()),
            Error::Solve(SolveError::Registry { stmt, .. }) => Some(stmt.to_string()),
            Error::ThreadPool(_) => None,
        }
    }
}

/// Result type for mdsolve operations
pub type Result<T> = std::result::Result<T, Error>;
