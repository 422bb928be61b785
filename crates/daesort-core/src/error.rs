//! Unified error type for structural analysis and model manipulation.
//!
//! Every failure in this workspace is a deterministic function of model
//! structure, so nothing here is retryable: a pass that returns an error has
//! to be re-run on a freshly rebuilt model.
//!
//! # Example
//!
//! ```ignore
//! use daesort_core::{DaeError, DaeResult};
//!
//! fn prepare(model: &mut OcpModel) -> DaeResult<()> {
//!     model.sort_dae()?;
//!     model.make_explicit()?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Error type for every daesort operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DaeError {
    /// Equation and variable counts disagree before a pass that needs a square system.
    #[error("{pass}: {equations} equations but {variables} variables")]
    DimensionMismatch {
        pass: &'static str,
        equations: usize,
        variables: usize,
    },

    /// The decomposition found an over- or under-determined part.
    #[error(
        "structurally singular system: {underdetermined} variables in the underdetermined part, {overdetermined} equations in the overdetermined part (first offending equation {equation:?}, variable {variable:?})"
    )]
    StructuralSingularity {
        underdetermined: usize,
        overdetermined: usize,
        equation: Option<usize>,
        variable: Option<usize>,
    },

    /// A block cannot be solved explicitly for its target variables.
    #[error("cannot find an explicit expression for block {block} (equations {first_equation}..{end_equation}), variable(s) {variables:?}")]
    UnsolvableBlock {
        block: usize,
        first_equation: usize,
        end_equation: usize,
        variables: Vec<String>,
    },

    /// A dependent definition still references a dependent variable after elimination.
    #[error("dependent definition {index} ({variable}) still depends on a dependent variable")]
    ResidualDependency { index: usize, variable: String },

    /// A variable category name is not recognized by the registry.
    #[error("unknown variable category '{0}'")]
    UnknownCategory(String),

    /// Differential/algebraic split produced mismatched equation and state counts.
    #[error("inconsistent differential split: {equations} differential equations but {states} differential states")]
    InconsistentSplit { equations: usize, states: usize },

    #[error("variable \"{0}\" has already been added")]
    DuplicateVariable(String),

    #[error("no such variable: \"{0}\"")]
    UnknownVariable(String),

    /// Row or column permutation is not a permutation of `0..len`.
    #[error("invalid {kind} permutation of length {len} for {expected} entries")]
    InvalidPermutation {
        kind: &'static str,
        len: usize,
        expected: usize,
    },

    /// An expression was used where a symbol was required.
    #[error("expression node {0} is not a symbol")]
    NotSymbolic(usize),

    /// Numeric evaluation reached a symbol without a bound value.
    #[error("symbol '{0}' has no value")]
    UnboundSymbol(String),

    /// Two sequences that must have equal length do not.
    #[error("{context}: length {left} does not match length {right}")]
    LengthMismatch {
        context: &'static str,
        left: usize,
        right: usize,
    },
}

impl DaeError {
    /// True for the error kind that `eliminate_algebraic` recovers from.
    pub fn is_unsolvable_block(&self) -> bool {
        matches!(self, DaeError::UnsolvableBlock { .. })
    }
}

/// Convenience type alias for Results using DaeError.
pub type DaeResult<T> = Result<T, DaeError>;
