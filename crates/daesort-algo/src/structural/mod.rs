//! # Structural analysis of equation systems
//!
//! Everything here works on dependency structure alone, never on numeric values.
//!
//! ## Module Organization
//!
//! - [`dependency`]: bit-vector dependency propagation producing sparse patterns
//! - [`matching`]: maximum bipartite matching (Hopcroft-Karp)
//! - [`dmperm`]: Dulmage-Mendelsohn decomposition behind the [`BlockOracle`] trait
//! - [`blt`]: block-lower-triangular orderings of square systems
//! - [`classify`]: explicit/implicit block test and the differential split
//! - [`block_solve`]: closed-form solution of blocks linear in their targets
//! - [`eliminate`]: dependent-variable elimination
//!
//! ## Usage
//!
//! ```ignore
//! use daesort_algo::structural::{BlockDecomposer, DependencyAnalyzer};
//!
//! let mut analyzer = DependencyAnalyzer::new(&model.graph, &equations, &unknowns)?;
//! let pattern = analyzer.pattern();
//! let blt = BlockDecomposer::new().decompose("sort_alg", &pattern)?;
//! for b in 0..blt.num_blocks() {
//!     println!("block {}: rows {:?}", b, blt.block_rows(b));
//! }
//! ```

pub mod block_solve;
pub mod blt;
pub mod classify;
pub mod dependency;
pub mod dmperm;
pub mod eliminate;
pub mod matching;

// Re-export main types
pub use block_solve::BlockSolver;
pub use blt::{BlockDecomposer, BltOrdering};
pub use classify::{DifferentialSplit, EquationClassifier};
pub use dependency::{DependencyAnalyzer, DependencyPattern};
pub use dmperm::{BlockOracle, Decomposition, DulmageMendelsohn};
pub use eliminate::DependentEliminator;
pub use matching::Matching;
