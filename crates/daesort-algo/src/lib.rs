//! # daesort-algo: structural passes over DAE models
//!
//! Sorting, causalization and elimination passes operating on
//! [`daesort_core::OcpModel`].
//!
//! ## Modules
//!
//! - [`structural`]: dependency patterns, matching, Dulmage-Mendelsohn
//!   decomposition, BLT ordering, block classification and solving
//! - [`passes`]: the model-level passes ([`Causalizer`], [`StructuralPasses`])
//! - [`scaling`]: numeric row scaling of the explicit ODE
//!
//! ## Example
//!
//! ```rust
//! use daesort_algo::StructuralPasses;
//! use daesort_core::{Category, OcpModel};
//!
//! let mut model = OcpModel::new();
//! let x1 = model.declare("x1", Category::State).unwrap();
//! let x2 = model.declare("x2", Category::State).unwrap();
//! let (x1v, x1d) = (model.registry.get(x1).var, model.registry.get(x1).der);
//! let (x2v, x2d) = (model.registry.get(x2).var, model.registry.get(x2).der);
//! let e1 = model.graph.sub(x1d, x2v);
//! let e2 = model.graph.add(x2d, x1v);
//! model.push_implicit_equation(e1);
//! model.push_implicit_equation(e2);
//!
//! model.make_explicit().unwrap();
//! assert!(model.implicit.is_empty());
//! assert_eq!(model.explicit.num_equations(), 2);
//! ```

pub mod passes;
pub mod scaling;
pub mod structural;

pub use passes::{CausalizationReport, CausalizeConfig, Causalizer, StructuralPasses};
pub use scaling::{row_scale_factors, scale_equations};
pub use structural::{
    BlockDecomposer, BlockOracle, BlockSolver, BltOrdering, Decomposition, DependencyAnalyzer,
    DependencyPattern, DependentEliminator, DifferentialSplit, DulmageMendelsohn,
    EquationClassifier, Matching,
};
