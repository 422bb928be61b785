//! # daesort-core: Symbolic DAE Model Core
//!
//! Data structures shared by the structural analysis passes:
//!
//! - [`expr::ExprGraph`] - arena of hash-consed scalar expressions with
//!   differentiation, substitution and sparsity propagation
//! - [`Variable`] and [`VariableRegistry`] - named unknowns with category,
//!   causality and numeric attributes
//! - [`EquationSystem`] - index-aligned equation/unknown pairs whose only
//!   reordering primitive moves both sides together
//! - [`OcpModel`] - the optimal-control model owning all of the above
//!
//! ## Quick Start
//!
//! ```rust
//! use daesort_core::*;
//!
//! let mut model = OcpModel::new();
//! let x1 = model.declare("x1", Category::State).unwrap();
//! let x2 = model.declare("x2", Category::State).unwrap();
//!
//! // der(x1) - x2 = 0, der(x2) + x1 = 0
//! let (x1v, x1d) = (model.registry.get(x1).var, model.registry.get(x1).der);
//! let (x2v, x2d) = (model.registry.get(x2).var, model.registry.get(x2).der);
//! let e1 = model.graph.sub(x1d, x2v);
//! let e2 = model.graph.add(x2d, x1v);
//! model.push_implicit_equation(e1);
//! model.push_implicit_equation(e2);
//!
//! assert!(model.implicit.is_square());
//! ```

pub mod error;
pub mod expr;
pub mod model;
pub mod system;
pub mod variable;

pub use error::{DaeError, DaeResult};
pub use expr::{ExprGraph, ExprMatrix, NodeId, SparsityPropagator};
pub use model::{OcpModel, SubstitutionScope};
pub use system::{check_permutation, invert_permutation, Constraint, EquationSystem};
pub use variable::{Category, Causality, VarId, Variable, VariableRegistry};
