//! Explicit-versus-implicit classification.

use daesort_core::{DaeError, DaeResult, ExprGraph, ExprMatrix, NodeId};
use serde::{Deserialize, Serialize};

use super::dependency::DependencyAnalyzer;

/// Result of splitting a DAE into differential and algebraic parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifferentialSplit {
    /// `true` for equations reached by some derivative.
    pub differential_equations: Vec<bool>,
    /// `true` for states whose derivative reaches some equation.
    pub differential_states: Vec<bool>,
}

impl DifferentialSplit {
    pub fn num_differential_equations(&self) -> usize {
        self.differential_equations.iter().filter(|&&d| d).count()
    }

    pub fn num_differential_states(&self) -> usize {
        self.differential_states.iter().filter(|&&d| d).count()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EquationClassifier;

impl EquationClassifier {
    /// A block is explicitly solvable iff its Jacobian block does not depend
    /// on the block's own targets, i.e. the targets enter linearly.
    pub fn is_explicit_block(graph: &ExprGraph, block_jacobian: &ExprMatrix, targets: &[NodeId]) -> bool {
        !graph.depends_on(block_jacobian.entries(), targets)
    }

    /// Forward from all derivatives finds the differential equations; reverse
    /// from all equations finds the derivatives that matter.
    pub fn split_differential(
        graph: &ExprGraph,
        equations: &[NodeId],
        derivatives: &[NodeId],
    ) -> DaeResult<DifferentialSplit> {
        let mut analyzer = DependencyAnalyzer::new(graph, equations, derivatives)?;
        let all_derivatives: Vec<usize> = (0..derivatives.len()).collect();
        let all_equations: Vec<usize> = (0..equations.len()).collect();
        let split = DifferentialSplit {
            differential_equations: analyzer.affected_equations(&all_derivatives),
            differential_states: analyzer.influencing_variables(&all_equations),
        };
        let equations = split.num_differential_equations();
        let states = split.num_differential_states();
        if equations != states {
            return Err(DaeError::InconsistentSplit { equations, states });
        }
        Ok(split)
    }
}
