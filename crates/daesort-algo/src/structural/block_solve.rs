//! Closed-form solution of blocks that are linear in their targets.
//!
//! With `f_b(x_b) = J_b x_b + f_res`, where `f_res = f_b(x_b := 0)`, the block
//! solution is `x_b = -J_b^-1 f_res`. Small blocks use the cofactor inverse,
//! larger ones the Gram-Schmidt QR solve.

use daesort_core::{DaeError, DaeResult, ExprGraph, ExprMatrix, NodeId};
use serde::{Deserialize, Serialize};

/// Largest block solved through the explicit inverse by default.
pub const DEFAULT_INVERSE_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSolver {
    pub inverse_threshold: usize,
}

impl Default for BlockSolver {
    fn default() -> Self {
        Self {
            inverse_threshold: DEFAULT_INVERSE_THRESHOLD,
        }
    }
}

impl BlockSolver {
    pub fn new(inverse_threshold: usize) -> Self {
        Self { inverse_threshold }
    }

    /// Solve `equations == 0` for `targets`, given the block Jacobian.
    ///
    /// Returns `Ok(None)` when the Jacobian is symbolically singular. The caller
    /// is responsible for checking that the block is linear in `targets`.
    pub fn solve(
        &self,
        graph: &mut ExprGraph,
        equations: &[NodeId],
        targets: &[NodeId],
        jacobian: &ExprMatrix,
    ) -> DaeResult<Option<Vec<NodeId>>> {
        let n = targets.len();
        if equations.len() != n || jacobian.nrows() != n || jacobian.ncols() != n {
            return Err(DaeError::LengthMismatch {
                context: "block solve",
                left: equations.len(),
                right: n,
            });
        }
        let zeros = vec![graph.zero(); n];
        let residual = graph.substitute(equations, targets, &zeros)?;
        let rhs: Vec<NodeId> = residual.iter().map(|&r| graph.neg(r)).collect();
        if n <= self.inverse_threshold {
            Ok(jacobian
                .inverse(graph)
                .map(|inv| inv.mul_vec(graph, &rhs)))
        } else {
            Ok(jacobian.solve_qr(graph, &rhs))
        }
    }
}
