//! Dense matrices of symbolic expressions.
//!
//! Only what block causalization needs: slicing, matrix-vector products, a
//! cofactor inverse for small blocks and a Gram-Schmidt QR solve for larger
//! ones. Singularity is detected symbolically: a determinant or a squared
//! column norm that simplifies to the constant `0` makes the solve return `None`.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use super::{ExprGraph, NodeId};

/// Row-major dense matrix of expression handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExprMatrix {
    nrows: usize,
    ncols: usize,
    data: Vec<NodeId>,
}

impl ExprMatrix {
    pub fn filled(nrows: usize, ncols: usize, value: NodeId) -> Self {
        Self {
            nrows,
            ncols,
            data: vec![value; nrows * ncols],
        }
    }

    /// Build from rows of equal length.
    pub fn from_rows(rows: &[Vec<NodeId>]) -> Self {
        let nrows = rows.len();
        let ncols = rows.first().map_or(0, Vec::len);
        debug_assert!(rows.iter().all(|r| r.len() == ncols));
        Self {
            nrows,
            ncols,
            data: rows.concat(),
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn is_square(&self) -> bool {
        self.nrows == self.ncols
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> NodeId {
        self.data[i * self.ncols + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: NodeId) {
        self.data[i * self.ncols + j] = value;
    }

    /// All entries, row-major.
    pub fn entries(&self) -> &[NodeId] {
        &self.data
    }

    pub fn row(&self, i: usize) -> &[NodeId] {
        &self.data[i * self.ncols..(i + 1) * self.ncols]
    }

    /// Copy of the sub-matrix `rows x cols`.
    pub fn block(&self, rows: Range<usize>, cols: Range<usize>) -> ExprMatrix {
        let ncols = cols.len();
        let nrows = rows.len();
        let mut data = Vec::with_capacity(nrows * ncols);
        for i in rows {
            data.extend_from_slice(&self.row(i)[cols.clone()]);
        }
        ExprMatrix { nrows, ncols, data }
    }

    fn minor(&self, skip_row: usize, skip_col: usize) -> ExprMatrix {
        let mut data = Vec::with_capacity((self.nrows - 1) * (self.ncols - 1));
        for i in (0..self.nrows).filter(|&i| i != skip_row) {
            for j in (0..self.ncols).filter(|&j| j != skip_col) {
                data.push(self.get(i, j));
            }
        }
        ExprMatrix {
            nrows: self.nrows - 1,
            ncols: self.ncols - 1,
            data,
        }
    }

    /// `self * v`.
    pub fn mul_vec(&self, graph: &mut ExprGraph, v: &[NodeId]) -> Vec<NodeId> {
        debug_assert_eq!(v.len(), self.ncols);
        (0..self.nrows)
            .map(|i| {
                let terms: Vec<NodeId> = self
                    .row(i)
                    .iter()
                    .zip(v)
                    .map(|(&a, &b)| graph.mul(a, b))
                    .collect();
                graph.sum(&terms)
            })
            .collect()
    }

    /// Determinant by cofactor expansion along the first row.
    ///
    /// Exponential in the dimension; intended for the small blocks routed to
    /// [`ExprMatrix::inverse`].
    pub fn determinant(&self, graph: &mut ExprGraph) -> NodeId {
        debug_assert!(self.is_square());
        match self.nrows {
            0 => graph.one(),
            1 => self.get(0, 0),
            2 => {
                let ad = graph.mul(self.get(0, 0), self.get(1, 1));
                let bc = graph.mul(self.get(0, 1), self.get(1, 0));
                graph.sub(ad, bc)
            }
            n => {
                let mut det = graph.zero();
                for j in 0..n {
                    let a = self.get(0, j);
                    if graph.is_zero(a) {
                        continue;
                    }
                    let sub = self.minor(0, j).determinant(graph);
                    let term = graph.mul(a, sub);
                    det = if j % 2 == 0 {
                        graph.add(det, term)
                    } else {
                        graph.sub(det, term)
                    };
                }
                det
            }
        }
    }

    /// Closed-form inverse `adj(A) / det(A)`; `None` if `det(A)` folds to zero.
    pub fn inverse(&self, graph: &mut ExprGraph) -> Option<ExprMatrix> {
        debug_assert!(self.is_square());
        let n = self.nrows;
        let det = self.determinant(graph);
        if graph.is_zero(det) {
            return None;
        }
        let zero = graph.zero();
        let mut inv = ExprMatrix::filled(n, n, zero);
        if n == 1 {
            let one = graph.one();
            inv.set(0, 0, graph.div(one, det));
            return Some(inv);
        }
        for i in 0..n {
            for j in 0..n {
                let cof = self.minor(i, j).determinant(graph);
                let cof = if (i + j) % 2 == 0 { cof } else { graph.neg(cof) };
                // adjugate is the transposed cofactor matrix
                inv.set(j, i, graph.div(cof, det));
            }
        }
        Some(inv)
    }

    /// Solve `self * x = b` with an orthogonal-triangular factorization.
    ///
    /// Modified Gram-Schmidt without normalization: `A = V U` with mutually
    /// orthogonal columns in `V` and unit upper-triangular `U`, so only rational
    /// operations appear and exact constants stay exact. Then
    /// `U x = D^-1 V^T b` with `D = diag(v_k . v_k)`, solved by back substitution.
    ///
    /// Returns `None` when some `v_k . v_k` folds to zero.
    pub fn solve_qr(&self, graph: &mut ExprGraph, b: &[NodeId]) -> Option<Vec<NodeId>> {
        debug_assert!(self.is_square());
        debug_assert_eq!(b.len(), self.nrows);
        let n = self.nrows;
        let zero = graph.zero();
        let mut v: Vec<Vec<NodeId>> = Vec::with_capacity(n);
        let mut norms: Vec<NodeId> = Vec::with_capacity(n);
        let mut u = ExprMatrix::filled(n, n, zero);

        for j in 0..n {
            let mut w: Vec<NodeId> = (0..n).map(|i| self.get(i, j)).collect();
            for k in 0..j {
                let proj = dot(graph, &v[k], &w);
                if graph.is_zero(proj) {
                    continue;
                }
                let c = graph.div(proj, norms[k]);
                u.set(k, j, c);
                for (wi, &vi) in w.iter_mut().zip(&v[k]) {
                    let t = graph.mul(c, vi);
                    *wi = graph.sub(*wi, t);
                }
            }
            let norm = dot(graph, &w, &w);
            if graph.is_zero(norm) {
                return None;
            }
            v.push(w);
            norms.push(norm);
        }

        let mut x: Vec<NodeId> = v
            .iter()
            .zip(&norms)
            .map(|(vk, &nk)| {
                let p = dot(graph, vk, b);
                graph.div(p, nk)
            })
            .collect();
        for i in (0..n).rev() {
            for k in i + 1..n {
                let t = graph.mul(u.get(i, k), x[k]);
                x[i] = graph.sub(x[i], t);
            }
        }
        Some(x)
    }
}

fn dot(graph: &mut ExprGraph, a: &[NodeId], b: &[NodeId]) -> NodeId {
    let terms: Vec<NodeId> = a.iter().zip(b).map(|(&x, &y)| graph.mul(x, y)).collect();
    graph.sum(&terms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn constant_matrix(g: &mut ExprGraph, rows: &[&[f64]]) -> ExprMatrix {
        let rows: Vec<Vec<NodeId>> = rows
            .iter()
            .map(|r| r.iter().map(|&v| g.constant(v)).collect())
            .collect();
        ExprMatrix::from_rows(&rows)
    }

    #[test]
    fn test_identity_inverse_is_identity() {
        let mut g = ExprGraph::new();
        let a = constant_matrix(&mut g, &[&[1.0, 0.0], &[0.0, 1.0]]);
        let inv = a.inverse(&mut g).unwrap();
        assert_eq!(inv, a);
    }

    #[test]
    fn test_singular_inverse_is_none() {
        let mut g = ExprGraph::new();
        let a = constant_matrix(&mut g, &[&[1.0, -1.0], &[-1.0, 1.0]]);
        assert!(a.inverse(&mut g).is_none());
        let b = vec![g.one(), g.one()];
        assert!(a.solve_qr(&mut g, &b).is_none());
    }

    #[test]
    fn test_inverse_and_qr_agree_numerically() {
        let mut g = ExprGraph::new();
        let p = g.symbol("p");
        let two = g.constant(2.0);
        let one = g.one();
        let zero = g.zero();
        let a = ExprMatrix::from_rows(&[
            vec![two, p, zero],
            vec![one, two, one],
            vec![zero, one, two],
        ]);
        let b = vec![one, p, two];
        let inv = a.inverse(&mut g).unwrap();
        let x_inv = inv.mul_vec(&mut g, &b);
        let x_qr = a.solve_qr(&mut g, &b).unwrap();
        let values = HashMap::from([(p, 0.5)]);
        let lhs = g.evaluate(&x_inv, &values).unwrap();
        let rhs = g.evaluate(&x_qr, &values).unwrap();
        for (l, r) in lhs.iter().zip(&rhs) {
            assert!((l - r).abs() < 1e-10, "{l} vs {r}");
        }
        let residual = a.mul_vec(&mut g, &x_inv);
        let res = g.evaluate(&residual, &values).unwrap();
        let want = g.evaluate(&b, &values).unwrap();
        for (l, r) in res.iter().zip(&want) {
            assert!((l - r).abs() < 1e-10);
        }
    }

    #[test]
    fn test_block_slicing() {
        let mut g = ExprGraph::new();
        let a = constant_matrix(&mut g, &[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
        let blk = a.block(0..2, 1..3);
        assert_eq!(blk.nrows(), 2);
        assert_eq!(blk.ncols(), 2);
        assert_eq!(g.as_constant(blk.get(1, 0)), Some(5.0));
    }
}
