//! Structural dependency patterns.
//!
//! [`DependencyAnalyzer`] answers "which equations does variable j reach" and
//! "which variables reach equation i" by sweeping bit markers over the shared
//! expression graph, 64 probes per sweep. The full pattern is stored as a
//! [`DependencyPattern`] in CSR form.
//!
//! The result is conservative: a term that cancels algebraically still counts
//! as a dependency.

use daesort_core::expr::sparsity::{Bits, BITS_PER_SWEEP};
use daesort_core::{check_permutation, DaeResult, ExprGraph, NodeId, SparsityPropagator};
use serde::{Deserialize, Serialize};
use sprs::{CsMat, TriMat};
use tracing::debug;

/// Boolean relation "equation i depends on variable j" in CSR layout.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyPattern {
    matrix: CsMat<u8>,
}

impl DependencyPattern {
    /// Build from the column indices of each row.
    pub fn from_rows(ncols: usize, rows: &[Vec<usize>]) -> Self {
        let mut triplets = TriMat::new((rows.len(), ncols));
        for (i, cols) in rows.iter().enumerate() {
            let mut cols = cols.clone();
            cols.sort_unstable();
            cols.dedup();
            for j in cols {
                triplets.add_triplet(i, j, 1u8);
            }
        }
        Self {
            matrix: triplets.to_csr(),
        }
    }

    /// (equations, variables)
    pub fn shape(&self) -> (usize, usize) {
        self.matrix.shape()
    }

    pub fn nrows(&self) -> usize {
        self.matrix.rows()
    }

    pub fn ncols(&self) -> usize {
        self.matrix.cols()
    }

    pub fn is_square(&self) -> bool {
        self.nrows() == self.ncols()
    }

    /// Number of structural non-zeros.
    pub fn nnz(&self) -> usize {
        self.matrix.nnz()
    }

    pub fn depends(&self, equation: usize, variable: usize) -> bool {
        self.matrix.get(equation, variable).is_some()
    }

    /// Variables equation `i` depends on, ascending.
    pub fn row(&self, i: usize) -> &[usize] {
        self.matrix
            .outer_view(i)
            .map(|v| v.into_raw_storage().0)
            .unwrap_or(&[])
    }

    /// Row lists, the adjacency form used by the graph algorithms.
    pub fn to_rows(&self) -> Vec<Vec<usize>> {
        (0..self.nrows()).map(|i| self.row(i).to_vec()).collect()
    }

    /// Pattern of the reordered system: new row `i` is old row `row_perm[i]`,
    /// new column `j` is old column `col_perm[j]`.
    pub fn permuted(&self, row_perm: &[usize], col_perm: &[usize]) -> DaeResult<Self> {
        check_permutation("row", row_perm, self.nrows())?;
        check_permutation("column", col_perm, self.ncols())?;
        let col_inv = daesort_core::invert_permutation(col_perm);
        let rows: Vec<Vec<usize>> = row_perm
            .iter()
            .map(|&old| self.row(old).iter().map(|&j| col_inv[j]).collect())
            .collect();
        Ok(Self::from_rows(self.ncols(), &rows))
    }
}

/// Sweep direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepMode {
    /// Seed variables, read equations.
    Forward,
    /// Seed equations, read variables.
    Reverse,
}

/// Dependency queries between a set of equations and a set of variable symbols.
pub struct DependencyAnalyzer<'g> {
    equations: Vec<NodeId>,
    variables: Vec<NodeId>,
    propagator: SparsityPropagator<'g>,
}

impl<'g> DependencyAnalyzer<'g> {
    pub fn new(graph: &'g ExprGraph, equations: &[NodeId], variables: &[NodeId]) -> DaeResult<Self> {
        graph.require_symbols(variables)?;
        Ok(Self {
            equations: equations.to_vec(),
            variables: variables.to_vec(),
            propagator: SparsityPropagator::new(graph, equations, variables),
        })
    }

    pub fn num_equations(&self) -> usize {
        self.equations.len()
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// Forward: which equations are reached by any of the seeded variables.
    pub fn affected_equations(&mut self, seeds: &[usize]) -> Vec<bool> {
        self.propagator.reset();
        for &j in seeds {
            self.propagator.seed(self.variables[j], 1);
        }
        self.propagator.propagate_forward();
        self.equations
            .iter()
            .map(|&e| self.propagator.marker(e) != 0)
            .collect()
    }

    /// Reverse: which variables reach any of the seeded equations.
    pub fn influencing_variables(&mut self, seeds: &[usize]) -> Vec<bool> {
        self.propagator.reset();
        for &i in seeds {
            self.propagator.seed(self.equations[i], 1);
        }
        self.propagator.propagate_reverse();
        self.variables
            .iter()
            .map(|&v| self.propagator.marker(v) != 0)
            .collect()
    }

    /// The direction needing fewer sweeps.
    pub fn preferred_mode(&self) -> SweepMode {
        if self.variables.len() <= self.equations.len() {
            SweepMode::Forward
        } else {
            SweepMode::Reverse
        }
    }

    /// Full dependency pattern, computed in the cheaper direction.
    pub fn pattern(&mut self) -> DependencyPattern {
        self.pattern_with(self.preferred_mode())
    }

    pub fn pattern_with(&mut self, mode: SweepMode) -> DependencyPattern {
        let m = self.equations.len();
        let n = self.variables.len();
        let mut rows: Vec<Vec<usize>> = vec![Vec::new(); m];
        let (probes, sweeps) = match mode {
            SweepMode::Forward => (n, n.div_ceil(BITS_PER_SWEEP)),
            SweepMode::Reverse => (m, m.div_ceil(BITS_PER_SWEEP)),
        };
        for sweep in 0..sweeps {
            let base = sweep * BITS_PER_SWEEP;
            let end = (base + BITS_PER_SWEEP).min(probes);
            self.propagator.reset();
            match mode {
                SweepMode::Forward => {
                    for j in base..end {
                        self.propagator.seed(self.variables[j], bit(j - base));
                    }
                    self.propagator.propagate_forward();
                    for (i, &e) in self.equations.iter().enumerate() {
                        let marker = self.propagator.marker(e);
                        rows[i].extend(set_bits(marker).map(|b| base + b));
                    }
                }
                SweepMode::Reverse => {
                    for i in base..end {
                        self.propagator.seed(self.equations[i], bit(i - base));
                    }
                    self.propagator.propagate_reverse();
                    for (j, &v) in self.variables.iter().enumerate() {
                        let marker = self.propagator.marker(v);
                        for b in set_bits(marker) {
                            rows[base + b].push(j);
                        }
                    }
                }
            }
        }
        let pattern = DependencyPattern::from_rows(n, &rows);
        debug!(
            "Dependency pattern {}x{} with {} non-zeros ({:?}, {} sweeps)",
            m,
            n,
            pattern.nnz(),
            mode,
            sweeps
        );
        pattern
    }
}

#[inline]
fn bit(k: usize) -> Bits {
    1 << k
}

fn set_bits(mut marker: Bits) -> impl Iterator<Item = usize> {
    std::iter::from_fn(move || {
        if marker == 0 {
            return None;
        }
        let b = marker.trailing_zeros() as usize;
        marker &= marker - 1;
        Some(b)
    })
}
