//! Block-lower-triangular orderings of square systems.
//!
//! [`BlockDecomposer`] is the strict front end of a [`BlockOracle`]: it only
//! accepts square patterns and rejects any result with an over- or
//! underdetermined part, so every [`BltOrdering`] it hands out consists of
//! square blocks only.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

use daesort_core::{invert_permutation, DaeError, DaeResult};

use super::dependency::DependencyPattern;
use super::dmperm::{BlockOracle, Decomposition, DulmageMendelsohn};

/// A block-lower-triangular reordering of a structurally non-singular system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BltOrdering {
    row_perm: Vec<usize>,
    col_perm: Vec<usize>,
    row_blocks: Vec<usize>,
    col_blocks: Vec<usize>,
}

impl BltOrdering {
    /// Ordering of an empty system.
    pub fn empty() -> Self {
        Self {
            row_perm: Vec::new(),
            col_perm: Vec::new(),
            row_blocks: vec![0],
            col_blocks: vec![0],
        }
    }

    pub fn row_perm(&self) -> &[usize] {
        &self.row_perm
    }

    pub fn col_perm(&self) -> &[usize] {
        &self.col_perm
    }

    pub fn row_blocks(&self) -> &[usize] {
        &self.row_blocks
    }

    pub fn col_blocks(&self) -> &[usize] {
        &self.col_blocks
    }

    /// Original row index to permuted position.
    pub fn inverse_row_perm(&self) -> Vec<usize> {
        invert_permutation(&self.row_perm)
    }

    pub fn num_blocks(&self) -> usize {
        self.row_blocks.len().saturating_sub(1)
    }

    pub fn len(&self) -> usize {
        self.row_perm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_perm.is_empty()
    }

    /// Permuted rows of block `b`.
    pub fn block_rows(&self, b: usize) -> Range<usize> {
        self.row_blocks[b]..self.row_blocks[b + 1]
    }

    /// Permuted columns of block `b`.
    pub fn block_cols(&self, b: usize) -> Range<usize> {
        self.col_blocks[b]..self.col_blocks[b + 1]
    }

    /// Block index of each permuted row.
    pub fn block_of_rows(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.len());
        for b in 0..self.num_blocks() {
            out.extend(std::iter::repeat(b).take(self.block_rows(b).len()));
        }
        out
    }

    /// Block index of each permuted column.
    pub fn block_of_cols(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.col_perm.len());
        for b in 0..self.num_blocks() {
            out.extend(std::iter::repeat(b).take(self.block_cols(b).len()));
        }
        out
    }

    /// Size of the largest block.
    pub fn max_block_size(&self) -> usize {
        (0..self.num_blocks())
            .map(|b| self.block_rows(b).len())
            .max()
            .unwrap_or(0)
    }

    /// True if in `permuted` (a pattern already reordered by this ordering)
    /// every row only uses columns of its own or an earlier block.
    pub fn is_block_lower_triangular(&self, permuted: &DependencyPattern) -> bool {
        let row_block = self.block_of_rows();
        let col_block = self.block_of_cols();
        (0..permuted.nrows()).all(|i| permuted.row(i).iter().all(|&j| col_block[j] <= row_block[i]))
    }
}

/// Square pattern in, block-lower-triangular ordering out.
#[derive(Debug, Clone, Default)]
pub struct BlockDecomposer<O: BlockOracle = DulmageMendelsohn> {
    oracle: O,
}

impl BlockDecomposer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<O: BlockOracle> BlockDecomposer<O> {
    pub fn with_oracle(oracle: O) -> Self {
        Self { oracle }
    }

    /// Unchecked decomposition: coarse parts are returned as they are.
    pub fn decompose_raw(&self, pattern: &DependencyPattern) -> Decomposition {
        self.oracle.decompose(pattern)
    }

    /// Decompose a square pattern on behalf of `pass`.
    ///
    /// Fails with [`DaeError::DimensionMismatch`] for a non-square pattern and
    /// with [`DaeError::StructuralSingularity`] if the decomposition leaves an
    /// under- or overdetermined part.
    pub fn decompose(&self, pass: &'static str, pattern: &DependencyPattern) -> DaeResult<BltOrdering> {
        let (m, n) = pattern.shape();
        if m != n {
            return Err(DaeError::DimensionMismatch {
                pass,
                equations: m,
                variables: n,
            });
        }
        if m == 0 {
            return Ok(BltOrdering::empty());
        }
        let d = self.oracle.decompose(pattern);
        if !d.is_structurally_nonsingular() {
            let cc = d.coarse_col_blocks;
            let rr = d.coarse_row_blocks;
            return Err(DaeError::StructuralSingularity {
                underdetermined: d.underdetermined_cols(),
                overdetermined: d.overdetermined_rows(),
                equation: d.row_perm[rr[2]..rr[4]].iter().min().copied(),
                variable: d.col_perm[cc[0]..cc[2]].iter().min().copied(),
            });
        }
        debug!(
            "{}: {} blocks, largest block {}",
            pass,
            d.num_blocks(),
            (0..d.num_blocks())
                .map(|b| d.row_blocks[b + 1] - d.row_blocks[b])
                .max()
                .unwrap_or(0)
        );
        Ok(BltOrdering {
            row_perm: d.row_perm,
            col_perm: d.col_perm,
            row_blocks: d.row_blocks,
            col_blocks: d.col_blocks,
        })
    }
}
