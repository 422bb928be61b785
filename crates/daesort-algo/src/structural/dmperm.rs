//! Dulmage-Mendelsohn decomposition of a dependency pattern.
//!
//! The coarse decomposition splits rows and columns into an underdetermined
//! part, a square part and an overdetermined part:
//!
//! ```text
//!          C0   C1   C2   C3
//!   R1  [  x    x    x    x  ]   underdetermined: (R1, C0 ∪ C1)
//!   R2  [            x    x  ]   square:          (R2, C2)
//!   R3  [                 x  ]   overdetermined:  (R3 ∪ R0, C3)
//!   R0  [                 x  ]
//! ```
//!
//! `C0` are the unmatched columns and `R0` the unmatched rows of a maximum
//! matching. The square part is further split into its strongly connected
//! blocks, ordered so that every block only uses columns of itself and of
//! earlier blocks.
//!
//! Ordering is deterministic: rows inside a block keep their original order,
//! and among blocks whose predecessors are all placed, the one holding the
//! smallest original row goes first.

use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, VecDeque};
use tracing::debug;

use super::dependency::DependencyPattern;
use super::matching::Matching;

/// Row/column permutations with fine and coarse block boundaries.
///
/// New row `i` is original row `row_perm[i]`. Fine block `b` spans rows
/// `row_blocks[b]..row_blocks[b + 1]` and columns
/// `col_blocks[b]..col_blocks[b + 1]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decomposition {
    pub row_perm: Vec<usize>,
    pub col_perm: Vec<usize>,
    pub row_blocks: Vec<usize>,
    pub col_blocks: Vec<usize>,
    /// Bounds of `R1 | R2 | R3 | R0` in the permuted row order.
    pub coarse_row_blocks: [usize; 5],
    /// Bounds of `C0 | C1 | C2 | C3` in the permuted column order.
    pub coarse_col_blocks: [usize; 5],
}

impl Decomposition {
    pub fn num_blocks(&self) -> usize {
        self.row_blocks.len().saturating_sub(1)
    }

    /// Number of columns in the underdetermined part.
    pub fn underdetermined_cols(&self) -> usize {
        self.coarse_col_blocks[2]
    }

    /// Number of rows in the overdetermined part.
    pub fn overdetermined_rows(&self) -> usize {
        self.coarse_row_blocks[4] - self.coarse_row_blocks[2]
    }

    /// True when the whole pattern lies in the square part.
    pub fn is_structurally_nonsingular(&self) -> bool {
        self.underdetermined_cols() == 0 && self.overdetermined_rows() == 0
    }
}

/// Source of block-triangular decompositions.
pub trait BlockOracle {
    fn decompose(&self, pattern: &DependencyPattern) -> Decomposition;
}

/// Hopcroft-Karp matching, alternating-path coarse partition and Tarjan SCCs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DulmageMendelsohn;

impl BlockOracle for DulmageMendelsohn {
    fn decompose(&self, pattern: &DependencyPattern) -> Decomposition {
        let (m, n) = pattern.shape();
        let rows = pattern.to_rows();
        let mut cols: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, r) in rows.iter().enumerate() {
            for &j in r {
                cols[j].push(i);
            }
        }
        let matching = Matching::maximum(pattern);

        // Underdetermined: alternate column -> row -> matched column from free columns.
        let mut under_row = vec![false; m];
        let mut under_col = vec![false; n];
        let mut queue: VecDeque<usize> = matching.unmatched_cols().collect();
        for &j in &queue {
            under_col[j] = true;
        }
        while let Some(j) = queue.pop_front() {
            for &i in &cols[j] {
                if under_row[i] {
                    continue;
                }
                under_row[i] = true;
                if let Some(k) = matching.row_to_col[i] {
                    if !under_col[k] {
                        under_col[k] = true;
                        queue.push_back(k);
                    }
                }
            }
        }

        // Overdetermined: alternate row -> column -> matched row from free rows.
        let mut over_row = vec![false; m];
        let mut over_col = vec![false; n];
        let mut queue: VecDeque<usize> = matching.unmatched_rows().collect();
        for &i in &queue {
            over_row[i] = true;
        }
        while let Some(i) = queue.pop_front() {
            for &j in &rows[i] {
                if over_col[j] {
                    continue;
                }
                over_col[j] = true;
                if let Some(k) = matching.col_to_row[j] {
                    if !over_row[k] {
                        over_row[k] = true;
                        queue.push_back(k);
                    }
                }
            }
        }

        let r1: Vec<usize> = (0..m).filter(|&i| under_row[i]).collect();
        let r3: Vec<usize> = (0..m)
            .filter(|&i| over_row[i] && matching.row_to_col[i].is_some())
            .collect();
        let r0: Vec<usize> = matching.unmatched_rows().collect();
        let c0: Vec<usize> = matching.unmatched_cols().collect();
        let c1: Vec<usize> = (0..n)
            .filter(|&j| under_col[j] && matching.col_to_row[j].is_some())
            .collect();
        let c3: Vec<usize> = (0..n).filter(|&j| over_col[j]).collect();
        let square: Vec<usize> = (0..m)
            .filter(|&i| !under_row[i] && !over_row[i])
            .collect();

        let mut row_perm = Vec::with_capacity(m);
        let mut col_perm = Vec::with_capacity(n);
        let mut row_blocks = vec![0];
        let mut col_blocks = vec![0];

        if !r1.is_empty() || !c0.is_empty() || !c1.is_empty() {
            row_perm.extend(&r1);
            col_perm.extend(&c0);
            col_perm.extend(&c1);
            row_blocks.push(row_perm.len());
            col_blocks.push(col_perm.len());
        }
        let coarse_rows_1 = r1.len();
        let coarse_cols_1 = c0.len();
        let coarse_cols_2 = c0.len() + c1.len();

        for block in fine_blocks(&square, &rows, &matching) {
            for &i in &block {
                row_perm.push(i);
                if let Some(j) = matching.row_to_col[i] {
                    col_perm.push(j);
                }
            }
            row_blocks.push(row_perm.len());
            col_blocks.push(col_perm.len());
        }
        let coarse_rows_2 = row_perm.len();
        let coarse_cols_3 = col_perm.len();

        if !r3.is_empty() || !r0.is_empty() || !c3.is_empty() {
            row_perm.extend(&r3);
            row_perm.extend(&r0);
            col_perm.extend(&c3);
            row_blocks.push(row_perm.len());
            col_blocks.push(col_perm.len());
        }

        let decomposition = Decomposition {
            row_perm,
            col_perm,
            row_blocks,
            col_blocks,
            coarse_row_blocks: [0, coarse_rows_1, coarse_rows_2, coarse_rows_2 + r3.len(), m],
            coarse_col_blocks: [0, coarse_cols_1, coarse_cols_2, coarse_cols_3, n],
        };
        debug!(
            "Dulmage-Mendelsohn: {}x{} pattern, matching size {}, {} blocks",
            m,
            n,
            matching.size(),
            decomposition.num_blocks()
        );
        decomposition
    }
}

/// Strongly connected blocks of the square part in a deterministic topological order.
fn fine_blocks(square: &[usize], rows: &[Vec<usize>], matching: &Matching) -> Vec<Vec<usize>> {
    if square.is_empty() {
        return Vec::new();
    }
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(square.len(), 0);
    let mut node_of_row = vec![None; rows.len()];
    for &i in square {
        node_of_row[i] = Some(graph.add_node(i));
    }
    // Edge k -> i when row i uses the column matched to row k.
    for &i in square {
        let Some(target) = node_of_row[i] else { continue };
        for &j in &rows[i] {
            let Some(k) = matching.col_to_row[j] else { continue };
            if k == i {
                continue;
            }
            if let Some(source) = node_of_row[k] {
                graph.update_edge(source, target, ());
            }
        }
    }

    let mut sccs: Vec<Vec<usize>> = tarjan_scc(&graph)
        .into_iter()
        .map(|component| {
            let mut rows: Vec<usize> = component.iter().map(|&v| graph[v]).collect();
            rows.sort_unstable();
            rows
        })
        .collect();
    // Number components by their smallest row.
    sccs.sort_unstable_by_key(|block| block[0]);

    let mut block_of_row = vec![usize::MAX; rows.len()];
    for (b, block) in sccs.iter().enumerate() {
        for &i in block {
            block_of_row[i] = b;
        }
    }

    let nb = sccs.len();
    let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); nb];
    let mut indegree = vec![0usize; nb];
    for edge in graph.raw_edges() {
        let from = block_of_row[graph[edge.source()]];
        let to = block_of_row[graph[edge.target()]];
        if from != to && successors[from].insert(to) {
            indegree[to] += 1;
        }
    }

    // Kahn's algorithm, smallest leading row first.
    let mut ready: BinaryHeap<Reverse<(usize, usize)>> = (0..nb)
        .filter(|&b| indegree[b] == 0)
        .map(|b| Reverse((sccs[b][0], b)))
        .collect();
    let mut order = Vec::with_capacity(nb);
    while let Some(Reverse((_, b))) = ready.pop() {
        order.push(b);
        for &s in &successors[b] {
            indegree[s] -= 1;
            if indegree[s] == 0 {
                ready.push(Reverse((sccs[s][0], s)));
            }
        }
    }
    debug_assert_eq!(order.len(), nb);

    let mut slots: Vec<Option<Vec<usize>>> = sccs.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|b| slots[b].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decompose(ncols: usize, rows: &[Vec<usize>]) -> Decomposition {
        DulmageMendelsohn.decompose(&DependencyPattern::from_rows(ncols, rows))
    }

    #[test]
    fn test_lower_triangular_is_unchanged() {
        let d = decompose(3, &[vec![0], vec![0, 1], vec![1, 2]]);
        assert_eq!(d.row_perm, vec![0, 1, 2]);
        assert_eq!(d.col_perm, vec![0, 1, 2]);
        assert_eq!(d.row_blocks, vec![0, 1, 2, 3]);
        assert!(d.is_structurally_nonsingular());
    }

    #[test]
    fn test_upper_triangular_is_reversed() {
        let d = decompose(3, &[vec![0, 1, 2], vec![1, 2], vec![2]]);
        assert_eq!(d.row_perm, vec![2, 1, 0]);
        assert_eq!(d.col_perm, vec![2, 1, 0]);
        assert_eq!(d.num_blocks(), 3);
    }

    #[test]
    fn test_cycle_forms_one_block() {
        // rows 0 and 2 couple through columns 0 and 2; row 1 only needs column 1
        let d = decompose(3, &[vec![0, 2], vec![1], vec![0, 2]]);
        assert_eq!(d.num_blocks(), 2);
        assert_eq!(d.row_perm, vec![0, 2, 1]);
        assert_eq!(d.row_blocks, vec![0, 2, 3]);
        assert_eq!(d.col_blocks, vec![0, 2, 3]);
    }

    #[test]
    fn test_singular_coarse_partition() {
        // two equations in x0 only, x1 unused
        let d = decompose(2, &[vec![0], vec![0]]);
        assert!(!d.is_structurally_nonsingular());
        assert_eq!(d.underdetermined_cols(), 1);
        assert_eq!(d.overdetermined_rows(), 2);
        assert_eq!(d.coarse_col_blocks, [0, 1, 1, 1, 2]);
        assert_eq!(d.coarse_row_blocks, [0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_empty_pattern() {
        let d = decompose(0, &[]);
        assert_eq!(d.num_blocks(), 0);
        assert!(d.is_structurally_nonsingular());
    }

    #[test]
    fn test_serializes_to_json() {
        let d = decompose(2, &[vec![0], vec![1]]);
        let json = serde_json::to_string(&d).unwrap();
        let back: Decomposition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}
