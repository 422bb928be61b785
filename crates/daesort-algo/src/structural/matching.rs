//! Maximum bipartite matching between equations (rows) and variables (columns).
//!
//! Hopcroft-Karp, seeded with a greedy pass that prefers the diagonal entry of
//! each row. A system whose diagonal is structurally non-zero is therefore
//! matched row `i` to column `i` without any augmentation.

use std::collections::VecDeque;

use super::dependency::DependencyPattern;

const INF: usize = usize::MAX;

/// A matching: `row_to_col[i] == Some(j)` iff `col_to_row[j] == Some(i)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matching {
    pub row_to_col: Vec<Option<usize>>,
    pub col_to_row: Vec<Option<usize>>,
}

impl Matching {
    /// Cardinality of the matching.
    pub fn size(&self) -> usize {
        self.row_to_col.iter().filter(|m| m.is_some()).count()
    }

    pub fn is_perfect(&self) -> bool {
        self.row_to_col.len() == self.col_to_row.len() && self.size() == self.row_to_col.len()
    }

    pub fn unmatched_rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.row_to_col
            .iter()
            .enumerate()
            .filter_map(|(i, m)| m.is_none().then_some(i))
    }

    pub fn unmatched_cols(&self) -> impl Iterator<Item = usize> + '_ {
        self.col_to_row
            .iter()
            .enumerate()
            .filter_map(|(j, m)| m.is_none().then_some(j))
    }

    /// Maximum matching of `pattern`.
    pub fn maximum(pattern: &DependencyPattern) -> Self {
        let rows = pattern.to_rows();
        let (m, n) = pattern.shape();
        let mut matching = Matching {
            row_to_col: vec![None; m],
            col_to_row: vec![None; n],
        };

        // Greedy start: diagonal first, then the first free column.
        for (i, cols) in rows.iter().enumerate() {
            if i < n && cols.binary_search(&i).is_ok() && matching.col_to_row[i].is_none() {
                matching.link(i, i);
            }
        }
        for (i, cols) in rows.iter().enumerate() {
            if matching.row_to_col[i].is_some() {
                continue;
            }
            if let Some(&j) = cols.iter().find(|&&j| matching.col_to_row[j].is_none()) {
                matching.link(i, j);
            }
        }

        let mut dist = vec![INF; m];
        while matching.layer(&rows, &mut dist) {
            let mut next_edge = vec![0usize; m];
            for i in 0..m {
                if matching.row_to_col[i].is_none() {
                    matching.augment(i, &rows, &mut dist, &mut next_edge);
                }
            }
        }
        matching
    }

    fn link(&mut self, i: usize, j: usize) {
        self.row_to_col[i] = Some(j);
        self.col_to_row[j] = Some(i);
    }

    /// BFS layering from the free rows; true if some free column is reachable.
    fn layer(&self, rows: &[Vec<usize>], dist: &mut [usize]) -> bool {
        let mut queue = VecDeque::new();
        for (i, d) in dist.iter_mut().enumerate() {
            if self.row_to_col[i].is_none() {
                *d = 0;
                queue.push_back(i);
            } else {
                *d = INF;
            }
        }
        let mut found = false;
        while let Some(i) = queue.pop_front() {
            for &j in &rows[i] {
                match self.col_to_row[j] {
                    None => found = true,
                    Some(k) if dist[k] == INF => {
                        dist[k] = dist[i] + 1;
                        queue.push_back(k);
                    }
                    Some(_) => {}
                }
            }
        }
        found
    }

    /// Layered DFS looking for an augmenting path starting at row `root`.
    ///
    /// Iterative: `path` holds the rows on the current path together with the
    /// column taken out of each, and `next_edge` is the per-row edge cursor.
    fn augment(
        &mut self,
        root: usize,
        rows: &[Vec<usize>],
        dist: &mut [usize],
        next_edge: &mut [usize],
    ) -> bool {
        let mut path: Vec<(usize, usize)> = Vec::new();
        let mut i = root;
        loop {
            if next_edge[i] < rows[i].len() {
                let j = rows[i][next_edge[i]];
                next_edge[i] += 1;
                match self.col_to_row[j] {
                    None => {
                        self.link(i, j);
                        while let Some((r, c)) = path.pop() {
                            self.link(r, c);
                        }
                        return true;
                    }
                    Some(k) if dist[k] == dist[i] + 1 => {
                        path.push((i, j));
                        i = k;
                    }
                    Some(_) => {}
                }
            } else {
                // dead end: drop the row from this phase and back up
                dist[i] = INF;
                match path.pop() {
                    Some((r, _)) => i = r,
                    None => return false,
                }
            }
        }
    }
}
