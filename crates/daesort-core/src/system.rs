//! Paired equation/unknown sequences.
//!
//! Most model collections come in index-aligned pairs: the implicit DAE and its
//! states, the algebraic equations and the algebraic variables, the dependent
//! definitions and the dependent variables. [`EquationSystem`] keeps each pair
//! together so a reordering can never move one side without the other.

use serde::{Deserialize, Serialize};

use crate::error::{DaeError, DaeResult};
use crate::expr::NodeId;
use crate::variable::VarId;

/// Ordered equations together with the unknowns they are associated with.
///
/// For the dependent set the pairing is positional (`unknowns[k]` is defined by
/// `equations[k]`); for implicit systems the two sides only share a length once
/// the system is square.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquationSystem {
    equations: Vec<NodeId>,
    unknowns: Vec<VarId>,
}

impl EquationSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(equations: Vec<NodeId>, unknowns: Vec<VarId>) -> Self {
        Self {
            equations,
            unknowns,
        }
    }

    pub fn equations(&self) -> &[NodeId] {
        &self.equations
    }

    pub fn unknowns(&self) -> &[VarId] {
        &self.unknowns
    }

    /// Mutable access to the expressions only; the order is not exposed.
    pub fn equations_mut(&mut self) -> &mut [NodeId] {
        &mut self.equations
    }

    pub fn num_equations(&self) -> usize {
        self.equations.len()
    }

    pub fn num_unknowns(&self) -> usize {
        self.unknowns.len()
    }

    pub fn is_square(&self) -> bool {
        self.equations.len() == self.unknowns.len()
    }

    /// True when there are neither equations nor unknowns.
    pub fn is_empty(&self) -> bool {
        self.equations.is_empty() && self.unknowns.is_empty()
    }

    pub fn push_equation(&mut self, equation: NodeId) {
        self.equations.push(equation);
    }

    pub fn push_unknown(&mut self, unknown: VarId) {
        self.unknowns.push(unknown);
    }

    pub fn push(&mut self, equation: NodeId, unknown: VarId) {
        self.equations.push(equation);
        self.unknowns.push(unknown);
    }

    /// Reorder both sides at once: new row `i` is old row `row_perm[i]`, new
    /// unknown `j` is old unknown `col_perm[j]`.
    ///
    /// Both arguments are validated before anything moves; on error the system
    /// is untouched.
    pub fn permute(&mut self, row_perm: &[usize], col_perm: &[usize]) -> DaeResult<()> {
        check_permutation("row", row_perm, self.equations.len())?;
        check_permutation("column", col_perm, self.unknowns.len())?;
        self.equations = row_perm.iter().map(|&i| self.equations[i]).collect();
        self.unknowns = col_perm.iter().map(|&j| self.unknowns[j]).collect();
        Ok(())
    }

    /// Keep the rows and unknowns whose mask entry is `true`; return the rest
    /// as a new system. Relative order is preserved on both sides.
    pub fn split_off_masked(&mut self, keep_rows: &[bool], keep_cols: &[bool]) -> DaeResult<Self> {
        if keep_rows.len() != self.equations.len() {
            return Err(DaeError::LengthMismatch {
                context: "row mask",
                left: keep_rows.len(),
                right: self.equations.len(),
            });
        }
        if keep_cols.len() != self.unknowns.len() {
            return Err(DaeError::LengthMismatch {
                context: "column mask",
                left: keep_cols.len(),
                right: self.unknowns.len(),
            });
        }
        let (kept_eq, moved_eq) = partition_by(&self.equations, keep_rows);
        let (kept_unk, moved_unk) = partition_by(&self.unknowns, keep_cols);
        self.equations = kept_eq;
        self.unknowns = kept_unk;
        Ok(Self::from_parts(moved_eq, moved_unk))
    }

    /// Append `other` after the existing entries.
    pub fn append(&mut self, other: EquationSystem) {
        self.equations.extend(other.equations);
        self.unknowns.extend(other.unknowns);
    }

    /// Insert `other` before the existing entries.
    pub fn prepend(&mut self, other: EquationSystem) {
        let mut equations = other.equations;
        equations.append(&mut self.equations);
        let mut unknowns = other.unknowns;
        unknowns.append(&mut self.unknowns);
        self.equations = equations;
        self.unknowns = unknowns;
    }

    /// Move everything out, leaving the system empty.
    pub fn take(&mut self) -> EquationSystem {
        std::mem::take(self)
    }

    pub fn into_parts(self) -> (Vec<NodeId>, Vec<VarId>) {
        (self.equations, self.unknowns)
    }
}

fn partition_by<T: Copy>(items: &[T], keep: &[bool]) -> (Vec<T>, Vec<T>) {
    let mut kept = Vec::new();
    let mut moved = Vec::new();
    for (&item, &k) in items.iter().zip(keep) {
        if k {
            kept.push(item);
        } else {
            moved.push(item);
        }
    }
    (kept, moved)
}

/// Fails unless `perm` lists every index of `0..expected` exactly once.
pub fn check_permutation(kind: &'static str, perm: &[usize], expected: usize) -> DaeResult<()> {
    let invalid = || DaeError::InvalidPermutation {
        kind,
        len: perm.len(),
        expected,
    };
    if perm.len() != expected {
        return Err(invalid());
    }
    let mut seen = vec![false; expected];
    for &p in perm {
        if p >= expected || seen[p] {
            return Err(invalid());
        }
        seen[p] = true;
    }
    Ok(())
}

/// Inverse of a permutation: `inverse[perm[i]] == i`.
pub fn invert_permutation(perm: &[usize]) -> Vec<usize> {
    let mut inverse = vec![0; perm.len()];
    for (i, &p) in perm.iter().enumerate() {
        inverse[p] = i;
    }
    inverse
}

/// Bounded constraint expression `min <= expr <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub expr: NodeId,
    pub min: f64,
    pub max: f64,
}

impl Constraint {
    pub fn new(expr: NodeId, min: f64, max: f64) -> Self {
        Self { expr, min, max }
    }

    /// Equality constraint `expr == 0`.
    pub fn equality(expr: NodeId) -> Self {
        Self::new(expr, 0.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system(n: usize) -> EquationSystem {
        EquationSystem::from_parts(
            (0..n).map(NodeId::new).collect(),
            (0..n).map(|j| VarId::new(10 + j)).collect(),
        )
    }

    #[test]
    fn test_permute_moves_both_sides() {
        let mut sys = system(3);
        sys.permute(&[2, 0, 1], &[1, 2, 0]).unwrap();
        assert_eq!(
            sys.equations(),
            &[NodeId::new(2), NodeId::new(0), NodeId::new(1)]
        );
        assert_eq!(
            sys.unknowns(),
            &[VarId::new(11), VarId::new(12), VarId::new(10)]
        );
    }

    #[test]
    fn test_permutation_round_trip() {
        let original = system(4);
        let mut sys = original.clone();
        let rows = [3, 1, 0, 2];
        let cols = [1, 3, 2, 0];
        sys.permute(&rows, &cols).unwrap();
        sys.permute(&invert_permutation(&rows), &invert_permutation(&cols))
            .unwrap();
        assert_eq!(sys, original);
    }

    #[test]
    fn test_invalid_permutation_leaves_system_untouched() {
        let mut sys = system(3);
        let before = sys.clone();
        assert!(matches!(
            sys.permute(&[0, 0, 1], &[0, 1, 2]),
            Err(DaeError::InvalidPermutation { kind: "row", .. })
        ));
        assert!(matches!(
            sys.permute(&[0, 1, 2], &[0, 1]),
            Err(DaeError::InvalidPermutation { kind: "column", .. })
        ));
        assert_eq!(sys, before);
    }

    #[test]
    fn test_split_off_masked_preserves_order() {
        let mut sys = system(4);
        let moved = sys
            .split_off_masked(&[true, false, true, false], &[false, true, true, true])
            .unwrap();
        assert_eq!(sys.equations(), &[NodeId::new(0), NodeId::new(2)]);
        assert_eq!(moved.equations(), &[NodeId::new(1), NodeId::new(3)]);
        assert_eq!(moved.unknowns(), &[VarId::new(10)]);
        assert_eq!(sys.num_unknowns(), 3);
    }

    #[test]
    fn test_prepend_puts_new_entries_first() {
        let mut sys = EquationSystem::from_parts(vec![NodeId::new(5)], vec![VarId::new(5)]);
        sys.prepend(system(2));
        assert_eq!(
            sys.unknowns(),
            &[VarId::new(10), VarId::new(11), VarId::new(5)]
        );
    }
}
