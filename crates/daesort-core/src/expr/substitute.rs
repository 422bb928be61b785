//! Substitution and structural dependency queries.

use std::collections::{HashMap, HashSet};

use super::{ExprGraph, NodeId};
use crate::error::{DaeError, DaeResult};

impl ExprGraph {
    /// Replace every occurrence of `old[k]` by `new[k]` in `exprs`, simultaneously.
    ///
    /// Replacements are not themselves rewritten: substituting `x -> y` and
    /// `y -> x` swaps the two symbols.
    pub fn substitute(
        &mut self,
        exprs: &[NodeId],
        old: &[NodeId],
        new: &[NodeId],
    ) -> DaeResult<Vec<NodeId>> {
        if old.len() != new.len() {
            return Err(DaeError::LengthMismatch {
                context: "substitute",
                left: old.len(),
                right: new.len(),
            });
        }
        self.require_symbols(old)?;
        let mut memo: HashMap<NodeId, NodeId> =
            old.iter().copied().zip(new.iter().copied()).collect();
        Ok(exprs.iter().map(|&e| self.rewrite(e, &mut memo)).collect())
    }

    /// Chained substitution: `exprs[k]` is rewritten with `vars[..k] := exprs[..k]`.
    ///
    /// Every entry is expressed in terms of the already-resolved earlier
    /// definitions, in one pass over the shared graph. When the definitions are in
    /// dependency order the result is free of all of `vars`; a reference to a
    /// later (or the same) variable survives and can be detected with
    /// [`ExprGraph::depends_on`].
    pub fn substitute_in_place(&mut self, vars: &[NodeId], exprs: &mut [NodeId]) -> DaeResult<()> {
        if vars.len() != exprs.len() {
            return Err(DaeError::LengthMismatch {
                context: "substitute_in_place",
                left: vars.len(),
                right: exprs.len(),
            });
        }
        self.require_symbols(vars)?;
        let mut memo: HashMap<NodeId, NodeId> = HashMap::new();
        for (var, expr) in vars.iter().zip(exprs.iter_mut()) {
            *expr = self.rewrite(*expr, &mut memo);
            memo.insert(*var, *expr);
        }
        Ok(())
    }

    /// Rewrite `root` bottom-up through `memo`; nodes already in `memo` are final.
    fn rewrite(&mut self, root: NodeId, memo: &mut HashMap<NodeId, NodeId>) -> NodeId {
        if let Some(&done) = memo.get(&root) {
            return done;
        }
        for id in self.subgraph(&[root]) {
            if memo.contains_key(&id) {
                continue;
            }
            let operands: Vec<NodeId> = self
                .node(id)
                .operands()
                .map(|op| memo.get(&op).copied().unwrap_or(op))
                .collect();
            let unchanged = self.node(id).operands().eq(operands.iter().copied());
            let rebuilt = if unchanged {
                id
            } else {
                self.rebuild(id, &operands)
            };
            memo.insert(id, rebuilt);
        }
        memo.get(&root).copied().unwrap_or(root)
    }

    /// Structural test: does any of `exprs` reach any of the symbols `vars`?
    pub fn depends_on(&self, exprs: &[NodeId], vars: &[NodeId]) -> bool {
        self.first_dependent(exprs, vars).is_some()
    }

    /// Index of the first expression in `exprs` that reaches one of `vars`.
    pub fn first_dependent(&self, exprs: &[NodeId], vars: &[NodeId]) -> Option<usize> {
        if vars.is_empty() {
            return None;
        }
        let targets: HashSet<NodeId> = vars.iter().copied().collect();
        let mut reaches: HashMap<NodeId, bool> = HashMap::new();
        for id in self.subgraph(exprs) {
            let hit = targets.contains(&id) || self.node(id).operands().any(|op| reaches[&op]);
            reaches.insert(id, hit);
        }
        exprs.iter().position(|e| reaches[e])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_with_zero_folds() {
        let mut g = ExprGraph::new();
        let dx = g.symbol("der(x)");
        let y = g.symbol("y");
        let e = g.sub(dx, y);
        let zero = g.zero();
        let out = g.substitute(&[e], &[dx], &[zero]).unwrap();
        let ny = g.neg(y);
        assert_eq!(out, vec![ny]);
    }

    #[test]
    fn test_substitute_is_simultaneous() {
        let mut g = ExprGraph::new();
        let x = g.symbol("x");
        let y = g.symbol("y");
        let two = g.constant(2.0);
        let e = g.div(x, y);
        let out = g.substitute(&[e], &[x, y], &[y, two]).unwrap();
        let expected = g.div(y, two);
        assert_eq!(out[0], expected);
    }

    #[test]
    fn test_substitute_in_place_chains_definitions() {
        let mut g = ExprGraph::new();
        let a = g.symbol("a");
        let b = g.symbol("b");
        let p = g.symbol("p");
        let one = g.one();
        // a = p + 1, b = 2 * a
        let def_a = g.add(p, one);
        let two = g.constant(2.0);
        let def_b = g.mul(two, a);
        let mut defs = vec![def_a, def_b];
        g.substitute_in_place(&[a, b], &mut defs).unwrap();
        assert!(!g.depends_on(&defs, &[a, b]));
        let expected = g.mul(two, def_a);
        assert_eq!(defs[1], expected);
    }

    #[test]
    fn test_substitute_in_place_leaves_forward_reference() {
        let mut g = ExprGraph::new();
        let a = g.symbol("a");
        let b = g.symbol("b");
        let one = g.one();
        // a = b + 1 refers to a later entry
        let def_a = g.add(b, one);
        let def_b = g.constant(4.0);
        let mut defs = vec![def_a, def_b];
        g.substitute_in_place(&[a, b], &mut defs).unwrap();
        assert_eq!(g.first_dependent(&defs, &[a, b]), Some(0));
    }

    #[test]
    fn test_depends_on_through_shared_nodes() {
        let mut g = ExprGraph::new();
        let x = g.symbol("x");
        let y = g.symbol("y");
        let z = g.symbol("z");
        let shared = g.sin(x);
        let e1 = g.mul(shared, y);
        let e2 = g.add(shared, z);
        assert!(g.depends_on(&[e1], &[x]));
        assert!(!g.depends_on(&[e1], &[z]));
        assert_eq!(g.first_dependent(&[e1, e2], &[z]), Some(1));
        assert!(!g.depends_on(&[e1], &[]));
    }

    #[test]
    fn test_length_mismatch() {
        let mut g = ExprGraph::new();
        let x = g.symbol("x");
        assert!(matches!(
            g.substitute(&[x], &[x], &[]),
            Err(DaeError::LengthMismatch { .. })
        ));
    }
}
