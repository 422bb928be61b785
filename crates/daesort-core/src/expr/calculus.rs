//! Forward-mode symbolic differentiation.
//!
//! Derivatives are built node by node in evaluation order, so shared
//! subexpressions are differentiated once per variable. The builder's
//! simplification keeps structurally zero partials as the constant `0`, which
//! is what makes [`ExprGraph::depends_on`] on a Jacobian block meaningful.

use std::collections::HashMap;

use super::{BinaryOp, ExprGraph, ExprMatrix, Node, NodeId, UnaryOp};
use crate::error::DaeResult;

impl ExprGraph {
    /// Partial derivative of `expr` with respect to the symbol `wrt`.
    pub fn diff(&mut self, expr: NodeId, wrt: NodeId) -> DaeResult<NodeId> {
        self.require_symbols(&[wrt])?;
        let order = self.subgraph(&[expr]);
        let partials = self.partials(&order, wrt);
        Ok(partials[&expr])
    }

    /// Dense symbolic Jacobian `d exprs / d vars` (rows follow `exprs`).
    pub fn jacobian(&mut self, exprs: &[NodeId], vars: &[NodeId]) -> DaeResult<ExprMatrix> {
        self.require_symbols(vars)?;
        let order = self.subgraph(exprs);
        let zero = self.zero();
        let mut jac = ExprMatrix::filled(exprs.len(), vars.len(), zero);
        for (j, &var) in vars.iter().enumerate() {
            let partials = self.partials(&order, var);
            for (i, expr) in exprs.iter().enumerate() {
                jac.set(i, j, partials[expr]);
            }
        }
        Ok(jac)
    }

    fn partials(&mut self, order: &[NodeId], wrt: NodeId) -> HashMap<NodeId, NodeId> {
        let zero = self.zero();
        let one = self.one();
        let mut d: HashMap<NodeId, NodeId> = HashMap::with_capacity(order.len());
        for &id in order {
            let node = self.node(id).clone();
            let partial = match node {
                Node::Constant(_) => zero,
                Node::Symbol(_) => {
                    if id == wrt {
                        one
                    } else {
                        zero
                    }
                }
                Node::Unary(op, a) => {
                    let da = d[&a];
                    if self.is_zero(da) {
                        zero
                    } else {
                        self.unary_partial(op, id, a, da)
                    }
                }
                Node::Binary(op, a, b) => {
                    let (da, db) = (d[&a], d[&b]);
                    if self.is_zero(da) && self.is_zero(db) {
                        zero
                    } else {
                        self.binary_partial(op, id, a, b, da, db)
                    }
                }
            };
            d.insert(id, partial);
        }
        d
    }

    fn unary_partial(&mut self, op: UnaryOp, node: NodeId, a: NodeId, da: NodeId) -> NodeId {
        match op {
            UnaryOp::Neg => self.neg(da),
            UnaryOp::Sqrt => {
                let two = self.constant(2.0);
                let denom = self.mul(two, node);
                self.div(da, denom)
            }
            UnaryOp::Exp => self.mul(da, node),
            UnaryOp::Log => self.div(da, a),
            UnaryOp::Sin => {
                let c = self.cos(a);
                self.mul(da, c)
            }
            UnaryOp::Cos => {
                let s = self.sin(a);
                let ds = self.mul(da, s);
                self.neg(ds)
            }
            UnaryOp::Tan => {
                let one = self.one();
                let sq = self.mul(node, node);
                let sec2 = self.add(one, sq);
                self.mul(da, sec2)
            }
            UnaryOp::Tanh => {
                let one = self.one();
                let sq = self.mul(node, node);
                let sech2 = self.sub(one, sq);
                self.mul(da, sech2)
            }
        }
    }

    fn binary_partial(
        &mut self,
        op: BinaryOp,
        node: NodeId,
        a: NodeId,
        b: NodeId,
        da: NodeId,
        db: NodeId,
    ) -> NodeId {
        match op {
            BinaryOp::Add => self.add(da, db),
            BinaryOp::Sub => self.sub(da, db),
            BinaryOp::Mul => {
                let l = self.mul(da, b);
                let r = self.mul(a, db);
                self.add(l, r)
            }
            BinaryOp::Div => {
                // (da - node * db) / b
                let t = self.mul(node, db);
                let num = self.sub(da, t);
                self.div(num, b)
            }
            BinaryOp::Pow => {
                if self.is_zero(db) {
                    // b * a^(b - 1) * da
                    let one = self.one();
                    let bm1 = self.sub(b, one);
                    let p = self.pow(a, bm1);
                    let bp = self.mul(b, p);
                    self.mul(bp, da)
                } else {
                    // node * (db * log(a) + b * da / a)
                    let la = self.log(a);
                    let t1 = self.mul(db, la);
                    let bda = self.mul(b, da);
                    let t2 = self.div(bda, a);
                    let s = self.add(t1, t2);
                    self.mul(node, s)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DaeError;

    #[test]
    fn test_linear_partials_are_constant() {
        let mut g = ExprGraph::new();
        let x = g.symbol("x");
        let y = g.symbol("y");
        let three = g.constant(3.0);
        let t = g.mul(three, x);
        let e = g.sub(t, y);
        let jac = g.jacobian(&[e], &[x, y]).unwrap();
        assert_eq!(g.as_constant(jac.get(0, 0)), Some(3.0));
        assert_eq!(g.as_constant(jac.get(0, 1)), Some(-1.0));
    }

    #[test]
    fn test_unrelated_variable_has_zero_partial() {
        let mut g = ExprGraph::new();
        let x = g.symbol("x");
        let z = g.symbol("z");
        let e = g.sin(x);
        let dz = g.diff(e, z).unwrap();
        assert!(g.is_zero(dz));
    }

    #[test]
    fn test_product_rule_matches_numeric() {
        let mut g = ExprGraph::new();
        let x = g.symbol("x");
        let y = g.symbol("y");
        let xy = g.mul(x, y);
        let e = g.mul(xy, x);
        let dx = g.diff(e, x).unwrap();
        let values = HashMap::from([(x, 1.5), (y, -2.0)]);
        let got = g.evaluate(&[dx], &values).unwrap()[0];
        assert!((got - 2.0 * 1.5 * -2.0).abs() < 1e-12);
    }

    #[test]
    fn test_jacobian_rejects_non_symbol() {
        let mut g = ExprGraph::new();
        let x = g.symbol("x");
        let e = g.exp(x);
        assert!(matches!(g.jacobian(&[e], &[e]), Err(DaeError::NotSymbolic(_))));
    }
}
