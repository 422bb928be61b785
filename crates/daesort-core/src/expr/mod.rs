//! # Symbolic scalar expression graph
//!
//! Expressions live in an append-only arena ([`ExprGraph`]) and are referred to
//! by stable integer handles ([`NodeId`]). Construction goes through the graph's
//! builder methods, which:
//!
//! - fold constants and apply local identities (`x + 0`, `x * 1`, `--x`, ...)
//! - hash-cons structurally identical nodes, so common subexpressions are shared
//! - intern symbols by name, so `symbol("x")` always returns the same node
//!
//! Because operands must exist before the node that uses them, every node's
//! operands have smaller ids than the node itself. All graph walks in this crate
//! rely on that ordering: ascending id order is a valid evaluation order.
//!
//! ## Modules
//!
//! - [`calculus`] - symbolic differentiation and Jacobians
//! - [`substitute`] - substitution and structural dependency tests
//! - [`sparsity`] - bit-vector dependency propagation
//! - [`matrix`] - dense symbolic matrices, inverse and QR solve

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{DaeError, DaeResult};

pub mod calculus;
pub mod matrix;
pub mod sparsity;
pub mod substitute;

pub use matrix::ExprMatrix;
pub use sparsity::SparsityPropagator;

/// Stable handle of a node in an [`ExprGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    #[inline]
    pub fn new(value: usize) -> Self {
        NodeId(value)
    }
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Sqrt,
    Exp,
    Log,
    Sin,
    Cos,
    Tan,
    Tanh,
}

impl UnaryOp {
    fn apply(self, a: f64) -> f64 {
        match self {
            UnaryOp::Neg => -a,
            UnaryOp::Sqrt => a.sqrt(),
            UnaryOp::Exp => a.exp(),
            UnaryOp::Log => a.ln(),
            UnaryOp::Sin => a.sin(),
            UnaryOp::Cos => a.cos(),
            UnaryOp::Tan => a.tan(),
            UnaryOp::Tanh => a.tanh(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Exp => "exp",
            UnaryOp::Log => "log",
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
            UnaryOp::Tan => "tan",
            UnaryOp::Tanh => "tanh",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Pow => a.powf(b),
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
        }
    }

    fn is_commutative(self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Mul)
    }
}

/// A single node of the expression graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Constant(f64),
    Symbol(String),
    Unary(UnaryOp, NodeId),
    Binary(BinaryOp, NodeId, NodeId),
}

impl Node {
    /// Operands of this node (zero, one or two).
    pub fn operands(&self) -> impl Iterator<Item = NodeId> {
        let (a, b) = match *self {
            Node::Constant(_) | Node::Symbol(_) => (None, None),
            Node::Unary(_, a) => (Some(a), None),
            Node::Binary(_, a, b) => (Some(a), Some(b)),
        };
        a.into_iter().chain(b)
    }
}

/// Hash-consing key. Symbols are interned separately by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NodeKey {
    Constant(u64),
    Unary(UnaryOp, NodeId),
    Binary(BinaryOp, NodeId, NodeId),
}

/// Append-only arena of shared scalar expressions.
#[derive(Debug, Clone)]
pub struct ExprGraph {
    nodes: Vec<Node>,
    interned: HashMap<NodeKey, NodeId>,
    symbols: HashMap<String, NodeId>,
    zero: NodeId,
    one: NodeId,
}

impl Default for ExprGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ExprGraph {
    pub fn new() -> Self {
        let mut graph = Self {
            nodes: Vec::new(),
            interned: HashMap::new(),
            symbols: HashMap::new(),
            zero: NodeId(0),
            one: NodeId(0),
        };
        graph.zero = graph.constant(0.0);
        graph.one = graph.constant(1.0);
        graph
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn zero(&self) -> NodeId {
        self.zero
    }

    pub fn one(&self) -> NodeId {
        self.one
    }

    /// Constant value of a node, if it is a constant.
    pub fn as_constant(&self, id: NodeId) -> Option<f64> {
        match self.nodes[id.0] {
            Node::Constant(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_zero(&self, id: NodeId) -> bool {
        self.as_constant(id) == Some(0.0)
    }

    pub fn is_one(&self, id: NodeId) -> bool {
        self.as_constant(id) == Some(1.0)
    }

    pub fn is_symbol(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0], Node::Symbol(_))
    }

    /// Name of a symbol node.
    pub fn symbol_name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0] {
            Node::Symbol(name) => Some(name),
            _ => None,
        }
    }

    /// Fails with [`DaeError::NotSymbolic`] unless every node is a symbol.
    pub fn require_symbols(&self, ids: &[NodeId]) -> DaeResult<()> {
        match ids.iter().find(|id| !self.is_symbol(**id)) {
            Some(id) => Err(DaeError::NotSymbolic(id.0)),
            None => Ok(()),
        }
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    fn intern(&mut self, key: NodeKey, node: Node) -> NodeId {
        if let Some(&id) = self.interned.get(&key) {
            return id;
        }
        let id = self.push(node);
        self.interned.insert(key, id);
        id
    }

    pub fn constant(&mut self, value: f64) -> NodeId {
        // -0.0 and 0.0 share a node
        let value = if value == 0.0 { 0.0 } else { value };
        self.intern(NodeKey::Constant(value.to_bits()), Node::Constant(value))
    }

    /// Interned symbol: the same name always yields the same node.
    pub fn symbol(&mut self, name: &str) -> NodeId {
        if let Some(&id) = self.symbols.get(name) {
            return id;
        }
        let id = self.push(Node::Symbol(name.to_string()));
        self.symbols.insert(name.to_string(), id);
        id
    }

    pub fn find_symbol(&self, name: &str) -> Option<NodeId> {
        self.symbols.get(name).copied()
    }

    pub fn unary(&mut self, op: UnaryOp, a: NodeId) -> NodeId {
        if let Some(v) = self.as_constant(a) {
            return self.constant(op.apply(v));
        }
        if op == UnaryOp::Neg {
            if let Node::Unary(UnaryOp::Neg, inner) = self.nodes[a.0] {
                return inner;
            }
        }
        self.intern(NodeKey::Unary(op, a), Node::Unary(op, a))
    }

    pub fn binary(&mut self, op: BinaryOp, a: NodeId, b: NodeId) -> NodeId {
        match (self.as_constant(a), self.as_constant(b)) {
            (Some(x), Some(y)) => return self.constant(op.apply(x, y)),
            (ca, cb) => {
                if let Some(id) = self.simplify(op, a, b, ca, cb) {
                    return id;
                }
            }
        }
        let (a, b) = if op.is_commutative() && b < a { (b, a) } else { (a, b) };
        self.intern(NodeKey::Binary(op, a, b), Node::Binary(op, a, b))
    }

    /// Local identities applied before a binary node is created.
    fn simplify(
        &mut self,
        op: BinaryOp,
        a: NodeId,
        b: NodeId,
        ca: Option<f64>,
        cb: Option<f64>,
    ) -> Option<NodeId> {
        match op {
            BinaryOp::Add => {
                if ca == Some(0.0) {
                    return Some(b);
                }
                if cb == Some(0.0) {
                    return Some(a);
                }
                if let Node::Unary(UnaryOp::Neg, nb) = self.nodes[b.0] {
                    return Some(self.sub(a, nb));
                }
                if let Node::Unary(UnaryOp::Neg, na) = self.nodes[a.0] {
                    return Some(self.sub(b, na));
                }
            }
            BinaryOp::Sub => {
                if cb == Some(0.0) {
                    return Some(a);
                }
                if ca == Some(0.0) {
                    return Some(self.neg(b));
                }
                if a == b {
                    return Some(self.zero);
                }
                if let Node::Unary(UnaryOp::Neg, nb) = self.nodes[b.0] {
                    return Some(self.add(a, nb));
                }
            }
            BinaryOp::Mul => {
                if ca == Some(0.0) || cb == Some(0.0) {
                    return Some(self.zero);
                }
                if ca == Some(1.0) {
                    return Some(b);
                }
                if cb == Some(1.0) {
                    return Some(a);
                }
                if ca == Some(-1.0) {
                    return Some(self.neg(b));
                }
                if cb == Some(-1.0) {
                    return Some(self.neg(a));
                }
            }
            BinaryOp::Div => {
                if ca == Some(0.0) {
                    return Some(self.zero);
                }
                if cb == Some(1.0) {
                    return Some(a);
                }
                if cb == Some(-1.0) {
                    return Some(self.neg(a));
                }
            }
            BinaryOp::Pow => {
                if cb == Some(0.0) {
                    return Some(self.one);
                }
                if cb == Some(1.0) {
                    return Some(a);
                }
            }
        }
        None
    }

    pub fn add(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(BinaryOp::Add, a, b)
    }

    pub fn sub(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(BinaryOp::Sub, a, b)
    }

    pub fn mul(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(BinaryOp::Mul, a, b)
    }

    pub fn div(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(BinaryOp::Div, a, b)
    }

    pub fn pow(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(BinaryOp::Pow, a, b)
    }

    pub fn neg(&mut self, a: NodeId) -> NodeId {
        self.unary(UnaryOp::Neg, a)
    }

    pub fn sqrt(&mut self, a: NodeId) -> NodeId {
        self.unary(UnaryOp::Sqrt, a)
    }

    pub fn exp(&mut self, a: NodeId) -> NodeId {
        self.unary(UnaryOp::Exp, a)
    }

    pub fn log(&mut self, a: NodeId) -> NodeId {
        self.unary(UnaryOp::Log, a)
    }

    pub fn sin(&mut self, a: NodeId) -> NodeId {
        self.unary(UnaryOp::Sin, a)
    }

    pub fn cos(&mut self, a: NodeId) -> NodeId {
        self.unary(UnaryOp::Cos, a)
    }

    /// Sum of a sequence, `0` when empty.
    pub fn sum(&mut self, terms: &[NodeId]) -> NodeId {
        terms.iter().fold(self.zero, |acc, &t| self.add(acc, t))
    }

    /// Rebuild a node of the same shape over new operands, re-running simplification.
    pub(crate) fn rebuild(&mut self, id: NodeId, operands: &[NodeId]) -> NodeId {
        match self.nodes[id.0] {
            Node::Constant(_) | Node::Symbol(_) => id,
            Node::Unary(op, _) => self.unary(op, operands[0]),
            Node::Binary(op, _, _) => self.binary(op, operands[0], operands[1]),
        }
    }

    /// All nodes reachable from `roots`, in ascending (evaluation) order.
    ///
    /// Linear in the size of the graph prefix up to the largest root.
    pub fn subgraph(&self, roots: &[NodeId]) -> Vec<NodeId> {
        let Some(max) = roots.iter().max() else {
            return Vec::new();
        };
        let mut visited = vec![false; max.0 + 1];
        let mut stack: Vec<NodeId> = roots.to_vec();
        while let Some(id) = stack.pop() {
            if visited[id.0] {
                continue;
            }
            visited[id.0] = true;
            stack.extend(self.nodes[id.0].operands().filter(|op| !visited[op.0]));
        }
        visited
            .iter()
            .enumerate()
            .filter_map(|(i, &seen)| seen.then_some(NodeId(i)))
            .collect()
    }

    /// Numerically evaluate `roots` given values for the symbols they reach.
    pub fn evaluate(&self, roots: &[NodeId], values: &HashMap<NodeId, f64>) -> DaeResult<Vec<f64>> {
        let mut cache: HashMap<NodeId, f64> = HashMap::new();
        for id in self.subgraph(roots) {
            let value = match &self.nodes[id.0] {
                Node::Constant(v) => *v,
                Node::Symbol(name) => *values
                    .get(&id)
                    .ok_or_else(|| DaeError::UnboundSymbol(name.clone()))?,
                Node::Unary(op, a) => op.apply(cache[a]),
                Node::Binary(op, a, b) => op.apply(cache[a], cache[b]),
            };
            cache.insert(id, value);
        }
        Ok(roots.iter().map(|r| cache[r]).collect())
    }

    /// Infix rendering, intended for diagnostics and log output.
    pub fn render(&self, id: NodeId) -> String {
        match &self.nodes[id.0] {
            Node::Constant(v) => format!("{v}"),
            Node::Symbol(name) => name.clone(),
            Node::Unary(UnaryOp::Neg, a) => format!("(-{})", self.render(*a)),
            Node::Unary(op, a) => format!("{}({})", op.name(), self.render(*a)),
            Node::Binary(op, a, b) => {
                format!("({} {} {})", self.render(*a), op.symbol(), self.render(*b))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbols_are_interned() {
        let mut g = ExprGraph::new();
        let x1 = g.symbol("x");
        let x2 = g.symbol("x");
        assert_eq!(x1, x2);
        assert_eq!(g.find_symbol("x"), Some(x1));
        assert_eq!(g.symbol_name(x1), Some("x"));
    }

    #[test]
    fn test_hash_consing_shares_nodes() {
        let mut g = ExprGraph::new();
        let x = g.symbol("x");
        let y = g.symbol("y");
        let a = g.add(x, y);
        let b = g.add(y, x);
        assert_eq!(a, b);
        let before = g.len();
        let _ = g.mul(a, b);
        let _ = g.mul(b, a);
        assert_eq!(g.len(), before + 1);
    }

    #[test]
    fn test_local_simplification() {
        let mut g = ExprGraph::new();
        let x = g.symbol("x");
        let zero = g.zero();
        let one = g.one();
        assert_eq!(g.add(x, zero), x);
        assert_eq!(g.mul(one, x), x);
        assert_eq!(g.mul(zero, x), zero);
        assert_eq!(g.sub(x, x), zero);
        let nx = g.neg(x);
        assert_eq!(g.neg(nx), x);
        assert_eq!(g.sub(zero, x), nx);
        let two = g.constant(2.0);
        let three = g.constant(3.0);
        let five = g.add(two, three);
        assert_eq!(g.as_constant(five), Some(5.0));
    }

    #[test]
    fn test_operands_precede_nodes() {
        let mut g = ExprGraph::new();
        let x = g.symbol("x");
        let y = g.symbol("y");
        let s = g.sin(x);
        let e = g.mul(s, y);
        let order = g.subgraph(&[e]);
        assert_eq!(order.last(), Some(&e));
        for id in &order {
            for op in g.node(*id).operands() {
                assert!(op < *id);
            }
        }
    }

    #[test]
    fn test_evaluate() {
        let mut g = ExprGraph::new();
        let x = g.symbol("x");
        let y = g.symbol("y");
        let xy = g.mul(x, y);
        let e = g.sub(xy, y);
        let values = HashMap::from([(x, 3.0), (y, 2.0)]);
        assert_eq!(g.evaluate(&[e], &values).unwrap(), vec![4.0]);

        let missing = HashMap::from([(x, 1.0)]);
        assert!(matches!(
            g.evaluate(&[e], &missing),
            Err(DaeError::UnboundSymbol(name)) if name == "y"
        ));
    }

    #[test]
    fn test_render() {
        let mut g = ExprGraph::new();
        let x = g.symbol("x");
        let two = g.constant(2.0);
        let e = g.mul(two, x);
        let nx = g.neg(e);
        assert_eq!(g.render(nx), "(-(2 * x))");
    }
}
