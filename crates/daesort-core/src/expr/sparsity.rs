//! Bit-vector dependency propagation over the expression graph.
//!
//! Every node of the subgraph spanned by a set of outputs carries a 64-bit
//! marker. Seeding inputs and sweeping in evaluation order (forward) tells which
//! outputs an input reaches; seeding outputs and sweeping in reverse order tells
//! which inputs an output reaches. Each bit is an independent probe, so one
//! sweep answers 64 queries.
//!
//! Propagation is a pure OR over graph edges: it never detects cancellation,
//! so the result over-approximates true dependency.

use std::collections::HashMap;

use super::{ExprGraph, NodeId};

/// Marker word type: one bit per simultaneous probe.
pub type Bits = u64;

/// Number of probes carried per sweep.
pub const BITS_PER_SWEEP: usize = Bits::BITS as usize;

/// Seed, propagate, read: the engine behind structural dependency analysis.
#[derive(Debug)]
pub struct SparsityPropagator<'g> {
    graph: &'g ExprGraph,
    order: Vec<NodeId>,
    slot: HashMap<NodeId, usize>,
    markers: Vec<Bits>,
}

impl<'g> SparsityPropagator<'g> {
    /// Prepare propagation over everything reachable from `outputs` and `inputs`.
    pub fn new(graph: &'g ExprGraph, outputs: &[NodeId], inputs: &[NodeId]) -> Self {
        let roots: Vec<NodeId> = outputs.iter().chain(inputs).copied().collect();
        let order = graph.subgraph(&roots);
        let slot = order.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let markers = vec![0; order.len()];
        Self {
            graph,
            order,
            slot,
            markers,
        }
    }

    /// Number of nodes swept per propagation.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Clear all markers.
    pub fn reset(&mut self) {
        self.markers.iter_mut().for_each(|m| *m = 0);
    }

    /// OR `bits` into the marker of `node`.
    pub fn seed(&mut self, node: NodeId, bits: Bits) {
        if let Some(&i) = self.slot.get(&node) {
            self.markers[i] |= bits;
        }
    }

    pub fn marker(&self, node: NodeId) -> Bits {
        self.slot.get(&node).map_or(0, |&i| self.markers[i])
    }

    /// Push markers from operands to the nodes that use them.
    pub fn propagate_forward(&mut self) {
        for (i, &id) in self.order.iter().enumerate() {
            let mut acc = self.markers[i];
            for op in self.graph.node(id).operands() {
                acc |= self.markers[self.slot[&op]];
            }
            self.markers[i] = acc;
        }
    }

    /// Push markers from nodes back to their operands.
    pub fn propagate_reverse(&mut self) {
        for (i, &id) in self.order.iter().enumerate().rev() {
            let m = self.markers[i];
            if m == 0 {
                continue;
            }
            for op in self.graph.node(id).operands() {
                self.markers[self.slot[&op]] |= m;
            }
        }
    }
}
