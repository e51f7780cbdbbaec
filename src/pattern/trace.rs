//! Table-driven subgraph tracing
//!
//! Multi-node templates are written as a list of [`Step`]s instead of
//! nested lookups. Each step starts from an already bound slot (slot 0 is
//! the anchor), looks at its distinct predecessors or successors, and
//! requires their operator types to be exactly the listed multiset. The
//! neighbors are then bound to new slots in the order the step lists them,
//! which is how sibling branches are told apart.
//!
//! # Example
//!
//! ```ignore
//! use onnx_fuser::pattern::trace::{Step, Tracer};
//!
//! // Div -> Log, anchored at Log
//! let slots = Tracer::new(graph, log).run(&[Step::pred(0, &["Div"])])?;
//! let div = slots[1];
//! ```

use crate::graph::{Graph, NodeId};

/// Direction of a trace step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hop {
    /// Producers of the node's inputs
    Predecessors,
    /// Consumers of the node's outputs
    Successors,
}

/// One assertion in a trace table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The neighbors of slot `from` have exactly the operator types `ops`
    /// (as a multiset); they are bound to new slots in `ops` order.
    Expect {
        /// Slot to start from
        from: usize,
        /// Which neighbors to inspect
        hop: Hop,
        /// Required operator types
        ops: &'static [&'static str],
    },
    /// Two slots are bound to the same node
    Same(usize, usize),
}

impl Step {
    /// `Expect` over successors
    pub const fn succ(from: usize, ops: &'static [&'static str]) -> Self {
        Self::Expect {
            from,
            hop: Hop::Successors,
            ops,
        }
    }

    /// `Expect` over predecessors
    pub const fn pred(from: usize, ops: &'static [&'static str]) -> Self {
        Self::Expect {
            from,
            hop: Hop::Predecessors,
            ops,
        }
    }
}

/// Runs a trace table from an anchor
#[derive(Debug)]
pub struct Tracer<'g> {
    graph: &'g Graph,
    slots: Vec<NodeId>,
}

impl<'g> Tracer<'g> {
    /// Start a trace with `anchor` bound to slot 0
    pub fn new(graph: &'g Graph, anchor: NodeId) -> Self {
        Self {
            graph,
            slots: vec![anchor],
        }
    }

    /// Apply `steps` in order, stopping at the first one that does not hold.
    ///
    /// Returns every bound slot on success.
    pub fn run(mut self, steps: &[Step]) -> Option<Vec<NodeId>> {
        for step in steps {
            match *step {
                Step::Expect { from, hop, ops } => self.expect(from, hop, ops)?,
                Step::Same(a, b) => {
                    if self.slots.get(a)? != self.slots.get(b)? {
                        return None;
                    }
                }
            }
        }
        Some(self.slots)
    }

    fn expect(&mut self, from: usize, hop: Hop, ops: &[&str]) -> Option<()> {
        let origin = *self.slots.get(from)?;
        let neighbors = match hop {
            Hop::Predecessors => self.graph.predecessors(origin),
            Hop::Successors => self.graph.successors(origin),
        };
        if neighbors.len() != ops.len() {
            return None;
        }

        let mut taken = vec![false; neighbors.len()];
        for op in ops {
            let i = neighbors.iter().enumerate().position(|(i, &n)| {
                !taken[i] && self.graph.node(n).map(|node| node.is_op(op)).unwrap_or(false)
            })?;
            taken[i] = true;
            self.slots.push(neighbors[i]);
        }
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use crate::proto::extensions::make_tensor_value_info;

    // x -> sub ─┬─> pow -> sqrt ─┐
    //           └────────────────┴─> div -> y
    fn fork_join() -> (Graph, [NodeId; 4]) {
        let mut g = Graph::new("fj");
        g.inputs.push(make_tensor_value_info("x", 1, &[4]));
        let sub = g
            .add_node(Node::new("Sub", "sub").with_inputs(&["x", "x"]).with_outputs(&["d"]))
            .unwrap();
        let pow = g
            .add_node(Node::new("Pow", "pow").with_inputs(&["d", "x"]).with_outputs(&["p"]))
            .unwrap();
        let sqrt = g
            .add_node(Node::new("Sqrt", "sqrt").with_inputs(&["p"]).with_outputs(&["s"]))
            .unwrap();
        let div = g
            .add_node(Node::new("Div", "div").with_inputs(&["d", "s"]).with_outputs(&["y"]))
            .unwrap();
        g.resort();
        (g, [sub, pow, sqrt, div])
    }

    #[test]
    fn test_branches_bound_by_op_type() {
        let (g, [sub, pow, sqrt, div]) = fork_join();
        // Successors of sub are [pow, div] in graph order; listing Div first
        // binds it to slot 1 regardless.
        let slots = Tracer::new(&g, sub)
            .run(&[
                Step::succ(0, &["Div", "Pow"]),
                Step::succ(2, &["Sqrt"]),
                Step::succ(3, &["Div"]),
                Step::Same(1, 4),
            ])
            .unwrap();
        assert_eq!(slots, vec![sub, div, pow, sqrt, div]);
    }

    #[test]
    fn test_cardinality_mismatch_fails() {
        let (g, [sub, ..]) = fork_join();
        assert!(Tracer::new(&g, sub).run(&[Step::succ(0, &["Pow"])]).is_none());
        assert!(Tracer::new(&g, sub)
            .run(&[Step::succ(0, &["Pow", "Div", "Mul"])])
            .is_none());
    }

    #[test]
    fn test_type_mismatch_fails() {
        let (g, [sub, ..]) = fork_join();
        assert!(Tracer::new(&g, sub)
            .run(&[Step::succ(0, &["Pow", "Pow"])])
            .is_none());
    }

    #[test]
    fn test_same_detects_different_nodes() {
        let (g, [_, _, sqrt, div]) = fork_join();
        let slots = Tracer::new(&g, div).run(&[Step::pred(0, &["Sub", "Sqrt"])]).unwrap();
        assert_eq!(slots[2], sqrt);
        assert!(Tracer::new(&g, div)
            .run(&[Step::pred(0, &["Sub", "Sqrt"]), Step::Same(1, 2)])
            .is_none());
    }

    #[test]
    fn test_unbound_slot_fails() {
        let (g, [sub, ..]) = fork_join();
        assert!(Tracer::new(&g, sub).run(&[Step::succ(5, &["Pow"])]).is_none());
    }
}
