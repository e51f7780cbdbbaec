//! Topological ordering
//!
//! Kahn's algorithm with a min-heap on [`NodeId`], so independent nodes
//! keep their insertion order and the result is deterministic.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;
use tracing::warn;

use super::context::Graph;
use super::node::NodeId;

impl Graph {
    /// Live nodes in the order computed by the last [`resort`](Self::resort)
    ///
    /// Nodes added since then are appended at the end.
    pub fn topological_order(&self) -> &[NodeId] {
        &self.order
    }

    /// Whether the last `resort` found a cycle
    pub fn has_cycle(&self) -> bool {
        self.cyclic
    }

    /// Recompute the topological order.
    ///
    /// On a cycle the nodes that could not be linearized are appended in
    /// arena order and a warning is logged; the order is then not
    /// guaranteed to respect every edge.
    pub fn resort(&mut self) {
        let live: Vec<NodeId> = self.nodes().map(|(id, _)| id).collect();

        let mut in_degree: FxHashMap<NodeId, usize> = FxHashMap::default();
        for &id in &live {
            in_degree.insert(id, self.predecessors(id).iter().filter(|&&p| p != id).count());
        }

        let mut ready: BinaryHeap<Reverse<NodeId>> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&id, _)| Reverse(id))
            .collect();

        let mut order = Vec::with_capacity(live.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            for succ in self.successors(id) {
                if succ == id {
                    continue;
                }
                if let Some(d) = in_degree.get_mut(&succ) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push(Reverse(succ));
                    }
                }
            }
        }

        self.cyclic = order.len() < live.len();
        if self.cyclic {
            let stuck: Vec<NodeId> = live
                .into_iter()
                .filter(|id| in_degree.get(id).copied().unwrap_or(0) > 0)
                .collect();
            warn!(
                graph = %self.name,
                unsorted = stuck.len(),
                "Cycle detected; falling back to insertion order for the remaining nodes"
            );
            order.extend(stuck);
        }
        self.order = order;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;
    use crate::proto::extensions::make_tensor_value_info;

    fn relu(name: &str, input: &str, output: &str) -> Node {
        Node::new("Relu", name).with_inputs(&[input]).with_outputs(&[output])
    }

    #[test]
    fn test_sort_reversed_chain() {
        let mut g = Graph::new("rev");
        g.inputs.push(make_tensor_value_info("x", 1, &[1]));
        let c = g.add_node(relu("c", "b_out", "y")).unwrap();
        let b = g.add_node(relu("b", "a_out", "b_out")).unwrap();
        let a = g.add_node(relu("a", "x", "a_out")).unwrap();
        g.resort();

        assert_eq!(g.topological_order(), &[a, b, c]);
        assert!(!g.has_cycle());
    }

    #[test]
    fn test_independent_nodes_keep_insertion_order() {
        let mut g = Graph::new("par");
        g.inputs.push(make_tensor_value_info("x", 1, &[1]));
        let p = g.add_node(relu("p", "x", "p_out")).unwrap();
        let q = g.add_node(relu("q", "x", "q_out")).unwrap();
        g.resort();
        assert_eq!(g.topological_order(), &[p, q]);
    }

    #[test]
    fn test_cycle_falls_back() {
        let mut g = Graph::new("loop");
        g.inputs.push(make_tensor_value_info("x", 1, &[1]));
        let head = g.add_node(relu("head", "x", "h")).unwrap();
        let a = g
            .add_node(Node::new("Add", "a").with_inputs(&["h", "b_out"]).with_outputs(&["a_out"]))
            .unwrap();
        let b = g.add_node(relu("b", "a_out", "b_out")).unwrap();
        g.resort();

        assert!(g.has_cycle());
        assert_eq!(g.topological_order(), &[head, a, b]);
        assert_eq!(g.node_count(), 3);
    }

    #[test]
    fn test_resort_after_mutation() {
        let mut g = Graph::new("mut");
        g.inputs.push(make_tensor_value_info("x", 1, &[1]));
        let a = g.add_node(relu("a", "x", "a_out")).unwrap();
        let b = g.add_node(relu("b", "a_out", "y")).unwrap();
        g.resort();

        g.remove_node(b);
        let c = g.add_node(relu("c", "a_out", "y")).unwrap();
        g.resort();
        assert_eq!(g.topological_order(), &[a, c]);
    }
}
