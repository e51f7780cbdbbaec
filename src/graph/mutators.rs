//! Graph mutation operations
//!
//! Every edit goes through these methods so the producer, consumer and
//! name maps never disagree with the arena. Mutations do not re-sort;
//! call [`Graph::resort`] once a rewrite is complete.

use tracing::debug;

use crate::error::{OnnxResult, TransformError};
use crate::proto::{TensorProto, ValueInfoProto};

use super::context::Graph;
use super::maps::{link_inputs, unlink_inputs};
use super::node::{Node, NodeId};

/// What a [`Graph::cleanup`] call removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    /// Nodes whose outputs nothing read
    pub nodes_removed: usize,
    /// Initializers nothing read
    pub initializers_removed: usize,
    /// Value info entries for tensors that no longer exist
    pub value_info_removed: usize,
}

impl Graph {
    // ========================================================================
    // Node mutation
    // ========================================================================

    /// Insert a node and index its edges.
    ///
    /// An empty or already-taken node name is replaced by a fresh one.
    /// Fails with `MalformedGraph` if one of its outputs already has a
    /// producer; the graph is unchanged in that case.
    pub fn add_node(&mut self, mut node: Node) -> OnnxResult<NodeId> {
        for output in node.live_outputs() {
            if let Some(existing) = self.producer_of(output) {
                let other = self.node(existing).map(|n| n.name.as_str()).unwrap_or("?");
                return Err(TransformError::MalformedGraph(format!(
                    "tensor '{}' produced by both '{}' and '{}'",
                    output, other, node.name
                )));
            }
        }

        if node.name.is_empty() || self.name_map.contains_key(&node.name) {
            let base = if node.name.is_empty() {
                node.op_type.clone()
            } else {
                node.name.clone()
            };
            node.name = self.unique_name(&base);
        }

        let id = NodeId(self.nodes.len() as u32);
        for output in node.live_outputs() {
            self.producer_map.insert(output.to_string(), id);
        }
        link_inputs(&mut self.consumer_map, id, &node);
        self.name_map.insert(node.name.clone(), id);
        self.nodes.push(Some(node));
        self.order.push(id);
        Ok(id)
    }

    /// Detach a node from every map and free its slot.
    ///
    /// Producers of its inputs are left in place even if now orphaned.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.get_mut(id.index())?.take()?;

        for output in node.live_outputs() {
            if self.producer_map.get(output) == Some(&id) {
                self.producer_map.remove(output);
            }
        }
        unlink_inputs(&mut self.consumer_map, id, &node);
        self.name_map.remove(&node.name);
        self.order.retain(|&n| n != id);
        Some(node)
    }

    /// Remove several nodes, returning the ones that were live
    pub fn remove_nodes(&mut self, ids: &[NodeId]) -> Vec<Node> {
        ids.iter().filter_map(|&id| self.remove_node(id)).collect()
    }

    /// Rewire input `slot` of node `id` to read `tensor`
    pub fn set_input(&mut self, id: NodeId, slot: usize, tensor: &str) -> OnnxResult<()> {
        let node = self
            .nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| TransformError::InvalidNode(format!("no live node {}", id)))?;
        if slot >= node.inputs.len() {
            return Err(TransformError::InvalidNode(format!(
                "node '{}' has no input slot {}",
                node.name, slot
            )));
        }

        unlink_inputs(&mut self.consumer_map, id, node);
        node.inputs[slot] = tensor.to_string();
        link_inputs(&mut self.consumer_map, id, node);
        Ok(())
    }

    // ========================================================================
    // Tensor mutation
    // ========================================================================

    /// Add or update an initializer
    pub fn set_initializer(&mut self, tensor: TensorProto) {
        self.initializers.insert(tensor.name.clone(), tensor);
    }

    /// Remove an initializer
    pub fn remove_initializer(&mut self, name: &str) -> Option<TensorProto> {
        self.initializers.shift_remove(name)
    }

    /// Add or update intermediate value info
    pub fn set_value_info(&mut self, vi: ValueInfoProto) {
        self.value_info.insert(vi.name.clone(), vi);
    }

    /// A node/tensor name derived from `base` that is not in use yet
    pub fn unique_name(&self, base: &str) -> String {
        let taken = |n: &str| self.name_map.contains_key(n) || self.has_tensor(n);
        if !base.is_empty() && !taken(base) {
            return base.to_string();
        }
        (1..)
            .map(|i| format!("{}_{}", base, i))
            .find(|n| !taken(n))
            .unwrap_or_default()
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Drop what no longer contributes to a graph output.
    ///
    /// Iteratively removes nodes none of whose outputs is read by a node or
    /// listed as a graph output, then initializers nothing reads, then value
    /// info and quantization annotations for tensors that no longer exist.
    /// Reads from inside subgraph attributes keep their producers alive.
    pub fn cleanup(&mut self) -> CleanupStats {
        let mut stats = CleanupStats::default();

        loop {
            let dead: Vec<NodeId> = self
                .nodes()
                .filter(|(_, node)| {
                    node.live_outputs().next().is_some()
                        && node.live_outputs().all(|out| {
                            self.consumers_of(out).is_empty() && !self.is_graph_output(out)
                        })
                })
                .map(|(id, _)| id)
                .collect();
            if dead.is_empty() {
                break;
            }
            stats.nodes_removed += self.remove_nodes(&dead).len();
        }

        let unused: Vec<String> = self
            .initializers
            .keys()
            .filter(|name| {
                self.consumers_of(name).is_empty()
                    && !self.is_graph_output(name)
                    && !self.is_graph_input(name)
            })
            .cloned()
            .collect();
        for name in &unused {
            self.initializers.shift_remove(name);
        }
        let sparse_before = self.sparse_initializers.len();
        let consumers = &self.consumer_map;
        let outputs = &self.outputs;
        self.sparse_initializers.retain(|sp| {
            sp.values.as_ref().is_some_and(|t| {
                consumers.contains_key(&t.name) || outputs.iter().any(|vi| vi.name == t.name)
            })
        });
        stats.initializers_removed =
            unused.len() + sparse_before - self.sparse_initializers.len();

        let before = self.value_info.len();
        let producers = &self.producer_map;
        let initializers = &self.initializers;
        self.value_info
            .retain(|name, _| producers.contains_key(name) || initializers.contains_key(name));
        stats.value_info_removed = before - self.value_info.len();

        let annotations = std::mem::take(&mut self.quantization_annotation);
        self.quantization_annotation = annotations
            .into_iter()
            .filter(|a| self.has_tensor(&a.tensor_name))
            .collect();

        if stats != CleanupStats::default() {
            debug!(
                nodes = stats.nodes_removed,
                initializers = stats.initializers_removed,
                value_info = stats.value_info_removed,
                "Graph cleanup"
            );
        }
        stats
    }
}
