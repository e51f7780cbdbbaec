//! Dependency and tensor queries
//!
//! Read-only methods patterns use while tracing a subgraph.

use smallvec::SmallVec;
use tracing::debug;

use crate::proto::ValueInfoProto;
use crate::tensor::Constant;

use super::context::Graph;
use super::node::NodeId;

/// Neighbor list returned by `predecessors` / `successors`
pub type Neighbors = SmallVec<[NodeId; 4]>;

impl Graph {
    // ========================================================================
    // Edge queries
    // ========================================================================

    /// Node producing `tensor`, if any
    pub fn producer_of(&self, tensor: &str) -> Option<NodeId> {
        self.producer_map.get(tensor).copied()
    }

    /// Nodes consuming `tensor`, in the order they were attached
    pub fn consumers_of(&self, tensor: &str) -> &[NodeId] {
        self.consumer_map
            .get(tensor)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Distinct nodes producing any input of `id`, in input order
    ///
    /// Producers of tensors read inside subgraph attributes are included.
    pub fn predecessors(&self, id: NodeId) -> Neighbors {
        let mut out = Neighbors::new();
        if let Some(node) = self.node(id) {
            for input in node.consumed_tensors() {
                if let Some(p) = self.producer_of(input) {
                    if !out.contains(&p) {
                        out.push(p);
                    }
                }
            }
        }
        out
    }

    /// Distinct nodes consuming any output of `id`, in output order
    pub fn successors(&self, id: NodeId) -> Neighbors {
        let mut out = Neighbors::new();
        if let Some(node) = self.node(id) {
            for output in node.live_outputs() {
                for &c in self.consumers_of(output) {
                    if !out.contains(&c) {
                        out.push(c);
                    }
                }
            }
        }
        out
    }

    // ========================================================================
    // Tensor classification
    // ========================================================================

    /// Check if a tensor is a graph input
    pub fn is_graph_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|vi| vi.name == name)
    }

    /// Check if a tensor is a graph output
    pub fn is_graph_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|vi| vi.name == name)
    }

    /// Whether `name` resolves to a producer, initializer or graph input
    pub fn has_tensor(&self, name: &str) -> bool {
        self.producer_map.contains_key(name)
            || self.initializers.contains_key(name)
            || self.is_sparse_initializer(name)
            || self.is_graph_input(name)
    }

    /// Check if a tensor is a sparse initializer
    pub fn is_sparse_initializer(&self, name: &str) -> bool {
        self.sparse_initializers
            .iter()
            .any(|sp| sp.values.as_ref().is_some_and(|t| t.name == name))
    }

    /// Whether `name` is a compile-time constant.
    ///
    /// Initializers count, as do outputs of `Constant` nodes carrying a
    /// tensor `value`.
    pub fn is_constant(&self, name: &str) -> bool {
        if self.initializers.contains_key(name) {
            return true;
        }
        self.producer_of(name)
            .and_then(|id| self.node(id))
            .map(|n| n.is_op("Constant") && n.attr_tensor("value").is_some())
            .unwrap_or(false)
    }

    /// Decoded value of a constant tensor
    ///
    /// Returns `None` when the tensor is not constant or its element type
    /// cannot be decoded.
    pub fn constant_value(&self, name: &str) -> Option<Constant> {
        let tensor = match self.initializers.get(name) {
            Some(t) => t,
            None => {
                let node = self.node(self.producer_of(name)?)?;
                if !node.is_op("Constant") {
                    return None;
                }
                node.attr_tensor("value")?
            }
        };
        match Constant::from_tensor(tensor) {
            Ok(c) => Some(c),
            Err(e) => {
                debug!(tensor = name, error = %e, "Constant not decodable");
                None
            }
        }
    }

    // ========================================================================
    // Shape and type queries
    // ========================================================================

    /// Value info for a tensor, searching intermediates, inputs and outputs
    pub fn value_info(&self, name: &str) -> Option<&ValueInfoProto> {
        self.value_info
            .get(name)
            .or_else(|| self.inputs.iter().find(|vi| vi.name == name))
            .or_else(|| self.outputs.iter().find(|vi| vi.name == name))
    }

    /// Shape of a tensor; unknown dimensions are `None`
    ///
    /// Initializer dims take effect when no value info is recorded.
    pub fn shape_of(&self, name: &str) -> Option<Vec<Option<i64>>> {
        if let Some(dims) = self.value_info(name).and_then(ValueInfoProto::dims) {
            return Some(dims);
        }
        self.initializers
            .get(name)
            .map(|t| t.dims.iter().map(|&d| Some(d)).collect())
    }

    /// Element type of a tensor
    pub fn elem_type_of(&self, name: &str) -> Option<i32> {
        if let Some(t) = self.value_info(name).and_then(ValueInfoProto::elem_type) {
            return Some(t);
        }
        self.initializers.get(name).map(|t| t.data_type)
    }
}
