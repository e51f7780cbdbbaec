//! Graph arena for ONNX model rewriting
//!
//! `Graph` owns every node of one ONNX graph plus the dependency index
//! (producer and consumer maps) derived from them. Nodes live in an arena
//! and are addressed by [`NodeId`]; a removed node leaves an empty slot so
//! handles held elsewhere never alias a different node.

use tracing::debug;

use crate::error::{OnnxResult, TransformError};
use crate::proto::{
    GraphProto, SparseTensorProto, StringStringEntryProto, TensorAnnotation, TensorProto,
    ValueInfoProto,
};

use super::maps::{ConsumerMap, InitializerMap, NameMap, ProducerMap, ValueInfoMap};
use super::node::{Node, NodeId};

/// Decoded ONNX graph with an always-consistent dependency index
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub(crate) name: String,
    pub(crate) doc_string: String,

    /// Node arena; `None` marks a removed node
    pub(crate) nodes: Vec<Option<Node>>,

    /// Maps tensor name → producing node
    pub(crate) producer_map: ProducerMap,

    /// Maps tensor name → consuming nodes
    pub(crate) consumer_map: ConsumerMap,

    /// Maps node name → node
    pub(crate) name_map: NameMap,

    /// Maps initializer name → TensorProto
    pub(crate) initializers: InitializerMap,

    /// Sparse initializers, named by their `values` tensor
    pub(crate) sparse_initializers: Vec<SparseTensorProto>,

    /// Quantization parameters attached to tensors
    pub(crate) quantization_annotation: Vec<TensorAnnotation>,

    pub(crate) metadata_props: Vec<StringStringEntryProto>,

    /// Intermediate value info (graph inputs/outputs are kept separately)
    pub(crate) value_info: ValueInfoMap,

    pub(crate) inputs: Vec<ValueInfoProto>,
    pub(crate) outputs: Vec<ValueInfoProto>,

    /// Live nodes, topologically sorted after `resort`
    pub(crate) order: Vec<NodeId>,

    /// Set when the last `resort` found a cycle
    pub(crate) cyclic: bool,
}

impl Graph {
    /// Create an empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Decode and index a GraphProto.
    ///
    /// Unnamed nodes receive a generated name. The result is validated
    /// and topologically sorted.
    pub fn from_proto(proto: &GraphProto) -> OnnxResult<Self> {
        let mut graph = Self::new(proto.name.clone());
        graph.doc_string = proto.doc_string.clone();
        graph.inputs = proto.input.clone();
        graph.outputs = proto.output.clone();
        for tensor in &proto.initializer {
            graph.initializers.insert(tensor.name.clone(), tensor.clone());
        }
        graph.sparse_initializers = proto.sparse_initializer.clone();
        graph.quantization_annotation = proto.quantization_annotation.clone();
        graph.metadata_props = proto.metadata_props.clone();
        for vi in &proto.value_info {
            graph.value_info.insert(vi.name.clone(), vi.clone());
        }
        for node in &proto.node {
            graph.add_node(Node::from_proto(node))?;
        }

        graph.validate()?;
        graph.resort();
        debug!(
            graph = %graph.name,
            nodes = graph.node_count(),
            initializers = graph.initializers.len(),
            "Graph loaded"
        );
        Ok(graph)
    }

    /// Encode back to a GraphProto with nodes in the current order
    pub fn to_proto(&self) -> GraphProto {
        GraphProto {
            name: self.name.clone(),
            doc_string: self.doc_string.clone(),
            node: self
                .order
                .iter()
                .filter_map(|&id| self.node(id))
                .map(Node::to_proto)
                .collect(),
            initializer: self.initializers.values().cloned().collect(),
            sparse_initializer: self.sparse_initializers.clone(),
            input: self.inputs.clone(),
            output: self.outputs.clone(),
            value_info: self.value_info.values().cloned().collect(),
            quantization_annotation: self.quantization_annotation.clone(),
            metadata_props: self.metadata_props.clone(),
        }
    }

    /// Check that every referenced tensor resolves.
    ///
    /// Node inputs (including tensors read by subgraph attributes) and
    /// graph outputs must each be produced by a node, be an initializer, or
    /// be a graph input. Node outputs may not shadow an initializer or
    /// graph input.
    pub fn validate(&self) -> OnnxResult<()> {
        for (_, node) in self.nodes() {
            for input in node.consumed_tensors() {
                if !self.has_tensor(input) {
                    return Err(TransformError::MalformedGraph(format!(
                        "input '{}' of node '{}' has no producer, initializer or graph input",
                        input, node.name
                    )));
                }
            }
            for output in node.live_outputs() {
                if self.initializers.contains_key(output) || self.is_graph_input(output) {
                    return Err(TransformError::MalformedGraph(format!(
                        "output '{}' of node '{}' shadows a graph input or initializer",
                        output, node.name
                    )));
                }
            }
        }
        for output in &self.outputs {
            if !self.has_tensor(&output.name) {
                return Err(TransformError::MalformedGraph(format!(
                    "graph output '{}' is never produced",
                    output.name
                )));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Node accessors
    // ========================================================================

    /// Graph name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a live node
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    /// Whether `id` still refers to a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Iterate over live nodes in arena (insertion) order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|n| (NodeId(i as u32), n)))
    }

    /// Number of live nodes
    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    /// Look up a node by name
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.name_map.get(name).copied()
    }

    /// Count live nodes with operator type `op_type`
    pub fn count_op(&self, op_type: &str) -> usize {
        self.nodes().filter(|(_, n)| n.is_op(op_type)).count()
    }

    /// Get initializer by name
    pub fn initializer(&self, name: &str) -> Option<&TensorProto> {
        self.initializers.get(name)
    }

    /// Iterate over initializers in declaration order
    pub fn initializers(&self) -> impl Iterator<Item = &TensorProto> {
        self.initializers.values()
    }

    /// Graph inputs
    pub fn inputs(&self) -> &[ValueInfoProto] {
        &self.inputs
    }

    /// Graph outputs
    pub fn outputs(&self) -> &[ValueInfoProto] {
        &self.outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::extensions::make_node;

    fn vi(name: &str) -> ValueInfoProto {
        ValueInfoProto {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn make_test_graph() -> GraphProto {
        GraphProto {
            name: "g".to_string(),
            node: vec![
                make_node("Conv", &["X", "W"], &["conv_out"], "conv_0"),
                make_node("Relu", &["conv_out"], &["Y"], "relu_0"),
            ],
            input: vec![vi("X")],
            output: vec![vi("Y")],
            initializer: vec![TensorProto {
                name: "W".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_graph_creation() {
        let graph = Graph::from_proto(&make_test_graph()).unwrap();

        assert_eq!(graph.node_count(), 2);
        let conv = graph.find_node("conv_0").unwrap();
        assert_eq!(graph.node(conv).unwrap().op_type, "Conv");
        assert!(graph.find_node("nonexistent").is_none());
    }

    #[test]
    fn test_dangling_input_is_malformed() {
        let mut proto = make_test_graph();
        proto.node[1].input[0] = "missing".to_string();
        let err = Graph::from_proto(&proto).unwrap_err();
        assert!(matches!(err, TransformError::MalformedGraph(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_duplicate_producer_is_malformed() {
        let mut proto = make_test_graph();
        proto
            .node
            .push(make_node("Identity", &["X"], &["conv_out"], "dup"));
        assert!(matches!(
            Graph::from_proto(&proto),
            Err(TransformError::MalformedGraph(_))
        ));
    }

    #[test]
    fn test_unproduced_graph_output_is_malformed() {
        let mut proto = make_test_graph();
        proto.output.push(vi("nowhere"));
        assert!(Graph::from_proto(&proto).is_err());
    }

    #[test]
    fn test_unnamed_nodes_get_names() {
        let mut proto = make_test_graph();
        proto.node[0].name.clear();
        proto.node[1].name.clear();
        let graph = Graph::from_proto(&proto).unwrap();
        let names: Vec<_> = graph.nodes().map(|(_, n)| n.name.clone()).collect();
        assert!(names.iter().all(|n| !n.is_empty()));
        assert_ne!(names[0], names[1]);
    }

    #[test]
    fn test_proto_round_trip() {
        let proto = make_test_graph();
        let graph = Graph::from_proto(&proto).unwrap();
        assert_eq!(graph.to_proto(), proto);
    }

    #[test]
    fn test_graph_extras_round_trip() {
        let mut proto = make_test_graph();
        proto.sparse_initializer.push(SparseTensorProto {
            values: Some(TensorProto {
                name: "S".to_string(),
                dims: vec![1],
                data_type: 1,
                float_data: vec![3.0],
                ..Default::default()
            }),
            dims: vec![4],
            ..Default::default()
        });
        proto.node.push(make_node("Add", &["Y", "S"], &["Z"], "add_sparse"));
        proto.output.push(vi("Z"));
        proto.quantization_annotation.push(TensorAnnotation {
            tensor_name: "conv_out".to_string(),
            quant_parameter_tensor_names: vec![StringStringEntryProto {
                key: "SCALE_TENSOR".to_string(),
                value: "W".to_string(),
            }],
        });
        proto.metadata_props.push(StringStringEntryProto {
            key: "stage".to_string(),
            value: "backbone".to_string(),
        });

        let graph = Graph::from_proto(&proto).unwrap();
        assert_eq!(graph.to_proto(), proto);
    }

    #[test]
    fn test_dangling_subgraph_read_is_malformed() {
        use crate::proto::attribute_proto::AttributeType;
        use crate::proto::AttributeProto;

        let mut proto = make_test_graph();
        let mut branch = make_node("If", &["X"], &["Z"], "if_0");
        branch.attribute.push(AttributeProto {
            name: "then_branch".to_string(),
            r#type: AttributeType::Graph as i32,
            g: Some(GraphProto {
                node: vec![make_node("Identity", &["nowhere"], &["r"], "id")],
                ..Default::default()
            }),
            ..Default::default()
        });
        proto.node.push(branch);

        let err = Graph::from_proto(&proto).unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn test_export_uses_topological_order() {
        let mut proto = make_test_graph();
        proto.node.reverse();
        let graph = Graph::from_proto(&proto).unwrap();
        let exported = graph.to_proto();
        assert_eq!(exported.node[0].name, "conv_0");
        assert_eq!(exported.node[1].name, "relu_0");
    }
}
