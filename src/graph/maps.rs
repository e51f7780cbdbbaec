//! Graph map types
//!
//! The dependency index behind [`Graph`](super::Graph). Both tensor maps
//! are keyed by tensor name and point into the node arena by [`NodeId`].

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::proto::{TensorProto, ValueInfoProto};

use super::node::{Node, NodeId};

/// Type alias for producer map: tensor_name → producing node
pub type ProducerMap = FxHashMap<String, NodeId>;

/// Type alias for consumer map: tensor_name → consuming nodes
/// SmallVec optimized for common case of 1-4 consumers
pub type ConsumerMap = FxHashMap<String, SmallVec<[NodeId; 4]>>;

/// Type alias for node name map: node_name → node
pub type NameMap = FxHashMap<String, NodeId>;

/// Type alias for initializer map: name → TensorProto (order preserved)
pub type InitializerMap = IndexMap<String, TensorProto>;

/// Type alias for value info map: name → ValueInfoProto (order preserved)
pub type ValueInfoMap = IndexMap<String, ValueInfoProto>;

/// Record `node`'s inputs in the consumer map
///
/// Tensors read by subgraph attributes count as inputs. A node that reads
/// the same tensor twice is listed once.
pub(crate) fn link_inputs(consumers: &mut ConsumerMap, id: NodeId, node: &Node) {
    for input in node.consumed_tensors() {
        let list = consumers.entry(input.to_string()).or_default();
        if !list.contains(&id) {
            list.push(id);
        }
    }
}

/// Remove `node` from the consumer lists of its inputs
pub(crate) fn unlink_inputs(consumers: &mut ConsumerMap, id: NodeId, node: &Node) {
    for input in node.consumed_tensors() {
        if let Some(list) = consumers.get_mut(input) {
            list.retain(|c| *c != id);
            if list.is_empty() {
                consumers.remove(input);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_input_linked_once() {
        let mut consumers = ConsumerMap::default();
        let square = Node::new("Mul", "sq").with_inputs(&["x", "x"]).with_outputs(&["y"]);
        link_inputs(&mut consumers, NodeId(0), &square);
        assert_eq!(consumers["x"].as_slice(), &[NodeId(0)]);

        unlink_inputs(&mut consumers, NodeId(0), &square);
        assert!(!consumers.contains_key("x"));
    }

    #[test]
    fn test_omitted_inputs_ignored() {
        let mut consumers = ConsumerMap::default();
        let conv = Node::new("Conv", "c").with_inputs(&["x", "w", ""]);
        link_inputs(&mut consumers, NodeId(3), &conv);
        assert_eq!(consumers.len(), 2);
        assert!(!consumers.contains_key(""));
    }

    #[test]
    fn test_subgraph_reads_linked() {
        use crate::graph::AttrValue;
        use crate::proto::attribute_proto::AttributeType;
        use crate::proto::extensions::make_node;
        use crate::proto::{AttributeProto, GraphProto};

        let body = GraphProto {
            node: vec![make_node("Identity", &["t"], &["r"], "id")],
            ..Default::default()
        };
        let attr = AttributeProto {
            name: "then_branch".to_string(),
            r#type: AttributeType::Graph as i32,
            g: Some(body),
            ..Default::default()
        };
        let branch = Node::new("If", "if_0")
            .with_inputs(&["cond"])
            .with_outputs(&["y"])
            .with_attr("then_branch", AttrValue::from_proto(&attr));

        let mut consumers = ConsumerMap::default();
        link_inputs(&mut consumers, NodeId(1), &branch);
        assert_eq!(consumers["t"].as_slice(), &[NodeId(1)]);
        assert_eq!(consumers["cond"].as_slice(), &[NodeId(1)]);

        unlink_inputs(&mut consumers, NodeId(1), &branch);
        assert!(consumers.is_empty());
    }
}
