//! Built-in fusion patterns
//!
//! | Pattern | Anchor | Matched nodes |
//! |---------|--------|---------------|
//! | [`ConvBnPattern`] | Conv | Conv, BatchNormalization |
//! | [`ConvTransposeBnPattern`] | ConvTranspose | ConvTranspose, BatchNormalization |
//! | [`LayerNormPattern`] | ReduceMean | 9-node mean/variance decomposition |
//! | [`AttentionPattern`] | Softmax | 8-node scaled dot-product core |
//! | [`LogDivPattern`] | Log | Div, Log |

pub mod attention;
pub mod conv_bn;
pub mod layer_norm;
pub mod log_div;

pub use attention::AttentionPattern;
pub use conv_bn::{ConvBnPattern, ConvTransposeBnPattern};
pub use layer_norm::LayerNormPattern;
pub use log_div::LogDivPattern;

use rustc_hash::FxHashSet;

use crate::graph::{Graph, NodeId};

/// Whether removing `nodes` leaves no dangling reference.
///
/// Every output of a matched node other than the boundary `outputs` must
/// be read only by matched nodes and must not be a graph output. Reads from
/// inside another node's subgraph count as reads by that node.
pub(crate) fn is_self_contained(graph: &Graph, nodes: &[NodeId], outputs: &[String]) -> bool {
    let set: FxHashSet<NodeId> = nodes.iter().copied().collect();
    nodes.iter().all(|&id| {
        let Some(node) = graph.node(id) else {
            return false;
        };
        node.live_outputs()
            .filter(|out| !outputs.iter().any(|b| b == out))
            .all(|out| {
                !graph.is_graph_output(out)
                    && graph.consumers_of(out).iter().all(|c| set.contains(c))
            })
    })
}

/// Single non-empty output of a node that must have exactly one
pub(crate) fn sole_output(graph: &Graph, id: NodeId) -> Option<String> {
    let node = graph.node(id)?;
    if node.outputs.len() != 1 {
        return None;
    }
    node.output(0).map(str::to_string)
}

/// Scalar value of a constant tensor
pub(crate) fn scalar_constant(graph: &Graph, name: &str) -> Option<f64> {
    graph.constant_value(name)?.scalar_f64()
}
