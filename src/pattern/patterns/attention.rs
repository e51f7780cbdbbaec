//! Multi-head attention core
//!
//! ```text
//! q ── Reshape ── Transpose ── Div(c) ─┐
//!                                      MatMul ── Softmax ── MatMul ── Transpose ── Reshape ── out
//! k ── Reshape ── Transpose ───────────┘                    │
//! v ── Reshape ── Transpose ────────────────────────────────┘
//! ```
//!
//! The match covers everything between the three head-split `Reshape`s
//! and the final merge `Reshape`, which both stay in the graph.

use tracing::warn;

use crate::graph::{AttrValue, Graph, NodeId};
use crate::pattern::constraint::{Constraint, OpTypeConstraint};
use crate::pattern::matcher::{MatchResult, Pattern};
use crate::pattern::ops;
use crate::pattern::trace::{Step, Tracer};

use super::{is_self_contained, sole_output};

const STEPS: &[Step] = &[
    Step::pred(0, &["MatMul"]),               // 1: scores
    Step::pred(1, &["Div", "Transpose"]),     // 2: scaled q, 3: k
    Step::pred(3, &["Reshape"]),              // 4
    Step::succ(0, &["MatMul"]),               // 5: context
    Step::pred(5, &["Softmax", "Transpose"]), // 6, 7: v
    Step::Same(0, 6),
    Step::pred(7, &["Reshape"]),              // 8
    Step::succ(5, &["Transpose"]),            // 9: head merge
    Step::succ(9, &["Reshape"]),              // 10
];

/// Scaled dot-product attention over split heads, anchored at `Softmax`
#[derive(Debug)]
pub struct AttentionPattern {
    constraints: Vec<Box<dyn Constraint>>,
}

impl AttentionPattern {
    /// Create the pattern
    pub fn new() -> Self {
        Self {
            constraints: vec![Box::new(OpTypeConstraint::new("Softmax"))],
        }
    }
}

impl Default for AttentionPattern {
    fn default() -> Self {
        Self::new()
    }
}

impl Pattern for AttentionPattern {
    fn name(&self) -> &str {
        ops::CUSTOM_ATTENTION
    }

    fn priority(&self) -> i32 {
        ops::DEFAULT_PRIORITY
    }

    fn constraints(&self) -> &[Box<dyn Constraint>] {
        &self.constraints
    }

    fn trace(&self, graph: &Graph, anchor: NodeId) -> Option<MatchResult> {
        let slots = Tracer::new(graph, anchor).run(STEPS)?;
        let [softmax, pre_mm, div, k_trans, _, post_mm, _, v_trans, _, post_tr, _] = slots[..]
        else {
            return None;
        };

        // The divisor may be a Constant node, so the q branch is followed
        // through input 0 instead of by neighbor set.
        let div_node = graph.node(div)?;
        if div_node.inputs.len() != 2 || !graph.is_constant(div_node.input(1)?) {
            return None;
        }
        let q_trans = graph.producer_of(div_node.input(0)?)?;
        let q_trans_node = graph.node(q_trans)?;
        if !q_trans_node.is_op("Transpose") {
            return None;
        }
        let q_split = graph.producer_of(q_trans_node.input(0)?)?;
        if !graph.node(q_split)?.is_op("Reshape") {
            return None;
        }

        let softmax_out = sole_output(graph, softmax)?;
        let scores = sole_output(graph, pre_mm)?;
        let scaled_q = sole_output(graph, div)?;
        let k_t = sole_output(graph, k_trans)?;
        let v_t = sole_output(graph, v_trans)?;
        let context = sole_output(graph, post_mm)?;
        if graph.node(softmax)?.input(0) != Some(scores.as_str())
            || graph.node(pre_mm)?.inputs != [scaled_q.as_str(), k_t.as_str()]
            || graph.node(post_mm)?.inputs != [softmax_out.as_str(), v_t.as_str()]
            || graph.node(post_tr)?.input(0) != Some(context.as_str())
        {
            return None;
        }

        let (seq_q, seq_k) = match graph.shape_of(&scores).as_deref() {
            Some([_, Some(q), Some(k)]) => (*q, *k),
            Some(dims) if dims.len() != 3 => return None,
            _ => {
                warn!(
                    tensor = %scores,
                    "Attention scores need a static rank-3 shape; skipping"
                );
                return None;
            }
        };

        let q = q_trans_node.input(0)?.to_string();
        let k = graph.node(k_trans)?.input(0)?.to_string();
        let v = graph.node(v_trans)?.input(0)?.to_string();
        let out = sole_output(graph, post_tr)?;

        let nodes = vec![softmax, pre_mm, div, q_trans, k_trans, post_mm, v_trans, post_tr];
        let outputs = vec![out];
        if !is_self_contained(graph, &nodes, &outputs) {
            return None;
        }

        Some(
            MatchResult::new(self, nodes, vec![q, k, v], outputs)
                .with_attr("seq_q", AttrValue::Ints(vec![0, seq_q]))
                .with_attr("seq_k", AttrValue::Ints(vec![0, seq_k])),
        )
    }
}
