//! Attention fusion
//!
//! Replaces the scaled dot-product core matched by
//! [`AttentionPattern`](crate::pattern::AttentionPattern) with a single
//! `CustomFFAttn` node:
//!
//! ```text
//!   CustomFFAttn(q, k, v, seq_q, seq_k) -> out
//! ```
//!
//! `seq_q` and `seq_k` are int32 `[0, len]` descriptors taken from the
//! static shape of the attention scores.

use ndarray::{ArrayD, IxDyn};
use tracing::info;

use crate::error::{OnnxResult, TransformError};
use crate::graph::{AttrValue, Graph, Node};
use crate::pattern::ops::CUSTOM_ATTENTION_OP;
use crate::pattern::{MatchResult, CUSTOM_ATTENTION};
use crate::tensor::Constant;

use super::common::{boundary_input, boundary_output, replace_matched, Fusion};

/// Fuse multi-head attention cores
#[derive(Debug, Clone, Copy, Default)]
pub struct FuseAttention;

impl FuseAttention {
    /// Create the fusion
    pub fn new() -> Self {
        Self
    }
}

/// `[0, len]` as an int32 constant
fn seq_descriptor(m: &MatchResult, key: &str) -> OnnxResult<Constant> {
    let values = match m.attr(key) {
        Some(AttrValue::Ints(v)) if v.len() == 2 => v,
        _ => {
            return Err(TransformError::MissingField(format!(
                "{} {}",
                CUSTOM_ATTENTION, key
            )))
        }
    };
    let narrowed = values
        .iter()
        .map(|&v| i32::try_from(v))
        .collect::<Result<Vec<i32>, _>>()
        .map_err(|_| {
            TransformError::precondition(
                CUSTOM_ATTENTION,
                format!("{} {:?} does not fit in int32", key, values),
            )
        })?;
    ArrayD::from_shape_vec(IxDyn(&[2]), narrowed)
        .map(Constant::Int32)
        .map_err(|e| TransformError::Internal(e.to_string()))
}

impl Fusion for FuseAttention {
    fn pattern(&self) -> &'static str {
        CUSTOM_ATTENTION
    }

    fn apply(&self, graph: &mut Graph, m: &MatchResult) -> OnnxResult<()> {
        let q = boundary_input(m, 0)?;
        let k = boundary_input(m, 1)?;
        let v = boundary_input(m, 2)?;
        let output = boundary_output(m)?;
        let seq_q = seq_descriptor(m, "seq_q")?;
        let seq_k = seq_descriptor(m, "seq_k")?;

        let seq_q_name = graph.unique_name(&format!("{}_seq_q_tensor", output));
        let seq_k_name = graph.unique_name(&format!("{}_seq_k_tensor", output));
        graph.set_initializer(seq_q.to_tensor(&seq_q_name));
        graph.set_initializer(seq_k.to_tensor(&seq_k_name));

        let node = Node::new(CUSTOM_ATTENTION_OP, format!("{}_customattn", output))
            .with_inputs(&[q, k, v, seq_q_name.as_str(), seq_k_name.as_str()])
            .with_outputs(&[output]);
        replace_matched(graph, m, vec![node])?;

        info!(
            output,
            removed = m.nodes().len(),
            "Fused attention"
        );
        Ok(())
    }
}
