//! Weighted layer followed by BatchNormalization
//!
//! ```text
//! X ── Conv(W, B) ── BatchNormalization(γ, β, μ, σ²) ── Y
//! ```
//!
//! Both variants match a 2-node chain where the convolution's only output
//! feeds only the normalization. Weight and normalization parameters must
//! be constants so the rewrite can fold them.

use crate::graph::{AttrValue, Graph, NodeId};
use crate::pattern::constraint::{Constraint, OpTypeConstraint};
use crate::pattern::matcher::{MatchResult, Pattern};
use crate::pattern::ops;

use super::{is_self_contained, sole_output};

/// BatchNormalization epsilon when the attribute is absent
pub const DEFAULT_BN_EPSILON: f32 = 1e-5;

/// Conv + BatchNormalization
#[derive(Debug)]
pub struct ConvBnPattern {
    constraints: Vec<Box<dyn Constraint>>,
}

impl ConvBnPattern {
    /// Create the pattern
    pub fn new() -> Self {
        Self {
            constraints: vec![Box::new(OpTypeConstraint::new("Conv"))],
        }
    }
}

impl Default for ConvBnPattern {
    fn default() -> Self {
        Self::new()
    }
}

impl Pattern for ConvBnPattern {
    fn name(&self) -> &str {
        ops::CONV_BN
    }

    fn priority(&self) -> i32 {
        ops::DEFAULT_PRIORITY
    }

    fn constraints(&self) -> &[Box<dyn Constraint>] {
        &self.constraints
    }

    fn trace(&self, graph: &Graph, anchor: NodeId) -> Option<MatchResult> {
        trace_weighted_bn(self, graph, anchor)
    }
}

/// ConvTranspose + BatchNormalization
#[derive(Debug)]
pub struct ConvTransposeBnPattern {
    constraints: Vec<Box<dyn Constraint>>,
}

impl ConvTransposeBnPattern {
    /// Create the pattern
    pub fn new() -> Self {
        Self {
            constraints: vec![Box::new(OpTypeConstraint::new("ConvTranspose"))],
        }
    }
}

impl Default for ConvTransposeBnPattern {
    fn default() -> Self {
        Self::new()
    }
}

impl Pattern for ConvTransposeBnPattern {
    fn name(&self) -> &str {
        ops::CONV_TRANSPOSE_BN
    }

    fn priority(&self) -> i32 {
        ops::DEFAULT_PRIORITY
    }

    fn constraints(&self) -> &[Box<dyn Constraint>] {
        &self.constraints
    }

    fn trace(&self, graph: &Graph, anchor: NodeId) -> Option<MatchResult> {
        trace_weighted_bn(self, graph, anchor)
    }
}

fn trace_weighted_bn(pattern: &dyn Pattern, graph: &Graph, anchor: NodeId) -> Option<MatchResult> {
    let conv = graph.node(anchor)?;
    let conv_out = sole_output(graph, anchor)?;

    let consumers = graph.consumers_of(&conv_out);
    if consumers.len() != 1 {
        return None;
    }
    let bn_id = consumers[0];
    let bn = graph.node(bn_id)?;
    if !bn.is_op("BatchNormalization") || bn.input(0) != Some(conv_out.as_str()) {
        return None;
    }
    // Training-mode normalization also emits running statistics.
    let bn_out = sole_output(graph, bn_id)?;

    conv.input(0)?;
    let weight = conv.input(1)?;
    if !graph.is_constant(weight) {
        return None;
    }
    if let Some(bias) = conv.input(2) {
        if !graph.is_constant(bias) {
            return None;
        }
    }
    for slot in 1..=4 {
        if !graph.is_constant(bn.input(slot)?) {
            return None;
        }
    }

    let nodes = vec![anchor, bn_id];
    let outputs = vec![bn_out];
    if !is_self_contained(graph, &nodes, &outputs) {
        return None;
    }

    let epsilon = bn.attr_float("epsilon").unwrap_or(DEFAULT_BN_EPSILON);
    let group = conv.attr_int("group").unwrap_or(1);
    Some(
        MatchResult::new(pattern, nodes, conv.inputs.clone(), outputs)
            .with_attr("epsilon", AttrValue::Float(epsilon))
            .with_attr("group", AttrValue::Int(group)),
    )
}
