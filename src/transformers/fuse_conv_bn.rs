//! Conv + BatchNormalization fusion
//!
//! Folds a BatchNormalization into the Conv or ConvTranspose feeding it,
//! leaving one convolution with modified weights and an explicit bias.
//!
//! ```text
//! Conv:  y = W * x + b
//! BN:    z = γ · (y − μ) / √(σ² + ε) + β
//!
//! Fused: z = W' * x + b'
//!   W' = W · s,  b' = b · s + (β − μ · s),  s = γ / √(σ² + ε)
//! ```

use tracing::info;

use crate::error::{OnnxResult, TransformError};
use crate::graph::{AttrValue, Graph, Node};
use crate::pattern::patterns::conv_bn::DEFAULT_BN_EPSILON;
use crate::pattern::{MatchResult, CONV_BN, CONV_TRANSPOSE_BN};

use super::common::{
    boundary_input, boundary_output, matched_node, replace_matched, require_constant, Fusion,
};
use super::fold::{fold_batch_norm, BatchNormParams, ChannelLayout};

/// Which convolution the fold targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConvKind {
    Conv,
    ConvTranspose,
}

/// Fold BatchNormalization into a preceding convolution
#[derive(Debug, Clone, Copy)]
pub struct FuseConvBn {
    kind: ConvKind,
}

impl FuseConvBn {
    /// Fusion for [`CONV_BN`] matches
    pub fn conv() -> Self {
        Self {
            kind: ConvKind::Conv,
        }
    }

    /// Fusion for [`CONV_TRANSPOSE_BN`] matches
    pub fn conv_transpose() -> Self {
        Self {
            kind: ConvKind::ConvTranspose,
        }
    }

    fn layout(&self, groups: usize) -> ChannelLayout {
        match self.kind {
            ConvKind::Conv => ChannelLayout::OutputFirst,
            ConvKind::ConvTranspose => ChannelLayout::Transposed { groups },
        }
    }
}

impl Fusion for FuseConvBn {
    fn pattern(&self) -> &'static str {
        match self.kind {
            ConvKind::Conv => CONV_BN,
            ConvKind::ConvTranspose => CONV_TRANSPOSE_BN,
        }
    }

    fn apply(&self, graph: &mut Graph, m: &MatchResult) -> OnnxResult<()> {
        let pattern = self.pattern();
        let precondition = |e: TransformError| TransformError::precondition(pattern, e.to_string());

        let conv = matched_node(graph, m, 0)?;
        let bn = matched_node(graph, m, 1)?;
        let x = boundary_input(m, 0)?;
        let weight_name = boundary_input(m, 1)?;
        let bias_name = m.inputs().get(2).filter(|s| !s.is_empty());
        let output = boundary_output(m)?;

        // ====================================================================
        // Fold (no mutation yet)
        // ====================================================================

        let weight = require_constant(graph, pattern, weight_name)?;
        let bias = bias_name
            .map(|b| require_constant(graph, pattern, b))
            .transpose()?;
        let mut bn_inputs = Vec::with_capacity(4);
        for slot in 1..=4 {
            let name = bn.input(slot).ok_or_else(|| {
                TransformError::precondition(
                    pattern,
                    format!("'{}' is missing input {}", bn.name, slot),
                )
            })?;
            bn_inputs.push(require_constant(graph, pattern, name)?);
        }

        let epsilon = match m.attr("epsilon") {
            Some(AttrValue::Float(eps)) => *eps,
            _ => bn.attr_float("epsilon").unwrap_or(DEFAULT_BN_EPSILON),
        };
        let group = match m.attr("group") {
            Some(AttrValue::Int(g)) => *g,
            _ => conv.attr_int("group").unwrap_or(1),
        };
        if group < 1 {
            return Err(TransformError::precondition(
                pattern,
                format!("'{}' has group {}", conv.name, group),
            ));
        }

        let params = BatchNormParams::from_constants(
            &bn_inputs[0],
            &bn_inputs[1],
            &bn_inputs[2],
            &bn_inputs[3],
            epsilon,
        )
        .map_err(precondition)?;
        let folded = fold_batch_norm(&weight, bias.as_ref(), &params, self.layout(group as usize))
            .map_err(precondition)?;

        // ====================================================================
        // Rewrite
        // ====================================================================

        let fused_weight = graph.unique_name(&format!("{}_fused", weight_name));
        let fused_bias = graph.unique_name(&match bias_name {
            Some(b) => format!("{}_fused", b),
            None => format!("{}_bias_fused", conv.name),
        });
        let mut fused = Node::new(conv.op_type.clone(), format!("{}_fused", conv.name))
            .with_domain(&conv.domain)
            .with_inputs(&[x, fused_weight.as_str(), fused_bias.as_str()])
            .with_outputs(&[output]);
        fused.attributes = conv.attributes.clone();

        info!(
            pattern,
            conv = %conv.name,
            bn = %bn.name,
            channels = params.channels(),
            "Folded BatchNormalization"
        );

        graph.set_initializer(folded.weight.to_tensor(&fused_weight));
        graph.set_initializer(folded.bias.to_tensor(&fused_bias));
        replace_matched(graph, m, vec![fused])?;
        Ok(())
    }
}
