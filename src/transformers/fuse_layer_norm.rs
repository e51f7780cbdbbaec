//! LayerNorm fusion
//!
//! Collapses the nine-node mean/variance decomposition matched by
//! [`LayerNormPattern`](crate::pattern::LayerNormPattern) into one node:
//!
//! ```text
//!   NvLayerNormPlugin(x, scale, bias, epsilon)          (Plugin)
//!   LayerNormalization(x, scale, bias; axis, epsilon)   (Onnx)
//! ```
//!
//! The plugin form takes epsilon as a scalar f32 operand; the standard form
//! needs opset 17 or newer.

use std::fmt;
use std::str::FromStr;

use ndarray::{ArrayD, IxDyn};
use tracing::info;

use crate::error::{OnnxResult, TransformError};
use crate::graph::{AttrValue, Graph, Node};
use crate::pattern::ops::{LAYER_NORM_ONNX_OP, LAYER_NORM_PLUGIN_OP};
use crate::pattern::{MatchResult, LAYER_NORM};
use crate::tensor::Constant;

use super::common::{boundary_input, boundary_output, replace_matched, Fusion};

/// Operator emitted for a fused layer norm
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LayerNormTarget {
    /// `NvLayerNormPlugin` with epsilon as a fourth operand
    #[default]
    Plugin,
    /// Standard `LayerNormalization` with `axis` and `epsilon` attributes
    Onnx,
}

impl LayerNormTarget {
    /// Operator type of the emitted node
    pub fn op_type(&self) -> &'static str {
        match self {
            Self::Plugin => LAYER_NORM_PLUGIN_OP,
            Self::Onnx => LAYER_NORM_ONNX_OP,
        }
    }
}

impl fmt::Display for LayerNormTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plugin => write!(f, "plugin"),
            Self::Onnx => write!(f, "onnx"),
        }
    }
}

impl FromStr for LayerNormTarget {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plugin" => Ok(Self::Plugin),
            "onnx" => Ok(Self::Onnx),
            other => Err(TransformError::Internal(format!(
                "unknown layer norm target '{}'",
                other
            ))),
        }
    }
}

/// Fuse decomposed LayerNorm subgraphs
#[derive(Debug, Clone, Copy, Default)]
pub struct FuseLayerNorm {
    target: LayerNormTarget,
}

impl FuseLayerNorm {
    /// Fusion emitting `target`
    pub fn new(target: LayerNormTarget) -> Self {
        Self { target }
    }

    /// Operator this fusion emits
    pub fn target(&self) -> LayerNormTarget {
        self.target
    }
}

/// Elements per normalized slice, when every dimension from `axis` on is known
fn normalized_size(graph: &Graph, x: &str, axis: i64) -> Option<usize> {
    let dims = graph.shape_of(x)?;
    let rank = dims.len() as i64;
    let start = if axis < 0 { axis + rank } else { axis };
    if !(0..rank).contains(&start) {
        return None;
    }
    dims[start as usize..]
        .iter()
        .try_fold(1usize, |acc, d| d.filter(|&d| d > 0).map(|d| acc * d as usize))
}

impl Fusion for FuseLayerNorm {
    fn pattern(&self) -> &'static str {
        LAYER_NORM
    }

    fn apply(&self, graph: &mut Graph, m: &MatchResult) -> OnnxResult<()> {
        let x = boundary_input(m, 0)?;
        let scale = boundary_input(m, 1)?;
        let bias = boundary_input(m, 2)?;
        let output = boundary_output(m)?;

        let epsilon = match m.attr("epsilon") {
            Some(AttrValue::Float(eps)) => *eps,
            _ => return Err(TransformError::MissingField(format!("{} epsilon", LAYER_NORM))),
        };
        let axis = match m.attr("axis") {
            Some(AttrValue::Int(axis)) => *axis,
            _ => return Err(TransformError::MissingField(format!("{} axis", LAYER_NORM))),
        };

        if let Some(expected) = normalized_size(graph, x, axis) {
            for operand in [scale, bias] {
                if let Some(c) = graph.constant_value(operand) {
                    if c.len() != expected {
                        return Err(TransformError::precondition(
                            LAYER_NORM,
                            format!(
                                "'{}' has {} elements, normalized slice of '{}' has {}",
                                operand,
                                c.len(),
                                x,
                                expected
                            ),
                        ));
                    }
                }
            }
        }

        let name = format!("{}_LayerNorm", output);
        let node = match self.target {
            LayerNormTarget::Plugin => {
                let eps_name = graph.unique_name(&format!("{}_ln_eps", x));
                let eps = Constant::Float(ArrayD::from_elem(IxDyn(&[]), epsilon));
                graph.set_initializer(eps.to_tensor(&eps_name));
                Node::new(self.target.op_type(), name)
                    .with_inputs(&[x, scale, bias, eps_name.as_str()])
                    .with_outputs(&[output])
            }
            LayerNormTarget::Onnx => Node::new(self.target.op_type(), name)
                .with_inputs(&[x, scale, bias])
                .with_outputs(&[output])
                .with_attr("axis", axis)
                .with_attr("epsilon", epsilon),
        };

        replace_matched(graph, m, vec![node])?;
        info!(
            kind = %self.target,
            output,
            epsilon,
            axis,
            "Fused LayerNorm"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::patterns::testing::*;
    use crate::pattern::{LayerNormPattern, Pattern};

    fn fused(target: LayerNormTarget) -> Graph {
        let Ln { mut graph, rm1, .. } = layer_norm_graph(&[-1], 2.0);
        let m = LayerNormPattern::new().match_node(&graph, rm1).unwrap();
        FuseLayerNorm::new(target).apply(&mut graph, &m).unwrap();
        graph.cleanup();
        graph.resort();
        graph
    }

    #[test]
    fn test_plugin_target() {
        let g = fused(LayerNormTarget::Plugin);
        assert_eq!(g.node_count(), 1);
        let node = g.node(g.producer_of("y").unwrap()).unwrap();
        assert_eq!(node.op_type, "NvLayerNormPlugin");
        assert_eq!(node.name, "y_LayerNorm");
        assert_eq!(node.inputs, vec!["x", "gamma", "beta", "x_ln_eps"]);
        let eps = g.constant_value("x_ln_eps").unwrap();
        assert!(eps.shape().is_empty());
        assert!((eps.scalar_f64().unwrap() - 1e-5).abs() < 1e-9);

        // The decomposition's own constants are gone.
        assert!(g.initializer("two").is_none());
        assert!(g.initializer("eps").is_none());
    }

    #[test]
    fn test_onnx_target() {
        let g = fused(LayerNormTarget::Onnx);
        let node = g.node(g.producer_of("y").unwrap()).unwrap();
        assert_eq!(node.op_type, "LayerNormalization");
        assert_eq!(node.inputs, vec!["x", "gamma", "beta"]);
        assert_eq!(node.attr_int("axis"), Some(2));
        assert_eq!(node.attr_float("epsilon"), Some(1e-5));
    }

    #[test]
    fn test_scale_length_mismatch_leaves_graph_untouched() {
        let Ln { mut graph, rm1, .. } = layer_norm_graph(&[-1], 2.0);
        f32_const(&mut graph, "gamma", &[6], vec![1.0; 6]);
        let m = LayerNormPattern::new().match_node(&graph, rm1).unwrap();
        let before = graph.to_proto();

        let err = FuseLayerNorm::default().apply(&mut graph, &m).unwrap_err();
        assert!(matches!(err, TransformError::FusionPrecondition { .. }));
        assert_eq!(graph.to_proto(), before);
    }

    #[test]
    fn test_normalized_size() {
        let Ln { graph, .. } = layer_norm_graph(&[-1], 2.0);
        assert_eq!(normalized_size(&graph, "x", -1), Some(8));
        assert_eq!(normalized_size(&graph, "x", 1), Some(32));
        assert_eq!(normalized_size(&graph, "x", 3), None);
        assert_eq!(normalized_size(&graph, "nope", 0), None);
    }

    #[test]
    fn test_target_parse() {
        assert_eq!("ONNX".parse::<LayerNormTarget>().unwrap(), LayerNormTarget::Onnx);
        assert_eq!(LayerNormTarget::default().to_string(), "plugin");
        assert!("trt".parse::<LayerNormTarget>().is_err());
    }
}
