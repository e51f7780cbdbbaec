//! Decomposed layer normalization
//!
//! ```text
//!        ┌── ReduceMean ──┐      ┌─ Pow ── ReduceMean ── Add(ε) ── Sqrt ─┐
//!   X ───┤                ├ Sub ─┤                                        ├ Div ── Mul(γ) ── Add(β) ── Y
//!        └────────────────┘      └────────────────────────────────────────┘
//! ```
//!
//! The trace starts at the mean reduction feeding `Sub`. The variance
//! reduction also satisfies the anchor constraint but fails on its first
//! step, so each template is matched exactly once.

use crate::graph::{AttrValue, Graph, Node, NodeId};
use crate::pattern::constraint::{Constraint, OpTypeConstraint};
use crate::pattern::matcher::{MatchResult, Pattern};
use crate::pattern::ops;
use crate::pattern::trace::{Step, Tracer};

use super::{is_self_contained, scalar_constant, sole_output};

const STEPS: &[Step] = &[
    Step::succ(0, &["Sub"]),          // 1
    Step::succ(1, &["Pow", "Div"]),   // 2, 3
    Step::succ(2, &["ReduceMean"]),   // 4
    Step::succ(4, &["Add"]),          // 5
    Step::succ(5, &["Sqrt"]),         // 6
    Step::succ(6, &["Div"]),          // 7
    Step::Same(3, 7),
    Step::succ(3, &["Mul"]),          // 8
    Step::succ(8, &["Add"]),          // 9
];

/// Mean/variance decomposition of LayerNormalization
#[derive(Debug)]
pub struct LayerNormPattern {
    constraints: Vec<Box<dyn Constraint>>,
}

impl LayerNormPattern {
    /// Create the pattern
    pub fn new() -> Self {
        Self {
            constraints: vec![Box::new(OpTypeConstraint::new("ReduceMean"))],
        }
    }
}

impl Default for LayerNormPattern {
    fn default() -> Self {
        Self::new()
    }
}

impl Pattern for LayerNormPattern {
    fn name(&self) -> &str {
        ops::LAYER_NORM
    }

    fn priority(&self) -> i32 {
        ops::DEFAULT_PRIORITY
    }

    fn constraints(&self) -> &[Box<dyn Constraint>] {
        &self.constraints
    }

    fn trace(&self, graph: &Graph, anchor: NodeId) -> Option<MatchResult> {
        let slots = Tracer::new(graph, anchor).run(STEPS)?;
        let [rm1, sub, pow, div, rm2, add_eps, sqrt, _, mul, add_bias] = slots[..] else {
            return None;
        };
        let node = |id| graph.node(id);

        let rm1_out = sole_output(graph, rm1)?;
        let sub_out = sole_output(graph, sub)?;
        let pow_out = sole_output(graph, pow)?;
        let rm2_out = sole_output(graph, rm2)?;
        let eps_out = sole_output(graph, add_eps)?;
        let sqrt_out = sole_output(graph, sqrt)?;
        let div_out = sole_output(graph, div)?;
        let mul_out = sole_output(graph, mul)?;
        let y = sole_output(graph, add_bias)?;

        let x = node(rm1)?.input(0)?.to_string();
        if node(sub)?.inputs != [x.as_str(), rm1_out.as_str()] {
            return None;
        }

        let pow_node = node(pow)?;
        if pow_node.input(0) != Some(sub_out.as_str()) || pow_node.inputs.len() != 2 {
            return None;
        }
        if scalar_constant(graph, pow_node.input(1)?) != Some(2.0) {
            return None;
        }
        if node(rm2)?.input(0) != Some(pow_out.as_str()) {
            return None;
        }
        if node(sqrt)?.input(0) != Some(eps_out.as_str()) {
            return None;
        }
        if node(div)?.inputs != [sub_out.as_str(), sqrt_out.as_str()] {
            return None;
        }

        let eps_name = other_operand(node(add_eps)?, &rm2_out)?;
        let epsilon = scalar_constant(graph, eps_name)?;
        let scale = other_operand(node(mul)?, &div_out)?.to_string();
        let bias = other_operand(node(add_bias)?, &mul_out)?.to_string();

        let axes = reduce_axes(graph, node(rm1)?)?;
        if reduce_axes(graph, node(rm2)?)? != axes {
            return None;
        }
        let rank = graph
            .shape_of(&x)
            .or_else(|| graph.shape_of(&div_out))
            .map(|s| s.len());
        let axis = trailing_axis(&axes, rank)?;

        let nodes = vec![rm1, sub, pow, rm2, add_eps, sqrt, div, mul, add_bias];
        let outputs = vec![y];
        if !is_self_contained(graph, &nodes, &outputs) {
            return None;
        }

        Some(
            MatchResult::new(self, nodes, vec![x, scale, bias], outputs)
                .with_attr("epsilon", AttrValue::Float(epsilon as f32))
                .with_attr("axis", AttrValue::Int(axis)),
        )
    }
}

/// For a binary node reading `known`, the operand that is not `known`
fn other_operand<'n>(node: &'n Node, known: &str) -> Option<&'n str> {
    match node.inputs.as_slice() {
        [a, b] if a == known && b != known => Some(b),
        [a, b] if b == known && a != known => Some(a),
        _ => None,
    }
}

/// Reduction axes of a keepdims ReduceMean, from the attribute or a
/// constant second input
fn reduce_axes(graph: &Graph, node: &Node) -> Option<Vec<i64>> {
    if node.attr_int("keepdims").unwrap_or(1) == 0 {
        return None;
    }
    if let Some(axes) = node.attr_ints("axes") {
        return Some(axes.to_vec());
    }
    let axes = graph.constant_value(node.input(1)?)?.to_i64_vec()?;
    Some(axes)
}

/// First normalized axis when `axes` are the trailing dimensions.
///
/// With an unknown rank only negative axes can be placed.
fn trailing_axis(axes: &[i64], rank: Option<usize>) -> Option<i64> {
    if axes.is_empty() {
        return None;
    }
    let k = axes.len() as i64;
    let mut norm: Vec<i64> = match rank {
        Some(r) => {
            let r = r as i64;
            axes.iter()
                .map(|&a| if a < 0 { a + r } else { a })
                .collect()
        }
        None if axes.iter().all(|&a| a < 0) => axes.to_vec(),
        None => return None,
    };
    norm.sort_unstable();
    norm.dedup();

    let end = match rank {
        Some(r) => r as i64,
        None => 0,
    };
    let expected: Vec<i64> = (end - k..end).collect();
    if norm != expected || expected.first().map_or(true, |&a| rank.is_some() && a < 0) {
        return None;
    }
    Some(end - k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::patterns::testing::*;

    #[test]
    fn test_layer_norm_match() {
        let ln = layer_norm_graph(&[-1], 2.0);
        let m = LayerNormPattern::new().match_node(&ln.graph, ln.rm1).unwrap();
        assert_eq!(m.nodes().len(), 9);
        assert_eq!(m.anchor(), Some(ln.rm1));
        assert_eq!(m.inputs(), &["x", "gamma", "beta"]);
        assert_eq!(m.outputs(), &["y"]);
        assert_eq!(m.attr("epsilon"), Some(&AttrValue::Float(1e-5)));
        assert_eq!(m.attr("axis"), Some(&AttrValue::Int(2)));
    }

    #[test]
    fn test_variance_reduction_does_not_anchor() {
        let ln = layer_norm_graph(&[-1], 2.0);
        assert!(LayerNormPattern::new().match_node(&ln.graph, ln.rm2).is_none());
    }

    #[test]
    fn test_two_trailing_axes() {
        let ln = layer_norm_graph(&[1, 2], 2.0);
        let m = LayerNormPattern::new().match_node(&ln.graph, ln.rm1).unwrap();
        assert_eq!(m.attr("axis"), Some(&AttrValue::Int(1)));
    }

    #[test]
    fn test_leading_axis_rejected() {
        let ln = layer_norm_graph(&[1], 2.0);
        assert!(LayerNormPattern::new().match_node(&ln.graph, ln.rm1).is_none());
    }

    #[test]
    fn test_wrong_exponent_rejected() {
        let ln = layer_norm_graph(&[-1], 3.0);
        assert!(LayerNormPattern::new().match_node(&ln.graph, ln.rm1).is_none());
    }

    #[test]
    fn test_axes_from_constant_input() {
        let mut g = Graph::new("ln18");
        input(&mut g, "x", &[2, 8]);
        output(&mut g, "y", &[2, 8]);
        i64_const(&mut g, "axes", &[1], vec![-1]);
        f32_const(&mut g, "two", &[], vec![2.0]);
        f32_const(&mut g, "eps", &[], vec![1e-6]);
        f32_const(&mut g, "gamma", &[8], vec![1.0; 8]);
        f32_const(&mut g, "beta", &[8], vec![0.0; 8]);
        let rm1 = node(&mut g, "ReduceMean", "rm1", &["x", "axes"], &["mean"]);
        node(&mut g, "Sub", "sub", &["x", "mean"], &["d"]);
        node(&mut g, "Pow", "pow", &["d", "two"], &["d2"]);
        node(&mut g, "ReduceMean", "rm2", &["d2", "axes"], &["var"]);
        node(&mut g, "Add", "add_eps", &["eps", "var"], &["ve"]);
        node(&mut g, "Sqrt", "sqrt", &["ve"], &["std"]);
        node(&mut g, "Div", "div", &["d", "std"], &["n"]);
        node(&mut g, "Mul", "mul", &["n", "gamma"], &["s"]);
        node(&mut g, "Add", "add_bias", &["beta", "s"], &["y"]);

        let m = LayerNormPattern::new().match_node(&g, rm1).unwrap();
        assert_eq!(m.attr("axis"), Some(&AttrValue::Int(1)));
        assert_eq!(m.attr("epsilon"), Some(&AttrValue::Float(1e-6)));
    }

    #[test]
    fn test_missing_axes_rejected() {
        let mut ln = layer_norm_graph(&[-1], 2.0);
        let rm1 = ln.graph.nodes[ln.rm1.index()].as_mut().unwrap();
        rm1.attributes.shift_remove("axes");
        assert!(LayerNormPattern::new().match_node(&ln.graph, ln.rm1).is_none());
    }

    #[test]
    fn test_intermediate_escape_rejected() {
        let mut ln = layer_norm_graph(&[-1], 2.0);
        output(&mut ln.graph, "std", &[2, 4, 1]);
        assert!(LayerNormPattern::new().match_node(&ln.graph, ln.rm1).is_none());
    }

    #[test]
    fn test_trailing_axis() {
        assert_eq!(trailing_axis(&[-1], Some(3)), Some(2));
        assert_eq!(trailing_axis(&[2, 1], Some(3)), Some(1));
        assert_eq!(trailing_axis(&[-2, -1], None), Some(-2));
        assert_eq!(trailing_axis(&[0], Some(3)), None);
        assert_eq!(trailing_axis(&[2], None), None);
        assert_eq!(trailing_axis(&[], Some(3)), None);
        assert_eq!(trailing_axis(&[-1, -3], Some(3)), None);
    }
}
