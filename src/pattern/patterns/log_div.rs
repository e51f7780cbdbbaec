//! `Log(a / b)` with two runtime operands
//!
//! Dividing first can overflow or hit zero where `Log(a) - Log(b)` stays
//! finite. Constant operands are assumed to be folded elsewhere.

use crate::graph::{Graph, NodeId};
use crate::pattern::constraint::{Constraint, OpTypeConstraint};
use crate::pattern::matcher::{MatchResult, Pattern};
use crate::pattern::ops;
use crate::pattern::trace::{Step, Tracer};

use super::{is_self_contained, sole_output};

const STEPS: &[Step] = &[Step::pred(0, &["Div"])];

/// Div followed by Log, anchored at `Log`
#[derive(Debug)]
pub struct LogDivPattern {
    constraints: Vec<Box<dyn Constraint>>,
}

impl LogDivPattern {
    /// Create the pattern
    pub fn new() -> Self {
        Self {
            constraints: vec![Box::new(OpTypeConstraint::new("Log"))],
        }
    }
}

impl Default for LogDivPattern {
    fn default() -> Self {
        Self::new()
    }
}

impl Pattern for LogDivPattern {
    fn name(&self) -> &str {
        ops::LOG_DIV
    }

    fn priority(&self) -> i32 {
        ops::DEFAULT_PRIORITY
    }

    fn constraints(&self) -> &[Box<dyn Constraint>] {
        &self.constraints
    }

    fn trace(&self, graph: &Graph, anchor: NodeId) -> Option<MatchResult> {
        let log = graph.node(anchor)?;
        if log.inputs.len() != 1 {
            return None;
        }
        let y = sole_output(graph, anchor)?;

        let slots = Tracer::new(graph, anchor).run(STEPS)?;
        let div_id = slots[1];
        let div = graph.node(div_id)?;
        let quotient = sole_output(graph, div_id)?;
        if log.input(0) != Some(quotient.as_str()) {
            return None;
        }

        let [a, b] = div.inputs.as_slice() else {
            return None;
        };
        if a.is_empty() || b.is_empty() || graph.is_constant(a) || graph.is_constant(b) {
            return None;
        }

        let nodes = vec![anchor, div_id];
        let outputs = vec![y];
        if !is_self_contained(graph, &nodes, &outputs) {
            return None;
        }
        Some(MatchResult::new(self, nodes, div.inputs.clone(), outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::patterns::testing::*;

    fn log_div_graph(b_const: bool) -> (Graph, NodeId, NodeId) {
        let mut g = Graph::new("logdiv");
        input(&mut g, "a", &[4]);
        if b_const {
            f32_const(&mut g, "b", &[4], vec![2.0; 4]);
        } else {
            input(&mut g, "b", &[4]);
        }
        output(&mut g, "z", &[4]);
        let div = node(&mut g, "Div", "div", &["a", "b"], &["q"]);
        let log = node(&mut g, "Log", "log", &["q"], &["z"]);
        (g, div, log)
    }

    #[test]
    fn test_log_div_match() {
        let (g, div, log) = log_div_graph(false);
        let m = LogDivPattern::new().match_node(&g, log).unwrap();
        assert_eq!(m.nodes(), &[log, div]);
        assert_eq!(m.anchor(), Some(log));
        assert_eq!(m.inputs(), &["a", "b"]);
        assert_eq!(m.outputs(), &["z"]);
    }

    #[test]
    fn test_constant_operand_rejected() {
        let (g, _, log) = log_div_graph(true);
        assert!(LogDivPattern::new().match_node(&g, log).is_none());
    }

    #[test]
    fn test_constant_node_operand_rejected() {
        let (mut g, _, log) = log_div_graph(false);
        let div = g.find_node("div").unwrap();
        let c = crate::graph::Node::new("Constant", "c")
            .with_outputs(&["c_out"])
            .with_attr(
                "value",
                crate::tensor::Constant::Float(ndarray::ArrayD::from_elem(
                    ndarray::IxDyn(&[4]),
                    3.0,
                ))
                .to_tensor("c_out"),
            );
        g.add_node(c).unwrap();
        g.set_input(div, 1, "c_out").unwrap();
        assert!(LogDivPattern::new().match_node(&g, log).is_none());
    }

    #[test]
    fn test_shared_quotient_rejected() {
        let (mut g, _, log) = log_div_graph(false);
        node(&mut g, "Exp", "exp", &["q"], &["e"]);
        assert!(LogDivPattern::new().match_node(&g, log).is_none());
    }

    #[test]
    fn test_quotient_read_by_subgraph_rejected() {
        let (mut g, _, log) = log_div_graph(false);
        input(&mut g, "cond", &[]);
        output(&mut g, "y", &[4]);
        if_node(&mut g, "branch", "cond", "q", "y");
        assert!(LogDivPattern::new().match_node(&g, log).is_none());
    }

    #[test]
    fn test_log_of_other_op_rejected() {
        let mut g = Graph::new("mul");
        input(&mut g, "a", &[4]);
        input(&mut g, "b", &[4]);
        node(&mut g, "Mul", "mul", &["a", "b"], &["q"]);
        let log = node(&mut g, "Log", "log", &["q"], &["z"]);
        assert!(LogDivPattern::new().match_node(&g, log).is_none());
    }
}
