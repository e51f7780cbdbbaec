//! Log-of-quotient rewrite
//!
//! ```text
//!   a ──┐                       a ── Log ──┐
//!       Div ── Log ── z   ==>              Sub ── z
//!   b ──┘                       b ── Log ──┘
//! ```
//!
//! `log(a / b)` overflows or hits `log(0)` for quotients that
//! `log(a) − log(b)` represents fine. The Sub keeps the Div's node name and
//! writes the original output tensor.

use tracing::info;

use crate::error::OnnxResult;
use crate::graph::{Graph, Node};
use crate::pattern::{MatchResult, LOG_DIV};

use super::common::{
    boundary_input, boundary_output, copy_value_info, matched_node, replace_matched, Fusion,
};

/// Rewrite `Log(Div(a, b))` as `Sub(Log(a), Log(b))`
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaceLogDiv;

impl ReplaceLogDiv {
    /// Create the fusion
    pub fn new() -> Self {
        Self
    }
}

impl Fusion for ReplaceLogDiv {
    fn pattern(&self) -> &'static str {
        LOG_DIV
    }

    fn apply(&self, graph: &mut Graph, m: &MatchResult) -> OnnxResult<()> {
        let log_name = matched_node(graph, m, 0)?.name.clone();
        let div_name = matched_node(graph, m, 1)?.name.clone();
        let a = boundary_input(m, 0)?;
        let b = boundary_input(m, 1)?;
        let output = boundary_output(m)?;

        let log_a = graph.unique_name(&format!("{}_0_out", log_name));
        let log_b = graph.unique_name(&format!("{}_1_out", log_name));

        let nodes = vec![
            Node::new("Log", format!("{}_0", log_name))
                .with_inputs(&[a])
                .with_outputs(&[log_a.as_str()]),
            Node::new("Log", format!("{}_1", log_name))
                .with_inputs(&[b])
                .with_outputs(&[log_b.as_str()]),
            Node::new("Sub", div_name)
                .with_inputs(&[log_a.as_str(), log_b.as_str()])
                .with_outputs(&[output]),
        ];
        replace_matched(graph, m, nodes)?;

        copy_value_info(graph, a, &log_a);
        copy_value_info(graph, b, &log_b);
        info!(output, "Replaced Log(Div) with Sub(Log, Log)");
        Ok(())
    }
}
