//! Common utilities for fusions
//!
//! Shared helper functions and types used across the rewrite procedures.

use tracing::debug;

use crate::error::{OnnxResult, TransformError};
use crate::graph::{Graph, Node, NodeId};
use crate::pattern::MatchResult;
use crate::tensor::Constant;

/// A rewrite procedure for one pattern
///
/// `apply` must check every precondition before it mutates the graph, so
/// an `Err` always leaves the graph as it was.
pub trait Fusion: Send + Sync {
    /// Name of the pattern this fusion consumes
    fn pattern(&self) -> &'static str;

    /// Replace the matched subgraph
    fn apply(&self, graph: &mut Graph, m: &MatchResult) -> OnnxResult<()>;
}

/// A match whose rewrite was refused or failed
#[derive(Debug, Clone, PartialEq)]
pub struct FusionFailure {
    /// Pattern name
    pub pattern: String,
    /// Name of the anchor node at the time of the attempt
    pub anchor: String,
    /// Error description
    pub reason: String,
}

/// Outcome counters for a batch of fusions
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FusionStats {
    /// Matches offered to the executor
    pub attempted: usize,
    /// Rewrites that completed
    pub succeeded: usize,
    /// Rewrites that did not
    pub failures: Vec<FusionFailure>,
    /// Names of the nodes created by successful rewrites
    pub created_nodes: Vec<String>,
}

impl FusionStats {
    /// Create empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful rewrite
    pub fn record(&mut self, created: impl IntoIterator<Item = String>) {
        self.attempted += 1;
        self.succeeded += 1;
        self.created_nodes.extend(created);
    }

    /// Record a failed rewrite
    pub fn record_failure(&mut self, failure: FusionFailure) {
        self.attempted += 1;
        self.failures.push(failure);
    }

    /// Merge with another result
    pub fn merge(&mut self, other: FusionStats) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failures.extend(other.failures);
        self.created_nodes.extend(other.created_nodes);
    }

    /// Whether every attempted rewrite succeeded
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Matched node at `slot`, which must still be live
pub fn matched_node<'g>(graph: &'g Graph, m: &MatchResult, slot: usize) -> OnnxResult<&'g Node> {
    let id = m.nodes().get(slot).copied().ok_or_else(|| {
        TransformError::Internal(format!("{} match has no node slot {}", m.pattern(), slot))
    })?;
    graph
        .node(id)
        .ok_or_else(|| TransformError::InvalidNode(format!("{} was removed", id)))
}

/// Decoded constant operand, or a precondition failure naming `pattern`
pub fn require_constant(graph: &Graph, pattern: &str, name: &str) -> OnnxResult<Constant> {
    graph
        .constant_value(name)
        .ok_or_else(|| TransformError::precondition(pattern, format!("'{}' is not a constant", name)))
}

/// Boundary input at `slot` of a match
pub fn boundary_input<'m>(m: &'m MatchResult, slot: usize) -> OnnxResult<&'m str> {
    m.inputs()
        .get(slot)
        .map(String::as_str)
        .ok_or_else(|| TransformError::MissingField(format!("{} input {}", m.pattern(), slot)))
}

/// Single boundary output of a match
pub fn boundary_output(m: &MatchResult) -> OnnxResult<&str> {
    match m.outputs() {
        [out] => Ok(out),
        other => Err(TransformError::Internal(format!(
            "{} match has {} outputs, expected 1",
            m.pattern(),
            other.len()
        ))),
    }
}

/// Swap the matched nodes for `replacements`.
///
/// The matched nodes are removed first so the replacements can take over
/// the boundary output names. Returns the new handles.
pub fn replace_matched(
    graph: &mut Graph,
    m: &MatchResult,
    replacements: Vec<Node>,
) -> OnnxResult<Vec<NodeId>> {
    let removed = graph.remove_nodes(m.nodes());
    debug!(
        pattern = m.pattern(),
        removed = removed.len(),
        added = replacements.len(),
        "Replacing matched subgraph"
    );
    replacements
        .into_iter()
        .map(|node| graph.add_node(node))
        .collect()
}

/// Copy the value info recorded for `from` under the name `to`
pub fn copy_value_info(graph: &mut Graph, from: &str, to: &str) {
    if let Some(mut vi) = graph.value_info(from).cloned() {
        vi.name = to.to_string();
        graph.set_value_info(vi);
    }
}
