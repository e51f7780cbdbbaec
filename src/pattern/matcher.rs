//! Pattern matching engine for ONNX graphs
//!
//! [`Pattern`] is the trait every fusion template implements;
//! [`Matcher`] drives one pass of all registered patterns over a graph.

use std::fmt;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::graph::{AttrValue, Graph, Node, NodeId};

use super::constraint::Constraint;
use super::registry::PatternRegistry;

/// Result of a successful pattern match
///
/// Holds node handles and tensor names only; it is invalidated by any
/// mutation that removes one of its nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pattern: String,
    priority: i32,
    nodes: Vec<NodeId>,
    node_set: FxHashSet<NodeId>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    attrs: IndexMap<String, AttrValue>,
}

impl MatchResult {
    /// Record a match of `pattern` over `nodes` (anchor first)
    pub fn new(
        pattern: &dyn Pattern,
        nodes: Vec<NodeId>,
        inputs: Vec<String>,
        outputs: Vec<String>,
    ) -> Self {
        let node_set = nodes.iter().copied().collect();
        Self {
            pattern: pattern.name().to_string(),
            priority: pattern.priority(),
            nodes,
            node_set,
            inputs,
            outputs,
            attrs: IndexMap::new(),
        }
    }

    /// Attach an extracted attribute
    pub fn with_attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    /// Name of the pattern that produced this match
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Priority of that pattern
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Matched nodes in pattern order; a successful fusion consumes all of them
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Anchor node
    pub fn anchor(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }

    /// Whether `id` is part of the match
    pub fn contains(&self, id: NodeId) -> bool {
        self.node_set.contains(&id)
    }

    /// Whether any matched node is in `claimed`
    pub fn overlaps(&self, claimed: &FxHashSet<NodeId>) -> bool {
        !self.node_set.is_disjoint(claimed)
    }

    /// Boundary input tensors
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Boundary output tensors
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Extracted attribute by name
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    /// All extracted attributes
    pub fn attrs(&self) -> &IndexMap<String, AttrValue> {
        &self.attrs
    }
}

/// A named, prioritized subgraph template
pub trait Pattern: Send + Sync + fmt::Debug {
    /// Display and dispatch key
    fn name(&self) -> &str;

    /// Higher priority is tried first on a shared anchor
    fn priority(&self) -> i32;

    /// Anchor constraints; the first is the operator type
    fn constraints(&self) -> &[Box<dyn Constraint>];

    /// Whether every constraint holds for `node`
    fn accepts(&self, node: &Node, graph: &Graph) -> bool {
        self.constraints().iter().all(|c| c.check(node, graph))
    }

    /// Structural trace from an anchor that already passed `accepts`
    fn trace(&self, graph: &Graph, anchor: NodeId) -> Option<MatchResult>;

    /// Constraints then trace
    fn match_node(&self, graph: &Graph, anchor: NodeId) -> Option<MatchResult> {
        let node = graph.node(anchor)?;
        if !self.accepts(node, graph) {
            return None;
        }
        self.trace(graph, anchor)
    }
}

/// Drives one matching pass over a graph
#[derive(Debug, Clone, Copy)]
pub struct Matcher<'r> {
    registry: &'r PatternRegistry,
}

impl<'r> Matcher<'r> {
    /// Create a matcher over the patterns in `registry`
    pub fn new(registry: &'r PatternRegistry) -> Self {
        Self { registry }
    }

    /// Run every pattern over the graph once.
    ///
    /// Nodes are visited in topological order and patterns in descending
    /// priority; the first pattern that matches a node claims it. Without
    /// `allow_overlap`, nodes claimed earlier in the pass are skipped, and
    /// a match touching a claimed node is discarded without trying the
    /// remaining lower-priority patterns on that anchor.
    pub fn run_pass(&self, graph: &Graph, allow_overlap: bool) -> Vec<MatchResult> {
        let mut claimed: FxHashSet<NodeId> = FxHashSet::default();
        let mut results = Vec::new();

        for &id in graph.topological_order() {
            if !allow_overlap && claimed.contains(&id) {
                continue;
            }
            let Some(node) = graph.node(id) else {
                continue;
            };

            for pattern in self.registry.patterns() {
                if !pattern.accepts(node, graph) {
                    continue;
                }
                let Some(m) = pattern.trace(graph, id) else {
                    continue;
                };

                if !allow_overlap && m.overlaps(&claimed) {
                    debug!(
                        pattern = pattern.name(),
                        anchor = %node.name,
                        "Match rejected: overlaps an earlier match"
                    );
                } else {
                    debug!(
                        pattern = pattern.name(),
                        anchor = %node.name,
                        nodes = m.nodes().len(),
                        "Match accepted"
                    );
                    claimed.extend(m.nodes().iter().copied());
                    results.push(m);
                }
                break;
            }
        }

        results
    }
}
