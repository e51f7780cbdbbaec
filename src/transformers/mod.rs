//! Fusion rewrites
//!
//! This module turns [`MatchResult`]s into graph edits:
//!
//! - **Folding**: absorb BatchNormalization into Conv / ConvTranspose weights
//! - **Collapsing**: replace LayerNorm and attention decompositions with one node
//! - **Stabilizing**: rewrite `Log(a / b)` as `Log(a) − Log(b)`
//!
//! # Overview
//!
//! Each rewrite implements the [`Fusion`] trait for one pattern name. The
//! [`FusionExecutor`] dispatches matches by pattern name, cleans up and
//! re-sorts the graph after every successful rewrite, and records failures
//! instead of aborting on them.
//!
//! # Example
//!
//! ```ignore
//! use onnx_fuser::pattern::{Matcher, PatternRegistry};
//! use onnx_fuser::transformers::FusionExecutor;
//!
//! let registry = PatternRegistry::with_defaults();
//! let matches = Matcher::new(&registry).run_pass(&graph, false);
//!
//! let stats = FusionExecutor::new().execute_all(&mut graph, &matches)?;
//! println!("{}/{} fusions applied", stats.succeeded, stats.attempted);
//! ```

/// Common utilities and types
pub mod common;
/// BatchNormalization folding numerics
pub mod fold;
/// Fuse multi-head attention
pub mod fuse_attention;
/// Fuse Conv / ConvTranspose + BN
pub mod fuse_conv_bn;
/// Fuse Layer Normalization
pub mod fuse_layer_norm;
/// Rewrite Log(Div)
pub mod replace_log_div;

// Re-export common types
pub use common::{Fusion, FusionFailure, FusionStats};
pub use fold::{fold_batch_norm, BatchNormParams, ChannelLayout, FoldedParams};

// Re-export fusions
pub use fuse_attention::FuseAttention;
pub use fuse_conv_bn::FuseConvBn;
pub use fuse_layer_norm::{FuseLayerNorm, LayerNormTarget};
pub use replace_log_div::ReplaceLogDiv;

use std::fmt;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::error::{OnnxResult, TransformError};
use crate::graph::Graph;
use crate::pattern::MatchResult;

/// Dispatches matches to the fusion registered for their pattern
pub struct FusionExecutor {
    fusions: FxHashMap<&'static str, Box<dyn Fusion>>,
}

impl fmt::Debug for FusionExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut patterns: Vec<_> = self.fusions.keys().collect();
        patterns.sort();
        f.debug_struct("FusionExecutor")
            .field("patterns", &patterns)
            .finish()
    }
}

impl Default for FusionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl FusionExecutor {
    /// Executor with a fusion for every built-in pattern
    pub fn new() -> Self {
        let mut executor = Self::empty();
        executor.register(FuseConvBn::conv());
        executor.register(FuseConvBn::conv_transpose());
        executor.register(FuseLayerNorm::default());
        executor.register(FuseAttention::new());
        executor.register(ReplaceLogDiv::new());
        executor
    }

    /// Executor with no fusions
    pub fn empty() -> Self {
        Self {
            fusions: FxHashMap::default(),
        }
    }

    /// Emit `target` for LayerNorm matches
    pub fn with_layer_norm_target(mut self, target: LayerNormTarget) -> Self {
        self.register(FuseLayerNorm::new(target));
        self
    }

    /// Add a fusion, replacing any registered for the same pattern
    pub fn register(&mut self, fusion: impl Fusion + 'static) {
        let pattern = fusion.pattern();
        if self.fusions.insert(pattern, Box::new(fusion)).is_some() {
            debug!(pattern, "Replaced fusion");
        }
    }

    /// Whether a fusion handles `pattern`
    pub fn handles(&self, pattern: &str) -> bool {
        self.fusions.contains_key(pattern)
    }

    /// Rewrite one match, then clean up and re-sort the graph.
    ///
    /// Fails without touching the graph when no fusion handles the
    /// pattern, one of the matched nodes is gone, or the fusion's
    /// preconditions do not hold.
    pub fn execute(&self, graph: &mut Graph, m: &MatchResult) -> OnnxResult<()> {
        let fusion = self.fusions.get(m.pattern()).ok_or_else(|| {
            TransformError::Internal(format!("no fusion registered for '{}'", m.pattern()))
        })?;
        if let Some(stale) = m.nodes().iter().find(|&&id| !graph.contains(id)) {
            return Err(TransformError::InvalidNode(format!(
                "{} match refers to removed node {}",
                m.pattern(),
                stale
            )));
        }

        fusion.apply(graph, m)?;
        graph.cleanup();
        graph.resort();
        Ok(())
    }

    /// Rewrite every match in order.
    ///
    /// Failures are recorded in the returned stats; only fatal errors
    /// (see [`TransformError::is_fatal`]) are returned. A match whose nodes
    /// were all dropped by an earlier cleanup is skipped without counting
    /// as an attempt.
    pub fn execute_all(&self, graph: &mut Graph, matches: &[MatchResult]) -> OnnxResult<FusionStats> {
        let mut stats = FusionStats::new();

        for m in matches {
            if !m.nodes().is_empty() && m.nodes().iter().all(|&id| !graph.contains(id)) {
                debug!(pattern = m.pattern(), "Skipping match removed as dead code");
                continue;
            }

            let anchor = m
                .anchor()
                .and_then(|id| graph.node(id))
                .map(|n| n.name.clone())
                .unwrap_or_default();

            match self.execute(graph, m) {
                Ok(()) => {
                    let created = m
                        .outputs()
                        .iter()
                        .filter_map(|out| graph.producer_of(out))
                        .filter_map(|id| graph.node(id))
                        .map(|n| n.name.clone())
                        .collect::<Vec<_>>();
                    stats.record(created);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(pattern = m.pattern(), anchor = %anchor, error = %e, "Fusion failed");
                    stats.record_failure(FusionFailure {
                        pattern: m.pattern().to_string(),
                        anchor,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::patterns::testing::*;
    use crate::pattern::{Matcher, PatternRegistry, LOG_DIV};

    /// Two independent Log(Div) chains
    fn two_log_divs() -> Graph {
        let mut g = Graph::new("two");
        for i in 0..2 {
            input(&mut g, &format!("a{}", i), &[1]);
            input(&mut g, &format!("b{}", i), &[1]);
            output(&mut g, &format!("z{}", i), &[1]);
            node(
                &mut g,
                "Div",
                &format!("div{}", i),
                &[&format!("a{}", i), &format!("b{}", i)],
                &[&format!("q{}", i)],
            );
            node(
                &mut g,
                "Log",
                &format!("log{}", i),
                &[&format!("q{}", i)],
                &[&format!("z{}", i)],
            );
        }
        g
    }

    #[derive(Debug)]
    struct Refuse(&'static str, bool);

    impl Fusion for Refuse {
        fn pattern(&self) -> &'static str {
            self.0
        }
        fn apply(&self, _graph: &mut Graph, m: &MatchResult) -> OnnxResult<()> {
            if self.1 {
                Err(TransformError::MalformedGraph("broken".to_string()))
            } else {
                Err(TransformError::precondition(m.pattern(), "refused"))
            }
        }
    }

    #[test]
    fn test_execute_all() {
        let mut g = two_log_divs();
        let registry = PatternRegistry::with_defaults();
        let matches = Matcher::new(&registry).run_pass(&g, false);
        assert_eq!(matches.len(), 2);

        let stats = FusionExecutor::new().execute_all(&mut g, &matches).unwrap();
        assert_eq!(stats.attempted, 2);
        assert_eq!(stats.succeeded, 2);
        assert!(stats.all_succeeded());
        assert_eq!(stats.created_nodes, vec!["div0", "div1"]);
        assert_eq!(g.count_op("Sub"), 2);
        assert_eq!(g.count_op("Div"), 0);
    }

    #[test]
    fn test_failure_is_recorded_not_raised() {
        let mut g = two_log_divs();
        let registry = PatternRegistry::with_defaults();
        let matches = Matcher::new(&registry).run_pass(&g, false);
        let before = g.to_proto();

        let mut executor = FusionExecutor::new();
        executor.register(Refuse(LOG_DIV, false));
        let stats = executor.execute_all(&mut g, &matches).unwrap();
        assert_eq!(stats.attempted, 2);
        assert_eq!(stats.succeeded, 0);
        assert_eq!(stats.failures.len(), 2);
        assert_eq!(stats.failures[0].anchor, "log0");
        assert!(stats.failures[0].reason.contains("refused"));
        assert_eq!(g.to_proto(), before);
    }

    #[test]
    fn test_fatal_error_propagates() {
        let mut g = two_log_divs();
        let registry = PatternRegistry::with_defaults();
        let matches = Matcher::new(&registry).run_pass(&g, false);

        let mut executor = FusionExecutor::new();
        executor.register(Refuse(LOG_DIV, true));
        let err = executor.execute_all(&mut g, &matches).unwrap_err();
        assert!(matches!(err, TransformError::MalformedGraph(_)));
    }

    #[test]
    fn test_match_on_dead_chain_skipped() {
        let mut g = two_log_divs();
        g.outputs.retain(|vi| vi.name != "z1");
        let registry = PatternRegistry::with_defaults();
        let matches = Matcher::new(&registry).run_pass(&g, false);
        assert_eq!(matches.len(), 2);

        let stats = FusionExecutor::new().execute_all(&mut g, &matches).unwrap();
        assert_eq!(stats.attempted, 1);
        assert_eq!(stats.succeeded, 1);
        assert!(stats.all_succeeded());
        assert_eq!(g.count_op("Div"), 0);
        assert!(g.find_node("log1").is_none());
    }

    #[test]
    fn test_stale_match_rejected() {
        let mut g = two_log_divs();
        let registry = PatternRegistry::with_defaults();
        let matches = Matcher::new(&registry).run_pass(&g, false);
        let executor = FusionExecutor::new();

        executor.execute(&mut g, &matches[0]).unwrap();
        let err = executor.execute(&mut g, &matches[0]).unwrap_err();
        assert!(matches!(err, TransformError::InvalidNode(_)));
    }

    #[test]
    fn test_missing_fusion() {
        let mut g = two_log_divs();
        let registry = PatternRegistry::with_defaults();
        let matches = Matcher::new(&registry).run_pass(&g, false);

        let executor = FusionExecutor::empty();
        assert!(!executor.handles(LOG_DIV));
        let stats = executor.execute_all(&mut g, &matches).unwrap();
        assert_eq!(stats.failures.len(), 2);
        assert_eq!(g.count_op("Div"), 2);
    }

    #[test]
    fn test_layer_norm_target_override() {
        let Ln { mut graph, .. } = layer_norm_graph(&[-1], 2.0);
        let registry = PatternRegistry::with_defaults();
        let matches = Matcher::new(&registry).run_pass(&graph, false);
        assert_eq!(matches.len(), 1);

        FusionExecutor::new()
            .with_layer_norm_target(LayerNormTarget::Onnx)
            .execute_all(&mut graph, &matches)
            .unwrap();
        assert_eq!(graph.count_op("LayerNormalization"), 1);
        assert_eq!(graph.node_count(), 1);
    }
}
