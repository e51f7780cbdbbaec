//! Optimizer session
//!
//! Drives repeated rounds of matching and fusion over one owned graph:
//!
//! ```text
//! Idle ──load──▶ Loaded ──optimize──▶ (Matching ─▶ Fusing)* ──▶ Done
//! ```
//!
//! A round with zero matches ends the session early (convergence). Failed
//! fusions are recorded in the [`SessionReport`] and do not stop the
//! remaining matches; only fatal errors abort.
//!
//! # Example
//!
//! ```ignore
//! use onnx_fuser::pattern::PatternRegistry;
//! use onnx_fuser::session::{OptimizerSession, SessionConfig};
//!
//! let registry = PatternRegistry::with_defaults();
//! let mut session = OptimizerSession::new(&registry)
//!     .with_config(SessionConfig::new().with_max_iterations(3));
//! session.load_model(&model)?;
//!
//! let report = session.optimize()?;
//! for it in &report.iterations {
//!     println!("#{}: {} matches, {} fused", it.index, it.matches_found, it.fusions_succeeded);
//! }
//! ```

pub mod config;

pub use config::SessionConfig;

use tracing::{info, warn};

use crate::error::{OnnxResult, TransformError};
use crate::graph::Graph;
use crate::pattern::{Matcher, PatternRegistry};
use crate::proto::ModelProto;
use crate::transformers::{FusionExecutor, FusionFailure};

/// Lifecycle of an [`OptimizerSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No graph attached
    Idle,
    /// Graph attached and validated
    Loaded,
    /// Running a match pass
    Matching,
    /// Applying the matches of the current pass
    Fusing,
    /// Last `optimize` finished or aborted
    Done,
}

/// Outcome of one match/fuse round
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationReport {
    /// Zero-based round number
    pub index: usize,
    /// Matches accepted by the matcher
    pub matches_found: usize,
    /// Matches rewritten successfully
    pub fusions_succeeded: usize,
    /// Matches whose rewrite was refused
    pub failures: Vec<FusionFailure>,
}

/// Outcome of [`OptimizerSession::optimize`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionReport {
    /// One entry per executed round, including a final zero-match round
    pub iterations: Vec<IterationReport>,
    /// Every attempted fusion in every round succeeded
    pub success: bool,
    /// A round found nothing left to match
    pub converged: bool,
    /// Node count before the first round
    pub nodes_before: usize,
    /// Node count after the last round
    pub nodes_after: usize,
}

impl SessionReport {
    /// Total successful fusions
    pub fn fusions_succeeded(&self) -> usize {
        self.iterations.iter().map(|it| it.fusions_succeeded).sum()
    }

    /// Every failure across all rounds
    pub fn failures(&self) -> impl Iterator<Item = &FusionFailure> {
        self.iterations.iter().flat_map(|it| it.failures.iter())
    }

    /// Nodes removed by the session
    pub fn nodes_removed(&self) -> usize {
        self.nodes_before.saturating_sub(self.nodes_after)
    }
}

/// Owns a graph and rewrites it with the patterns of one registry
#[derive(Debug)]
pub struct OptimizerSession<'r> {
    registry: &'r PatternRegistry,
    config: SessionConfig,
    executor: FusionExecutor,
    graph: Option<Graph>,
    state: SessionState,
}

impl<'r> OptimizerSession<'r> {
    /// Idle session with the default configuration
    pub fn new(registry: &'r PatternRegistry) -> Self {
        let config = SessionConfig::default();
        Self {
            registry,
            executor: FusionExecutor::new().with_layer_norm_target(config.layer_norm_target),
            config,
            graph: None,
            state: SessionState::Idle,
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.executor = FusionExecutor::new().with_layer_norm_target(config.layer_norm_target);
        self.config = config;
        self
    }

    /// Replace the fusion executor, e.g. to add handlers for custom patterns
    pub fn with_executor(mut self, executor: FusionExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Current configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Attach a graph, replacing any previous one.
    ///
    /// The graph is validated and topologically sorted first; a malformed
    /// graph leaves the session as it was.
    pub fn load(&mut self, mut graph: Graph) -> OnnxResult<()> {
        graph.validate()?;
        graph.resort();
        if graph.has_cycle() {
            warn!(graph = %graph.name(), "Graph has a cycle; matching order is best-effort");
        }
        self.graph = Some(graph);
        self.state = SessionState::Loaded;
        Ok(())
    }

    /// Decode and attach the graph of `model`
    pub fn load_model(&mut self, model: &ModelProto) -> OnnxResult<()> {
        let proto = model
            .graph
            .as_ref()
            .ok_or_else(|| TransformError::InvalidModel("model has no graph".to_string()))?;
        self.load(Graph::from_proto(proto)?)
    }

    /// Attached graph
    pub fn graph(&self) -> OnnxResult<&Graph> {
        self.graph.as_ref().ok_or(TransformError::NoGraphLoaded)
    }

    /// Detach the graph, consuming the session
    pub fn into_graph(self) -> OnnxResult<Graph> {
        self.graph.ok_or(TransformError::NoGraphLoaded)
    }

    /// Run up to `max_iterations` match/fuse rounds.
    ///
    /// Stops early when a round finds no matches. Fusion failures are
    /// reported, not returned; a fatal error aborts the session and leaves
    /// it in [`SessionState::Done`].
    pub fn optimize(&mut self) -> OnnxResult<SessionReport> {
        let graph = self.graph.as_mut().ok_or(TransformError::NoGraphLoaded)?;
        let matcher = Matcher::new(self.registry);
        let mut report = SessionReport {
            nodes_before: graph.node_count(),
            success: true,
            ..Default::default()
        };

        for index in 0..self.config.max_iterations {
            self.state = SessionState::Matching;
            let matches = matcher.run_pass(graph, self.config.allow_overlap);
            if matches.is_empty() {
                info!(iteration = index, "No matches left; converged");
                report.iterations.push(IterationReport {
                    index,
                    ..Default::default()
                });
                report.converged = true;
                break;
            }

            self.state = SessionState::Fusing;
            let stats = match self.executor.execute_all(graph, &matches) {
                Ok(stats) => stats,
                Err(e) => {
                    self.state = SessionState::Done;
                    return Err(e);
                }
            };

            info!(
                iteration = index,
                matches = matches.len(),
                fused = stats.succeeded,
                failed = stats.failures.len(),
                nodes = graph.node_count(),
                "Iteration complete"
            );
            report.success &= stats.all_succeeded();
            report.iterations.push(IterationReport {
                index,
                matches_found: matches.len(),
                fusions_succeeded: stats.succeeded,
                failures: stats.failures,
            });
        }

        report.nodes_after = graph.node_count();
        self.state = SessionState::Done;
        info!(
            success = report.success,
            converged = report.converged,
            nodes_before = report.nodes_before,
            nodes_after = report.nodes_after,
            "Session finished"
        );
        Ok(report)
    }
}
