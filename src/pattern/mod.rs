//! Pattern matching module for ONNX graph optimization
//!
//! This module identifies fusible subgraphs. A [`Pattern`] is gated by
//! [`Constraint`]s on its anchor node and then traces the rest of its
//! template; the [`Matcher`] runs every pattern of a [`PatternRegistry`]
//! over a graph and keeps a non-overlapping set of [`MatchResult`]s.
//!
//! # Overview
//!
//! One matching pass:
//! 1. Visit nodes in topological order
//! 2. Offer each node to the registered patterns, highest priority first
//! 3. Keep the first match; drop it if it overlaps an accepted one
//!
//! # Example
//!
//! ```ignore
//! use onnx_fuser::pattern::{Matcher, PatternRegistry};
//!
//! let registry = PatternRegistry::with_defaults();
//! let matches = Matcher::new(&registry).run_pass(&graph, false);
//!
//! for m in &matches {
//!     println!("{}: {} nodes -> {:?}", m.pattern(), m.nodes().len(), m.outputs());
//! }
//! ```
//!
//! # Templates
//!
//! Multi-node patterns describe their shape as a [`trace::Step`] table:
//!
//! ```ignore
//! use onnx_fuser::pattern::trace::{Step, Tracer};
//!
//! const STEPS: &[Step] = &[Step::pred(0, &["Div"])];
//! let slots = Tracer::new(&graph, log_node).run(STEPS);
//! ```

pub mod constraint;
pub mod matcher;
pub mod ops;
pub mod patterns;
pub mod registry;
pub mod trace;

// Re-export main types
pub use constraint::{AttrConstraint, Comparator, Constraint, OpTypeConstraint};
pub use matcher::{MatchResult, Matcher, Pattern};
pub use patterns::{
    AttentionPattern, ConvBnPattern, ConvTransposeBnPattern, LayerNormPattern, LogDivPattern,
};
pub use registry::PatternRegistry;
pub use trace::{Hop, Step, Tracer};

// Re-export pattern names
pub use ops::{CONV_BN, CONV_TRANSPOSE_BN, CUSTOM_ATTENTION, LAYER_NORM, LOG_DIV};
