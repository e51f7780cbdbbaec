//! # onnx-fuser
//!
//! Pattern-matching operator fusion for ONNX graphs.
//!
//! Subgraph templates are matched against a decoded graph and each match
//! is rewritten into a fused operator, round after round, until nothing
//! matches or an iteration bound is reached.
//!
//! ## Features
//!
//! - **Pattern Matching**: table-driven templates with op-type and attribute constraints
//! - **Node Fusion**: Conv/ConvTranspose + BatchNorm folding, LayerNorm, attention
//! - **Numerical Stability**: `Log(a / b)` rewritten as `Log(a) − Log(b)`
//! - **Graph Cleanup**: Remove unused nodes, initializers, and value_info
//!
//! ## Example
//!
//! ```ignore
//! use onnx_fuser::prelude::*;
//!
//! let model = load_model("model.onnx")?;
//! let (optimized, report) = optimize_model(&model, SessionConfig::default())?;
//! save_model(&optimized, "optimized.onnx")?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// ============================================================================
// Module declarations
// ============================================================================

pub mod error;
pub mod graph;
pub mod io;
pub mod logging;
pub mod pattern;
pub mod proto;
pub mod session;
pub mod tensor;
pub mod transformers;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Prelude module - import commonly used types with `use onnx_fuser::prelude::*`
pub mod prelude {
    pub use crate::error::{OnnxResult, TransformError};
    pub use crate::graph::{Graph, Node, NodeId};
    pub use crate::io::{load_model, optimize_file, optimize_model, save_model};
    pub use crate::logging::{init_logging, LogLevel};
    pub use crate::pattern::{MatchResult, Matcher, Pattern, PatternRegistry};
    pub use crate::proto::onnx::*;
    pub use crate::session::{OptimizerSession, SessionConfig, SessionReport};
    pub use crate::transformers::{Fusion, FusionExecutor, LayerNormTarget};
}

// ============================================================================
// Crate-level re-exports
// ============================================================================

pub use error::{OnnxResult, TransformError};

// ============================================================================
// Version information
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
