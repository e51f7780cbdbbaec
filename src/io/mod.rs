//! ONNX I/O module
//!
//! Loading and saving ONNX models, plus one-shot optimization of a model
//! in memory or on disk.
//!
//! # Example
//!
//! ```ignore
//! use onnx_fuser::io::{load_model, save_model, optimize_file};
//! use onnx_fuser::session::SessionConfig;
//!
//! // Load and save
//! let model = load_model("input.onnx")?;
//! save_model(&model, "output.onnx")?;
//!
//! // One-shot optimization
//! let report = optimize_file("input.onnx", "optimized.onnx", SessionConfig::default())?;
//! println!("Removed {} nodes", report.nodes_removed());
//! ```

pub mod reader;
pub mod writer;

// Re-exports
pub use reader::{load_model, load_model_from_bytes};
pub use writer::{model_size, model_to_bytes, save_model};

use std::path::Path;

use tracing::{info, warn};

use crate::error::OnnxResult;
use crate::pattern::PatternRegistry;
use crate::proto::ModelProto;
use crate::session::{OptimizerSession, SessionConfig, SessionReport};
use crate::transformers::LayerNormTarget;

/// First default-domain opset defining `LayerNormalization`
const LAYER_NORMALIZATION_OPSET: i64 = 17;

/// Optimize a model in memory with the built-in patterns.
///
/// Model metadata, opset imports and graph inputs/outputs are carried over
/// unchanged; only the graph body is rewritten.
pub fn optimize_model(
    model: &ModelProto,
    config: SessionConfig,
) -> OnnxResult<(ModelProto, SessionReport)> {
    let registry = PatternRegistry::with_defaults();
    optimize_model_with(model, config, &registry)
}

/// [`optimize_model`] with a caller-supplied pattern registry
pub fn optimize_model_with(
    model: &ModelProto,
    config: SessionConfig,
    registry: &PatternRegistry,
) -> OnnxResult<(ModelProto, SessionReport)> {
    if config.layer_norm_target == LayerNormTarget::Onnx {
        let opset = model.opset_version();
        if opset.map_or(true, |v| v < LAYER_NORMALIZATION_OPSET) {
            warn!(
                opset = ?opset,
                required = LAYER_NORMALIZATION_OPSET,
                "LayerNormalization requires a newer default-domain opset"
            );
        }
    }

    let mut session = OptimizerSession::new(registry).with_config(config);
    session.load_model(model)?;
    let report = session.optimize()?;

    let mut optimized = model.clone();
    optimized.graph = Some(session.into_graph()?.to_proto());
    Ok((optimized, report))
}

/// Load, optimize and save in one step
pub fn optimize_file<P1: AsRef<Path>, P2: AsRef<Path>>(
    input: P1,
    output: P2,
    config: SessionConfig,
) -> OnnxResult<SessionReport> {
    let model = load_model(input.as_ref())?;
    let (optimized, report) = optimize_model(&model, config)?;
    save_model(&optimized, output.as_ref())?;

    info!(
        input = %input.as_ref().display(),
        output = %output.as_ref().display(),
        nodes_before = report.nodes_before,
        nodes_after = report.nodes_after,
        "Optimized model file"
    );
    Ok(report)
}
