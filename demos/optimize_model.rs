//! Example: fuse operators in an ONNX model
//!
//! # Usage
//!
//! ```bash
//! cargo run --example optimize_model -- input.onnx output.onnx --iterations 3
//! ```

use std::env;

use onnx_fuser::prelude::*;
use onnx_fuser::session::SessionConfig;

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} <input.onnx> <output.onnx> [options]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --iterations N      Match/fuse rounds (default 1)");
    eprintln!("  --allow-overlap     Keep matches that share nodes");
    eprintln!("  --onnx-layer-norm   Emit LayerNormalization instead of NvLayerNormPlugin");
    std::process::exit(1);
}

fn main() -> OnnxResult<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 || args[1].starts_with("--") || args[2].starts_with("--") {
        usage(&args[0]);
    }
    let input_path = &args[1];
    let output_path = &args[2];

    let mut config = SessionConfig::from_env();
    let mut rest = args[3..].iter();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--allow-overlap" => config = config.with_allow_overlap(true),
            "--onnx-layer-norm" => config = config.with_layer_norm_target(LayerNormTarget::Onnx),
            "--iterations" => match rest.next().and_then(|n| n.parse().ok()) {
                Some(n) => config = config.with_max_iterations(n),
                None => usage(&args[0]),
            },
            _ => usage(&args[0]),
        }
    }

    if let Err(e) = init_logging(config.log_level) {
        eprintln!("Logging disabled: {}", e);
    }

    println!("Optimizing {} -> {}", input_path, output_path);
    let model = load_model(input_path)?;
    let (optimized, report) = optimize_model(&model, config)?;
    save_model(&optimized, output_path)?;

    println!();
    for it in &report.iterations {
        println!(
            "  Iteration {}: {} matches, {} fused, {} failed",
            it.index,
            it.matches_found,
            it.fusions_succeeded,
            it.failures.len()
        );
        for failure in &it.failures {
            println!("    {} at '{}': {}", failure.pattern, failure.anchor, failure.reason);
        }
    }
    println!();
    println!("  Nodes: {} -> {}", report.nodes_before, report.nodes_after);
    println!("  Converged: {}", report.converged);
    println!("  Success: {}", report.success);
    println!();
    println!("Saved to {}", output_path);

    Ok(())
}
