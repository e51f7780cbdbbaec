//! Session configuration
//!
//! Defaults can be overridden programmatically with the `with_*` builders
//! or from the environment:
//!
//! - `ONNX_FUSER_ALLOW_OVERLAP`: "1"/"true" to keep overlapping matches
//! - `ONNX_FUSER_MAX_ITERATIONS`: match/fuse rounds per session
//! - `ONNX_FUSER_LOG_LEVEL`: see [`LogLevel::parse`]

use std::env;

use tracing::warn;

use crate::logging::{LogLevel, LOG_LEVEL_ENV};
use crate::transformers::LayerNormTarget;

/// Environment variable enabling overlapping matches
pub const ALLOW_OVERLAP_ENV: &str = "ONNX_FUSER_ALLOW_OVERLAP";

/// Environment variable bounding the number of iterations
pub const MAX_ITERATIONS_ENV: &str = "ONNX_FUSER_MAX_ITERATIONS";

/// Knobs consumed by [`OptimizerSession`](super::OptimizerSession)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Keep matches that share nodes with an earlier match in the same pass
    pub allow_overlap: bool,
    /// Upper bound on match/fuse rounds
    pub max_iterations: usize,
    /// Verbosity for binaries that install a subscriber
    pub log_level: LogLevel,
    /// Operator emitted for fused layer norms
    pub layer_norm_target: LayerNormTarget,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            allow_overlap: false,
            max_iterations: 1,
            log_level: LogLevel::Info,
            layer_norm_target: LayerNormTarget::Plugin,
        }
    }
}

impl SessionConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by the `ONNX_FUSER_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(value) = lookup(ALLOW_OVERLAP_ENV) {
            match parse_bool(&value) {
                Some(flag) => config.allow_overlap = flag,
                None => warn!(var = ALLOW_OVERLAP_ENV, value = %value, "Ignoring invalid value"),
            }
        }

        if let Some(value) = lookup(MAX_ITERATIONS_ENV) {
            match value.trim().parse::<usize>() {
                Ok(n) => config.max_iterations = n,
                Err(_) => warn!(var = MAX_ITERATIONS_ENV, value = %value, "Ignoring invalid value"),
            }
        }

        if let Some(value) = lookup(LOG_LEVEL_ENV) {
            match LogLevel::parse(&value) {
                Some(level) => config.log_level = level,
                None => warn!(var = LOG_LEVEL_ENV, value = %value, "Ignoring invalid value"),
            }
        }

        config
    }

    /// Set whether overlapping matches are kept
    pub fn with_allow_overlap(mut self, allow_overlap: bool) -> Self {
        self.allow_overlap = allow_overlap;
        self
    }

    /// Set the iteration bound
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the log level
    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    /// Set the fused layer norm operator
    pub fn with_layer_norm_target(mut self, target: LayerNormTarget) -> Self {
        self.layer_norm_target = target;
        self
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
