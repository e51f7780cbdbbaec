//! Error types for onnx-fuser
//!
//! This module defines all error types used throughout the crate.
//!
//! A pattern that does not match is not an error: patterns return
//! `Option<MatchResult>`. A cyclic graph is not an error either; it is
//! logged and matching continues on a best-effort order.

use thiserror::Error;

/// Main error type for graph rewriting operations
#[derive(Error, Debug)]
pub enum TransformError {
    /// A tensor reference resolves to nothing, or a tensor has two producers
    #[error("Malformed graph: {0}")]
    MalformedGraph(String),

    /// An operation that needs a graph ran before one was attached
    #[error("No graph loaded")]
    NoGraphLoaded,

    /// A captured parameter does not satisfy the fusion's invariant
    #[error("Fusion precondition failed for {pattern}: {reason}")]
    FusionPrecondition {
        /// Pattern whose rewrite was refused
        pattern: String,
        /// Human-readable description of the violated invariant
        reason: String,
    },

    /// Invalid node configuration
    #[error("Invalid node: {0}")]
    InvalidNode(String),

    /// Invalid model
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Tensor data does not agree with its declared shape
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Invalid tensor data type
    #[error("Invalid data type: {0}")]
    InvalidDataType(i32),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Protobuf decode error
    #[error("Protobuf decode error: {0}")]
    ProtoDecode(#[from] prost::DecodeError),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransformError {
    /// Build a precondition failure for `pattern`
    pub fn precondition(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FusionPrecondition {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error must abort the whole optimizer session.
    ///
    /// Everything else only fails the match that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MalformedGraph(_)
                | Self::NoGraphLoaded
                | Self::InvalidModel(_)
                | Self::Io(_)
                | Self::ProtoDecode(_)
        )
    }
}

/// Result type alias for ONNX operations
pub type OnnxResult<T> = Result<T, TransformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransformError::MalformedGraph("dangling input 'x'".to_string());
        assert!(err.to_string().contains("dangling input"));
    }

    #[test]
    fn test_precondition_display() {
        let err = TransformError::precondition("ConvTransposeBN", "scale has 3 channels, expected 8");
        let msg = err.to_string();
        assert!(msg.contains("ConvTransposeBN"));
        assert!(msg.contains("expected 8"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(TransformError::NoGraphLoaded.is_fatal());
        assert!(TransformError::MalformedGraph(String::new()).is_fatal());
        assert!(!TransformError::precondition("LogDiv", "x").is_fatal());
        assert!(!TransformError::ShapeMismatch(String::new()).is_fatal());
    }
}
