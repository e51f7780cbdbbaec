//! Pattern names, priorities and operator tags
//!
//! Pattern names double as the dispatch key between a match and the
//! rewrite registered for it.

/// Conv followed by BatchNormalization
pub const CONV_BN: &str = "ConvBN";

/// ConvTranspose followed by BatchNormalization
pub const CONV_TRANSPOSE_BN: &str = "ConvTransposeBN";

/// Decomposed layer normalization
pub const LAYER_NORM: &str = "LayerNorm";

/// Decomposed multi-head attention core
pub const CUSTOM_ATTENTION: &str = "CustomAttention";

/// Log of a quotient
pub const LOG_DIV: &str = "LogDiv";

/// Priority every built-in pattern registers with; their anchors are disjoint
pub const DEFAULT_PRIORITY: i32 = 10;

/// Fused operator emitted for layer normalization in plugin mode
pub const LAYER_NORM_PLUGIN_OP: &str = "NvLayerNormPlugin";

/// Standard ONNX layer normalization operator
pub const LAYER_NORM_ONNX_OP: &str = "LayerNormalization";

/// Fused attention operator
pub const CUSTOM_ATTENTION_OP: &str = "CustomFFAttn";
