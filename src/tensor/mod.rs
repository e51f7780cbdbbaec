//! Tensor utilities for ONNX models
//!
//! - Decoding TensorProto payloads into ndarray (`convert`)
//! - Typed constants that remember their element type (`constant`)
//!
//! # Example
//!
//! ```ignore
//! use onnx_fuser::tensor::Constant;
//!
//! let weight = Constant::from_tensor(&tensor)?;
//! let scaled = weight.to_f64() * 2.0;
//! let out = Constant::from_f64(weight.data_type(), scaled)?.to_tensor("w_scaled");
//! ```

pub mod constant;
pub mod convert;

pub use constant::Constant;
pub use convert::{
    dtype_size, i32_to_dtype, tensor_shape, tensor_to_array_f32, tensor_to_array_f64,
    tensor_to_array_i32, tensor_to_array_i64,
};
