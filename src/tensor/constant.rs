//! Typed constant tensors
//!
//! A [`Constant`] is a decoded initializer (or `Constant` node value) that
//! keeps its element type, so a rewrite can compute in f64 and cast back to
//! the dtype the model declared.

use ndarray::ArrayD;

use crate::error::{OnnxResult, TransformError};
use crate::proto::tensor_proto::{DataLocation, DataType};
use crate::proto::TensorProto;

use super::convert::{
    i32_to_dtype, tensor_to_array_f32, tensor_to_array_f64, tensor_to_array_i32,
    tensor_to_array_i64,
};

/// Decoded constant tensor
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// FLOAT
    Float(ArrayD<f32>),
    /// DOUBLE
    Double(ArrayD<f64>),
    /// INT32
    Int32(ArrayD<i32>),
    /// INT64
    Int64(ArrayD<i64>),
}

impl Constant {
    /// Decode `tensor`; element types other than the four above are refused,
    /// as are tensors whose data lives in an external file
    pub fn from_tensor(tensor: &TensorProto) -> OnnxResult<Self> {
        if tensor.data_location == DataLocation::External as i32 {
            return Err(TransformError::MissingField(format!(
                "tensor '{}' stores its data externally",
                tensor.name
            )));
        }
        match i32_to_dtype(tensor.data_type)? {
            DataType::Float => Ok(Self::Float(tensor_to_array_f32(tensor)?)),
            DataType::Double => Ok(Self::Double(tensor_to_array_f64(tensor)?)),
            DataType::Int32 => Ok(Self::Int32(tensor_to_array_i32(tensor)?)),
            DataType::Int64 => Ok(Self::Int64(tensor_to_array_i64(tensor)?)),
            other => Err(TransformError::InvalidDataType(other as i32)),
        }
    }

    /// Encode as a TensorProto named `name`, using the typed data fields
    pub fn to_tensor(&self, name: &str) -> TensorProto {
        let dims = self.shape().iter().map(|&d| d as i64).collect();
        let mut tensor = TensorProto {
            name: name.to_string(),
            dims,
            data_type: self.data_type() as i32,
            ..Default::default()
        };
        match self {
            Self::Float(a) => tensor.float_data = a.iter().copied().collect(),
            Self::Double(a) => tensor.double_data = a.iter().copied().collect(),
            Self::Int32(a) => tensor.int32_data = a.iter().copied().collect(),
            Self::Int64(a) => tensor.int64_data = a.iter().copied().collect(),
        }
        tensor
    }

    /// ONNX element type
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
        }
    }

    /// Dimensions
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Float(a) => a.shape(),
            Self::Double(a) => a.shape(),
            Self::Int32(a) => a.shape(),
            Self::Int64(a) => a.shape(),
        }
    }

    /// Element count
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    /// Whether the tensor holds no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widen every element to f64
    pub fn to_f64(&self) -> ArrayD<f64> {
        match self {
            Self::Float(a) => a.mapv(f64::from),
            Self::Double(a) => a.clone(),
            Self::Int32(a) => a.mapv(f64::from),
            Self::Int64(a) => a.mapv(|v| v as f64),
        }
    }

    /// Narrow an f64 computation back to `dtype`
    pub fn from_f64(dtype: DataType, values: ArrayD<f64>) -> OnnxResult<Self> {
        match dtype {
            DataType::Float => Ok(Self::Float(values.mapv(|v| v as f32))),
            DataType::Double => Ok(Self::Double(values)),
            DataType::Int32 => Ok(Self::Int32(values.mapv(|v| v.round() as i32))),
            DataType::Int64 => Ok(Self::Int64(values.mapv(|v| v.round() as i64))),
            other => Err(TransformError::InvalidDataType(other as i32)),
        }
    }

    /// The value of a single-element tensor, whatever its rank
    pub fn scalar_f64(&self) -> Option<f64> {
        if self.len() != 1 {
            return None;
        }
        self.to_f64().iter().next().copied()
    }

    /// Integer elements in row-major order; `None` for float tensors
    pub fn to_i64_vec(&self) -> Option<Vec<i64>> {
        match self {
            Self::Int32(a) => Some(a.iter().map(|&v| i64::from(v)).collect()),
            Self::Int64(a) => Some(a.iter().copied().collect()),
            _ => None,
        }
    }
}
