//! Tensor decoding
//!
//! Reads the element payload of a TensorProto into ndarray storage,
//! from either `raw_data` (little-endian) or the typed repeated fields.

use ndarray::{ArrayD, IxDyn};

use crate::error::{OnnxResult, TransformError};
use crate::proto::tensor_proto::DataType;
use crate::proto::TensorProto;

/// Convert i32 to DataType enum
pub fn i32_to_dtype(value: i32) -> OnnxResult<DataType> {
    DataType::try_from(value).map_err(|_| TransformError::InvalidDataType(value))
}

/// Size in bytes for the element types the optimizer can decode
pub fn dtype_size(dtype: DataType) -> OnnxResult<usize> {
    match dtype {
        DataType::Float | DataType::Int32 => Ok(4),
        DataType::Double | DataType::Int64 => Ok(8),
        other => Err(TransformError::InvalidDataType(other as i32)),
    }
}

/// Shape of `tensor` as usize dims; negative dims are rejected
pub fn tensor_shape(tensor: &TensorProto) -> OnnxResult<Vec<usize>> {
    tensor
        .dims
        .iter()
        .map(|&d| {
            usize::try_from(d).map_err(|_| {
                TransformError::ShapeMismatch(format!(
                    "tensor '{}' has negative dim {}",
                    tensor.name, d
                ))
            })
        })
        .collect()
}

/// Decode a FLOAT tensor
pub fn tensor_to_array_f32(tensor: &TensorProto) -> OnnxResult<ArrayD<f32>> {
    let data = if tensor.raw_data.is_empty() {
        tensor.float_data.clone()
    } else {
        decode_raw(tensor, 4, |b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))?
    };
    into_array(tensor, data)
}

/// Decode a DOUBLE tensor
pub fn tensor_to_array_f64(tensor: &TensorProto) -> OnnxResult<ArrayD<f64>> {
    let data = if tensor.raw_data.is_empty() {
        tensor.double_data.clone()
    } else {
        decode_raw(tensor, 8, |b| {
            f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
        })?
    };
    into_array(tensor, data)
}

/// Decode an INT32 tensor
pub fn tensor_to_array_i32(tensor: &TensorProto) -> OnnxResult<ArrayD<i32>> {
    let data = if tensor.raw_data.is_empty() {
        tensor.int32_data.clone()
    } else {
        decode_raw(tensor, 4, |b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))?
    };
    into_array(tensor, data)
}

/// Decode an INT64 tensor
pub fn tensor_to_array_i64(tensor: &TensorProto) -> OnnxResult<ArrayD<i64>> {
    let data = if tensor.raw_data.is_empty() {
        tensor.int64_data.clone()
    } else {
        decode_raw(tensor, 8, |b| {
            i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
        })?
    };
    into_array(tensor, data)
}

// ============================================================================
// Internal helpers
// ============================================================================

fn decode_raw<T>(tensor: &TensorProto, width: usize, read: impl Fn(&[u8]) -> T) -> OnnxResult<Vec<T>> {
    if tensor.raw_data.len() % width != 0 {
        return Err(TransformError::ShapeMismatch(format!(
            "raw data of '{}' is {} bytes, not a multiple of {}",
            tensor.name,
            tensor.raw_data.len(),
            width
        )));
    }
    Ok(tensor.raw_data.chunks_exact(width).map(read).collect())
}

fn into_array<T>(tensor: &TensorProto, data: Vec<T>) -> OnnxResult<ArrayD<T>> {
    let shape = tensor_shape(tensor)?;
    let expected: usize = shape.iter().product();
    if data.len() != expected {
        return Err(TransformError::ShapeMismatch(format!(
            "tensor '{}' holds {} elements but dims {:?} need {}",
            tensor.name,
            data.len(),
            tensor.dims,
            expected
        )));
    }
    ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(|e| TransformError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_data() {
        let tensor = TensorProto {
            dims: vec![2, 3],
            data_type: DataType::Float as i32,
            float_data: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            ..Default::default()
        };

        let array = tensor_to_array_f32(&tensor).unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert_eq!(array[[1, 2]], 6.0);
    }

    #[test]
    fn test_raw_data_little_endian() {
        let raw: Vec<u8> = [3i64, -7].iter().flat_map(|v| v.to_le_bytes()).collect();
        let tensor = TensorProto {
            dims: vec![2],
            data_type: DataType::Int64 as i32,
            raw_data: raw,
            ..Default::default()
        };

        let array = tensor_to_array_i64(&tensor).unwrap();
        assert_eq!(array.as_slice().unwrap(), &[3, -7]);
    }

    #[test]
    fn test_scalar_has_one_element() {
        let tensor = TensorProto {
            data_type: DataType::Double as i32,
            double_data: vec![0.5],
            ..Default::default()
        };
        let array = tensor_to_array_f64(&tensor).unwrap();
        assert_eq!(array.ndim(), 0);
        assert_eq!(array.len(), 1);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let tensor = TensorProto {
            name: "w".to_string(),
            dims: vec![4],
            data_type: DataType::Float as i32,
            float_data: vec![1.0, 2.0],
            ..Default::default()
        };
        assert!(matches!(
            tensor_to_array_f32(&tensor),
            Err(TransformError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_unsupported_dtype() {
        assert!(dtype_size(DataType::Float16).is_err());
        assert!(i32_to_dtype(999).is_err());
    }
}
