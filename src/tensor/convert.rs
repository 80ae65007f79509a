//! Tensor conversion utilities
//!
//! Convert between ONNX TensorProto, graph initializers and ndarray types.

use ndarray::{Array, ArrayD, IxDyn};

use crate::error::{SplitError, SplitResult};
use crate::graph::Initializer;
use crate::proto::tensor_proto::DataType;
use crate::proto::TensorProto;

use super::dtype::{dtype_size, i32_to_dtype};
use super::shape::numel;

/// Convert TensorProto to f32 ndarray
///
/// This handles both raw_data and the typed data fields.
pub fn tensor_to_array_f32(tensor: &TensorProto) -> SplitResult<ArrayD<f32>> {
    let dtype = i32_to_dtype(tensor.data_type)?;
    let shape: Vec<usize> = tensor.dims.iter().map(|&d| d.max(0) as usize).collect();
    let expected_len = numel(&tensor.dims);

    let data: Vec<f32> = if !tensor.raw_data.is_empty() {
        decode_raw_to_f32(&tensor.raw_data, dtype, expected_len)?
    } else {
        match dtype {
            DataType::Float => tensor.float_data.clone(),
            DataType::Double => tensor.double_data.iter().map(|&v| v as f32).collect(),
            DataType::Int32 => tensor.int32_data.iter().map(|&v| v as f32).collect(),
            DataType::Int64 => tensor.int64_data.iter().map(|&v| v as f32).collect(),
            DataType::Uint64 => tensor.uint64_data.iter().map(|&v| v as f32).collect(),
            _ => {
                return Err(SplitError::InvalidDataType(tensor.data_type));
            }
        }
    };

    if data.len() != expected_len {
        return Err(SplitError::ShapeInferenceFailed(format!(
            "Tensor '{}': data length {} does not match shape {:?} (expected {})",
            tensor.name,
            data.len(),
            tensor.dims,
            expected_len
        )));
    }

    Array::from_shape_vec(IxDyn(&shape), data).map_err(|e| SplitError::Internal(e.to_string()))
}

/// Create TensorProto from a graph initializer
pub fn initializer_to_tensor(init: &Initializer, name: &str) -> TensorProto {
    TensorProto {
        dims: init.dims(),
        data_type: DataType::Float as i32,
        float_data: init.data.clone(),
        name: name.to_string(),
        ..Default::default()
    }
}

/// Create a graph initializer from a TensorProto
pub fn tensor_to_initializer(tensor: &TensorProto) -> SplitResult<Initializer> {
    tensor_to_array_f32(tensor).map(|array| Initializer::from_array(&array))
}

// ============================================================================
// Internal helpers
// ============================================================================

fn decode_raw_to_f32(raw: &[u8], dtype: DataType, expected: usize) -> SplitResult<Vec<f32>> {
    let elem_size = dtype_size(dtype)?;
    if raw.len() != expected * elem_size {
        return Err(SplitError::ShapeInferenceFailed(format!(
            "Raw data size {} does not match expected {} * {}",
            raw.len(),
            expected,
            elem_size
        )));
    }

    match dtype {
        DataType::Float => Ok(raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()),
        DataType::Double => Ok(raw
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32)
            .collect()),
        DataType::Int32 => Ok(raw
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32)
            .collect()),
        DataType::Int64 => Ok(raw
            .chunks_exact(8)
            .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32)
            .collect()),
        DataType::Uint8 => Ok(raw.iter().map(|&b| b as f32).collect()),
        DataType::Int8 => Ok(raw.iter().map(|&b| b as i8 as f32).collect()),
        _ => Err(SplitError::InvalidDataType(dtype as i32)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_to_array_f32_float_data() {
        let tensor = TensorProto {
            dims: vec![2, 3],
            data_type: DataType::Float as i32,
            float_data: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            ..Default::default()
        };

        let array = tensor_to_array_f32(&tensor).unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert_eq!(array[[0, 0]], 1.0);
        assert_eq!(array[[1, 2]], 6.0);
    }

    #[test]
    fn test_tensor_to_array_f32_raw_data() {
        let raw: Vec<u8> = [1.0f32, 2.0f32].iter().flat_map(|f| f.to_le_bytes()).collect();

        let tensor = TensorProto {
            dims: vec![2],
            data_type: DataType::Float as i32,
            raw_data: raw,
            ..Default::default()
        };

        let array = tensor_to_array_f32(&tensor).unwrap();
        assert_eq!(array.shape(), &[2]);
        assert_eq!(array[1], 2.0);
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let tensor = TensorProto {
            name: "w".to_string(),
            dims: vec![3],
            data_type: DataType::Float as i32,
            float_data: vec![1.0],
            ..Default::default()
        };
        assert!(tensor_to_array_f32(&tensor).is_err());
    }

    #[test]
    fn test_initializer_tensor_conversion() {
        let init = Initializer {
            shape: vec![2, 2],
            data: vec![1.0, 2.0, 3.0, 4.0],
        };
        let tensor = initializer_to_tensor(&init, "w");

        assert_eq!(tensor.dims, vec![2, 2]);
        assert_eq!(tensor.name, "w");
        assert_eq!(tensor_to_initializer(&tensor).unwrap(), init);
    }
}
