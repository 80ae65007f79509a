//! ONNX data type mappings
//!
//! Element types the codec can read back into `f32` arrays.

use crate::error::{SplitError, SplitResult};
use crate::proto::tensor_proto::DataType;

/// Size in bytes of one `raw_data` element, for the types the codec decodes
pub fn dtype_size(dtype: DataType) -> SplitResult<usize> {
    match dtype {
        DataType::Uint8 | DataType::Int8 => Ok(1),
        DataType::Float | DataType::Int32 => Ok(4),
        DataType::Double | DataType::Int64 => Ok(8),
        _ => Err(SplitError::InvalidDataType(dtype as i32)),
    }
}

/// Convert i32 to DataType enum
pub fn i32_to_dtype(value: i32) -> SplitResult<DataType> {
    DataType::try_from(value).map_err(|_| SplitError::InvalidDataType(value))
}
