//! Tensor utilities
//!
//! This module provides utilities for working with tensors:
//! - Data type mappings (`dtype`)
//! - Shape utilities (`shape`)
//! - Conversion between TensorProto, initializers and ndarray (`convert`)
//!
//! Runtime values are `ndarray::ArrayD<f32>`; [`TensorMap`] binds them to
//! tensor names.

pub mod convert;
pub mod dtype;
pub mod shape;

use ndarray::ArrayD;
use rustc_hash::FxHashMap;

/// Named runtime tensor values
pub type TensorMap = FxHashMap<String, ArrayD<f32>>;

// Re-export commonly used items
pub use convert::{
    initializer_to_tensor, tensor_to_array_f32, tensor_to_initializer,
};
pub use dtype::{dtype_size, i32_to_dtype};
pub use shape::{broadcast_shape, concrete_dims, normalize_axis, numel, shape_matches, to_dims};
