//! Shape utilities
//!
//! Functions for working with tensor shapes, where -1 marks an unknown
//! dimension.

use crate::error::{SplitError, SplitResult};

/// Calculate total number of elements from shape
pub fn numel(shape: &[i64]) -> usize {
    if shape.is_empty() {
        1 // scalar
    } else {
        shape.iter().map(|&d| d.max(0) as usize).product()
    }
}

/// Replace unknown dimensions by `fill` and convert to `usize`
pub fn concrete_dims(shape: &[i64], fill: usize) -> Vec<usize> {
    shape
        .iter()
        .map(|&d| if d < 0 { fill } else { d as usize })
        .collect()
}

/// Convert concrete dims to the signed representation
pub fn to_dims(shape: &[usize]) -> Vec<i64> {
    shape.iter().map(|&d| d as i64).collect()
}

/// Check whether a concrete shape satisfies a possibly dynamic one
pub fn shape_matches(declared: &[i64], actual: &[usize]) -> bool {
    declared.len() == actual.len()
        && declared
            .iter()
            .zip(actual)
            .all(|(&d, &a)| d < 0 || d as usize == a)
}

/// Compute broadcast output shape (numpy rules, unknown dims stay unknown
/// unless the other side fixes them)
pub fn broadcast_shape(shape_a: &[i64], shape_b: &[i64]) -> SplitResult<Vec<i64>> {
    let max_len = shape_a.len().max(shape_b.len());
    let mut result = vec![0i64; max_len];

    for i in 0..max_len {
        // Index from the right (broadcasting aligns from trailing dimensions)
        let dim_a = if i < shape_a.len() {
            shape_a[shape_a.len() - 1 - i]
        } else {
            1
        };
        let dim_b = if i < shape_b.len() {
            shape_b[shape_b.len() - 1 - i]
        } else {
            1
        };

        let out_dim = if dim_a < 0 {
            if dim_b > 1 {
                dim_b
            } else {
                -1
            }
        } else if dim_b < 0 {
            if dim_a > 1 {
                dim_a
            } else {
                -1
            }
        } else if dim_a == dim_b || dim_b == 1 {
            dim_a
        } else if dim_a == 1 {
            dim_b
        } else {
            return Err(SplitError::ShapeInferenceFailed(format!(
                "Shapes {:?} and {:?} are not broadcastable",
                shape_a, shape_b
            )));
        };

        result[max_len - 1 - i] = out_dim;
    }

    Ok(result)
}

/// Normalize axis to positive index
pub fn normalize_axis(axis: i64, ndim: usize) -> SplitResult<usize> {
    let ndim_i64 = ndim as i64;
    let normalized = if axis < 0 { axis + ndim_i64 } else { axis };

    if normalized < 0 || normalized >= ndim_i64 {
        return Err(SplitError::InvalidNode(format!(
            "Axis {} out of bounds for ndim {}",
            axis, ndim
        )));
    }

    Ok(normalized as usize)
}
