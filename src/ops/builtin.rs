//! Built-in operator kernels
//!
//! Reference implementations of the operator kinds every graph may use
//! without registering anything. Kernels are plain `ndarray` code and
//! evaluate one node at a time; each built-in produces exactly one output.

use ndarray::{ArrayD, Axis, Ix1, Ix2, Ix3, IxDyn};

use crate::error::{SplitError, SplitResult};
use crate::graph::Node;
use crate::tensor::{broadcast_shape, normalize_axis, to_dims};

/// Operator kinds understood without registration
pub const BUILTIN_OPS: &[&str] = &[
    "Dense",
    "MatMul",
    "Conv1D",
    "Add",
    "Sub",
    "Mul",
    "Relu",
    "Sigmoid",
    "Tanh",
    "Softmax",
    "Concatenate",
    "Flatten",
    "Identity",
];

/// Check whether an operator kind is built in
pub fn is_builtin(op_type: &str) -> bool {
    BUILTIN_OPS.contains(&op_type)
}

fn input<'a>(node: &Node, inputs: &[&'a ArrayD<f32>], idx: usize) -> SplitResult<&'a ArrayD<f32>> {
    inputs.get(idx).copied().ok_or_else(|| {
        SplitError::InvalidNode(format!(
            "{} node '{}' expects at least {} inputs, got {}",
            node.op_type,
            node.name,
            idx + 1,
            inputs.len()
        ))
    })
}

fn shape_err(node: &Node, e: impl std::fmt::Display) -> SplitError {
    SplitError::InvalidNode(format!("{} node '{}': {}", node.op_type, node.name, e))
}

/// Evaluate a built-in node
pub fn evaluate(node: &Node, inputs: &[&ArrayD<f32>]) -> SplitResult<ArrayD<f32>> {
    match node.op_type.as_str() {
        "Dense" => {
            let out = matmul(node, input(node, inputs, 0)?, input(node, inputs, 1)?)?;
            match inputs.get(2) {
                Some(bias) => binary(node, &out, bias, |a, b| a + b),
                None => Ok(out),
            }
        }
        "MatMul" => matmul(node, input(node, inputs, 0)?, input(node, inputs, 1)?),
        "Conv1D" => conv1d(node, inputs),
        "Add" => binary(node, input(node, inputs, 0)?, input(node, inputs, 1)?, |a, b| a + b),
        "Sub" => binary(node, input(node, inputs, 0)?, input(node, inputs, 1)?, |a, b| a - b),
        "Mul" => binary(node, input(node, inputs, 0)?, input(node, inputs, 1)?, |a, b| a * b),
        "Relu" => Ok(input(node, inputs, 0)?.mapv(|v| v.max(0.0))),
        "Sigmoid" => Ok(input(node, inputs, 0)?.mapv(|v| 1.0 / (1.0 + (-v).exp()))),
        "Tanh" => Ok(input(node, inputs, 0)?.mapv(f32::tanh)),
        "Softmax" => softmax(node, input(node, inputs, 0)?),
        "Concatenate" => concatenate(node, inputs),
        "Flatten" => flatten(node, input(node, inputs, 0)?),
        "Identity" => Ok(input(node, inputs, 0)?.clone()),
        other => Err(SplitError::InvalidNode(format!(
            "'{}' is not a built-in operator (node '{}')",
            other, node.name
        ))),
    }
}

/// `x[..., k] · w[k, n] → [..., n]`
pub fn matmul(node: &Node, x: &ArrayD<f32>, w: &ArrayD<f32>) -> SplitResult<ArrayD<f32>> {
    let w2 = w
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|e| shape_err(node, format!("weight must be 2-D: {}", e)))?;
    let in_dim = *x
        .shape()
        .last()
        .ok_or_else(|| shape_err(node, "input must have at least one dimension"))?;
    if in_dim != w2.nrows() {
        return Err(shape_err(
            node,
            format!(
                "input width {} does not match weight shape {:?}",
                in_dim,
                w2.shape()
            ),
        ));
    }

    let rows = if in_dim == 0 { 0 } else { x.len() / in_dim };
    let x_std = x.as_standard_layout();
    let x2 = x_std
        .view()
        .into_shape((rows, in_dim))
        .map_err(|e| shape_err(node, e))?;
    let product = x2.dot(&w2);

    let mut out_shape = x.shape().to_vec();
    if let Some(last) = out_shape.last_mut() {
        *last = w2.ncols();
    }
    product
        .into_shape(IxDyn(&out_shape))
        .map_err(|e| shape_err(node, e))
}

fn binary(
    node: &Node,
    a: &ArrayD<f32>,
    b: &ArrayD<f32>,
    op: impl Fn(&ArrayD<f32>, &ArrayD<f32>) -> ArrayD<f32>,
) -> SplitResult<ArrayD<f32>> {
    // ndarray panics on incompatible shapes, check first
    broadcast_shape(&to_dims(a.shape()), &to_dims(b.shape())).map_err(|e| shape_err(node, e))?;
    Ok(op(a, b))
}

fn conv_stride(node: &Node) -> usize {
    node.attr_ints("strides")
        .and_then(|s| s.first().copied())
        .unwrap_or_else(|| node.attr_int("stride", 1))
        .max(1) as usize
}

fn conv1d(node: &Node, inputs: &[&ArrayD<f32>]) -> SplitResult<ArrayD<f32>> {
    let x = input(node, inputs, 0)?
        .view()
        .into_dimensionality::<Ix3>()
        .map_err(|e| shape_err(node, format!("input must be [N, C, W]: {}", e)))?;
    let w = input(node, inputs, 1)?
        .view()
        .into_dimensionality::<Ix3>()
        .map_err(|e| shape_err(node, format!("kernel must be [M, C, K]: {}", e)))?;
    let bias = match inputs.get(2) {
        Some(b) => Some(
            b.view()
                .into_dimensionality::<Ix1>()
                .map_err(|e| shape_err(node, format!("bias must be [M]: {}", e)))?,
        ),
        None => None,
    };

    let (batch, channels, width) = x.dim();
    let (filters, kernel_channels, kernel) = w.dim();
    if channels != kernel_channels {
        return Err(shape_err(
            node,
            format!("input has {} channels, kernel expects {}", channels, kernel_channels),
        ));
    }
    if kernel == 0 || width < kernel {
        return Err(shape_err(
            node,
            format!("kernel size {} does not fit input width {}", kernel, width),
        ));
    }
    let stride = conv_stride(node);
    let out_width = (width - kernel) / stride + 1;

    let mut out = ndarray::Array3::<f32>::zeros((batch, filters, out_width));
    for n in 0..batch {
        for m in 0..filters {
            let b = bias.as_ref().map(|b| b[m]).unwrap_or(0.0);
            for t in 0..out_width {
                let start = t * stride;
                let mut acc = b;
                for c in 0..channels {
                    for k in 0..kernel {
                        acc += x[[n, c, start + k]] * w[[m, c, k]];
                    }
                }
                out[[n, m, t]] = acc;
            }
        }
    }
    Ok(out.into_dyn())
}

fn softmax(node: &Node, x: &ArrayD<f32>) -> SplitResult<ArrayD<f32>> {
    let axis = normalize_axis(node.attr_int("axis", -1), x.ndim())?;
    let mut out = x.to_owned();
    for mut lane in out.lanes_mut(Axis(axis)) {
        let max = lane.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        lane.mapv_inplace(|v| (v - max).exp());
        let sum = lane.sum();
        lane.mapv_inplace(|v| v / sum);
    }
    Ok(out)
}

fn concatenate(node: &Node, inputs: &[&ArrayD<f32>]) -> SplitResult<ArrayD<f32>> {
    let first = input(node, inputs, 0)?;
    let axis = normalize_axis(node.attr_int("axis", -1), first.ndim())?;
    let views: Vec<_> = inputs.iter().map(|a| a.view()).collect();
    ndarray::concatenate(Axis(axis), &views).map_err(|e| shape_err(node, e))
}

/// Split point of a Flatten node; `rank` itself is allowed
fn flatten_axis(node: &Node, rank: usize) -> SplitResult<usize> {
    let axis = node.attr_int("axis", 1);
    if axis == rank as i64 {
        Ok(rank)
    } else {
        normalize_axis(axis, rank)
    }
}

fn flatten(node: &Node, x: &ArrayD<f32>) -> SplitResult<ArrayD<f32>> {
    let axis = flatten_axis(node, x.ndim())?;
    let outer: usize = x.shape()[..axis].iter().product();
    let inner: usize = x.shape()[axis..].iter().product();
    x.as_standard_layout()
        .into_owned()
        .into_shape(IxDyn(&[outer, inner]))
        .map_err(|e| shape_err(node, e))
}

// ============================================================================
// Shape inference
// ============================================================================

/// Infer the output shape of a built-in node from its input shapes
///
/// Returns `Ok(None)` when an input shape needed for the answer is unknown.
pub fn infer_shape(node: &Node, inputs: &[Option<Vec<i64>>]) -> SplitResult<Option<Vec<i64>>> {
    let shape = |idx: usize| inputs.get(idx).and_then(|s| s.as_deref());

    let result = match node.op_type.as_str() {
        "Dense" | "MatMul" => match (shape(0), shape(1)) {
            (Some(x), Some(w)) if !x.is_empty() && w.len() == 2 => {
                let mut out = x.to_vec();
                if let Some(last) = out.last_mut() {
                    *last = w[1];
                }
                Some(out)
            }
            _ => None,
        },
        "Conv1D" => match (shape(0), shape(1)) {
            (Some(x), Some(w)) if x.len() == 3 && w.len() == 3 => {
                let stride = conv_stride(node) as i64;
                let width = if x[2] < 0 || w[2] < 0 {
                    -1
                } else {
                    (x[2] - w[2]) / stride + 1
                };
                Some(vec![x[0], w[0], width])
            }
            _ => None,
        },
        "Add" | "Sub" | "Mul" => match (shape(0), shape(1)) {
            (Some(a), Some(b)) => Some(broadcast_shape(a, b)?),
            _ => None,
        },
        "Relu" | "Sigmoid" | "Tanh" | "Softmax" | "Identity" => shape(0).map(<[i64]>::to_vec),
        "Concatenate" => {
            let known: Option<Vec<&[i64]>> = (0..inputs.len()).map(shape).collect();
            match known {
                Some(shapes) if !shapes.is_empty() => {
                    let rank = shapes[0].len();
                    if shapes.iter().any(|s| s.len() != rank) {
                        return Err(SplitError::ShapeInferenceFailed(format!(
                            "Concatenate node '{}' has inputs of different rank",
                            node.name
                        )));
                    }
                    let axis = normalize_axis(node.attr_int("axis", -1), rank)?;
                    let mut out = shapes[0].to_vec();
                    out[axis] = if shapes.iter().any(|s| s[axis] < 0) {
                        -1
                    } else {
                        shapes.iter().map(|s| s[axis]).sum()
                    };
                    Some(out)
                }
                _ => None,
            }
        }
        "Flatten" => match shape(0) {
            Some(x) => {
                let axis = flatten_axis(node, x.len())?;
                let fold = |dims: &[i64]| {
                    if dims.iter().any(|&d| d < 0) {
                        -1
                    } else {
                        dims.iter().product()
                    }
                };
                Some(vec![fold(&x[..axis]), fold(&x[axis..])])
            }
            None => None,
        },
        _ => None,
    };

    Ok(result)
}
