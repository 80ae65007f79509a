//! GraphModel ↔ ONNX mapping
//!
//! | Native kind | ONNX |
//! |-------------|------|
//! | `Dense` | `MatMul` + `Add` (bias) |
//! | `Conv1D` | `Conv` |
//! | `Concatenate` | `Concat` |
//! | `MatMul`, `Add`, `Sub`, `Mul`, `Relu`, `Sigmoid`, `Tanh`, `Softmax`, `Flatten`, `Identity` | same name |
//! | custom kinds | same name in [`CUSTOM_DOMAIN`] |
//!
//! Axis attributes are always written explicitly so the exported graph does
//! not depend on ONNX defaults.

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{SplitError, SplitResult};
use crate::graph::{AttrValue, GraphModel, InitializerMap, Node, TensorRef};
use crate::ops::builtin;
use crate::proto::attribute_proto::AttributeType;
use crate::proto::extensions::{make_opset, make_tensor_value_info, make_unshaped_value_info};
use crate::proto::tensor_proto::DataType;
use crate::proto::{AttributeProto, GraphProto, ModelProto, NodeProto, ValueInfoProto};
use crate::tensor::{initializer_to_tensor, tensor_to_initializer};

use super::validation::check_model;

/// Domain of custom operator nodes
pub const CUSTOM_DOMAIN: &str = "ai.model_splitter.custom";
/// Default-domain opset written on export
pub const OPSET_VERSION: i64 = 13;
/// ONNX IR version written on export
pub const IR_VERSION: i64 = 8;
/// Producer name written on export
pub const PRODUCER_NAME: &str = "model-splitter";

// ============================================================================
// Export
// ============================================================================

fn attr_to_proto(name: &str, value: &AttrValue) -> AttributeProto {
    match value {
        AttrValue::Int(v) => AttributeProto::new_int(name, *v),
        AttrValue::Float(v) => AttributeProto::new_float(name, *v),
        AttrValue::Ints(v) => AttributeProto::new_ints(name, v.clone()),
        AttrValue::Floats(v) => AttributeProto::new_floats(name, v.clone()),
        AttrValue::String(v) => AttributeProto::new_string(name, v),
    }
}

fn node_proto(op_type: &str, name: &str, inputs: &[String], outputs: &[String]) -> NodeProto {
    NodeProto {
        op_type: op_type.to_string(),
        name: name.to_string(),
        input: inputs.to_vec(),
        output: outputs.to_vec(),
        ..Default::default()
    }
}

fn value_info(graph: &GraphModel, name: &str) -> ValueInfoProto {
    match graph.tensor_shape(name) {
        Some(shape) => make_tensor_value_info(name, DataType::Float as i32, shape),
        None => make_unshaped_value_info(name, DataType::Float as i32),
    }
}

fn export_node(node: &Node) -> Vec<NodeProto> {
    let carried = || {
        node.attributes
            .iter()
            .map(|(k, v)| attr_to_proto(k, v))
            .collect::<Vec<_>>()
    };

    match node.op_type.as_str() {
        "Dense" if node.inputs.len() > 2 => {
            let product = format!("{}__matmul", node.outputs[0]);
            vec![
                node_proto(
                    "MatMul",
                    &format!("{}_matmul", node.name),
                    &node.inputs[..2],
                    &[product.clone()],
                ),
                node_proto(
                    "Add",
                    &format!("{}_bias", node.name),
                    &[product, node.inputs[2].clone()],
                    &node.outputs,
                ),
            ]
        }
        "Dense" => vec![node_proto("MatMul", &node.name, &node.inputs, &node.outputs)],
        "Conv1D" => {
            let mut proto = node_proto("Conv", &node.name, &node.inputs, &node.outputs);
            let stride = node
                .attr_ints("strides")
                .and_then(|s| s.first().copied())
                .unwrap_or_else(|| node.attr_int("stride", 1));
            proto.attribute.push(AttributeProto::new_ints("strides", vec![stride]));
            vec![proto]
        }
        "Concatenate" | "Softmax" => {
            let op = if node.op_type == "Concatenate" { "Concat" } else { "Softmax" };
            let mut proto = node_proto(op, &node.name, &node.inputs, &node.outputs);
            proto
                .attribute
                .push(AttributeProto::new_int("axis", node.attr_int("axis", -1)));
            vec![proto]
        }
        "Flatten" => {
            let mut proto = node_proto("Flatten", &node.name, &node.inputs, &node.outputs);
            proto
                .attribute
                .push(AttributeProto::new_int("axis", node.attr_int("axis", 1)));
            vec![proto]
        }
        op if builtin::is_builtin(op) => {
            let mut proto = node_proto(op, &node.name, &node.inputs, &node.outputs);
            proto.attribute = carried();
            vec![proto]
        }
        op => {
            let mut proto = node_proto(op, &node.name, &node.inputs, &node.outputs);
            proto.domain = CUSTOM_DOMAIN.to_string();
            proto.attribute = carried();
            vec![proto]
        }
    }
}

/// Map a graph to an ONNX model
pub fn to_onnx(graph: &GraphModel) -> SplitResult<ModelProto> {
    let mut nodes = Vec::with_capacity(graph.node_count());
    let mut has_custom = false;
    for node in graph.nodes() {
        if node.outputs.is_empty() {
            return Err(SplitError::InvalidNode(format!(
                "node '{}' has no outputs",
                node.name
            )));
        }
        has_custom |= !builtin::is_builtin(&node.op_type);
        nodes.extend(export_node(node));
    }

    let intermediate: Vec<ValueInfoProto> = graph
        .nodes()
        .flat_map(|n| n.outputs.iter())
        .filter(|t| !graph.is_graph_output(t))
        .filter_map(|t| {
            graph
                .tensor_shape(t)
                .map(|s| make_tensor_value_info(t, DataType::Float as i32, s))
        })
        .collect();

    let mut opset_import = vec![make_opset("", OPSET_VERSION)];
    if has_custom {
        opset_import.push(make_opset(CUSTOM_DOMAIN, 1));
    }

    Ok(ModelProto {
        ir_version: IR_VERSION,
        opset_import,
        producer_name: PRODUCER_NAME.to_string(),
        producer_version: crate::VERSION.to_string(),
        graph: Some(GraphProto {
            name: graph.name().to_string(),
            node: nodes,
            initializer: graph
                .initializers()
                .iter()
                .map(|(name, init)| initializer_to_tensor(init, name))
                .collect(),
            input: graph
                .input_names()
                .iter()
                .map(|n| value_info(graph, n))
                .collect(),
            output: graph
                .output_names()
                .iter()
                .map(|n| value_info(graph, n))
                .collect(),
            value_info: intermediate,
            ..Default::default()
        }),
        ..Default::default()
    })
}

// ============================================================================
// Import
// ============================================================================

fn attr_from_proto(attr: &AttributeProto) -> Option<AttrValue> {
    match attr.attribute_type() {
        AttributeType::Int => Some(AttrValue::Int(attr.i)),
        AttributeType::Float => Some(AttrValue::Float(attr.f)),
        AttributeType::Ints => Some(AttrValue::Ints(attr.ints.clone())),
        AttributeType::Floats => Some(AttrValue::Floats(attr.floats.clone())),
        AttributeType::String => Some(AttrValue::String(
            String::from_utf8_lossy(&attr.s).into_owned(),
        )),
        _ => None,
    }
}

fn import_op_type(proto: &NodeProto) -> SplitResult<String> {
    if !proto.is_default_domain() {
        return Ok(proto.op_type.clone());
    }
    let op = match proto.op_type.as_str() {
        "Conv" => "Conv1D",
        "Concat" => "Concatenate",
        other if builtin::is_builtin(other) && other != "Dense" && other != "Conv1D" => other,
        other => {
            return Err(SplitError::UnresolvedOperator {
                op: other.to_string(),
                node: proto.name.clone(),
            })
        }
    };
    Ok(op.to_string())
}

/// Map an ONNX model back to a graph
///
/// The model is checked first. Default-domain operators outside the mapped
/// set are rejected; nodes from other domains keep their kind and must be
/// resolved like any custom operator.
pub fn from_onnx(model: &ModelProto) -> SplitResult<GraphModel> {
    check_model(model)?;
    let graph = model
        .graph
        .as_ref()
        .ok_or_else(|| SplitError::InvalidModel("Model does not contain a graph".to_string()))?;

    let mut initializers = InitializerMap::new();
    for tensor in &graph.initializer {
        initializers.insert(tensor.name.clone(), tensor_to_initializer(tensor)?);
    }

    let mut nodes = Vec::with_capacity(graph.node.len());
    for (idx, proto) in graph.node.iter().enumerate() {
        let op_type = import_op_type(proto)?;
        let name = if proto.name.is_empty() {
            format!("{}_{}", op_type, idx)
        } else {
            proto.name.clone()
        };
        let attributes: IndexMap<String, AttrValue> = proto
            .attribute
            .iter()
            .filter_map(|a| attr_from_proto(a).map(|v| (a.name.clone(), v)))
            .collect();
        nodes.push(Node {
            name,
            op_type,
            inputs: proto.input.clone(),
            outputs: proto.output.clone(),
            attributes,
        });
    }

    // Initializers may be listed as graph inputs too
    let inputs = graph
        .input
        .iter()
        .filter(|i| !initializers.contains_key(&i.name))
        .map(|i| TensorRef::new(i.name.clone(), i.get_shape()))
        .collect();
    let outputs = graph
        .output
        .iter()
        .map(|o| TensorRef::new(o.name.clone(), o.get_shape()))
        .collect();

    let mut result = GraphModel::new(graph.name.clone(), nodes, inputs, outputs, initializers)?;
    for info in &graph.value_info {
        if let Some(shape) = info.get_shape() {
            result.set_tensor_shape(&info.name, shape);
        }
    }
    debug!(
        graph = %result.name(),
        nodes = result.node_count(),
        "imported ONNX graph"
    );
    Ok(result)
}
