//! In-memory computation graph
//!
//! `GraphModel` owns the node sequence (stored in topological order) together
//! with producer/consumer maps for O(1) traversal, the graph-level inputs and
//! outputs, constant initializers and every tensor shape known so far.

use indexmap::IndexMap;
use ndarray::{ArrayD, IxDyn};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{SplitError, SplitResult};

use super::maps::{
    build_consumer_map, build_producer_map, ConsumerMap, InitializerMap, NodeMap, ProducerMap,
    ShapeMap,
};

/// Attribute value attached to a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Integer scalar
    Int(i64),
    /// Float scalar
    Float(f32),
    /// Integer list
    Ints(Vec<i64>),
    /// Float list
    Floats(Vec<f32>),
    /// String
    String(String),
}

/// One operator application inside a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node name
    pub name: String,
    /// Operator kind
    #[serde(rename = "op")]
    pub op_type: String,
    /// Input tensor names, in operator argument order
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Output tensor names
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Operator attributes
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, AttrValue>,
}

impl Node {
    /// Create a node without attributes
    pub fn new(op_type: &str, name: &str, inputs: &[&str], outputs: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            op_type: op_type.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            attributes: IndexMap::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with_attr(mut self, name: &str, value: AttrValue) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    /// Get attribute by name
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    /// Get integer attribute value with default
    pub fn attr_int(&self, name: &str, default: i64) -> i64 {
        match self.attr(name) {
            Some(AttrValue::Int(v)) => *v,
            Some(AttrValue::Float(v)) => *v as i64,
            _ => default,
        }
    }

    /// Get float attribute value with default
    pub fn attr_float(&self, name: &str, default: f32) -> f32 {
        match self.attr(name) {
            Some(AttrValue::Float(v)) => *v,
            Some(AttrValue::Int(v)) => *v as f32,
            _ => default,
        }
    }

    /// Get repeated int attribute
    pub fn attr_ints(&self, name: &str) -> Option<&[i64]> {
        match self.attr(name) {
            Some(AttrValue::Ints(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// First output tensor, if any
    pub fn first_output(&self) -> Option<&str> {
        self.outputs.first().map(String::as_str)
    }
}

/// Named tensor with an optional static shape (-1 marks an unknown dimension)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorRef {
    /// Tensor identifier
    pub name: String,
    /// Static shape, when known
    pub shape: Option<Vec<i64>>,
}

impl TensorRef {
    /// Create a tensor reference
    pub fn new(name: impl Into<String>, shape: Option<Vec<i64>>) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }
}

/// Constant float tensor stored with the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Initializer {
    /// Dimensions
    pub shape: Vec<usize>,
    /// Row-major values
    pub data: Vec<f32>,
}

impl Initializer {
    /// Create from an array
    pub fn from_array(array: &ArrayD<f32>) -> Self {
        Self {
            shape: array.shape().to_vec(),
            data: array.iter().copied().collect(),
        }
    }

    /// Convert to an ndarray
    pub fn to_array(&self) -> SplitResult<ArrayD<f32>> {
        ArrayD::from_shape_vec(IxDyn(&self.shape), self.data.clone()).map_err(|e| {
            SplitError::InvalidModel(format!(
                "Initializer data length {} does not match shape {:?}: {}",
                self.data.len(),
                self.shape,
                e
            ))
        })
    }

    /// Shape as signed dims
    pub fn dims(&self) -> Vec<i64> {
        self.shape.iter().map(|&d| d as i64).collect()
    }
}

/// A computation graph
///
/// Construction checks the structural invariants: unique node names, one
/// producer per tensor, and every node input produced earlier in the
/// sequence, declared as a graph input, or provided by an initializer.
#[derive(Debug, Clone)]
pub struct GraphModel {
    name: String,
    pub(super) nodes: NodeMap,
    pub(super) producer_map: ProducerMap,
    pub(super) consumer_map: ConsumerMap,
    inputs: Vec<String>,
    outputs: Vec<String>,
    pub(super) initializers: InitializerMap,
    pub(super) shapes: ShapeMap,
}

impl GraphModel {
    /// Build a graph, validating its structure
    pub fn new(
        name: impl Into<String>,
        nodes: Vec<Node>,
        inputs: Vec<TensorRef>,
        outputs: Vec<TensorRef>,
        initializers: InitializerMap,
    ) -> SplitResult<Self> {
        let name = name.into();
        let mut shapes: ShapeMap = FxHashMap::default();
        let mut known: FxHashMap<&str, ()> = FxHashMap::default();

        for input in &inputs {
            if input.name.is_empty() {
                return Err(SplitError::InvalidModel(format!(
                    "Graph '{}' has an input with an empty name",
                    name
                )));
            }
            if known.insert(input.name.as_str(), ()).is_some() {
                return Err(SplitError::InvalidModel(format!(
                    "Graph input '{}' declared twice",
                    input.name
                )));
            }
        }
        for (init_name, init) in &initializers {
            known.insert(init_name.as_str(), ());
            shapes.insert(init_name.clone(), init.dims());
        }

        let mut node_map = NodeMap::with_capacity(nodes.len());
        for node in &nodes {
            if node.op_type.is_empty() {
                return Err(SplitError::InvalidModel(format!(
                    "Node '{}' has empty op type",
                    node.name
                )));
            }
            for input in &node.inputs {
                if !input.is_empty() && !known.contains_key(input.as_str()) {
                    return Err(SplitError::InvalidModel(format!(
                        "Node '{}' ({}): input '{}' is not produced by an earlier node, \
                         a graph input or an initializer",
                        node.name, node.op_type, input
                    )));
                }
            }
            for output in &node.outputs {
                if output.is_empty() {
                    continue;
                }
                if known.insert(output.as_str(), ()).is_some() {
                    return Err(SplitError::InvalidModel(format!(
                        "Tensor '{}' produced by node '{}' is already defined",
                        output, node.name
                    )));
                }
            }
        }
        for output in &outputs {
            if !known.contains_key(output.name.as_str()) {
                return Err(SplitError::InvalidModel(format!(
                    "Graph output '{}' is never produced",
                    output.name
                )));
            }
        }
        drop(known);

        for node in nodes {
            if node_map.contains_key(&node.name) {
                return Err(SplitError::InvalidModel(format!(
                    "Duplicate node name '{}'",
                    node.name
                )));
            }
            node_map.insert(node.name.clone(), node);
        }

        for tensor in inputs.iter().chain(outputs.iter()) {
            if let Some(shape) = &tensor.shape {
                shapes.insert(tensor.name.clone(), shape.clone());
            }
        }

        Ok(Self {
            name,
            producer_map: build_producer_map(node_map.values()),
            consumer_map: build_consumer_map(node_map.values()),
            nodes: node_map,
            inputs: inputs.into_iter().map(|t| t.name).collect(),
            outputs: outputs.into_iter().map(|t| t.name).collect(),
            initializers,
            shapes,
        })
    }

    /// Graph name
    pub fn name(&self) -> &str {
        &self.name
    }

    // ========================================================================
    // Node accessors
    // ========================================================================

    /// Get a node by name
    pub fn get_node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate over all nodes in stored (topological) order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Iterate over node names in order
    pub fn node_names(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    // ========================================================================
    // Tensor accessors
    // ========================================================================

    /// Graph input names
    pub fn input_names(&self) -> &[String] {
        &self.inputs
    }

    /// Graph output names
    pub fn output_names(&self) -> &[String] {
        &self.outputs
    }

    /// Graph inputs with their shapes
    pub fn inputs(&self) -> Vec<TensorRef> {
        self.inputs.iter().map(|n| self.tensor(n)).collect()
    }

    /// Reference to any tensor of the graph, with its shape if known
    pub fn tensor(&self, name: &str) -> TensorRef {
        TensorRef::new(name, self.tensor_shape(name).map(<[i64]>::to_vec))
    }

    /// Known shape of a tensor
    pub fn tensor_shape(&self, name: &str) -> Option<&[i64]> {
        self.shapes.get(name).map(Vec::as_slice)
    }

    /// Record a tensor shape
    pub fn set_tensor_shape(&mut self, name: &str, shape: Vec<i64>) {
        self.shapes.insert(name.to_string(), shape);
    }

    /// Check whether a tensor name exists anywhere in the graph
    pub fn has_tensor(&self, name: &str) -> bool {
        self.producer_map.contains_key(name)
            || self.is_graph_input(name)
            || self.is_initializer(name)
    }

    /// Check if a tensor is a graph input
    pub fn is_graph_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|n| n == name)
    }

    /// Check if a tensor is a graph output
    pub fn is_graph_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|n| n == name)
    }

    // ========================================================================
    // Initializers
    // ========================================================================

    /// Check if a tensor is an initializer
    pub fn is_initializer(&self, name: &str) -> bool {
        self.initializers.contains_key(name)
    }

    /// Get initializer by name
    pub fn get_initializer(&self, name: &str) -> Option<&Initializer> {
        self.initializers.get(name)
    }

    /// All initializers in declaration order
    pub fn initializers(&self) -> &InitializerMap {
        &self.initializers
    }

    // ========================================================================
    // Graph traversal
    // ========================================================================

    /// Get the producer node name for a tensor
    pub fn get_producer_name(&self, tensor_name: &str) -> Option<&String> {
        self.producer_map.get(tensor_name)
    }

    /// Get consumer node names for a tensor
    pub fn get_consumer_names(&self, tensor_name: &str) -> Option<&[String]> {
        self.consumer_map.get(tensor_name).map(|v| v.as_slice())
    }
}
