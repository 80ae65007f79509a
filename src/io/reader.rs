//! Model readers
//!
//! Load native `.mgraph` models into a [`GraphModel`] and ONNX models from
//! files or bytes.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use indexmap::IndexMap;
use prost::Message;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{SplitError, SplitResult};
use crate::graph::{GraphModel, Initializer, InitializerMap, Node, TensorRef};
use crate::ops::{builtin, infer_shapes, CustomOperatorRegistry};
use crate::proto::ModelProto;

/// Extension of native model files
pub const NATIVE_EXTENSION: &str = "mgraph";

// ============================================================================
// Native format
// ============================================================================

/// Declared graph input in a native file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeInput {
    /// Tensor name
    pub name: String,
    /// Static shape, -1 for unknown dimensions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<i64>>,
}

/// On-disk layout of a native model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeModel {
    /// Graph name
    #[serde(default)]
    pub name: String,
    /// Graph inputs
    pub inputs: Vec<NativeInput>,
    /// Graph output tensor names
    pub outputs: Vec<String>,
    /// Nodes in topological order
    pub nodes: Vec<Node>,
    /// Constant tensors
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub initializers: InitializerMap,
    /// Known shapes of intermediate and output tensors
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub value_info: IndexMap<String, Vec<i64>>,
}

impl NativeModel {
    /// Build the in-memory graph, validating its structure
    pub fn into_graph(self) -> SplitResult<GraphModel> {
        let NativeModel {
            name,
            inputs,
            outputs,
            nodes,
            initializers,
            value_info,
        } = self;

        let inputs = inputs
            .into_iter()
            .map(|i| TensorRef::new(i.name, i.shape))
            .collect();
        let outputs = outputs
            .into_iter()
            .map(|o| {
                let shape = value_info.get(&o).cloned();
                TensorRef::new(o, shape)
            })
            .collect();

        let mut graph = GraphModel::new(name, nodes, inputs, outputs, initializers)?;
        for (tensor, shape) in value_info {
            if graph.has_tensor(&tensor) {
                graph.set_tensor_shape(&tensor, shape);
            } else {
                debug!(tensor = %tensor, "ignoring shape of unknown tensor");
            }
        }
        Ok(graph)
    }

    /// Capture a graph in the on-disk layout
    pub fn from_graph(graph: &GraphModel) -> Self {
        let value_info = graph
            .nodes()
            .flat_map(|n| n.outputs.iter())
            .filter_map(|t| graph.tensor_shape(t).map(|s| (t.clone(), s.to_vec())))
            .collect();

        Self {
            name: graph.name().to_string(),
            inputs: graph
                .inputs()
                .into_iter()
                .map(|t| NativeInput {
                    name: t.name,
                    shape: t.shape,
                })
                .collect(),
            outputs: graph.output_names().to_vec(),
            nodes: graph.nodes().cloned().collect(),
            initializers: graph
                .initializers()
                .iter()
                .map(|(k, v)| (k.clone(), Initializer::clone(v)))
                .collect(),
            value_info,
        }
    }
}

/// Read a native model file without resolving its operators
///
/// The result is structurally valid but may reference operator kinds that
/// have no implementation. Use [`GraphLoader`] to get an executable graph.
pub fn read_graph<P: AsRef<Path>>(path: P) -> SplitResult<GraphModel> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(SplitError::ModelNotFound(path.to_path_buf()));
    }

    let reader = BufReader::new(File::open(path)?);
    let native: NativeModel =
        serde_json::from_reader(reader).map_err(|source| SplitError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    native.into_graph().map_err(|e| match e {
        SplitError::InvalidModel(msg) => {
            SplitError::InvalidModel(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

// ============================================================================
// GraphLoader
// ============================================================================

/// Loader options
#[derive(Debug, Clone, Default)]
pub struct LoaderConfig {
    /// Log a summary (node count, input shapes) of every loaded model
    pub summary: bool,
}

/// Loads native models and resolves their operators
#[derive(Debug, Clone, Default)]
pub struct GraphLoader {
    config: LoaderConfig,
}

impl GraphLoader {
    /// Create a loader
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Loader configuration
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load a native model
    ///
    /// Every operator kind outside the built-in set must resolve through
    /// `registry`, falling back to its stub factory. Kinds that resolve to
    /// nothing fail with [`SplitError::UnresolvedOperator`]. Unknown
    /// intermediate shapes are inferred afterwards. Errors carry `path`
    /// (see [`SplitError::in_model`]).
    pub fn load<P: AsRef<Path>>(
        &self,
        path: P,
        registry: &mut CustomOperatorRegistry,
    ) -> SplitResult<GraphModel> {
        let path = path.as_ref();
        self.load_resolved(path, registry)
            .map_err(|e| e.in_model(path))
    }

    fn load_resolved(
        &self,
        path: &Path,
        registry: &mut CustomOperatorRegistry,
    ) -> SplitResult<GraphModel> {
        let mut graph = read_graph(path)?;

        let mut stubbed: Vec<String> = Vec::new();
        for node in graph.nodes() {
            if builtin::is_builtin(&node.op_type) {
                continue;
            }
            match registry.resolve_or_stub(&node.op_type) {
                Some((_, true)) => stubbed.push(node.op_type.clone()),
                Some(_) => {}
                None => {
                    return Err(SplitError::UnresolvedOperator {
                        op: node.op_type.clone(),
                        node: node.name.clone(),
                    })
                }
            }
        }
        if !stubbed.is_empty() {
            warn!(
                path = %path.display(),
                operators = ?stubbed,
                "model loaded with stub operators, numeric results are not faithful"
            );
        }

        let inferred = infer_shapes(&mut graph, registry)?;
        debug!(path = %path.display(), inferred, "shape inference done");

        if self.config.summary {
            let inputs: Vec<String> = graph
                .inputs()
                .iter()
                .map(|t| match &t.shape {
                    Some(s) => format!("{}{:?}", t.name, s),
                    None => format!("{}[?]", t.name),
                })
                .collect();
            info!(
                path = %path.display(),
                nodes = graph.node_count(),
                parameters = graph.parameter_count(),
                inputs = %inputs.join(", "),
                "loaded model"
            );
        }

        Ok(graph)
    }
}

// ============================================================================
// ONNX
// ============================================================================

/// Load an ONNX model from a file path
pub fn load_onnx<P: AsRef<Path>>(path: P) -> SplitResult<ModelProto> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(SplitError::ModelNotFound(path.to_path_buf()));
    }

    let mut reader = BufReader::new(File::open(path)?);
    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer)?;

    load_onnx_from_bytes(&buffer)
}

/// Load an ONNX model from bytes
pub fn load_onnx_from_bytes(bytes: &[u8]) -> SplitResult<ModelProto> {
    Ok(ModelProto::decode(bytes)?)
}
