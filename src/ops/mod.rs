//! Operator implementations
//!
//! Every node kind is either one of the [built-in kernels](builtin) or a
//! custom operator resolved through the [`CustomOperatorRegistry`]. Custom
//! operators come from three places:
//!
//! - explicit [`CustomOperatorRegistry::register`] calls
//! - an operator manifest (`custom_ops.json`) next to the model, mapping
//!   operator names onto the plugin [`catalog`]
//! - an installed stub factory, used as a last resort
//!
//! # Example
//!
//! ```ignore
//! use model_splitter::ops::CustomOperatorRegistry;
//!
//! let mut registry = CustomOperatorRegistry::new();
//! registry.load_manifest(&model_dir.join("custom_ops.json"))?;
//! registry.install_linear_stub();
//! ```

pub mod builtin;
pub mod mel;
pub mod stub;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use ndarray::ArrayD;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{SplitError, SplitResult};
use crate::graph::{GraphModel, Node};

pub use mel::MelSpectrogram;
pub use stub::LinearStub;

/// Implementation of an operator kind outside the built-in set
pub trait CustomOperator: Send + Sync {
    /// Compute the node outputs from its input values
    fn compute(&self, node: &Node, inputs: &[&ArrayD<f32>]) -> SplitResult<Vec<ArrayD<f32>>>;

    /// Shape of the first output given the input shapes, if it can be known
    /// statically
    fn infer_shape(&self, _node: &Node, _inputs: &[Option<Vec<i64>>]) -> Option<Vec<i64>> {
        None
    }

    /// Whether this implementation stands in for an unavailable definition
    fn is_stub(&self) -> bool {
        false
    }
}

/// Shared handle to a custom operator
pub type OperatorRef = Arc<dyn CustomOperator>;

/// Produces a stand-in implementation for an operator name
pub type StubFactory = Arc<dyn Fn(&str) -> OperatorRef + Send + Sync>;

/// File name of the operator manifest looked up next to a model
pub const OPERATOR_MANIFEST: &str = "custom_ops.json";

/// Operator manifest: operator name → catalog implementation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorManifest {
    /// Operator name → implementation name
    #[serde(default)]
    pub operators: IndexMap<String, String>,
}

impl OperatorManifest {
    /// Read a manifest file
    pub fn read(path: &Path) -> SplitResult<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|source| SplitError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Look up an implementation in the plugin catalog
pub fn catalog(implementation: &str) -> Option<OperatorRef> {
    match implementation {
        "mel_spectrogram" | "MelSpecLayerSimple" => Some(Arc::new(MelSpectrogram)),
        "linear_stub" => Some(Arc::new(LinearStub::default())),
        _ => None,
    }
}

/// Registry of custom operator implementations
#[derive(Clone, Default)]
pub struct CustomOperatorRegistry {
    operators: FxHashMap<String, OperatorRef>,
    stub: Option<StubFactory>,
}

impl CustomOperatorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation, replacing any previous one
    pub fn register(&mut self, name: impl Into<String>, implementation: OperatorRef) {
        let name = name.into();
        debug!(op = %name, "registered custom operator");
        self.operators.insert(name, implementation);
    }

    /// Resolve a registered implementation
    pub fn resolve(&self, name: &str) -> Option<OperatorRef> {
        self.operators.get(name).cloned()
    }

    /// Check if an implementation is registered
    pub fn contains(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }

    /// Number of registered implementations
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    /// Check if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Install a stub factory used for names nothing else resolves
    pub fn install_stub(&mut self, factory: StubFactory) {
        self.stub = Some(factory);
    }

    /// Install [`LinearStub`] as the stub factory
    pub fn install_linear_stub(&mut self) {
        self.install_stub(Arc::new(|_name: &str| -> OperatorRef {
            Arc::new(LinearStub::default())
        }));
    }

    /// Check if a stub factory is installed
    pub fn has_stub(&self) -> bool {
        self.stub.is_some()
    }

    /// Resolve a name, falling back to the stub factory
    ///
    /// A stub created here is registered under `name` so every node of that
    /// kind shares it. The flag is `true` when the stub was used.
    pub fn resolve_or_stub(&mut self, name: &str) -> Option<(OperatorRef, bool)> {
        if let Some(op) = self.resolve(name) {
            return Some((op, false));
        }
        let factory = self.stub.clone()?;
        let op = factory(name);
        warn!(op = %name, "no implementation available, substituting a stub");
        self.operators.insert(name.to_string(), Arc::clone(&op));
        Some((op, true))
    }

    /// Check whether a registered implementation is a stub
    pub fn is_stubbed(&self, name: &str) -> bool {
        self.operators.get(name).map_or(false, |op| op.is_stub())
    }

    /// Register every entry of an operator manifest
    ///
    /// Returns the number of registered operators. An entry naming an
    /// implementation outside the catalog is an error.
    pub fn load_manifest(&mut self, path: &Path) -> SplitResult<usize> {
        let manifest = OperatorManifest::read(path)?;
        for (op_name, implementation) in &manifest.operators {
            let op = catalog(implementation).ok_or_else(|| {
                SplitError::InvalidModel(format!(
                    "{}: operator '{}' maps to unknown implementation '{}'",
                    path.display(),
                    op_name,
                    implementation
                ))
            })?;
            self.register(op_name.clone(), op);
        }
        Ok(manifest.operators.len())
    }
}

/// Fill in unknown tensor shapes by walking the graph in order
///
/// Built-in kinds use their own inference rule, custom kinds the optional
/// [`CustomOperator::infer_shape`] contract of their registered
/// implementation. Shapes already known (declared in the file or set by the
/// caller) are never overridden. Returns the number of shapes added.
pub fn infer_shapes(graph: &mut GraphModel, registry: &CustomOperatorRegistry) -> SplitResult<usize> {
    let nodes: Vec<Node> = graph.nodes().cloned().collect();
    let mut added = 0;

    for node in &nodes {
        let output = match node.first_output() {
            Some(o) if graph.tensor_shape(o).is_none() => o,
            _ => continue,
        };
        let input_shapes: Vec<Option<Vec<i64>>> = node
            .inputs
            .iter()
            .map(|i| graph.tensor_shape(i).map(<[i64]>::to_vec))
            .collect();

        let inferred = if builtin::is_builtin(&node.op_type) {
            builtin::infer_shape(node, &input_shapes)?
        } else {
            registry
                .resolve(&node.op_type)
                .and_then(|op| op.infer_shape(node, &input_shapes))
        };

        if let Some(shape) = inferred {
            graph.set_tensor_shape(output, shape);
            added += 1;
        }
    }

    Ok(added)
}

impl fmt::Debug for CustomOperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.operators.keys().collect();
        names.sort();
        f.debug_struct("CustomOperatorRegistry")
            .field("operators", &names)
            .field("stub", &self.stub.is_some())
            .finish()
    }
}
