//! Graph execution
//!
//! [`Executor`] interprets native graphs for validation. The
//! [`InferenceRuntime`] trait is the seam through which exported ONNX files
//! are executed; [`ReferenceRuntime`] decodes them back into a graph and
//! interprets that.

pub mod executor;

use std::path::Path;

use tracing::debug;

use crate::error::SplitResult;
use crate::io::{from_onnx, load_onnx};
use crate::ops::CustomOperatorRegistry;
use crate::tensor::TensorMap;

pub use executor::Executor;

/// Loads an exported model file and runs it
pub trait InferenceRuntime {
    /// Runtime name used in logs
    fn name(&self) -> &str;

    /// Run the model at `model_path` on named inputs, returning its outputs
    fn run(&self, model_path: &Path, inputs: &TensorMap) -> SplitResult<TensorMap>;
}

/// ONNX runtime backed by the crate's own interpreter
#[derive(Debug, Clone, Default)]
pub struct ReferenceRuntime {
    registry: CustomOperatorRegistry,
}

impl ReferenceRuntime {
    /// Create a runtime resolving custom-domain nodes through `registry`
    pub fn new(registry: CustomOperatorRegistry) -> Self {
        Self { registry }
    }
}

impl InferenceRuntime for ReferenceRuntime {
    fn name(&self) -> &str {
        "reference"
    }

    fn run(&self, model_path: &Path, inputs: &TensorMap) -> SplitResult<TensorMap> {
        let model = load_onnx(model_path)?;
        let graph = from_onnx(&model)?;
        debug!(path = %model_path.display(), nodes = graph.node_count(), "running exported model");
        Executor::new(&graph, &self.registry).run(inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphModel, Initializer, InitializerMap, Node, TensorRef};
    use crate::io::{save_onnx, to_onnx};
    use ndarray::{ArrayD, IxDyn};

    #[test]
    fn test_reference_runtime_matches_executor() {
        let mut inits = InitializerMap::new();
        inits.insert(
            "w".to_string(),
            Initializer {
                shape: vec![3, 2],
                data: vec![0.5, -0.5, 1.0, 0.25, -1.0, 2.0],
            },
        );
        inits.insert(
            "b".to_string(),
            Initializer {
                shape: vec![2],
                data: vec![0.1, 0.2],
            },
        );
        let graph = GraphModel::new(
            "dense",
            vec![
                Node::new("Dense", "dense", &["x", "w", "b"], &["h"]),
                Node::new("Sigmoid", "act", &["h"], &["y"]),
            ],
            vec![TensorRef::new("x", Some(vec![1, 3]))],
            vec![TensorRef::new("y", None)],
            inits,
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dense.onnx");
        save_onnx(&to_onnx(&graph).unwrap(), &path).unwrap();

        let mut inputs = TensorMap::default();
        inputs.insert(
            "x".to_string(),
            ArrayD::from_shape_vec(IxDyn(&[1, 3]), vec![0.3, -0.2, 0.7]).unwrap(),
        );

        let registry = CustomOperatorRegistry::new();
        let expected = Executor::new(&graph, &registry).run(&inputs).unwrap();
        let runtime = ReferenceRuntime::default();
        let actual = runtime.run(&path, &inputs).unwrap();

        for (a, b) in expected["y"].iter().zip(actual["y"].iter()) {
            assert!((a - b).abs() < 1e-6);
        }
        assert_eq!(runtime.name(), "reference");
    }
}
