//! Sequential graph interpreter
//!
//! Runs a [`GraphModel`] node by node in stored order on `ndarray` values.
//! Built-in kinds use the kernels of [`crate::ops::builtin`], every other
//! kind the implementation registered for it.

use ndarray::ArrayD;
use tracing::trace;

use crate::error::{SplitError, SplitResult};
use crate::graph::{GraphModel, Node};
use crate::ops::{builtin, CustomOperatorRegistry};
use crate::tensor::{shape_matches, TensorMap};

/// Interpreter bound to one graph
#[derive(Debug, Clone, Copy)]
pub struct Executor<'a> {
    graph: &'a GraphModel,
    registry: &'a CustomOperatorRegistry,
}

impl<'a> Executor<'a> {
    /// Create an executor
    pub fn new(graph: &'a GraphModel, registry: &'a CustomOperatorRegistry) -> Self {
        Self { graph, registry }
    }

    /// Run the graph and return its outputs
    pub fn run(&self, inputs: &TensorMap) -> SplitResult<TensorMap> {
        self.run_with(inputs, &[])
    }

    /// Run the graph and return its outputs plus the named intermediate
    /// tensors
    pub fn run_with(&self, inputs: &TensorMap, extra: &[&str]) -> SplitResult<TensorMap> {
        let mut values = TensorMap::default();

        for name in self.graph.input_names() {
            let value = inputs.get(name).ok_or_else(|| {
                SplitError::InvalidModel(format!(
                    "graph '{}' needs input '{}' which was not provided",
                    self.graph.name(),
                    name
                ))
            })?;
            if let Some(declared) = self.graph.tensor_shape(name) {
                if !shape_matches(declared, value.shape()) {
                    return Err(SplitError::InvalidModel(format!(
                        "input '{}' has shape {:?}, graph '{}' declares {:?}",
                        name,
                        value.shape(),
                        self.graph.name(),
                        declared
                    )));
                }
            }
            values.insert(name.clone(), value.clone());
        }
        for (name, init) in self.graph.initializers() {
            values.insert(name.clone(), init.to_array()?);
        }

        for node in self.graph.nodes() {
            let outputs = self.eval_node(node, &values)?;
            for (name, value) in node.outputs.iter().zip(outputs) {
                if !name.is_empty() {
                    trace!(node = %node.name, tensor = %name, shape = ?value.shape(), "computed");
                    values.insert(name.clone(), value);
                }
            }
        }

        let mut result = TensorMap::default();
        let wanted = self
            .graph
            .output_names()
            .iter()
            .map(String::as_str)
            .chain(extra.iter().copied());
        for name in wanted {
            let value = values.get(name).ok_or_else(|| {
                SplitError::Internal(format!(
                    "tensor '{}' was not computed by graph '{}'",
                    name,
                    self.graph.name()
                ))
            })?;
            result.insert(name.to_string(), value.clone());
        }
        Ok(result)
    }

    fn eval_node(&self, node: &Node, values: &TensorMap) -> SplitResult<Vec<ArrayD<f32>>> {
        let args: Vec<&ArrayD<f32>> = node
            .inputs
            .iter()
            .filter(|i| !i.is_empty())
            .map(|i| {
                values.get(i).ok_or_else(|| {
                    SplitError::Internal(format!(
                        "input '{}' of node '{}' has no value",
                        i, node.name
                    ))
                })
            })
            .collect::<SplitResult<_>>()?;

        let outputs = if builtin::is_builtin(&node.op_type) {
            vec![builtin::evaluate(node, &args)?]
        } else {
            let op = self.registry.resolve(&node.op_type).ok_or_else(|| {
                SplitError::UnresolvedOperator {
                    op: node.op_type.clone(),
                    node: node.name.clone(),
                }
            })?;
            op.compute(node, &args)?
        };

        if outputs.len() < node.outputs.len() {
            return Err(SplitError::InvalidNode(format!(
                "{} node '{}' produced {} values for {} outputs",
                node.op_type,
                node.name,
                outputs.len(),
                node.outputs.len()
            )));
        }
        Ok(outputs)
    }

    /// Check whether the graph uses stub implementations
    pub fn uses_stubs(&self) -> bool {
        self.graph
            .nodes()
            .any(|n| !builtin::is_builtin(&n.op_type) && self.registry.is_stubbed(&n.op_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AttrValue, Initializer, InitializerMap, TensorRef};
    use ndarray::IxDyn;

    fn make_graph() -> GraphModel {
        let mut inits = InitializerMap::new();
        inits.insert(
            "w".to_string(),
            Initializer {
                shape: vec![2, 2],
                data: vec![1.0, 2.0, 3.0, 4.0],
            },
        );
        GraphModel::new(
            "small",
            vec![
                Node::new("MatMul", "mm", &["x", "w"], &["h"]),
                Node::new("Relu", "relu", &["h"], &["r"]),
                Node::new("Concatenate", "cat", &["r", "h"], &["y"])
                    .with_attr("axis", AttrValue::Int(-1)),
            ],
            vec![TensorRef::new("x", Some(vec![-1, 2]))],
            vec![TensorRef::new("y", None)],
            inits,
        )
        .unwrap()
    }

    fn input(data: Vec<f32>) -> TensorMap {
        let mut map = TensorMap::default();
        map.insert(
            "x".to_string(),
            ArrayD::from_shape_vec(IxDyn(&[1, 2]), data).unwrap(),
        );
        map
    }

    #[test]
    fn test_run() {
        let graph = make_graph();
        let registry = CustomOperatorRegistry::new();
        let out = Executor::new(&graph, &registry)
            .run(&input(vec![1.0, -1.0]))
            .unwrap();

        // h = [1*1 + -1*3, 1*2 + -1*4] = [-2, -2]
        let y = &out["y"];
        assert_eq!(y.shape(), &[1, 4]);
        assert_eq!(y.iter().copied().collect::<Vec<_>>(), vec![0.0, 0.0, -2.0, -2.0]);
    }

    #[test]
    fn test_run_with_intermediate() {
        let graph = make_graph();
        let registry = CustomOperatorRegistry::new();
        let out = Executor::new(&graph, &registry)
            .run_with(&input(vec![1.0, 1.0]), &["h"])
            .unwrap();
        assert_eq!(out["h"].iter().copied().collect::<Vec<_>>(), vec![4.0, 6.0]);
        assert!(out.contains_key("y"));
    }

    #[test]
    fn test_missing_input() {
        let graph = make_graph();
        let registry = CustomOperatorRegistry::new();
        assert!(Executor::new(&graph, &registry).run(&TensorMap::default()).is_err());
    }

    #[test]
    fn test_wrong_input_shape() {
        let graph = make_graph();
        let registry = CustomOperatorRegistry::new();
        let mut map = TensorMap::default();
        map.insert("x".to_string(), ArrayD::zeros(IxDyn(&[1, 3])));
        assert!(Executor::new(&graph, &registry).run(&map).is_err());
    }

    #[test]
    fn test_unresolved_custom_op() {
        let graph = GraphModel::new(
            "custom",
            vec![Node::new("Mystery", "m", &["x"], &["y"])],
            vec![TensorRef::new("x", None)],
            vec![TensorRef::new("y", None)],
            InitializerMap::new(),
        )
        .unwrap();
        let registry = CustomOperatorRegistry::new();
        let err = Executor::new(&graph, &registry)
            .run(&input(vec![0.0, 0.0]))
            .unwrap_err();
        assert!(matches!(err, SplitError::UnresolvedOperator { .. }));
    }

    #[test]
    fn test_stub_detection() {
        let graph = GraphModel::new(
            "custom",
            vec![Node::new("Mystery", "m", &["x"], &["y"])],
            vec![TensorRef::new("x", None)],
            vec![TensorRef::new("y", None)],
            InitializerMap::new(),
        )
        .unwrap();
        let mut registry = CustomOperatorRegistry::new();
        registry.install_linear_stub();
        registry.resolve_or_stub("Mystery").unwrap();

        let executor = Executor::new(&graph, &registry);
        assert!(executor.uses_stubs());
        let out = executor.run(&input(vec![0.5, 0.5])).unwrap();
        assert_eq!(out["y"].shape(), &[1, 2]);
    }
}
