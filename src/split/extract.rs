//! Subgraph extraction
//!
//! Cut a graph at a boundary tensor and keep exactly the nodes lying on some
//! path from the boundary to the requested outputs:
//!
//! 1. walk backward from the outputs over producer edges, never past the
//!    node producing the boundary
//! 2. intersect with the nodes forward-reachable from the boundary, which
//!    drops side branches that only feed a merge point
//! 3. keep the survivors in their original relative order
//! 4. feed the boundary from a fresh placeholder input
//!
//! The source graph is never modified.

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::error::{SplitError, SplitResult};
use crate::graph::{BfsIterator, GraphModel, InitializerMap, Node, TensorRef};

/// Default name of the placeholder input
pub const DEFAULT_PLACEHOLDER: &str = "boundary_input";

/// Extracts self-contained subgraphs
#[derive(Debug, Clone)]
pub struct SubgraphExtractor {
    placeholder: String,
}

impl Default for SubgraphExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_PLACEHOLDER)
    }
}

impl SubgraphExtractor {
    /// Create an extractor naming its placeholder input `placeholder`
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            placeholder: placeholder.into(),
        }
    }

    /// Requested placeholder name
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Placeholder name not clashing with any tensor of `graph`
    fn placeholder_for(&self, graph: &GraphModel) -> String {
        if !graph.has_tensor(&self.placeholder) {
            return self.placeholder.clone();
        }
        (1..)
            .map(|i| format!("{}_{}", self.placeholder, i))
            .find(|name| !graph.has_tensor(name))
            .unwrap_or_else(|| self.placeholder.clone())
    }

    /// Extract the part of `graph` computing `outputs` from `boundary`
    ///
    /// The result has a single input, the placeholder, shaped like the
    /// boundary tensor. Initializers used by the kept nodes and the known
    /// shapes of kept tensors are copied.
    pub fn extract(
        &self,
        graph: &GraphModel,
        boundary: &TensorRef,
        outputs: &[String],
    ) -> SplitResult<GraphModel> {
        let boundary_name = boundary.name.as_str();
        if !graph.has_tensor(boundary_name) {
            return Err(SplitError::BoundaryNotFound(format!(
                "tensor '{}' (not in graph '{}')",
                boundary_name,
                graph.name()
            )));
        }
        if outputs.is_empty() {
            return Err(SplitError::EmptySubgraph(boundary_name.to_string()));
        }
        for output in outputs {
            if !graph.has_tensor(output) {
                return Err(SplitError::InvalidModel(format!(
                    "requested output '{}' is not a tensor of graph '{}'",
                    output,
                    graph.name()
                )));
            }
        }

        let boundary_producer = graph.get_producer_name(boundary_name);

        let mut backward = BfsIterator::backward(graph, outputs.iter().map(String::as_str));
        if let Some(producer) = boundary_producer {
            backward = backward.excluding(producer.as_str());
        }
        let upstream: FxHashSet<&str> = backward.map(|n| n.name.as_str()).collect();
        let downstream: FxHashSet<&str> = BfsIterator::forward(graph, boundary_name)
            .map(|n| n.name.as_str())
            .collect();

        for output in outputs {
            if output == boundary_name {
                continue;
            }
            let connected = graph
                .get_producer_name(output)
                .map_or(false, |p| downstream.contains(p.as_str()));
            if !connected {
                return Err(SplitError::DisconnectedOutput {
                    output: output.clone(),
                    boundary: boundary_name.to_string(),
                });
            }
        }

        let selected: Vec<&Node> = graph
            .nodes()
            .filter(|n| upstream.contains(n.name.as_str()) && downstream.contains(n.name.as_str()))
            .collect();
        if selected.is_empty() {
            return Err(SplitError::EmptySubgraph(boundary_name.to_string()));
        }

        let placeholder = self.placeholder_for(graph);
        let rename = |t: &String| {
            if t == boundary_name {
                placeholder.clone()
            } else {
                t.clone()
            }
        };

        let mut produced: FxHashSet<&str> = FxHashSet::default();
        let mut initializers = InitializerMap::new();
        let mut nodes = Vec::with_capacity(selected.len());
        for node in &selected {
            for input in node.inputs.iter().filter(|i| !i.is_empty()) {
                if input == boundary_name || produced.contains(input.as_str()) {
                    continue;
                }
                match graph.get_initializer(input) {
                    Some(init) => {
                        initializers
                            .entry(input.clone())
                            .or_insert_with(|| init.clone());
                    }
                    None => {
                        return Err(SplitError::UnboundInput {
                            node: node.name.clone(),
                            tensor: input.clone(),
                        })
                    }
                }
            }
            produced.extend(node.outputs.iter().map(String::as_str));

            let mut copy = Node::clone(node);
            copy.inputs = node.inputs.iter().map(rename).collect();
            nodes.push(copy);
        }

        let boundary_shape = boundary
            .shape
            .clone()
            .or_else(|| graph.tensor_shape(boundary_name).map(<[i64]>::to_vec));
        let inputs = vec![TensorRef::new(placeholder.clone(), boundary_shape)];
        let result_outputs = outputs
            .iter()
            .map(|o| {
                let shape = graph.tensor_shape(o).map(<[i64]>::to_vec);
                TensorRef::new(rename(o), shape)
            })
            .collect();

        let mut result =
            GraphModel::new(graph.name(), nodes, inputs, result_outputs, initializers)?;
        for tensor in &produced {
            if let Some(shape) = graph.tensor_shape(tensor) {
                result.set_tensor_shape(tensor, shape.to_vec());
            }
        }

        debug!(
            boundary = %boundary_name,
            placeholder = %placeholder,
            kept = result.node_count(),
            dropped = graph.node_count() - result.node_count(),
            "extracted subgraph"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Initializer, InitializerMap};

    fn names(graph: &GraphModel) -> Vec<&str> {
        graph.node_names().map(String::as_str).collect()
    }

    // x -> n1 -> n2 -> n3 -> y
    fn make_chain() -> GraphModel {
        GraphModel::new(
            "chain",
            vec![
                Node::new("Relu", "n1", &["x"], &["t1"]),
                Node::new("Relu", "n2", &["t1"], &["t2"]),
                Node::new("Relu", "n3", &["t2"], &["y"]),
            ],
            vec![TensorRef::new("x", Some(vec![1, 4]))],
            vec![TensorRef::new("y", None)],
            InitializerMap::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_linear_chain() {
        let graph = make_chain();
        let boundary = graph.tensor("t1");
        let sub = SubgraphExtractor::new("ph")
            .extract(&graph, &boundary, &["y".to_string()])
            .unwrap();

        assert_eq!(names(&sub), vec!["n2", "n3"]);
        assert_eq!(sub.input_names(), &["ph".to_string()]);
        assert_eq!(sub.get_node("n2").unwrap().inputs, vec!["ph"]);
        // source untouched
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.get_node("n2").unwrap().inputs, vec!["t1"]);

        // same value at the output, bit for bit
        let registry = crate::ops::CustomOperatorRegistry::new();
        let mut inputs = crate::tensor::TensorMap::default();
        inputs.insert(
            "x".to_string(),
            ndarray::ArrayD::from_shape_vec(ndarray::IxDyn(&[1, 4]), vec![-1.0, 0.5, 2.0, -0.25])
                .unwrap(),
        );
        let full = crate::runtime::Executor::new(&graph, &registry)
            .run_with(&inputs, &["t1"])
            .unwrap();
        let mut feed = crate::tensor::TensorMap::default();
        feed.insert("ph".to_string(), full["t1"].clone());
        let part = crate::runtime::Executor::new(&sub, &registry).run(&feed).unwrap();
        assert_eq!(crate::validate::max_abs_diff(&full["y"], &part["y"]), 0.0);
    }

    // x -> a -> b ----> d -> y
    //       \-> c ---/
    //   side -> s --/ (into d via e)
    fn make_branchy() -> GraphModel {
        let mut inits = InitializerMap::new();
        inits.insert(
            "k".to_string(),
            Initializer {
                shape: vec![1],
                data: vec![2.0],
            },
        );
        GraphModel::new(
            "branchy",
            vec![
                Node::new("Relu", "a", &["x"], &["a_out"]),
                Node::new("Tanh", "s", &["x"], &["s_out"]),
                Node::new("Relu", "b", &["a_out"], &["b_out"]),
                Node::new("Mul", "c", &["a_out", "k"], &["c_out"]),
                Node::new("Add", "d", &["b_out", "c_out"], &["y"]),
                Node::new("Relu", "unrelated", &["s_out"], &["z"]),
            ],
            vec![TensorRef::new("x", Some(vec![1, 3]))],
            vec![TensorRef::new("y", None), TensorRef::new("z", None)],
            inits,
        )
        .unwrap()
    }

    #[test]
    fn test_branch_and_merge() {
        let graph = make_branchy();
        let boundary = graph.tensor("a_out");
        let sub = SubgraphExtractor::default()
            .extract(&graph, &boundary, &["y".to_string()])
            .unwrap();

        assert_eq!(names(&sub), vec!["b", "c", "d"]);
        assert!(sub.is_initializer("k"));
        assert_eq!(sub.initializers().len(), 1);
        assert_eq!(sub.output_names(), &["y".to_string()]);
    }

    #[test]
    fn test_side_input_is_unbound() {
        // d2 merges the boundary branch with a branch that bypasses it
        let graph = GraphModel::new(
            "bypass",
            vec![
                Node::new("Relu", "a", &["x"], &["a_out"]),
                Node::new("Tanh", "side", &["x"], &["side_out"]),
                Node::new("Add", "merge", &["a_out", "side_out"], &["y"]),
            ],
            vec![TensorRef::new("x", None)],
            vec![TensorRef::new("y", None)],
            InitializerMap::new(),
        )
        .unwrap();

        let err = SubgraphExtractor::default()
            .extract(&graph, &graph.tensor("a_out"), &["y".to_string()])
            .unwrap_err();
        match err {
            SplitError::UnboundInput { node, tensor } => {
                assert_eq!(node, "merge");
                assert_eq!(tensor, "side_out");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_disconnected_output() {
        let graph = make_branchy();
        let err = SubgraphExtractor::default()
            .extract(&graph, &graph.tensor("a_out"), &["z".to_string()])
            .unwrap_err();
        assert!(matches!(err, SplitError::DisconnectedOutput { .. }));
    }

    #[test]
    fn test_empty_subgraph() {
        let graph = make_chain();
        let err = SubgraphExtractor::default()
            .extract(&graph, &graph.tensor("y"), &["y".to_string()])
            .unwrap_err();
        assert!(matches!(err, SplitError::EmptySubgraph(_)));
    }

    #[test]
    fn test_placeholder_collision() {
        let graph = make_chain();
        let sub = SubgraphExtractor::new("t2")
            .extract(&graph, &graph.tensor("t1"), &["y".to_string()])
            .unwrap();
        assert_eq!(sub.input_names(), &["t2_1".to_string()]);
    }

    #[test]
    fn test_placeholder_shape_and_copied_shapes() {
        let mut graph = make_chain();
        graph.set_tensor_shape("t1", vec![1, 4]);
        graph.set_tensor_shape("t2", vec![1, 4]);

        let sub = SubgraphExtractor::new("ph")
            .extract(&graph, &graph.tensor("t1"), &["y".to_string()])
            .unwrap();
        assert_eq!(sub.tensor_shape("ph"), Some(&[1, 4][..]));
        assert_eq!(sub.tensor_shape("t2"), Some(&[1, 4][..]));
        assert_eq!(sub.tensor_shape("t1"), None);
    }
}
