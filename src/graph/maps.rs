//! Graph map types and builders
//!
//! Defines the lookup structures kept alongside the node sequence.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::model::{Initializer, Node};

/// Type alias for producer map: tensor_name → producer node name
pub type ProducerMap = FxHashMap<String, String>;

/// Type alias for consumer map: tensor_name → [consumer_node_names]
/// SmallVec optimized for common case of 1-4 consumers
pub type ConsumerMap = FxHashMap<String, SmallVec<[String; 4]>>;

/// Type alias for node map: node_name → Node (order preserved)
pub type NodeMap = IndexMap<String, Node>;

/// Type alias for initializer map: name → Initializer (order preserved)
pub type InitializerMap = IndexMap<String, Initializer>;

/// Type alias for shape map: tensor_name → dims (-1 = unknown)
pub type ShapeMap = FxHashMap<String, Vec<i64>>;

/// Build producer map from nodes
///
/// Maps each output tensor name to the node that produces it.
pub fn build_producer_map<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> ProducerMap {
    let mut map = FxHashMap::default();

    for node in nodes {
        for output in &node.outputs {
            if !output.is_empty() {
                map.insert(output.clone(), node.name.clone());
            }
        }
    }

    map
}

/// Build consumer map from nodes
///
/// Maps each tensor name to the list of nodes that consume it. A node that
/// reads the same tensor twice is listed once.
pub fn build_consumer_map<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> ConsumerMap {
    let mut map: ConsumerMap = FxHashMap::default();

    for node in nodes {
        for input in &node.inputs {
            if input.is_empty() {
                continue;
            }
            let consumers = map.entry(input.clone()).or_default();
            if !consumers.contains(&node.name) {
                consumers.push(node.name.clone());
            }
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_nodes() -> Vec<Node> {
        vec![
            Node::new("Dense", "dense_0", &["x", "w0", "b0"], &["h"]),
            Node::new("Add", "add_0", &["h", "h"], &["sum"]),
            Node::new("Relu", "relu_0", &["sum"], &["y"]),
        ]
    }

    #[test]
    fn test_build_producer_map() {
        let nodes = make_test_nodes();
        let map = build_producer_map(&nodes);

        assert_eq!(map.get("h"), Some(&"dense_0".to_string()));
        assert_eq!(map.get("y"), Some(&"relu_0".to_string()));
        assert!(map.get("x").is_none()); // input, not produced by node
    }

    #[test]
    fn test_build_consumer_map() {
        let nodes = make_test_nodes();
        let map = build_consumer_map(&nodes);

        assert_eq!(
            map.get("x").map(|v| v.as_slice()),
            Some(&["dense_0".to_string()][..])
        );
        // consumed twice by the same node, recorded once
        assert_eq!(map.get("h").map(|v| v.len()), Some(1));
        assert!(map.get("y").is_none());
    }
}
