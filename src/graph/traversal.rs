//! Graph traversal utilities
//!
//! Breadth-first walks over producer or consumer edges, starting from tensors.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use super::model::{GraphModel, Node};

/// Direction of traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Forward: follow consumer edges (input → output)
    Forward,
    /// Backward: follow producer edges (output → input)
    Backward,
}

/// BFS traversal iterator
///
/// Yields every node reachable from the start tensors in the chosen
/// direction, each node once. Nodes passed to [`BfsIterator::excluding`] are
/// neither yielded nor traversed through.
pub struct BfsIterator<'a> {
    graph: &'a GraphModel,
    queue: VecDeque<&'a str>,
    visited: FxHashSet<&'a str>,
    direction: Direction,
}

impl<'a> BfsIterator<'a> {
    /// Create a new BFS iterator seeded by the neighbours of the given tensors
    ///
    /// Backward walks start at the producers of `tensors`, forward walks at
    /// their consumers.
    pub fn from_tensors<I>(graph: &'a GraphModel, tensors: I, direction: Direction) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut iter = Self {
            graph,
            queue: VecDeque::new(),
            visited: FxHashSet::default(),
            direction,
        };
        for tensor in tensors {
            iter.enqueue_neighbours_of_tensor(tensor);
        }
        iter
    }

    /// Create forward BFS (follows consumers)
    pub fn forward(graph: &'a GraphModel, tensor: &'a str) -> Self {
        Self::from_tensors(graph, [tensor], Direction::Forward)
    }

    /// Create backward BFS (follows producers)
    pub fn backward<I>(graph: &'a GraphModel, tensors: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self::from_tensors(graph, tensors, Direction::Backward)
    }

    /// Never visit the given node (or anything only reachable through it)
    pub fn excluding(mut self, node_name: &'a str) -> Self {
        self.queue.retain(|n| *n != node_name);
        self.visited.insert(node_name);
        self
    }

    fn enqueue(&mut self, node_name: &'a str) {
        if self.visited.insert(node_name) {
            self.queue.push_back(node_name);
        }
    }

    fn enqueue_neighbours_of_tensor(&mut self, tensor: &'a str) {
        let graph = self.graph;
        match self.direction {
            Direction::Backward => {
                if let Some(producer) = graph.get_producer_name(tensor) {
                    self.enqueue(producer.as_str());
                }
            }
            Direction::Forward => {
                if let Some(consumers) = graph.get_consumer_names(tensor) {
                    for consumer in consumers {
                        self.enqueue(consumer.as_str());
                    }
                }
            }
        }
    }
}

impl<'a> Iterator for BfsIterator<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let graph = self.graph;
        let name = self.queue.pop_front()?;
        let node = graph.get_node(name)?;

        let edges = match self.direction {
            Direction::Forward => &node.outputs,
            Direction::Backward => &node.inputs,
        };
        for tensor in edges {
            if !tensor.is_empty() {
                self.enqueue_neighbours_of_tensor(tensor.as_str());
            }
        }

        Some(node)
    }
}
