//! Boundary discovery
//!
//! A boundary is found by name: the first node, in stored topological order,
//! whose name matches a [`BoundarySpec`] provides the split tensor (its first
//! output).

use std::fmt;

use tracing::debug;

use crate::error::{SplitError, SplitResult};
use crate::graph::{GraphModel, Node, TensorRef};

/// Rule selecting the boundary node by name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BoundarySpec {
    /// Name contains the pattern, ignoring ASCII case
    Contains(String),
    /// Name equals the pattern
    Exact(String),
    /// Name starts with the pattern
    Prefix(String),
}

impl BoundarySpec {
    /// Case-insensitive substring rule
    pub fn contains(pattern: impl Into<String>) -> Self {
        Self::Contains(pattern.into())
    }

    /// Check a node name against the rule
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Contains(p) => name.to_ascii_lowercase().contains(&p.to_ascii_lowercase()),
            Self::Exact(p) => name == p,
            Self::Prefix(p) => name.starts_with(p.as_str()),
        }
    }
}

impl Default for BoundarySpec {
    /// The join of the two spectrogram branches in audio classifiers
    fn default() -> Self {
        Self::contains("concatenate")
    }
}

impl fmt::Display for BoundarySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contains(p) => write!(f, "name containing '{}'", p),
            Self::Exact(p) => write!(f, "name '{}'", p),
            Self::Prefix(p) => write!(f, "name starting with '{}'", p),
        }
    }
}

/// Locates the boundary node of a graph
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundaryLocator;

impl BoundaryLocator {
    /// First node matching `spec`
    pub fn find_node<'a>(graph: &'a GraphModel, spec: &BoundarySpec) -> SplitResult<&'a Node> {
        let mut matches = graph.nodes().filter(|n| spec.matches(&n.name));
        let node = matches
            .next()
            .ok_or_else(|| SplitError::BoundaryNotFound(spec.to_string()))?;

        let others: Vec<&str> = matches.map(|n| n.name.as_str()).collect();
        if !others.is_empty() {
            debug!(chosen = %node.name, ignored = ?others, "several boundary candidates");
        }
        Ok(node)
    }

    /// Boundary tensor: first output of the first matching node, with its
    /// shape when known
    pub fn find(graph: &GraphModel, spec: &BoundarySpec) -> SplitResult<TensorRef> {
        let node = Self::find_node(graph, spec)?;
        let output = node.first_output().ok_or_else(|| {
            SplitError::InvalidNode(format!("boundary node '{}' has no outputs", node.name))
        })?;
        debug!(node = %node.name, tensor = %output, "boundary located");
        Ok(graph.tensor(output))
    }
}
