//! Graph representation for native models
//!
//! This module provides the in-memory computation graph and its queries:
//!
//! - [`GraphModel`]: node sequence in topological order plus O(1) lookups
//! - [`maps`]: type definitions and builders for graph maps
//! - [`traversal`]: breadth-first walks over producer/consumer edges
//!
//! # Example
//!
//! ```ignore
//! use model_splitter::graph::GraphModel;
//!
//! let producer = graph.get_producer_name("concat_out");
//! let consumers = graph.get_consumer_names("concat_out");
//! ```
//!
//! # Maps
//!
//! | Map | Description |
//! |-----|-------------|
//! | `producer_map` | tensor name → producer node name |
//! | `consumer_map` | tensor name → consumer node names |
//! | `nodes` | node name → Node (order preserved) |
//! | `initializers` | name → Initializer (order preserved) |
//! | `shapes` | tensor name → known dims |

pub mod accessors;
pub mod maps;
pub mod model;
pub mod traversal;

// Re-export main types
pub use maps::{ConsumerMap, InitializerMap, NodeMap, ProducerMap, ShapeMap};
pub use model::{AttrValue, GraphModel, Initializer, Node, TensorRef};
pub use traversal::{BfsIterator, Direction};
