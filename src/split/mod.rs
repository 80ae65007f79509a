//! Graph splitting
//!
//! [`BoundaryLocator`] finds the split tensor by node name and
//! [`SubgraphExtractor`] cuts out everything between it and the outputs.
//!
//! # Example
//!
//! ```ignore
//! use model_splitter::split::{BoundaryLocator, BoundarySpec, SubgraphExtractor};
//!
//! let boundary = BoundaryLocator::find(&graph, &BoundarySpec::contains("concatenate"))?;
//! let classifier = SubgraphExtractor::new("mel_spectrogram")
//!     .extract(&graph, &boundary, graph.output_names())?;
//! ```

pub mod boundary;
pub mod extract;

pub use boundary::{BoundaryLocator, BoundarySpec};
pub use extract::{SubgraphExtractor, DEFAULT_PLACEHOLDER};
