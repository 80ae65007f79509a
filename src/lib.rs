//! # Model Splitter
//!
//! Split native model graphs at a boundary node and export the part a target
//! runtime supports to ONNX.
//!
//! Audio classifiers often start with a spectrogram front end built from
//! custom operators that no ONNX runtime ships. This crate cuts such a graph
//! right after the front end, exports the classifier that remains, and checks
//! numerically that the exported part reproduces the full model.
//!
//! ## Features
//!
//! - **Custom Operators**: Registry with manifest loading and seeded stubs
//! - **Graph Splitting**: Boundary lookup and sub-graph extraction
//! - **Export**: Built-in ONNX converter or an external tool
//! - **Validation**: Seeded random inputs, reference execution, max-abs-diff
//! - **Batch Conversion**: Recursive, idempotent, continues past failures
//!
//! ## Example
//!
//! ```ignore
//! use std::path::Path;
//! use model_splitter::prelude::*;
//!
//! let report = convert_classifier(
//!     Path::new("models/birdnet"),
//!     &ConvertOptions::default(),
//!     &FormatExporter::builtin(),
//! )?;
//! assert!(report.all_passed());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// ============================================================================
// Module declarations
// ============================================================================

pub mod convert;
pub mod error;
pub mod export;
pub mod graph;
pub mod io;
pub mod ops;
pub mod proto;
pub mod runtime;
pub mod split;
pub mod tensor;
pub mod validate;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Prelude module - import commonly used types with `use model_splitter::prelude::*`
pub mod prelude {
    pub use crate::convert::{
        convert_batch, convert_classifier, convert_metadata, BatchReport, ConversionReport,
        ConvertOptions,
    };
    pub use crate::error::{SplitError, SplitResult};
    pub use crate::export::{ConversionTool, FormatExporter, ProcessTool};
    pub use crate::graph::{GraphModel, Node, TensorRef};
    pub use crate::io::{from_onnx, read_graph, save_graph, to_onnx, GraphLoader, LoaderConfig};
    pub use crate::ops::{CustomOperator, CustomOperatorRegistry};
    pub use crate::runtime::{Executor, InferenceRuntime, ReferenceRuntime};
    pub use crate::split::{BoundaryLocator, BoundarySpec, SubgraphExtractor};
    pub use crate::tensor::TensorMap;
    pub use crate::validate::{EquivalenceValidator, ValidationResult, ValidatorConfig};
}

// ============================================================================
// Crate-level re-exports
// ============================================================================

pub use error::{SplitError, SplitResult};

// ============================================================================
// Version information
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
