//! Model I/O
//!
//! This module reads and writes both sides of a conversion:
//!
//! - native `.mgraph` models ([`GraphLoader`], [`read_graph`], [`save_graph`])
//! - ONNX models ([`load_onnx`], [`save_onnx`]) and the mapping between the
//!   two ([`to_onnx`], [`from_onnx`])
//!
//! # Example
//!
//! ```ignore
//! use model_splitter::io::{GraphLoader, LoaderConfig, to_onnx, save_onnx};
//! use model_splitter::ops::CustomOperatorRegistry;
//!
//! let mut registry = CustomOperatorRegistry::new();
//! let graph = GraphLoader::new(LoaderConfig::default()).load("audio-model.mgraph", &mut registry)?;
//! save_onnx(&to_onnx(&graph)?, "audio-model.onnx")?;
//! ```

pub mod onnx;
pub mod reader;
pub mod validation;
pub mod writer;

// Re-exports
pub use onnx::{from_onnx, to_onnx, CUSTOM_DOMAIN, IR_VERSION, OPSET_VERSION, PRODUCER_NAME};
pub use reader::{
    load_onnx, load_onnx_from_bytes, read_graph, GraphLoader, LoaderConfig, NativeInput,
    NativeModel, NATIVE_EXTENSION,
};
pub use validation::{check_model, get_opset_version, is_opset_supported, validate_model, ModelCheck};
pub use writer::{file_size_mb, save_graph, save_onnx};
