//! Error types for model-splitter
//!
//! This module defines all error types used throughout the crate.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Main error type for loading, splitting and exporting model graphs
#[derive(Error, Debug)]
pub enum SplitError {
    /// Required input file is absent
    #[error("Model not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    /// No node name matched the boundary rule
    #[error("Boundary not found: no node matches {0}")]
    BoundaryNotFound(String),

    /// A requested output does not depend on the boundary tensor
    #[error("Output '{output}' is not reachable from boundary '{boundary}'")]
    DisconnectedOutput {
        /// Requested output tensor
        output: String,
        /// Boundary tensor
        boundary: String,
    },

    /// Nothing lies between the boundary and the outputs
    #[error("Empty subgraph: no node between boundary '{0}' and the requested outputs")]
    EmptySubgraph(String),

    /// The extracted graph would need a tensor it cannot produce
    #[error("Node '{node}' needs tensor '{tensor}' which is neither the boundary nor a constant")]
    UnboundInput {
        /// Consuming node
        node: String,
        /// Unbound tensor
        tensor: String,
    },

    /// Operator kind without implementation and without stub
    #[error("Unresolved operator '{op}' used by node '{node}'")]
    UnresolvedOperator {
        /// Operator kind
        op: String,
        /// Node using it
        node: String,
    },

    /// Conversion tool failed
    #[error("Export to {} failed (exit code {exit_code}):\n{diagnostics}", .path.display())]
    ExportError {
        /// Destination path
        path: PathBuf,
        /// Tool exit code (-1 if terminated by a signal)
        exit_code: i32,
        /// Captured tool stderr, verbatim
        diagnostics: String,
    },

    /// Batch input contained no model files
    #[error("No .{extension} files found in {}", .path.display())]
    NoModelsFound {
        /// Searched directory
        path: PathBuf,
        /// Expected extension
        extension: String,
    },

    /// Options that cannot be combined or do not apply
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid model
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Invalid node configuration
    #[error("Invalid node: {0}")]
    InvalidNode(String),

    /// Shape inference failed
    #[error("Shape inference failed: {0}")]
    ShapeInferenceFailed(String),

    /// Invalid tensor data type
    #[error("Invalid data type: {0}")]
    InvalidDataType(i32),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Native model (JSON) error
    #[error("Failed to parse {}: {source}", .path.display())]
    Json {
        /// File being parsed
        path: PathBuf,
        /// Parser error
        source: serde_json::Error,
    },

    /// Protobuf decode error
    #[error("Protobuf decode error: {0}")]
    ProtoDecode(#[from] prost::DecodeError),

    /// Protobuf encode error
    #[error("Protobuf encode error: {0}")]
    ProtoEncode(#[from] prost::EncodeError),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Error raised while processing a model file
    #[error("{}: {source}", .path.display())]
    InModel {
        /// Model file being processed
        path: PathBuf,
        /// Underlying error
        source: Box<SplitError>,
    },
}

impl SplitError {
    /// Attach the model file being processed
    ///
    /// Errors that already name a file are returned unchanged.
    pub fn in_model(self, path: &Path) -> Self {
        match self {
            Self::ModelNotFound(_)
            | Self::ExportError { .. }
            | Self::NoModelsFound { .. }
            | Self::Json { .. }
            | Self::InModel { .. } => self,
            other => Self::InModel {
                path: path.to_path_buf(),
                source: Box::new(other),
            },
        }
    }

    /// The error underneath any model-file context
    pub fn root_cause(&self) -> &SplitError {
        match self {
            Self::InModel { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type alias for model-splitter operations
pub type SplitResult<T> = Result<T, SplitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SplitError::BoundaryNotFound("name containing 'concatenate'".to_string());
        assert!(err.to_string().contains("concatenate"));
    }

    #[test]
    fn test_model_not_found_names_path() {
        let err = SplitError::ModelNotFound(PathBuf::from("/models/audio-model.mgraph"));
        assert!(err.to_string().contains("/models/audio-model.mgraph"));
    }

    #[test]
    fn test_export_error_keeps_diagnostics() {
        let err = SplitError::ExportError {
            path: PathBuf::from("out.onnx"),
            exit_code: 2,
            diagnostics: "Unsupported op RFFT".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("out.onnx"));
        assert!(msg.contains("exit code 2"));
        assert!(msg.contains("Unsupported op RFFT"));
    }

    #[test]
    fn test_in_model_names_path_and_cause() {
        let err = SplitError::UnresolvedOperator {
            op: "MelSpecLayerSimple".to_string(),
            node: "mel_a".to_string(),
        }
        .in_model(Path::new("/models/audio-model.mgraph"));

        let msg = err.to_string();
        assert!(msg.contains("/models/audio-model.mgraph"));
        assert!(msg.contains("MelSpecLayerSimple"));
        assert!(matches!(err.root_cause(), SplitError::UnresolvedOperator { .. }));

        // wrapping twice keeps one context
        let again = err.in_model(Path::new("/other.mgraph"));
        assert!(!again.to_string().contains("/other.mgraph"));
    }

    #[test]
    fn test_in_model_keeps_errors_with_paths() {
        let err = SplitError::ModelNotFound(PathBuf::from("/models/meta-model.mgraph"))
            .in_model(Path::new("/models/meta-model.mgraph"));
        assert!(matches!(err, SplitError::ModelNotFound(_)));
    }
}
