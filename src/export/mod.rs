//! ONNX export
//!
//! [`FormatExporter`] hands native models to a [`ConversionTool`] and turns
//! tool failures into [`SplitError::ExportError`] carrying the tool's
//! stderr verbatim.
//!
//! # Example
//!
//! ```ignore
//! use model_splitter::export::{FormatExporter, ProcessTool};
//!
//! let exporter = FormatExporter::new(Box::new(ProcessTool::new("mgraph2onnx")));
//! exporter.export(&classifier, Path::new("audio-model.onnx"))?;
//! ```

pub mod tool;

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{SplitError, SplitResult};
use crate::graph::GraphModel;
use crate::io::{save_graph, NATIVE_EXTENSION};

pub use tool::{BuiltinConverter, ConversionTool, ProcessTool, ToolOutput};

/// Exports graphs through a conversion tool
pub struct FormatExporter {
    tool: Box<dyn ConversionTool>,
}

impl FormatExporter {
    /// Exporter using `tool`
    pub fn new(tool: Box<dyn ConversionTool>) -> Self {
        Self { tool }
    }

    /// Exporter using the in-process converter
    pub fn builtin() -> Self {
        Self::new(Box::new(BuiltinConverter))
    }

    /// Name of the conversion tool
    pub fn tool_name(&self) -> &str {
        self.tool.name()
    }

    /// Export an in-memory graph to `destination`
    ///
    /// The graph is staged as a native file next to the destination and
    /// removed once the tool has finished, whatever the outcome.
    pub fn export(&self, graph: &GraphModel, destination: &Path) -> SplitResult<PathBuf> {
        let staging = staging_path(destination);
        save_graph(graph, &staging)?;

        let result = self.export_file(&staging, destination);
        if let Err(e) = std::fs::remove_file(&staging) {
            debug!(path = %staging.display(), error = %e, "could not remove staged model");
        }
        result
    }

    /// Convert an existing native file to `destination`
    pub fn export_file(&self, source: &Path, destination: &Path) -> SplitResult<PathBuf> {
        let args: Vec<OsString> = vec![
            "--input".into(),
            source.as_os_str().to_os_string(),
            "--output".into(),
            destination.as_os_str().to_os_string(),
        ];
        let output = self.tool.run(&args)?;
        if !output.stdout.is_empty() {
            debug!(tool = %self.tool.name(), stdout = %output.stdout.trim_end(), "converter output");
        }

        if !output.success() {
            return Err(SplitError::ExportError {
                path: destination.to_path_buf(),
                exit_code: output.exit_code,
                diagnostics: output.stderr,
            });
        }
        if !destination.is_file() {
            return Err(SplitError::ExportError {
                path: destination.to_path_buf(),
                exit_code: output.exit_code,
                diagnostics: format!(
                    "{} reported success but wrote no file{}{}",
                    self.tool.name(),
                    if output.stderr.is_empty() { "" } else { ":\n" },
                    output.stderr
                ),
            });
        }

        info!(
            tool = %self.tool.name(),
            source = %source.display(),
            destination = %destination.display(),
            "exported"
        );
        Ok(destination.to_path_buf())
    }
}

impl fmt::Debug for FormatExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatExporter")
            .field("tool", &self.tool.name())
            .finish()
    }
}

fn staging_path(destination: &Path) -> PathBuf {
    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string());
    destination.with_file_name(format!(".{}.staging.{}", stem, NATIVE_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{InitializerMap, Node, TensorRef};
    use crate::io::{from_onnx, load_onnx};

    struct FailingTool;

    impl ConversionTool for FailingTool {
        fn name(&self) -> &str {
            "failing"
        }

        fn run(&self, _args: &[OsString]) -> SplitResult<ToolOutput> {
            Ok(ToolOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "Unsupported op: Mystery\n  at node m".to_string(),
            })
        }
    }

    fn make_graph() -> GraphModel {
        GraphModel::new(
            "g",
            vec![Node::new("Relu", "r", &["x"], &["y"])],
            vec![TensorRef::new("x", Some(vec![1, 2]))],
            vec![TensorRef::new("y", None)],
            InitializerMap::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_builtin_export() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.onnx");

        let written = FormatExporter::builtin().export(&make_graph(), &dest).unwrap();
        assert_eq!(written, dest);
        let back = from_onnx(&load_onnx(&dest).unwrap()).unwrap();
        assert_eq!(back.node_count(), 1);

        // staging file is gone
        assert!(!staging_path(&dest).exists());
    }

    #[test]
    fn test_failure_keeps_stderr_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.onnx");

        let err = FormatExporter::new(Box::new(FailingTool))
            .export(&make_graph(), &dest)
            .unwrap_err();
        match err {
            SplitError::ExportError {
                path,
                exit_code,
                diagnostics,
            } => {
                assert_eq!(path, dest);
                assert_eq!(exit_code, 1);
                assert_eq!(diagnostics, "Unsupported op: Mystery\n  at node m");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!staging_path(&dest).exists());
    }

    #[test]
    fn test_staging_path() {
        assert_eq!(
            staging_path(Path::new("/m/audio-model.onnx")),
            PathBuf::from("/m/.audio-model.staging.mgraph")
        );
    }
}
