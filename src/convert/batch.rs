//! Batch conversion
//!
//! Convert one native model file, or every `.mgraph` file below a directory,
//! straight through a conversion tool. Models whose destination already
//! exists are skipped. Directory runs are sequential and keep going after a
//! failure; the failures are collected in the [`BatchReport`].

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{SplitError, SplitResult};
use crate::export::FormatExporter;
use crate::io::{file_size_mb, NATIVE_EXTENSION};

/// Extension of converted files
pub const ONNX_EXTENSION: &str = "onnx";

/// Outcome of a batch run
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Model files found
    pub discovered: usize,
    /// Destinations written
    pub converted: Vec<PathBuf>,
    /// Sources skipped because their destination exists
    pub skipped: Vec<PathBuf>,
    /// Sources that failed, with the cause
    pub failures: Vec<(PathBuf, SplitError)>,
}

impl BatchReport {
    /// Whether every discovered model converted or was skipped
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Native model files below `dir`, sorted
pub fn find_models(dir: &Path) -> SplitResult<Vec<PathBuf>> {
    fn visit(dir: &Path, files: &mut Vec<PathBuf>) -> SplitResult<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                visit(&path, files)?;
            } else if path.extension().and_then(|e| e.to_str()) == Some(NATIVE_EXTENSION) {
                files.push(path);
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    visit(dir, &mut files)?;
    files.sort();
    Ok(files)
}

/// Convert a file or a directory tree
///
/// `output` only applies to a single file; combining it with a directory is
/// rejected. A directory without any model is an error.
pub fn convert_batch(
    input: &Path,
    output: Option<&Path>,
    exporter: &FormatExporter,
) -> SplitResult<BatchReport> {
    let mut report = BatchReport::default();

    if input.is_dir() {
        if output.is_some() {
            return Err(SplitError::InvalidArgument(
                "-o cannot be used with directory input".to_string(),
            ));
        }
        let models = find_models(input)?;
        if models.is_empty() {
            return Err(SplitError::NoModelsFound {
                path: input.to_path_buf(),
                extension: NATIVE_EXTENSION.to_string(),
            });
        }
        report.discovered = models.len();
        info!(count = models.len(), dir = %input.display(), "found models");

        for source in models {
            let destination = source.with_extension(ONNX_EXTENSION);
            convert_one(&source, &destination, exporter, &mut report);
        }
    } else if input.is_file() {
        report.discovered = 1;
        let destination = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| input.with_extension(ONNX_EXTENSION));
        convert_one(input, &destination, exporter, &mut report);
    } else {
        return Err(SplitError::ModelNotFound(input.to_path_buf()));
    }

    info!(
        converted = report.converted.len(),
        skipped = report.skipped.len(),
        failed = report.failures.len(),
        "batch finished"
    );
    Ok(report)
}

fn convert_one(
    source: &Path,
    destination: &Path,
    exporter: &FormatExporter,
    report: &mut BatchReport,
) {
    if destination.exists() {
        info!(
            source = %source.display(),
            destination = %destination.display(),
            "skipping, already converted"
        );
        report.skipped.push(source.to_path_buf());
        return;
    }
    match exporter.export_file(source, destination) {
        Ok(written) => {
            if let Ok(size) = file_size_mb(&written) {
                info!(destination = %written.display(), size_mb = %format!("{:.1}", size), "converted");
            }
            report.converted.push(written);
        }
        Err(e) => {
            warn!(source = %source.display(), error = %e, "conversion failed");
            report.failures.push((source.to_path_buf(), e));
        }
    }
}
