//! batch-convert
//!
//! Convert a native model file, or every `.mgraph` file below a directory,
//! to ONNX. Existing outputs are skipped and failures do not stop the run.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use model_splitter::convert::convert_batch;
use model_splitter::export::{FormatExporter, ProcessTool};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Batch-convert native models to ONNX
#[derive(Parser, Debug)]
#[command(name = "batch-convert")]
#[command(version)]
struct Cli {
    /// Model file or directory to search recursively
    input: PathBuf,

    /// Output path (single-file input only)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// External converter program, invoked as `<program> --input <native> --output <onnx>`
    #[arg(long)]
    converter: Option<PathBuf>,
}

/// `RUST_LOG` when set, otherwise `info`
fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(log_filter())
        .init();

    let cli = Cli::parse();
    let exporter = match &cli.converter {
        Some(program) => FormatExporter::new(Box::new(ProcessTool::new(program))),
        None => FormatExporter::builtin(),
    };

    let report = match convert_batch(&cli.input, cli.output.as_deref(), &exporter) {
        Ok(report) => report,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if report.success() {
        info!(
            converted = report.converted.len(),
            skipped = report.skipped.len(),
            "all models converted"
        );
        ExitCode::SUCCESS
    } else {
        for (source, e) in &report.failures {
            error!(source = %source.display(), "{}", e);
        }
        error!(
            failed = report.failures.len(),
            total = report.discovered,
            "some conversions failed"
        );
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_prefers_rust_log() {
        std::env::remove_var("RUST_LOG");
        assert_eq!(log_filter().to_string(), "info");

        std::env::set_var("RUST_LOG", "error");
        assert_eq!(log_filter().to_string(), "error");
        std::env::remove_var("RUST_LOG");
    }
}
