//! split-convert
//!
//! Convert the models of a model directory to ONNX: the audio classifier is
//! split after its spectrogram front end, the metadata model (with `--meta`)
//! is exported whole with stubs for unavailable operators.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use model_splitter::convert::{convert_classifier, convert_metadata, ConversionReport, ConvertOptions};
use model_splitter::export::{FormatExporter, ProcessTool};
use model_splitter::io::LoaderConfig;
use model_splitter::SplitResult;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Split native audio models at the spectrogram boundary and export them to ONNX
#[derive(Parser, Debug)]
#[command(name = "split-convert")]
#[command(version)]
struct Cli {
    /// Directory containing audio-model.mgraph (and meta-model.mgraph)
    model_dir: PathBuf,

    /// Output file name for the classifier, relative to the model directory
    #[arg(short, long, default_value = "audio-model.onnx")]
    output: String,

    /// Also convert the metadata model
    #[arg(long)]
    meta: bool,

    /// Output file name for the metadata model
    #[arg(long, default_value = "meta-model.onnx")]
    meta_output: String,

    /// External converter program, invoked as `<program> [args] --input <native> --output <onnx>`
    ///
    /// Without it the built-in converter is used.
    #[arg(long)]
    converter: Option<PathBuf>,

    /// Extra argument for the converter program (repeatable)
    #[arg(long = "converter-arg", requires = "converter", allow_hyphen_values = true)]
    converter_args: Vec<String>,

    /// Largest accepted absolute difference in validation
    #[arg(long, default_value_t = 1e-4)]
    tolerance: f32,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn log_report(label: &str, report: &ConversionReport) {
    info!(
        model = label,
        destination = %report.destination.display(),
        nodes = report.nodes_exported,
        size_mb = %format!("{:.1}", report.size_mb),
        "conversion done"
    );
    for check in &report.validations {
        info!("{}", check);
    }
    if !report.all_passed() {
        warn!(model = label, "validation differences above tolerance, check the output");
    }
}

/// `RUST_LOG` when set, otherwise `warn` with `--quiet` and `info` without
fn log_filter(quiet: bool) -> EnvFilter {
    let level = if quiet { "warn" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

fn run(cli: &Cli, exporter: &FormatExporter) -> SplitResult<()> {
    let loader = LoaderConfig { summary: !cli.quiet };

    let mut options = ConvertOptions {
        output_name: cli.output.clone(),
        loader: loader.clone(),
        ..ConvertOptions::default()
    };
    options.validator.tolerance = cli.tolerance;
    let audio = convert_classifier(&cli.model_dir, &options, exporter)?;
    log_report("audio", &audio);

    if cli.meta {
        let mut options = ConvertOptions {
            output_name: cli.meta_output.clone(),
            loader,
            ..ConvertOptions::metadata()
        };
        options.validator.tolerance = cli.tolerance;
        let meta = convert_metadata(&cli.model_dir, &options, exporter)?;
        log_report("meta", &meta);
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(log_filter(cli.quiet))
        .init();

    let exporter = match &cli.converter {
        Some(program) => FormatExporter::new(Box::new(
            ProcessTool::new(program).args(&cli.converter_args),
        )),
        None => FormatExporter::builtin(),
    };

    match run(&cli, &exporter) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
