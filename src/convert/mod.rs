//! Conversion pipelines
//!
//! Two policies over the same building blocks:
//!
//! - [`convert_classifier`]: load the audio model, split it at the first
//!   `concatenate` node, export only the classifier part and check it
//!   against the full model before and after export
//! - [`convert_metadata`]: export the metadata model whole, standing in
//!   stubs for operators nobody provides; its checks are advisory
//!
//! [`batch`] converts files straight through a tool without splitting.

pub mod batch;

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{SplitError, SplitResult};
use crate::export::FormatExporter;
use crate::graph::{GraphModel, TensorRef};
use crate::io::{file_size_mb, GraphLoader, LoaderConfig};
use crate::ops::{CustomOperatorRegistry, OPERATOR_MANIFEST};
use crate::runtime::ReferenceRuntime;
use crate::split::{BoundaryLocator, BoundarySpec, SubgraphExtractor};
use crate::tensor::TensorMap;
use crate::validate::{EquivalenceValidator, ValidationResult, ValidatorConfig};

pub use batch::{convert_batch, find_models, BatchReport};

/// Audio classifier model file inside a model directory
pub const AUDIO_MODEL_FILE: &str = "audio-model.mgraph";
/// Metadata model file inside a model directory
pub const META_MODEL_FILE: &str = "meta-model.mgraph";
/// Default output file of the classifier conversion
pub const AUDIO_OUTPUT_FILE: &str = "audio-model.onnx";
/// Default output file of the metadata conversion
pub const META_OUTPUT_FILE: &str = "meta-model.onnx";
/// Input name of the extracted classifier
pub const MEL_PLACEHOLDER: &str = "mel_spectrogram";

/// Conversion options
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Rule locating the split node
    pub boundary: BoundarySpec,
    /// Output file name, relative to the model directory
    pub output_name: String,
    /// Input name of the extracted graph
    pub placeholder_name: String,
    /// Equivalence check settings
    pub validator: ValidatorConfig,
    /// Loader settings
    pub loader: LoaderConfig,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            boundary: BoundarySpec::default(),
            output_name: AUDIO_OUTPUT_FILE.to_string(),
            placeholder_name: MEL_PLACEHOLDER.to_string(),
            validator: ValidatorConfig::default(),
            loader: LoaderConfig::default(),
        }
    }
}

impl ConvertOptions {
    /// Defaults for the metadata model
    pub fn metadata() -> Self {
        Self {
            output_name: META_OUTPUT_FILE.to_string(),
            ..Self::default()
        }
    }
}

/// Summary of one conversion
#[derive(Debug, Clone)]
pub struct ConversionReport {
    /// Native model read
    pub source: PathBuf,
    /// ONNX file written
    pub destination: PathBuf,
    /// Boundary tensor, when the model was split
    pub boundary: Option<String>,
    /// Nodes in the loaded model
    pub nodes_total: usize,
    /// Nodes in the exported graph
    pub nodes_exported: usize,
    /// Size of the written file in MB
    pub size_mb: f64,
    /// Operator kinds backed by stubs
    pub stubbed_operators: Vec<String>,
    /// Equivalence checks, in the order they ran
    pub validations: Vec<ValidationResult>,
}

impl ConversionReport {
    /// Whether every check stayed within tolerance
    pub fn all_passed(&self) -> bool {
        self.validations.iter().all(|v| v.passed)
    }

    /// Whether the checks only prove structural compatibility
    pub fn is_advisory(&self) -> bool {
        !self.stubbed_operators.is_empty()
    }
}

fn registry_for(model_dir: &Path) -> SplitResult<CustomOperatorRegistry> {
    let mut registry = CustomOperatorRegistry::new();
    let manifest = model_dir.join(OPERATOR_MANIFEST);
    if manifest.is_file() {
        let count = registry.load_manifest(&manifest)?;
        info!(path = %manifest.display(), operators = count, "loaded operator manifest");
    }
    Ok(registry)
}

fn stubbed_operators(graph: &GraphModel, registry: &CustomOperatorRegistry) -> Vec<String> {
    graph
        .op_types()
        .into_iter()
        .filter(|op| registry.is_stubbed(op))
        .map(str::to_string)
        .collect()
}

fn model_path(model_dir: &Path, file: &str) -> SplitResult<PathBuf> {
    let path = model_dir.join(file);
    if path.is_file() {
        Ok(path)
    } else {
        Err(SplitError::ModelNotFound(path))
    }
}

/// Run the post-export check, skipping it when the runtime cannot load the
/// exported file
fn check_export(
    validator: &EquivalenceValidator<'_>,
    full: &GraphModel,
    split: Option<(&TensorRef, &str)>,
    runtime: &ReferenceRuntime,
    destination: &Path,
    sample: &TensorMap,
) -> Option<ValidationResult> {
    match validator.compare_exported(full, split, runtime, destination, sample) {
        Ok(result) => Some(result),
        Err(e) => {
            warn!(path = %destination.display(), error = %e, "skipping post-export validation");
            None
        }
    }
}

/// Split the audio model at its boundary and export the classifier part
pub fn convert_classifier(
    model_dir: &Path,
    options: &ConvertOptions,
    exporter: &FormatExporter,
) -> SplitResult<ConversionReport> {
    let source = model_path(model_dir, AUDIO_MODEL_FILE)?;
    let mut registry = registry_for(model_dir)?;
    let graph = GraphLoader::new(options.loader.clone()).load(&source, &mut registry)?;

    let in_source = |e: SplitError| e.in_model(&source);

    let boundary = BoundaryLocator::find(&graph, &options.boundary).map_err(in_source)?;
    let boundary_node = graph
        .get_producer_name(&boundary.name)
        .cloned()
        .unwrap_or_default();
    info!(
        node = %boundary_node,
        tensor = %boundary.name,
        shape = ?boundary.shape,
        "split point"
    );

    let extracted = SubgraphExtractor::new(options.placeholder_name.clone())
        .extract(&graph, &boundary, graph.output_names())
        .map_err(in_source)?;
    let placeholder = extracted
        .input_names()
        .first()
        .cloned()
        .ok_or_else(|| SplitError::Internal("extracted graph has no input".to_string()))?;
    info!(
        kept = extracted.node_count(),
        total = graph.node_count(),
        placeholder = %placeholder,
        "classifier extracted"
    );

    let validator = EquivalenceValidator::new(&registry, options.validator.clone());
    let sample = validator.sample_inputs(&graph).map_err(in_source)?;
    let mut validations = vec![validator
        .compare_across_boundary(&graph, &boundary, &extracted, &sample)
        .map_err(in_source)?];

    let destination = exporter.export(&extracted, &model_dir.join(&options.output_name))?;
    let size_mb = file_size_mb(&destination)?;
    info!(path = %destination.display(), size_mb = %format!("{:.1}", size_mb), "saved");

    let runtime = ReferenceRuntime::new(registry.clone());
    validations.extend(check_export(
        &validator,
        &graph,
        Some((&boundary, placeholder.as_str())),
        &runtime,
        &destination,
        &sample,
    ));

    Ok(ConversionReport {
        source,
        destination,
        boundary: Some(boundary.name),
        nodes_total: graph.node_count(),
        nodes_exported: extracted.node_count(),
        size_mb,
        stubbed_operators: stubbed_operators(&graph, &registry),
        validations,
    })
}

/// Export the metadata model whole, stubbing unresolved operators
pub fn convert_metadata(
    model_dir: &Path,
    options: &ConvertOptions,
    exporter: &FormatExporter,
) -> SplitResult<ConversionReport> {
    let source = model_path(model_dir, META_MODEL_FILE)?;
    let mut registry = registry_for(model_dir)?;
    registry.install_linear_stub();
    let graph = GraphLoader::new(options.loader.clone()).load(&source, &mut registry)?;

    let stubbed = stubbed_operators(&graph, &registry);
    if !stubbed.is_empty() {
        warn!(
            operators = ?stubbed,
            "metadata model uses stubs, validation is advisory only"
        );
    }

    let validator = EquivalenceValidator::new(&registry, options.validator.clone());
    let sample = validator
        .sample_inputs(&graph)
        .map_err(|e| e.in_model(&source))?;

    let destination = exporter.export(&graph, &model_dir.join(&options.output_name))?;
    let size_mb = file_size_mb(&destination)?;
    info!(path = %destination.display(), size_mb = %format!("{:.1}", size_mb), "saved");

    let runtime = ReferenceRuntime::new(registry.clone());
    let validations: Vec<_> =
        check_export(&validator, &graph, None, &runtime, &destination, &sample)
            .into_iter()
            .collect();

    Ok(ConversionReport {
        source,
        destination,
        boundary: None,
        nodes_total: graph.node_count(),
        nodes_exported: graph.node_count(),
        size_mb,
        stubbed_operators: stubbed,
        validations,
    })
}
