//! End-to-end conversion tests on small synthetic models

use std::fs;
use std::path::Path;

use model_splitter::convert::{
    convert_batch, convert_classifier, convert_metadata, ConvertOptions, AUDIO_MODEL_FILE,
    META_MODEL_FILE,
};
use model_splitter::export::{FormatExporter, ProcessTool};
use model_splitter::graph::{AttrValue, GraphModel, Initializer, InitializerMap, Node, TensorRef};
use model_splitter::io::{load_onnx, save_graph, save_onnx, to_onnx, GraphLoader};
use model_splitter::ops::{CustomOperatorRegistry, OPERATOR_MANIFEST};
use model_splitter::runtime::{Executor, InferenceRuntime, ReferenceRuntime};
use model_splitter::split::{BoundaryLocator, BoundarySpec, SubgraphExtractor};
use model_splitter::validate::{max_abs_diff, EquivalenceValidator, ValidatorConfig};
use model_splitter::SplitError;

const MANIFEST: &str = r#"{"operators": {"MelSpecLayerSimple": "mel_spectrogram"}}"#;

fn weights(shape: &[usize], scale: f32) -> Initializer {
    let len: usize = shape.iter().product();
    Initializer {
        shape: shape.to_vec(),
        data: (0..len)
            .map(|i| ((i * 7 % 13) as f32 - 6.0) * scale)
            .collect(),
    }
}

fn mel(name: &str, output: &str, fmin: f32) -> Node {
    Node::new("MelSpecLayerSimple", name, &["audio"], &[output])
        .with_attr("frame_length", AttrValue::Int(64))
        .with_attr("frame_step", AttrValue::Int(32))
        .with_attr("n_mels", AttrValue::Int(8))
        .with_attr("fmin", AttrValue::Float(fmin))
        .with_attr("fmax", AttrValue::Float(4000.0))
        .with_attr("sample_rate", AttrValue::Float(16000.0))
}

/// Two mel front ends joined by a concatenation, then a small classifier
///
/// audio [1, 1024] -> mel [1, 8, 31] x2 -> concat [1, 16, 31] -> conv [1, 4, 29]
/// -> relu -> flatten [1, 116] -> dense [1, 3] -> softmax
fn audio_model() -> GraphModel {
    let mut inits = InitializerMap::new();
    inits.insert("conv_w".to_string(), weights(&[4, 16, 3], 0.01));
    inits.insert("conv_b".to_string(), weights(&[4], 0.05));
    inits.insert("dense_w".to_string(), weights(&[116, 3], 0.02));
    inits.insert("dense_b".to_string(), weights(&[3], 0.1));

    GraphModel::new(
        "audio",
        vec![
            mel("mel_a", "mel_a_out", 0.0),
            mel("mel_b", "mel_b_out", 500.0),
            Node::new("Concatenate", "mel_concatenate", &["mel_a_out", "mel_b_out"], &["spec"])
                .with_attr("axis", AttrValue::Int(1)),
            Node::new("Conv1D", "conv1", &["spec", "conv_w", "conv_b"], &["c1"]),
            Node::new("Relu", "relu1", &["c1"], &["r1"]),
            Node::new("Flatten", "flatten", &["r1"], &["flat"]),
            Node::new("Dense", "dense", &["flat", "dense_w", "dense_b"], &["logits"]),
            Node::new("Softmax", "softmax", &["logits"], &["scores"]),
        ],
        vec![TensorRef::new("audio", Some(vec![1, 1024]))],
        vec![TensorRef::new("scores", None)],
        inits,
    )
    .unwrap()
}

/// Location features through an operator nobody implements
fn meta_model() -> GraphModel {
    let mut inits = InitializerMap::new();
    inits.insert("head_w".to_string(), weights(&[8, 4], 0.05));

    GraphModel::new(
        "meta",
        vec![
            Node::new("GeoEmbedding", "embed", &["lat_lon_week"], &["e"])
                .with_attr("units", AttrValue::Int(8)),
            Node::new("MatMul", "head", &["e", "head_w"], &["h"]),
            Node::new("Sigmoid", "prob", &["h"], &["p"]),
        ],
        vec![TensorRef::new("lat_lon_week", Some(vec![1, 3]))],
        vec![TensorRef::new("p", None)],
        inits,
    )
    .unwrap()
}

fn model_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    save_graph(&audio_model(), dir.path().join(AUDIO_MODEL_FILE)).unwrap();
    save_graph(&meta_model(), dir.path().join(META_MODEL_FILE)).unwrap();
    fs::write(dir.path().join(OPERATOR_MANIFEST), MANIFEST).unwrap();
    dir
}

#[test]
fn test_classifier_split_and_export() {
    let dir = model_dir();
    let report = convert_classifier(dir.path(), &ConvertOptions::default(), &FormatExporter::builtin())
        .unwrap();

    assert_eq!(report.boundary.as_deref(), Some("spec"));
    assert_eq!(report.nodes_total, 8);
    assert_eq!(report.nodes_exported, 5);
    assert!(report.stubbed_operators.is_empty());
    assert!(!report.is_advisory());
    assert_eq!(report.validations.len(), 2);
    assert!(report.all_passed(), "{:?}", report.validations);
    assert_eq!(report.destination, dir.path().join("audio-model.onnx"));

    let model = load_onnx(&report.destination).unwrap();
    let graph = model.graph.unwrap();
    assert_eq!(graph.input.len(), 1);
    assert_eq!(graph.input[0].name, "mel_spectrogram");
    assert_eq!(graph.input[0].get_shape(), Some(vec![1, 16, 31]));
    assert!(graph.node.iter().all(|n| n.op_type != "MelSpecLayerSimple"));
    assert!(graph.node.iter().all(|n| n.op_type != "Concat"));
}

#[test]
fn test_extracted_classifier_nodes() {
    let dir = model_dir();
    let mut registry = CustomOperatorRegistry::new();
    registry
        .load_manifest(&dir.path().join(OPERATOR_MANIFEST))
        .unwrap();
    let graph = GraphLoader::default()
        .load(dir.path().join(AUDIO_MODEL_FILE), &mut registry)
        .unwrap();

    let boundary = BoundaryLocator::find(&graph, &BoundarySpec::default()).unwrap();
    assert_eq!(boundary.name, "spec");
    assert_eq!(boundary.shape, Some(vec![1, 16, 31]));

    let extracted = SubgraphExtractor::new("mel_spectrogram")
        .extract(&graph, &boundary, graph.output_names())
        .unwrap();
    let kept: Vec<&str> = extracted.nodes().map(|n| n.name.as_str()).collect();
    assert_eq!(kept, vec!["conv1", "relu1", "flatten", "dense", "softmax"]);
    assert_eq!(
        extracted.inputs(),
        vec![TensorRef::new("mel_spectrogram", Some(vec![1, 16, 31]))]
    );
}

#[test]
fn test_classifier_without_manifest_fails() {
    let dir = model_dir();
    fs::remove_file(dir.path().join(OPERATOR_MANIFEST)).unwrap();

    let err = convert_classifier(dir.path(), &ConvertOptions::default(), &FormatExporter::builtin())
        .unwrap_err();
    assert!(err.to_string().contains("audio-model.mgraph"), "{err}");
    match err.root_cause() {
        SplitError::UnresolvedOperator { op, node } => {
            assert_eq!(op, "MelSpecLayerSimple");
            assert_eq!(node, "mel_a");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_boundary_not_found() {
    let dir = model_dir();
    let options = ConvertOptions {
        boundary: BoundarySpec::Exact("no_such_node".to_string()),
        ..ConvertOptions::default()
    };
    let err = convert_classifier(dir.path(), &options, &FormatExporter::builtin()).unwrap_err();
    assert!(matches!(err.root_cause(), SplitError::BoundaryNotFound(_)));
    assert!(err.to_string().contains("audio-model.mgraph"));
    assert!(!dir.path().join("audio-model.onnx").exists());
}

#[cfg(unix)]
#[test]
fn test_failing_tool_reports_diagnostics() {
    let dir = model_dir();
    let tool = ProcessTool::new("sh")
        .arg("-c")
        .arg("echo 'Unsupported op: RFFT' >&2; exit 3");
    let exporter = FormatExporter::new(Box::new(tool));

    let err = convert_classifier(dir.path(), &ConvertOptions::default(), &exporter).unwrap_err();
    match err {
        SplitError::ExportError {
            exit_code,
            diagnostics,
            ..
        } => {
            assert_eq!(exit_code, 3);
            assert!(diagnostics.contains("Unsupported op: RFFT"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!dir.path().join("audio-model.onnx").exists());
}

#[test]
fn test_metadata_with_stub_is_advisory() {
    let dir = model_dir();
    let report = convert_metadata(dir.path(), &ConvertOptions::metadata(), &FormatExporter::builtin())
        .unwrap();

    assert!(report.is_advisory());
    assert_eq!(report.stubbed_operators, vec!["GeoEmbedding".to_string()]);
    assert!(report.boundary.is_none());
    assert_eq!(report.nodes_exported, 3);
    assert!(report.validations.iter().all(|v| v.advisory));
    assert!(dir.path().join("meta-model.onnx").is_file());
}

#[test]
fn test_onnx_round_trip_matches_reference() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(OPERATOR_MANIFEST), MANIFEST).unwrap();
    let mut registry = CustomOperatorRegistry::new();
    registry.load_manifest(&dir.path().join(OPERATOR_MANIFEST)).unwrap();

    let graph = audio_model();
    let path = dir.path().join("full.onnx");
    save_onnx(&to_onnx(&graph).unwrap(), &path).unwrap();

    let validator = EquivalenceValidator::new(&registry, ValidatorConfig::default());
    let sample = validator.sample_inputs(&graph).unwrap();
    let expected = Executor::new(&graph, &registry).run(&sample).unwrap();
    let actual = ReferenceRuntime::new(registry.clone()).run(&path, &sample).unwrap();

    let diff = max_abs_diff(&expected["scores"], &actual["scores"]);
    assert!(diff <= 1e-4, "max abs diff {diff}");
}

#[test]
fn test_batch_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("nested");
    fs::create_dir_all(&nested).unwrap();
    save_graph(&meta_model_without_custom(), dir.path().join("a.mgraph")).unwrap();
    save_graph(&meta_model_without_custom(), nested.join("b.mgraph")).unwrap();

    let exporter = FormatExporter::builtin();
    let first = convert_batch(dir.path(), None, &exporter).unwrap();
    assert!(first.success());
    assert_eq!(first.converted.len(), 2);
    assert!(nested.join("b.onnx").is_file());

    let second = convert_batch(dir.path(), None, &exporter).unwrap();
    assert!(second.success());
    assert!(second.converted.is_empty());
    assert_eq!(second.skipped.len(), 2);
}

#[test]
fn test_batch_missing_input() {
    let err = convert_batch(
        Path::new("/nonexistent/models"),
        None,
        &FormatExporter::builtin(),
    )
    .unwrap_err();
    assert!(matches!(err, SplitError::ModelNotFound(_)));
}

fn meta_model_without_custom() -> GraphModel {
    let mut inits = InitializerMap::new();
    inits.insert("w".to_string(), weights(&[3, 2], 0.1));
    GraphModel::new(
        "plain",
        vec![
            Node::new("MatMul", "mm", &["x", "w"], &["h"]),
            Node::new("Tanh", "act", &["h"], &["y"]),
        ],
        vec![TensorRef::new("x", Some(vec![1, 3]))],
        vec![TensorRef::new("y", None)],
        inits,
    )
    .unwrap()
}
