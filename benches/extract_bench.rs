//! Benchmark for boundary lookup, extraction and reference execution
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use model_splitter::graph::{GraphModel, Initializer, InitializerMap, Node, TensorRef};
use model_splitter::ops::CustomOperatorRegistry;
use model_splitter::runtime::Executor;
use model_splitter::split::{BoundaryLocator, BoundarySpec, SubgraphExtractor};
use model_splitter::validate::{EquivalenceValidator, ValidatorConfig};

/// A front end of `depth` Tanh nodes, a concatenation, then `depth` Dense layers
fn chain_model(depth: usize, width: usize) -> GraphModel {
    let mut nodes = Vec::with_capacity(2 * depth + 1);
    let mut inits = InitializerMap::new();

    let mut prev = "x".to_string();
    for i in 0..depth {
        let out = format!("front_{}", i);
        nodes.push(Node::new("Tanh", &format!("tanh_{}", i), &[&prev], &[&out]));
        prev = out;
    }
    nodes.push(
        Node::new("Concatenate", "concatenate", &[&prev, "x"], &["joined"])
            .with_attr("axis", model_splitter::graph::AttrValue::Int(1)),
    );

    prev = "joined".to_string();
    for i in 0..depth {
        let w = format!("w_{}", i);
        let out = format!("h_{}", i);
        let data = (0..4 * width * width)
            .map(|k| ((k % 17) as f32 - 8.0) * 0.01)
            .collect();
        inits.insert(
            w.clone(),
            Initializer {
                shape: vec![2 * width, 2 * width],
                data,
            },
        );
        nodes.push(Node::new("Dense", &format!("dense_{}", i), &[&prev, &w], &[&out]));
        prev = out;
    }

    GraphModel::new(
        "chain",
        nodes,
        vec![TensorRef::new("x", Some(vec![1, width as i64]))],
        vec![TensorRef::new(prev, None)],
        inits,
    )
    .unwrap()
}

fn extract_benchmark(c: &mut Criterion) {
    let graph = chain_model(64, 32);
    let spec = BoundarySpec::default();

    c.bench_function("boundary_find", |b| {
        b.iter(|| BoundaryLocator::find(black_box(&graph), &spec).unwrap())
    });

    let boundary = BoundaryLocator::find(&graph, &spec).unwrap();
    let extractor = SubgraphExtractor::new("mel_spectrogram");
    c.bench_function("extract_chain_64", |b| {
        b.iter(|| {
            extractor
                .extract(black_box(&graph), &boundary, graph.output_names())
                .unwrap()
        })
    });
}

fn execute_benchmark(c: &mut Criterion) {
    let graph = chain_model(16, 64);
    let registry = CustomOperatorRegistry::new();
    let validator = EquivalenceValidator::new(&registry, ValidatorConfig::default());
    let sample = validator.sample_inputs(&graph).unwrap();

    c.bench_function("execute_chain_16", |b| {
        b.iter(|| Executor::new(&graph, &registry).run(black_box(&sample)).unwrap())
    });
}

criterion_group!(benches, extract_benchmark, execute_benchmark);
criterion_main!(benches);
