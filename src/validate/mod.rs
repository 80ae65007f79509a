//! Numeric equivalence checks
//!
//! Converted graphs are checked against the original, unmodified graph on a
//! seeded sample input. The result is a [`ValidationResult`]; exceeding the
//! tolerance is logged as a warning and never turned into an error.

use std::fmt;
use std::path::Path;

use ndarray::{ArrayD, IxDyn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use tracing::{info, warn};

use crate::error::{SplitError, SplitResult};
use crate::graph::{GraphModel, TensorRef};
use crate::ops::CustomOperatorRegistry;
use crate::runtime::{Executor, InferenceRuntime};
use crate::tensor::{concrete_dims, TensorMap};

/// Validator options
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Largest accepted absolute difference
    pub tolerance: f32,
    /// Seed of the sample input generator
    pub seed: u64,
    /// Scale applied to standard-normal sample values
    pub input_scale: f32,
    /// Size used for unknown input dimensions
    pub unknown_dim: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-4,
            seed: 42,
            input_scale: 0.1,
            unknown_dim: 1,
        }
    }
}

/// Outcome of one equivalence check
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    /// What was compared
    pub label: String,
    /// Largest absolute elementwise difference over all outputs
    pub max_abs_diff: f32,
    /// Tolerance in effect
    pub tolerance: f32,
    /// `max_abs_diff <= tolerance`
    pub passed: bool,
    /// The graphs contain stub operators, so agreement proves structure only
    pub advisory: bool,
}

impl ValidationResult {
    /// Build a result from a measured difference
    pub fn new(label: impl Into<String>, max_abs_diff: f32, tolerance: f32, advisory: bool) -> Self {
        Self {
            label: label.into(),
            max_abs_diff,
            tolerance,
            passed: max_abs_diff <= tolerance,
            advisory,
        }
    }

    /// Log the result: info when it passed, warning otherwise
    pub fn log(&self) {
        if self.passed {
            info!(
                check = %self.label,
                max_abs_diff = self.max_abs_diff,
                advisory = self.advisory,
                "validation passed"
            );
        } else {
            warn!(
                check = %self.label,
                max_abs_diff = self.max_abs_diff,
                tolerance = self.tolerance,
                advisory = self.advisory,
                "validation difference above tolerance"
            );
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: max abs diff {:.3e} (tolerance {:.0e}) {}",
            self.label,
            self.max_abs_diff,
            self.tolerance,
            if self.passed { "OK" } else { "WARNING" }
        )?;
        if self.advisory {
            write!(f, " [advisory: stub operators]")?;
        }
        Ok(())
    }
}

/// Largest absolute elementwise difference
///
/// Differing shapes and NaN/non-NaN disagreements count as infinite.
pub fn max_abs_diff(a: &ArrayD<f32>, b: &ArrayD<f32>) -> f32 {
    if a.shape() != b.shape() {
        return f32::INFINITY;
    }
    a.iter().zip(b.iter()).fold(0.0f32, |acc, (&x, &y)| {
        let diff = match (x.is_nan(), y.is_nan()) {
            (true, true) => 0.0,
            (false, false) => (x - y).abs(),
            _ => f32::INFINITY,
        };
        acc.max(diff)
    })
}

/// Compares graphs by running them on identical inputs
#[derive(Debug, Clone)]
pub struct EquivalenceValidator<'a> {
    registry: &'a CustomOperatorRegistry,
    config: ValidatorConfig,
}

impl<'a> EquivalenceValidator<'a> {
    /// Create a validator executing custom kinds through `registry`
    pub fn new(registry: &'a CustomOperatorRegistry, config: ValidatorConfig) -> Self {
        Self { registry, config }
    }

    /// Validator options
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Seeded sample values for every input of `graph`
    ///
    /// Inputs are filled in declaration order from one generator, unknown
    /// dimensions take [`ValidatorConfig::unknown_dim`].
    pub fn sample_inputs(&self, graph: &GraphModel) -> SplitResult<TensorMap> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut inputs = TensorMap::default();

        for input in graph.inputs() {
            let shape = input.shape.as_ref().ok_or_else(|| {
                SplitError::InvalidModel(format!(
                    "cannot generate a sample for input '{}' of graph '{}' without a shape",
                    input.name,
                    graph.name()
                ))
            })?;
            let dims = concrete_dims(shape, self.config.unknown_dim);
            let scale = self.config.input_scale;
            let value = ArrayD::from_shape_simple_fn(IxDyn(&dims), || {
                let v: f32 = StandardNormal.sample(&mut rng);
                v * scale
            });
            inputs.insert(input.name, value);
        }
        Ok(inputs)
    }

    fn uses_stubs(&self, graph: &GraphModel) -> bool {
        Executor::new(graph, self.registry).uses_stubs()
    }

    fn compare_outputs(
        &self,
        label: &str,
        reference: &TensorMap,
        actual: &TensorMap,
        names: &[String],
        advisory: bool,
    ) -> SplitResult<ValidationResult> {
        let mut worst = 0.0f32;
        for name in names {
            let (expected, got) = match (reference.get(name), actual.get(name)) {
                (Some(e), Some(g)) => (e, g),
                _ => {
                    return Err(SplitError::Internal(format!(
                        "{}: output '{}' missing from one side",
                        label, name
                    )))
                }
            };
            worst = worst.max(max_abs_diff(expected, got));
        }

        let result = ValidationResult::new(label, worst, self.config.tolerance, advisory);
        result.log();
        Ok(result)
    }

    /// Compare two graphs with the same inputs and outputs
    ///
    /// Outputs are paired by position.
    pub fn compare(
        &self,
        a: &GraphModel,
        b: &GraphModel,
        inputs: &TensorMap,
    ) -> SplitResult<ValidationResult> {
        if a.output_names().len() != b.output_names().len() {
            return Err(SplitError::InvalidModel(format!(
                "graphs '{}' and '{}' have different output counts",
                a.name(),
                b.name()
            )));
        }
        let out_a = Executor::new(a, self.registry).run(inputs)?;
        let out_b = Executor::new(b, self.registry).run(inputs)?;

        let mut renamed = TensorMap::default();
        for (name_a, name_b) in a.output_names().iter().zip(b.output_names()) {
            if let Some(v) = out_b.get(name_b) {
                renamed.insert(name_a.clone(), v.clone());
            }
        }
        let advisory = self.uses_stubs(a) || self.uses_stubs(b);
        self.compare_outputs(
            &format!("{} vs {}", b.name(), a.name()),
            &out_a,
            &renamed,
            a.output_names(),
            advisory,
        )
    }

    /// Check an extracted graph against the graph it came from
    ///
    /// `full` runs on `sample`, giving both the reference outputs and the
    /// boundary value, which is then fed to `extracted`.
    pub fn compare_across_boundary(
        &self,
        full: &GraphModel,
        boundary: &TensorRef,
        extracted: &GraphModel,
        sample: &TensorMap,
    ) -> SplitResult<ValidationResult> {
        let placeholder = single_input(extracted)?;
        let mut wanted: Vec<&str> = vec![boundary.name.as_str()];
        wanted.extend(extracted.output_names().iter().map(String::as_str));

        let reference = Executor::new(full, self.registry).run_with(sample, &wanted)?;
        let mut feed = TensorMap::default();
        feed.insert(placeholder.to_string(), reference[boundary.name.as_str()].clone());
        let actual = Executor::new(extracted, self.registry).run(&feed)?;

        let advisory = self.uses_stubs(full) || self.uses_stubs(extracted);
        self.compare_outputs(
            "extracted vs original",
            &reference,
            &actual,
            extracted.output_names(),
            advisory,
        )
    }

    /// Check an exported file against the original graph through a runtime
    ///
    /// With `split = Some((boundary, placeholder))` the exported model is fed
    /// the boundary value under the placeholder name, otherwise the sample
    /// itself.
    pub fn compare_exported(
        &self,
        full: &GraphModel,
        split: Option<(&TensorRef, &str)>,
        runtime: &dyn InferenceRuntime,
        path: &Path,
        sample: &TensorMap,
    ) -> SplitResult<ValidationResult> {
        let mut wanted: Vec<&str> = Vec::new();
        if let Some((boundary, _)) = split {
            wanted.push(boundary.name.as_str());
        }
        let reference = Executor::new(full, self.registry).run_with(sample, &wanted)?;

        let feed = match split {
            Some((boundary, placeholder)) => {
                let mut feed = TensorMap::default();
                feed.insert(placeholder.to_string(), reference[boundary.name.as_str()].clone());
                feed
            }
            None => sample.clone(),
        };
        let actual = runtime.run(path, &feed)?;

        let mut names: Vec<String> = actual.keys().cloned().collect();
        names.sort();
        let label = format!("exported ({}) vs original", runtime.name());
        self.compare_outputs(&label, &reference, &actual, &names, self.uses_stubs(full))
    }
}

fn single_input(graph: &GraphModel) -> SplitResult<&str> {
    match graph.input_names() {
        [only] => Ok(only.as_str()),
        other => Err(SplitError::InvalidModel(format!(
            "extracted graph '{}' should have one input, has {}",
            graph.name(),
            other.len()
        ))),
    }
}
