//! ONNX model checks
//!
//! Structural checks run on every ONNX model before it is imported: graph
//! presence, tensor connectivity, single producers and a supported default
//! opset.

use rustc_hash::FxHashSet;

use crate::error::{SplitError, SplitResult};
use crate::proto::{GraphProto, ModelProto};

/// Outcome of checking a model
#[derive(Debug, Clone, Default)]
pub struct ModelCheck {
    /// Critical issues
    pub errors: Vec<String>,
    /// Non-critical issues
    pub warnings: Vec<String>,
}

impl ModelCheck {
    /// Whether no error was found
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
}

/// Minimum supported default-domain opset
pub const MIN_OPSET_VERSION: i64 = 7;
/// Maximum supported default-domain opset
pub const MAX_OPSET_VERSION: i64 = 21;

/// Check if opset version is supported
pub fn is_opset_supported(version: i64) -> bool {
    (MIN_OPSET_VERSION..=MAX_OPSET_VERSION).contains(&version)
}

/// Get the default opset version from a model
pub fn get_opset_version(model: &ModelProto) -> Option<i64> {
    model
        .opset_import
        .iter()
        .find(|op| op.domain.is_empty() || op.domain == "ai.onnx")
        .map(|op| op.version)
}

/// Check an ONNX model
pub fn validate_model(model: &ModelProto) -> ModelCheck {
    let mut check = ModelCheck::default();

    if model.ir_version < 3 {
        check.warning(format!("IR version {} is very old", model.ir_version));
    }
    match get_opset_version(model) {
        Some(v) if !is_opset_supported(v) => {
            check.error(format!("Unsupported opset version {}", v));
        }
        Some(_) => {}
        None => check.warning("No default-domain opset import"),
    }

    match &model.graph {
        Some(graph) => {
            let graph_check = validate_graph(graph);
            check.errors.extend(graph_check.errors);
            check.warnings.extend(graph_check.warnings);
        }
        None => check.error("Model does not contain a graph"),
    }

    check
}

/// Check a graph
pub fn validate_graph(graph: &GraphProto) -> ModelCheck {
    let mut check = ModelCheck::default();
    let mut known: FxHashSet<&str> = FxHashSet::default();

    for input in &graph.input {
        if input.name.is_empty() {
            check.error("Graph input has empty name");
        } else {
            known.insert(&input.name);
        }
    }
    for init in &graph.initializer {
        if init.name.is_empty() {
            check.error("Initializer has empty name");
        } else {
            known.insert(&init.name);
        }
    }

    let mut produced: FxHashSet<&str> = FxHashSet::default();
    for (idx, node) in graph.node.iter().enumerate() {
        if node.op_type.is_empty() {
            check.error(format!("Node {} has empty op_type", idx));
        }
        for input in &node.input {
            if !input.is_empty() && !known.contains(input.as_str()) {
                check.error(format!(
                    "Node '{}' ({}): input '{}' not found",
                    node.name, node.op_type, input
                ));
            }
        }
        if node.output.is_empty() {
            check.warning(format!("Node '{}' ({}) has no outputs", node.name, node.op_type));
        }
        for output in node.output.iter().filter(|o| !o.is_empty()) {
            if !produced.insert(output) {
                check.error(format!("Duplicate output '{}' in node '{}'", output, node.name));
            }
            known.insert(output);
        }
    }

    for output in &graph.output {
        if !known.contains(output.name.as_str()) {
            check.error(format!("Graph output '{}' not produced by any node", output.name));
        }
    }

    check
}

/// Check a model, failing with every error found
pub fn check_model(model: &ModelProto) -> SplitResult<()> {
    let check = validate_model(model);
    if check.is_valid() {
        Ok(())
    } else {
        Err(SplitError::InvalidModel(check.errors.join("; ")))
    }
}
