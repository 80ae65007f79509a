//! Graph summary queries
//!
//! Used by the loader summary and the conversion report.

use rustc_hash::FxHashSet;

use super::model::GraphModel;

impl GraphModel {
    /// Distinct operator kinds, in first-use order
    pub fn op_types(&self) -> Vec<&str> {
        let mut seen = FxHashSet::default();
        self.nodes()
            .map(|n| n.op_type.as_str())
            .filter(|op| seen.insert(*op))
            .collect()
    }

    /// Total number of constant parameters
    pub fn parameter_count(&self) -> usize {
        self.initializers().values().map(|i| i.data.len()).sum()
    }
}
