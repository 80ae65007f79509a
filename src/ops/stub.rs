//! Deterministic stand-in for unavailable operators
//!
//! [`LinearStub`] keeps a graph loadable when the definition of one of its
//! operators is missing. It projects the last axis of its first input to
//! `units` values (attribute, defaults to the input width) with
//! Glorot-uniform weights seeded from the node name, so repeated loads of the
//! same graph compute the same numbers. Those numbers are not the trained
//! operator's; results only prove structural compatibility.

use std::hash::{Hash, Hasher};

use ndarray::{Array2, ArrayD};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHasher;

use crate::error::{SplitError, SplitResult};
use crate::graph::Node;

use super::builtin::matmul;
use super::CustomOperator;

/// Seeded linear projection used in place of a missing operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearStub {
    seed: u64,
}

impl Default for LinearStub {
    fn default() -> Self {
        Self { seed: 42 }
    }
}

impl LinearStub {
    fn units(node: &Node, in_dim: usize) -> usize {
        let units = node.attr_int("units", in_dim as i64);
        if units > 0 {
            units as usize
        } else {
            in_dim
        }
    }

    /// Weight matrix `[in_dim, units]` for a node
    pub fn weights(&self, node: &Node, in_dim: usize, units: usize) -> Array2<f32> {
        let mut hasher = FxHasher::default();
        node.name.hash(&mut hasher);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ hasher.finish());

        let limit = (6.0 / (in_dim + units).max(1) as f32).sqrt();
        Array2::from_shape_fn((in_dim, units), |_| rng.gen_range(-limit..=limit))
    }
}

impl CustomOperator for LinearStub {
    fn compute(&self, node: &Node, inputs: &[&ArrayD<f32>]) -> SplitResult<Vec<ArrayD<f32>>> {
        let x = inputs.first().ok_or_else(|| {
            SplitError::InvalidNode(format!("stub node '{}' has no input", node.name))
        })?;
        let in_dim = x.shape().last().copied().unwrap_or(1);
        let units = Self::units(node, in_dim);

        let w = self.weights(node, in_dim, units).into_dyn();
        let y = matmul(node, x, &w)?;
        Ok(vec![y; node.outputs.len().max(1)])
    }

    fn infer_shape(&self, node: &Node, inputs: &[Option<Vec<i64>>]) -> Option<Vec<i64>> {
        let mut shape = inputs.first()?.clone()?;
        let last = shape.last_mut()?;
        let units = node.attr_int("units", *last);
        if units > 0 {
            *last = units;
        }
        Some(shape)
    }

    fn is_stub(&self) -> bool {
        true
    }
}
