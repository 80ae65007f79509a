//! Mel-band power spectrogram operator
//!
//! Input `[batch, samples]`, output `[batch, n_mels, n_frames]`. Each row is
//! scaled to [-1, 1], cut into Hann-windowed frames, projected onto sinusoids
//! at mel-spaced center frequencies between `fmin` and `fmax`, squared and
//! compressed with the exponent `1 / (1 + exp(mag_scale))`. Bands are stored
//! highest frequency first.
//!
//! Attributes (defaults in parentheses): `frame_length` (2048), `frame_step`
//! (278), `n_mels` (96), `fmin` (0), `fmax` (3000), `sample_rate` (48000),
//! `mag_scale` (1.0).

use std::f32::consts::PI;

use ndarray::{Array2, Array3, ArrayD, Axis, Ix2};

use crate::error::{SplitError, SplitResult};
use crate::graph::Node;

use super::CustomOperator;

/// Framed mel-band power spectrogram
#[derive(Debug, Clone, Copy, Default)]
pub struct MelSpectrogram;

#[derive(Debug, Clone, Copy)]
struct MelParams {
    frame_length: usize,
    frame_step: usize,
    n_mels: usize,
    fmin: f32,
    fmax: f32,
    sample_rate: f32,
    mag_scale: f32,
}

impl MelParams {
    fn from_node(node: &Node) -> SplitResult<Self> {
        let params = Self {
            frame_length: node.attr_int("frame_length", 2048).max(0) as usize,
            frame_step: node.attr_int("frame_step", 278).max(0) as usize,
            n_mels: node.attr_int("n_mels", 96).max(0) as usize,
            fmin: node.attr_float("fmin", 0.0),
            fmax: node.attr_float("fmax", 3000.0),
            sample_rate: node.attr_float("sample_rate", 48000.0),
            mag_scale: node.attr_float("mag_scale", 1.0),
        };
        if params.frame_length == 0 || params.frame_step == 0 || params.n_mels == 0 {
            return Err(SplitError::InvalidNode(format!(
                "mel node '{}': frame_length, frame_step and n_mels must be positive",
                node.name
            )));
        }
        if !(params.fmin >= 0.0 && params.fmin < params.fmax && params.sample_rate > 0.0) {
            return Err(SplitError::InvalidNode(format!(
                "mel node '{}': need 0 <= fmin < fmax and a positive sample_rate",
                node.name
            )));
        }
        Ok(params)
    }

    fn n_frames(&self, samples: usize) -> Option<usize> {
        (samples >= self.frame_length).then(|| (samples - self.frame_length) / self.frame_step + 1)
    }

    /// Center frequencies in Hz, evenly spaced on the mel scale
    fn centers(&self) -> Vec<f32> {
        let lo = hz_to_mel(self.fmin);
        let hi = hz_to_mel(self.fmax);
        let step = (hi - lo) / (self.n_mels + 1) as f32;
        (1..=self.n_mels)
            .map(|m| mel_to_hz(lo + step * m as f32))
            .collect()
    }

    /// Windowed cosine and sine bases `[n_mels, frame_length]`
    fn bases(&self) -> (Array2<f32>, Array2<f32>) {
        let n = self.frame_length;
        let window: Vec<f32> = (0..n)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / n as f32).cos())
            .collect();
        let centers = self.centers();

        let phase = |m: usize, i: usize| 2.0 * PI * centers[m] * i as f32 / self.sample_rate;
        let cos = Array2::from_shape_fn((self.n_mels, n), |(m, i)| window[i] * phase(m, i).cos());
        let sin = Array2::from_shape_fn((self.n_mels, n), |(m, i)| window[i] * phase(m, i).sin());
        (cos, sin)
    }
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

impl CustomOperator for MelSpectrogram {
    fn compute(&self, node: &Node, inputs: &[&ArrayD<f32>]) -> SplitResult<Vec<ArrayD<f32>>> {
        let params = MelParams::from_node(node)?;
        let audio = inputs
            .first()
            .ok_or_else(|| SplitError::InvalidNode(format!("mel node '{}' has no input", node.name)))?
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|e| {
                SplitError::InvalidNode(format!(
                    "mel node '{}': input must be [batch, samples]: {}",
                    node.name, e
                ))
            })?;

        let (batch, samples) = audio.dim();
        let n_frames = params.n_frames(samples).ok_or_else(|| {
            SplitError::InvalidNode(format!(
                "mel node '{}': {} samples is shorter than one frame of {}",
                node.name, samples, params.frame_length
            ))
        })?;
        let (cos, sin) = params.bases();
        let exponent = 1.0 / (1.0 + params.mag_scale.exp());

        let mut out = Array3::<f32>::zeros((batch, params.n_mels, n_frames));
        for (b, row) in audio.axis_iter(Axis(0)).enumerate() {
            let lo = row.fold(f32::INFINITY, |m, &v| m.min(v));
            let hi = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            let range = (hi - lo).max(f32::EPSILON);
            let scaled = row.mapv(|v| 2.0 * (v - lo) / range - 1.0);

            for f in 0..n_frames {
                let start = f * params.frame_step;
                let frame = scaled.slice(ndarray::s![start..start + params.frame_length]);
                let re = cos.dot(&frame);
                let im = sin.dot(&frame);
                for m in 0..params.n_mels {
                    let power = re[m] * re[m] + im[m] * im[m];
                    out[[b, params.n_mels - 1 - m, f]] = power.powf(exponent);
                }
            }
        }

        Ok(vec![out.into_dyn()])
    }

    fn infer_shape(&self, node: &Node, inputs: &[Option<Vec<i64>>]) -> Option<Vec<i64>> {
        let params = MelParams::from_node(node).ok()?;
        let shape = inputs.first()?.as_ref()?;
        if shape.len() != 2 {
            return None;
        }
        let frames = if shape[1] < 0 {
            -1
        } else {
            params.n_frames(shape[1] as usize)? as i64
        };
        Some(vec![shape[0], params.n_mels as i64, frames])
    }
}
