use ndarray::{Array1, Array4, Axis, parallel::prelude::*};

use crate::{Result, SiameseErr, config::NormMode};

/// Per-channel normalization of `(batch, channel, height, width)` tensors.
///
/// Starts with unit scale, zero shift, zero running mean and unit running variance. The running
/// estimates are only read (`NormMode::Running`), nothing in the crate updates them.
#[derive(Debug, Clone)]
pub struct BatchNorm2d {
    eps: f32,
    mode: NormMode,
    gamma: Array1<f32>,
    beta: Array1<f32>,
    running_mean: Array1<f32>,
    running_var: Array1<f32>,
}

impl BatchNorm2d {
    /// Creates a new `BatchNorm2d` layer.
    ///
    /// # Arguments
    /// * `channels` - The amount of channels to normalize.
    /// * `eps` - Added to the variance before taking its square root.
    /// * `mode` - Which statistics to normalize with.
    pub fn new(channels: usize, eps: f32, mode: NormMode) -> Self {
        Self {
            eps,
            mode,
            gamma: Array1::ones(channels),
            beta: Array1::zeros(channels),
            running_mean: Array1::zeros(channels),
            running_var: Array1::ones(channels),
        }
    }

    /// Returns the amount of learnable parameters (scale and shift) this layer has.
    pub fn size(&self) -> usize {
        self.gamma.len() + self.beta.len()
    }

    pub fn channels(&self) -> usize {
        self.gamma.len()
    }

    pub fn mode(&self) -> NormMode {
        self.mode
    }

    /// Normalizes `x` in place, channel by channel.
    pub fn forward(&self, mut x: Array4<f32>) -> Result<Array4<f32>> {
        let channels = x.len_of(Axis(1));
        if channels != self.channels() {
            return Err(SiameseErr::ShapeMismatch {
                what: "normalization channels",
                got: channels,
                expected: self.channels(),
            });
        }

        x.axis_iter_mut(Axis(1))
            .into_par_iter()
            .enumerate()
            .for_each(|(c, mut lane)| {
                if lane.is_empty() {
                    return;
                }

                let (mean, var) = match self.mode {
                    NormMode::Batch => {
                        let n = lane.len() as f32;
                        let mean = lane.sum() / n;
                        let var = lane.fold(0., |acc, &v| acc + (v - mean).powi(2)) / n;
                        (mean, var)
                    }
                    NormMode::Running => (self.running_mean[c], self.running_var[c]),
                };

                let scale = self.gamma[c] / (var + self.eps).sqrt();
                let shift = self.beta[c];
                lane.mapv_inplace(|v| (v - mean) * scale + shift);
            });

        Ok(x)
    }
}
