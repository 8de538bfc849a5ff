use ndarray::{Array2, Ix2};

use super::{Model, Sequential, layers::Layer};
use crate::Result;

/// The fully connected head: `Dense -> Relu -> Dense -> Softmax`.
#[derive(Debug, Clone)]
pub struct Classifier {
    input_dim: usize,
    nclasses: usize,
    seq: Sequential,
}

impl Classifier {
    pub(crate) fn new(input_dim: usize, nclasses: usize, seq: Sequential) -> Self {
        Self {
            input_dim,
            nclasses,
            seq,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn nclasses(&self) -> usize {
        self.nclasses
    }

    pub fn layers(&self) -> &[Layer] {
        self.seq.layers()
    }
}

impl Model for Classifier {
    type Input = Array2<f32>;
    type Output = Array2<f32>;

    fn size(&self) -> usize {
        self.seq.size()
    }

    fn forward(&self, x: Array2<f32>) -> Result<Array2<f32>> {
        Ok(self.seq.forward(x.into_dyn())?.into_dimensionality::<Ix2>()?)
    }
}
