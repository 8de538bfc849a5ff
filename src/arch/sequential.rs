use ndarray::ArrayD;

use super::{Model, layers::Layer};
use crate::Result;

/// A sequential model: information flows through its layers in order.
#[derive(Debug, Clone)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }
}

impl Model for Sequential {
    type Input = ArrayD<f32>;
    type Output = ArrayD<f32>;

    fn size(&self) -> usize {
        self.layers.iter().map(|layer| layer.size()).sum()
    }

    fn forward(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        self.layers.iter().try_fold(x, |x, layer| layer.forward(x))
    }
}
