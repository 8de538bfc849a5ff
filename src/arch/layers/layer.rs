use ndarray::ArrayD;

use super::{BatchNorm2d, Conv2d, Dense, Softmax};
use crate::{
    Result,
    config::{ConvSpec, NormMode, SoftmaxAxis},
    initialization::ParamGen,
};

/// Every stage a `Sequential` can be made of.
///
/// Layers exchange dynamically ranked tensors so convolutional and fully connected stages can
/// share a container, each layer checks the rank it needs on the way in.
#[derive(Debug, Clone)]
pub enum Layer {
    Conv2d(Conv2d),
    BatchNorm2d(BatchNorm2d),
    /// Rectification, computed on the incoming buffer.
    Relu,
    Dense(Dense),
    Softmax(Softmax),
}

impl Layer {
    pub fn conv2d(spec: ConvSpec, param_gen: &mut dyn ParamGen) -> Result<Self> {
        Conv2d::new(spec, param_gen).map(Self::Conv2d)
    }

    pub fn batch_norm2d(channels: usize, eps: f32, mode: NormMode) -> Self {
        Self::BatchNorm2d(BatchNorm2d::new(channels, eps, mode))
    }

    pub fn relu() -> Self {
        Self::Relu
    }

    pub fn dense(dim: (usize, usize), param_gen: &mut dyn ParamGen) -> Result<Self> {
        Dense::new(dim, param_gen).map(Self::Dense)
    }

    pub fn softmax(axis: SoftmaxAxis) -> Self {
        Self::Softmax(Softmax::new(axis))
    }

    /// Returns the amount of learnable parameters of the layer.
    pub fn size(&self) -> usize {
        match self {
            Self::Conv2d(l) => l.size(),
            Self::BatchNorm2d(l) => l.size(),
            Self::Dense(l) => l.size(),
            Self::Relu | Self::Softmax(_) => 0,
        }
    }

    /// Feeds `x` through the layer.
    ///
    /// # Errors
    /// Returns a shape error if `x` doesn't have the rank or dimensions the layer expects.
    pub fn forward(&self, x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        match self {
            Self::Conv2d(l) => Ok(l.forward(x.into_dimensionality()?)?.into_dyn()),
            Self::BatchNorm2d(l) => Ok(l.forward(x.into_dimensionality()?)?.into_dyn()),
            Self::Relu => {
                let mut x = x;
                x.mapv_inplace(|v| if v < 0. { 0. } else { v });
                Ok(x)
            }
            Self::Dense(l) => Ok(l.forward(x.into_dimensionality()?)?.into_dyn()),
            Self::Softmax(l) => Ok(l.forward(x.into_dimensionality()?)?.into_dyn()),
        }
    }
}
