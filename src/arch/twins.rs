use std::sync::Arc;

use ndarray::{Array4, Ix4};

use super::{Model, Sequential, layers::Layer};
use crate::{Result, SiameseErr, config::ConvSpec};

/// A stack of `Conv2d -> BatchNorm2d -> Relu` blocks, one block per `ConvSpec`.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    specs: Vec<ConvSpec>,
    seq: Sequential,
}

impl FeatureExtractor {
    pub(crate) fn new(specs: Vec<ConvSpec>, seq: Sequential) -> Self {
        Self { specs, seq }
    }

    pub fn specs(&self) -> &[ConvSpec] {
        &self.specs
    }

    pub fn layers(&self) -> &[Layer] {
        self.seq.layers()
    }

    /// Computes the output shape for a `(batch, in_channels, height, width)` input without
    /// running any convolution.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if some kernel doesn't fit the feature map reaching it.
    pub fn output_shape(&self, input: [usize; 4]) -> Result<[usize; 4]> {
        let [batch, mut channels, mut height, mut width] = input;

        for (i, spec) in self.specs.iter().enumerate() {
            let side = |side: usize| {
                spec.output_side(side).ok_or_else(|| {
                    SiameseErr::InvalidConfig(format!(
                        "convolution {i} with kernel {} doesn't fit a feature map side of {side}",
                        spec.kernel_size
                    ))
                })
            };

            height = side(height)?;
            width = side(width)?;
            channels = spec.out_channels;
        }

        Ok([batch, channels, height, width])
    }
}

impl Model for FeatureExtractor {
    type Input = Array4<f32>;
    type Output = Array4<f32>;

    fn size(&self) -> usize {
        self.seq.size()
    }

    fn forward(&self, x: Array4<f32>) -> Result<Array4<f32>> {
        Ok(self.seq.forward(x.into_dyn())?.into_dimensionality::<Ix4>()?)
    }
}

/// The two feature extractors of a `SiameseNet`.
///
/// Shared twins are two handles to the same allocation, so any change to its parameters is seen
/// by both branches. Independent twins own disjoint parameters.
#[derive(Debug, Clone)]
pub struct Twins {
    first: Arc<FeatureExtractor>,
    second: Arc<FeatureExtractor>,
}

impl Twins {
    /// Uses `twin` for both branches.
    pub fn shared(twin: FeatureExtractor) -> Self {
        let first = Arc::new(twin);
        let second = Arc::clone(&first);
        Self { first, second }
    }

    /// Uses a different extractor for each branch.
    pub fn independent(first: FeatureExtractor, second: FeatureExtractor) -> Self {
        Self {
            first: Arc::new(first),
            second: Arc::new(second),
        }
    }

    pub fn first(&self) -> &Arc<FeatureExtractor> {
        &self.first
    }

    pub fn second(&self) -> &Arc<FeatureExtractor> {
        &self.second
    }

    /// Whether both branches are the very same extractor.
    pub fn is_shared(&self) -> bool {
        Arc::ptr_eq(&self.first, &self.second)
    }

    /// Returns the amount of distinct parameters, shared twins are counted once.
    pub fn size(&self) -> usize {
        if self.is_shared() {
            self.first.size()
        } else {
            self.first.size() + self.second.size()
        }
    }
}
