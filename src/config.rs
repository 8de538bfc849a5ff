use std::{fs, path::Path};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::{Result, SiameseErr};

/// One element of the convolutional chain as the user declares it, its input channels come from
/// the previous element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvStage {
    pub out_channels: usize,
    pub kernel_size: usize,
    #[serde(default = "default_stride")]
    pub stride: usize,
    #[serde(default)]
    pub padding: usize,
}

fn default_stride() -> usize {
    1
}

impl ConvStage {
    /// Creates a new `ConvStage` with unit stride and no padding.
    pub fn new(out_channels: usize, kernel_size: usize) -> Self {
        Self {
            out_channels,
            kernel_size,
            stride: 1,
            padding: 0,
        }
    }
}

/// A fully resolved convolution specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvSpec {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
}

impl ConvSpec {
    /// Returns the side of the feature map this convolution produces from a square input of
    /// side `side`, or `None` if the kernel doesn't fit or the padded side overflows.
    pub fn output_side(&self, side: usize) -> Option<usize> {
        if self.stride == 0 {
            return None;
        }

        let padded = self.padding.checked_mul(2)?.checked_add(side)?;
        let span = padded.checked_sub(self.kernel_size)?;
        Some(span / self.stride + 1)
    }

    /// The amount of inputs that feed each output unit, `None` if it overflows.
    pub fn fan_in(&self) -> Option<usize> {
        self.in_channels
            .checked_mul(self.kernel_size)?
            .checked_mul(self.kernel_size)
    }

    /// The amount of weights and biases of the convolution, `None` if it overflows.
    pub fn param_count(&self) -> Option<usize> {
        dense_param_count(self.fan_in()?, self.out_channels)
    }
}

/// The amount of weights and biases of a projection from `input_dim` to `output_dim` units,
/// `None` if it overflows.
pub fn dense_param_count(input_dim: usize, output_dim: usize) -> Option<usize> {
    input_dim.checked_add(1)?.checked_mul(output_dim)
}

/// Resolves the convolutional chain by propagating each stage's output channels as the next
/// stage's input channels.
///
/// # Arguments
/// * `in_channels` - The channels of the images fed to the first stage.
/// * `stages` - The ordered stages.
///
/// # Returns
/// One specification per stage.
pub fn derive_conv_specs(in_channels: usize, stages: &[ConvStage]) -> Vec<ConvSpec> {
    stages
        .iter()
        .scan(in_channels, |in_channels, stage| {
            let spec = ConvSpec {
                in_channels: *in_channels,
                out_channels: stage.out_channels,
                kernel_size: stage.kernel_size,
                stride: stage.stride,
                padding: stage.padding,
            };

            *in_channels = stage.out_channels;
            Some(spec)
        })
        .collect()
}

/// Checks that `specs` form a linear chain starting at `in_channels`.
pub fn chain_is_consistent(specs: &[ConvSpec], in_channels: usize) -> bool {
    let Some(first) = specs.first() else {
        return true;
    };

    first.in_channels == in_channels
        && specs
            .windows(2)
            .all(|w| w[1].in_channels == w[0].out_channels)
}

/// How the learnable layers get their initial values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamInit {
    /// Uniform in `±1 / sqrt(fan_in)` for both weights and biases.
    #[default]
    KaimingUniform,
    Const {
        value: f32,
    },
    Normal {
        mean: f32,
        std_dev: f32,
    },
}

/// Which statistics the normalization stages use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormMode {
    /// Statistics of the batch being evaluated.
    #[default]
    Batch,
    /// The running estimates stored in the layer.
    Running,
}

/// The axis along which the two twin outputs are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcatAxis {
    /// Stack the twin outputs as extra rows: `(2 * batch, features)`.
    #[default]
    Batch,
    /// Join the twin outputs per pair: `(batch, 2 * features)`.
    Feature,
}

/// The axis the classifier's final probability normalization runs along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftmaxAxis {
    /// Every column (class) sums to one across the rows.
    #[default]
    Batch,
    /// Every row sums to one across the classes.
    Class,
}

impl SoftmaxAxis {
    /// The ndarray axis index of a `(rows, classes)` matrix.
    pub fn index(self) -> usize {
        match self {
            SoftmaxAxis::Batch => 0,
            SoftmaxAxis::Class => 1,
        }
    }
}

/// Everything needed to build and smoke-test a `SiameseNet`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiameseConfig {
    /// Channels of the input images.
    pub in_channels: usize,
    /// Side of the square input images.
    pub image: usize,
    /// Declared side of the twins' output feature maps, checked against the derived one.
    pub fully: Option<usize>,
    pub conv_layers: Vec<ConvStage>,
    /// Width of the classifier's hidden projection.
    pub hidden: usize,
    pub nclasses: usize,
    /// Batch size of the dummy inputs fed by the entry point.
    pub batch_size: usize,
    pub share_twins: bool,
    pub concat_axis: ConcatAxis,
    pub softmax_axis: SoftmaxAxis,
    pub norm_mode: NormMode,
    pub init: ParamInit,
    /// Seed for the parameter draws, drawn from the OS when absent.
    pub seed: Option<u64>,
    /// Added to the variance by the normalization stages.
    pub eps: f32,
}

impl Default for SiameseConfig {
    fn default() -> Self {
        Self {
            in_channels: 1,
            image: 32,
            fully: Some(11),
            conv_layers: vec![
                ConvStage::new(64, 10),
                ConvStage::new(128, 7),
                ConvStage::new(128, 4),
                ConvStage::new(256, 4),
            ],
            hidden: 32,
            nclasses: 4,
            batch_size: 32,
            share_twins: false,
            concat_axis: ConcatAxis::Batch,
            softmax_axis: SoftmaxAxis::Batch,
            norm_mode: NormMode::Batch,
            init: ParamInit::KaimingUniform,
            seed: None,
            eps: 1e-5,
        }
    }
}

impl SiameseConfig {
    /// Parses a configuration from JSON, missing fields take their default value.
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or the resulting configuration is invalid.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;

        if config.fully.is_none() {
            warn!("no declared feature map side, trusting the derived one");
        }

        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    ///
    /// # Errors
    /// Returns an error if the file can't be read or its contents are invalid.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Resolves the convolutional chain.
    pub fn conv_specs(&self) -> Vec<ConvSpec> {
        derive_conv_specs(self.in_channels, &self.conv_layers)
    }

    /// Computes the `(channels, side)` of a twin's output feature map.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if some kernel doesn't fit its input feature map.
    pub fn feature_dims(&self) -> Result<(usize, usize)> {
        let mut channels = self.in_channels;
        let mut side = self.image;

        for (i, spec) in self.conv_specs().iter().enumerate() {
            side = spec.output_side(side).ok_or_else(|| {
                SiameseErr::InvalidConfig(format!(
                    "convolution {i} with kernel {}, stride {} and padding {} can't be applied to a {side}x{side} feature map",
                    spec.kernel_size, spec.stride, spec.padding
                ))
            })?;
            channels = spec.out_channels;
        }

        Ok((channels, side))
    }

    /// Computes the width of the classifier's input from the twins' declared configuration.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the feature map can't be derived or disagrees with `fully`.
    pub fn classifier_input_dim(&self) -> Result<usize> {
        let (channels, side) = self.feature_dims()?;

        match self.fully {
            Some(fully) if fully != side => {
                return Err(SiameseErr::InvalidConfig(format!(
                    "declared feature map side {fully} but the convolutions produce {side}"
                )));
            }
            _ => {}
        }

        let per_twin = side.checked_mul(side).and_then(|n| n.checked_mul(channels));
        let width = match self.concat_axis {
            ConcatAxis::Batch => per_twin,
            ConcatAxis::Feature => per_twin.and_then(|n| n.checked_mul(2)),
        };

        width.ok_or_else(|| {
            SiameseErr::InvalidConfig(format!(
                "a {channels}x{side}x{side} feature map is too wide to classify"
            ))
        })
    }

    /// Checks every construction constraint at once.
    ///
    /// # Errors
    /// Returns `InvalidConfig` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(SiameseErr::InvalidConfig(msg.to_string()));

        if self.in_channels == 0 {
            return invalid("in_channels must be positive");
        }
        if self.image == 0 {
            return invalid("image must be positive");
        }
        if self.conv_layers.is_empty() {
            return invalid("conv_layers must not be empty");
        }
        if let Some(i) = self
            .conv_layers
            .iter()
            .position(|s| s.out_channels == 0 || s.kernel_size == 0 || s.stride == 0)
        {
            return Err(SiameseErr::InvalidConfig(format!(
                "convolution {i} must have positive out_channels, kernel_size and stride"
            )));
        }
        if let Some(i) = self
            .conv_specs()
            .iter()
            .position(|spec| spec.param_count().is_none())
        {
            return Err(SiameseErr::InvalidConfig(format!(
                "convolution {i} has more parameters than fit in memory"
            )));
        }
        if self.hidden == 0 {
            return invalid("hidden must be positive");
        }
        if self.nclasses == 0 {
            return invalid("nclasses must be positive");
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be positive");
        }
        if !(self.eps.is_finite() && self.eps > 0.) {
            return invalid("eps must be a positive finite number");
        }

        let input_dim = self.classifier_input_dim()?;
        if dense_param_count(input_dim, self.hidden).is_none()
            || dense_param_count(self.hidden, self.nclasses).is_none()
        {
            return invalid("the classifier has more parameters than fit in memory");
        }

        Ok(())
    }
}
