use ndarray::{Array1, Array2, Array4, Array6, ArrayView1, ArrayView4, linalg, s};

use crate::{Result, SiameseErr, config::ConvSpec, initialization::ParamGen};

/// A 2D cross-correlation over `(batch, channel, height, width)` tensors.
///
/// The input windows are unfolded into a `(batch * out_h * out_w, in_c * k * k)` matrix
/// (im2col) so the whole layer becomes a single matrix product against the weights.
#[derive(Debug, Clone)]
pub struct Conv2d {
    spec: ConvSpec,
    fan_in: usize,
    weights: Array4<f32>,
    biases: Array1<f32>,
}

impl Conv2d {
    /// Creates a new `Conv2d` layer.
    ///
    /// # Arguments
    /// * `spec` - The channels, kernel, stride and padding of the layer.
    /// * `param_gen` - Generates the weights first, then the biases.
    ///
    /// # Returns
    /// The layer or an error if its size overflows or the generator couldn't fill it.
    pub fn new(spec: ConvSpec, param_gen: &mut dyn ParamGen) -> Result<Self> {
        let k = spec.kernel_size;
        let (Some(fan_in), Some(size)) = (spec.fan_in(), spec.param_count()) else {
            return Err(SiameseErr::InvalidConfig(format!(
                "a {k}x{k} convolution from {} to {} channels has too many parameters",
                spec.in_channels, spec.out_channels
            )));
        };

        let mut params = param_gen.take(size)?;
        let biases = Array1::from_vec(params.split_off(size - spec.out_channels));
        let weights = Array4::from_shape_vec((spec.out_channels, spec.in_channels, k, k), params)?;

        Ok(Self {
            spec,
            fan_in,
            weights,
            biases,
        })
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    pub fn spec(&self) -> &ConvSpec {
        &self.spec
    }

    /// The kernels, shaped `(out_channels, in_channels, k, k)`.
    pub fn weights(&self) -> ArrayView4<'_, f32> {
        self.weights.view()
    }

    pub fn biases(&self) -> ArrayView1<'_, f32> {
        self.biases.view()
    }

    /// Convolves a batch of feature maps.
    ///
    /// # Arguments
    /// * `x` - A `(batch, in_channels, height, width)` tensor.
    ///
    /// # Returns
    /// A `(batch, out_channels, out_h, out_w)` tensor or a shape error.
    pub fn forward(&self, x: Array4<f32>) -> Result<Array4<f32>> {
        let ConvSpec {
            in_channels,
            out_channels,
            kernel_size: k,
            stride,
            ..
        } = self.spec;

        let (batch, channels, height, width) = x.dim();
        if channels != in_channels {
            return Err(SiameseErr::ShapeMismatch {
                what: "convolution input channels",
                got: channels,
                expected: in_channels,
            });
        }

        let side_of = |side: usize| {
            self.spec
                .output_side(side)
                .ok_or(SiameseErr::ShapeMismatch {
                    what: "convolution input side",
                    got: side.saturating_add(self.spec.padding.saturating_mul(2)),
                    expected: k,
                })
        };
        let (out_h, out_w) = (side_of(height)?, side_of(width)?);

        let x = self.pad(x);
        let mut patches = Array6::<f32>::zeros((batch, out_h, out_w, channels, k, k));

        for c in 0..channels {
            for ky in 0..k {
                for kx in 0..k {
                    let window = x.slice(s![
                        ..,
                        c,
                        ky..ky + stride * (out_h - 1) + 1;stride,
                        kx..kx + stride * (out_w - 1) + 1;stride
                    ]);
                    patches.slice_mut(s![.., .., .., c, ky, kx]).assign(&window);
                }
            }
        }

        let rows = batch * out_h * out_w;
        let cols = patches.into_shape_with_order((rows, self.fan_in))?;
        let w = self
            .weights
            .view()
            .into_shape_with_order((out_channels, self.fan_in))?;

        let mut z = Array2::zeros((rows, out_channels));
        linalg::general_mat_mul(1.0, &cols, &w.t(), 0.0, &mut z);
        z += &self.biases;

        let z = z
            .into_shape_with_order((batch, out_h, out_w, out_channels))?
            .permuted_axes([0, 3, 1, 2]);

        Ok(z.as_standard_layout().into_owned())
    }

    fn pad(&self, x: Array4<f32>) -> Array4<f32> {
        let p = self.spec.padding;
        if p == 0 {
            return x;
        }

        let (batch, channels, height, width) = x.dim();
        let mut padded = Array4::zeros((batch, channels, height + 2 * p, width + 2 * p));
        padded
            .slice_mut(s![.., .., p..p + height, p..p + width])
            .assign(&x);

        padded
    }
}
