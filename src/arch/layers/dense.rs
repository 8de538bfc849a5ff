use ndarray::{Array1, Array2, ArrayView2, linalg};

use crate::{Result, SiameseErr, initialization::ParamGen};

/// A fully connected projection: `z = x·W + b`.
#[derive(Debug, Clone)]
pub struct Dense {
    dim: (usize, usize),
    weights: Array2<f32>,
    biases: Array1<f32>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The input and output widths.
    /// * `param_gen` - Generates the weights first, then the biases.
    ///
    /// # Returns
    /// The layer or an error if the generator couldn't fill it.
    pub fn new(dim: (usize, usize), param_gen: &mut dyn ParamGen) -> Result<Self> {
        let w_size = dim.0 * dim.1;
        let mut params = param_gen.take(w_size + dim.1)?;
        let biases = Array1::from_vec(params.split_off(w_size));
        let weights = Array2::from_shape_vec(dim, params)?;

        Ok(Self {
            dim,
            weights,
            biases,
        })
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        (self.dim.0 + 1) * self.dim.1
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    pub fn weights(&self) -> ArrayView2<'_, f32> {
        self.weights.view()
    }

    /// Projects every row of `x`.
    ///
    /// # Arguments
    /// * `x` - A `(rows, dim.0)` matrix.
    ///
    /// # Returns
    /// A `(rows, dim.1)` matrix or an error if `x` has the wrong width.
    pub fn forward(&self, x: Array2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(SiameseErr::ShapeMismatch {
                what: "dense input features",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let mut z = Array2::zeros((x.nrows(), self.dim.1));
        linalg::general_mat_mul(1.0, &x, &self.weights, 0.0, &mut z);
        z += &self.biases;
        Ok(z)
    }
}
