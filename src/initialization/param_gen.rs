use crate::{Result, SiameseErr};

/// A `ParamGen` generates values for the initial state of a layer's parameters.
pub trait ParamGen {
    /// Should sample at most `n` parameters.
    ///
    /// # Arguments
    /// * `n` - The upper limit of samples to generate.
    ///
    /// # Returns
    /// An option whether the generator is exhausted.
    fn sample(&mut self, n: usize) -> Option<Vec<f32>>;

    /// Samples exactly `n` parameters, asking the generator as many times as needed.
    ///
    /// # Arguments
    /// * `n` - The amount of parameters to generate.
    ///
    /// # Returns
    /// The parameters or an error if the generator got exhausted before producing `n` of them.
    fn take(&mut self, n: usize) -> Result<Vec<f32>> {
        let mut params = Vec::with_capacity(n);

        while params.len() < n {
            let Some(sample) = self.sample(n - params.len()) else {
                break;
            };

            if sample.is_empty() {
                break;
            }

            params.extend(sample);
        }

        if params.len() != n {
            return Err(SiameseErr::ParamGenExhausted {
                got: params.len(),
                expected: n,
            });
        }

        Ok(params)
    }
}
