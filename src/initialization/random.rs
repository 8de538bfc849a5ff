use std::{cell::RefCell, rc::Rc};

use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use super::{ParamGen, RandErr};

/// A parameter generator that follows a certain probabilistic distribution.
///
/// Several generators may share the same random number generator, that way building the layers
/// of a model in order consumes a single reproducible stream.
pub struct RandParamGen<R: Rng, D: Distribution<f32>> {
    rng: Rc<RefCell<R>>,
    distribution: D,
    remaining: usize,
}

impl<R: Rng, D: Distribution<f32>> RandParamGen<R, D> {
    /// Creates a new `RandParamGen` parameter generator.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `distribution` - The distribution to sample the random numbers from.
    /// * `limit` - The maximum amount of numbers to generate.
    pub fn new(rng: Rc<RefCell<R>>, distribution: D, limit: usize) -> Self {
        Self {
            rng,
            distribution,
            remaining: limit,
        }
    }
}

impl<R: Rng> RandParamGen<R, Uniform<f32>> {
    /// Creates a new `RandParamGen` parameter generator with a uniform distribution.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `limit` - The maximum amount of numbers to generate.
    /// * `low` - The inclusive lower limit.
    /// * `high` - The exclusive upper limit.
    ///
    /// # Returns
    /// An error if the range is invalid (low >= high).
    pub fn uniform(
        rng: Rc<RefCell<R>>,
        limit: usize,
        low: f32,
        high: f32,
    ) -> Result<Self, RandErr> {
        Ok(Self::new(rng, Uniform::new(low, high)?, limit))
    }

    /// Creates a new `RandParamGen` parameter generator using Kaiming uniform initialization
    /// with a leaky rectifier slope of `a`.
    ///
    /// With `a = sqrt(5)` the bound collapses to `1 / sqrt(fan_in)`, which is the usual default
    /// for both the weights and the biases of convolutions and linear projections.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `limit` - The maximum amount of numbers to generate.
    /// * `fan_in` - The number of input units feeding each output unit.
    /// * `a` - The negative slope of the rectifier the layer is followed by.
    ///
    /// # Returns
    /// An error if the calculated range is invalid.
    pub fn kaiming_uniform(
        rng: Rc<RefCell<R>>,
        limit: usize,
        fan_in: usize,
        a: f32,
    ) -> Result<Self, RandErr> {
        let gain = (2. / (1. + a * a)).sqrt();
        let bound = gain * (3. / fan_in as f32).sqrt();
        Self::uniform(rng, limit, -bound, bound)
    }
}

impl<R: Rng> RandParamGen<R, Normal<f32>> {
    /// Creates a new `RandParamGen` parameter generator with a normal distribution.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `limit` - The maximum amount of numbers to generate.
    /// * `mean` - The mean of the distribution.
    /// * `std_dev` - The standard deviation of the distribution.
    ///
    /// # Returns
    /// An error if `std_dev` is not finite (Nan or infinite).
    pub fn normal(
        rng: Rc<RefCell<R>>,
        limit: usize,
        mean: f32,
        std_dev: f32,
    ) -> Result<Self, RandErr> {
        Ok(Self::new(rng, Normal::new(mean, std_dev)?, limit))
    }
}

impl<R: Rng, D: Distribution<f32>> ParamGen for RandParamGen<R, D> {
    fn sample(&mut self, mut n: usize) -> Option<Vec<f32>> {
        if self.remaining == 0 {
            return None;
        }

        n = n.min(self.remaining);
        self.remaining -= n;

        let mut rng = self.rng.borrow_mut();
        let sample = (0..n).map(|_| self.distribution.sample(&mut *rng)).collect();
        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn seeded_rng() -> Rc<RefCell<StdRng>> {
        Rc::new(RefCell::new(StdRng::seed_from_u64(42)))
    }

    #[test]
    fn empty() {
        let mut param_gen = RandParamGen::normal(seeded_rng(), 0, 0., 1.).unwrap();
        assert!(param_gen.sample(1).is_none());
    }

    #[test]
    fn partial() {
        let mut param_gen = RandParamGen::normal(seeded_rng(), 10, 0., 1.).unwrap();

        assert_eq!(param_gen.sample(7).unwrap().len(), 7);
        assert_eq!(param_gen.sample(7).unwrap().len(), 3);
        assert!(param_gen.sample(1).is_none());
    }

    #[test]
    fn kaiming_uniform_default_slope_stays_within_fan_in_bound() {
        const FAN_IN: usize = 100;

        let a = 5f32.sqrt();
        let mut param_gen = RandParamGen::kaiming_uniform(seeded_rng(), 1000, FAN_IN, a).unwrap();
        let sample = param_gen.take(1000).unwrap();

        let bound = 1. / (FAN_IN as f32).sqrt() + 1e-6;
        assert!(sample.iter().all(|x| x.abs() <= bound));
        assert!(sample.iter().any(|&x| x != sample[0]));
    }

    #[test]
    fn same_seed_same_stream() {
        let mut a = RandParamGen::uniform(seeded_rng(), 16, -1., 1.).unwrap();
        let mut b = RandParamGen::uniform(seeded_rng(), 16, -1., 1.).unwrap();

        assert_eq!(a.take(16).unwrap(), b.take(16).unwrap());
    }

    #[test]
    fn shared_rng_advances_between_generators() {
        let rng = seeded_rng();
        let mut a = RandParamGen::uniform(rng.clone(), 8, -1., 1.).unwrap();
        let mut b = RandParamGen::uniform(rng, 8, -1., 1.).unwrap();

        assert_ne!(a.take(8).unwrap(), b.take(8).unwrap());
    }

    #[test]
    fn invalid_ranges() {
        assert!(RandParamGen::uniform(seeded_rng(), 1, 1., -1.).is_err());
        assert!(RandParamGen::normal(seeded_rng(), 1, 0., f32::NAN).is_err());
    }
}
