mod constant;
mod error;
mod param_gen;
mod random;

use std::{cell::RefCell, rc::Rc};

use rand::rngs::StdRng;

pub use constant::ConstParamGen;
pub use error::RandErr;
pub use param_gen::ParamGen;
pub use random::RandParamGen;

use crate::config::ParamInit;

/// The random number generator every builder of the crate draws from.
pub type SharedRng = Rc<RefCell<StdRng>>;

/// Builds the generator for a learnable layer following the configured initialization.
///
/// # Arguments
/// * `init` - The initialization strategy.
/// * `rng` - The shared random number generator.
/// * `fan_in` - The number of inputs feeding each output unit of the layer.
/// * `limit` - The total amount of parameters the layer needs (weights and biases).
///
/// # Returns
/// A boxed generator or an error if the distribution is invalid.
pub fn param_gen_for(
    init: &ParamInit,
    rng: &SharedRng,
    fan_in: usize,
    limit: usize,
) -> Result<Box<dyn ParamGen>, RandErr> {
    let param_gen: Box<dyn ParamGen> = match *init {
        ParamInit::KaimingUniform => Box::new(RandParamGen::kaiming_uniform(
            rng.clone(),
            limit,
            fan_in,
            5f32.sqrt(),
        )?),
        ParamInit::Const { value } => Box::new(ConstParamGen::new(value, limit)),
        ParamInit::Normal { mean, std_dev } => {
            Box::new(RandParamGen::normal(rng.clone(), limit, mean, std_dev)?)
        }
    };

    Ok(param_gen)
}
