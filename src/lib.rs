pub mod arch;
pub mod config;
pub mod error;
pub mod initialization;

use log::info;
use ndarray::{Array2, Array4};

pub use arch::{Model, ModelBuilder, SiameseNet};
pub use config::SiameseConfig;
pub use error::{Result, SiameseErr};

/// Builds the network described by `config` and feeds it a pair of all-zero batches.
///
/// # Arguments
/// * `config` - The network and smoke test settings.
///
/// # Returns
/// The class probabilities of the dummy pair, or the first error met while building or
/// evaluating the network.
pub fn run(config: &SiameseConfig) -> Result<Array2<f32>> {
    let model = ModelBuilder::build(config)?;

    let shape = (config.batch_size, config.in_channels, config.image, config.image);
    let pair = (Array4::zeros(shape), Array4::zeros(shape));
    let y = model.forward(pair)?;

    info!(rows = y.nrows(), classes = y.ncols(); "forwarded dummy pair");
    Ok(y)
}
