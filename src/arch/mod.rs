mod builder;
mod classifier;
pub mod layers;
mod model;
mod sequential;
mod siamese;
mod twins;

pub use builder::ModelBuilder;
pub use classifier::Classifier;
pub use model::Model;
pub use sequential::Sequential;
pub use siamese::SiameseNet;
pub use twins::{FeatureExtractor, Twins};
