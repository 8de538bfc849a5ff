mod batch_norm;
mod conv2d;
mod dense;
mod layer;
mod softmax;

pub use batch_norm::BatchNorm2d;
pub use conv2d::Conv2d;
pub use dense::Dense;
pub use layer::Layer;
pub use softmax::Softmax;
