use crate::Result;

/// Anything that maps an input to an output through learnable layers.
///
/// Forward evaluation never mutates the model, so a model can be shared between threads and
/// evaluated concurrently.
pub trait Model {
    type Input;
    type Output;

    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Makes a forward pass through the model.
    ///
    /// # Errors
    /// Returns a shape error if the input doesn't fit the model.
    fn forward(&self, input: Self::Input) -> Result<Self::Output>;
}
