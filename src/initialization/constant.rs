use super::ParamGen;

/// Hands out a fixed value for every weight and bias of a layer, up to a budget.
///
/// Backs `ParamInit::Const`, which gives models whose outputs don't depend on any seed.
pub struct ConstParamGen {
    value: f32,
    remaining: usize,
}

impl ConstParamGen {
    /// Creates a generator filled with `value`.
    ///
    /// # Arguments
    /// * `value` - Every parameter of the layer.
    /// * `limit` - The layer's parameter count, sampling past it yields nothing.
    pub fn new(value: f32, limit: usize) -> Self {
        Self {
            value,
            remaining: limit,
        }
    }
}

impl ParamGen for ConstParamGen {
    fn sample(&mut self, n: usize) -> Option<Vec<f32>> {
        let granted = n.min(self.remaining);
        if granted == 0 {
            return None;
        }

        self.remaining -= granted;
        Some(vec![self.value; granted])
    }
}
