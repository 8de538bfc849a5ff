use ndarray::{Array2, Axis};

use crate::{Result, config::SoftmaxAxis};

/// Turns the lanes of a `(rows, classes)` matrix along `axis` into probability distributions.
#[derive(Debug, Clone, Copy)]
pub struct Softmax {
    axis: SoftmaxAxis,
}

impl Softmax {
    pub fn new(axis: SoftmaxAxis) -> Self {
        Self { axis }
    }

    pub fn axis(&self) -> SoftmaxAxis {
        self.axis
    }

    pub fn forward(&self, mut x: Array2<f32>) -> Result<Array2<f32>> {
        for mut lane in x.lanes_mut(Axis(self.axis.index())) {
            let max = lane.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            lane.mapv_inplace(|v| (v - max).exp());

            let sum = lane.sum();
            lane.mapv_inplace(|v| v / sum);
        }

        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn class_axis_normalizes_rows() {
        let y = Softmax::new(SoftmaxAxis::Class)
            .forward(array![[0., 0.], [1000., 0.]])
            .unwrap();

        assert_eq!(y.row(0), array![0.5, 0.5]);
        assert!((y[[1, 0]] - 1.).abs() < 1e-6);
        assert!(y[[1, 1]] >= 0.);
    }

    #[test]
    fn batch_axis_normalizes_columns() {
        let y = Softmax::new(SoftmaxAxis::Batch)
            .forward(array![[1., 5.], [1., 5.], [1., 5.], [1., 5.]])
            .unwrap();

        assert!(y.iter().all(|&p| (p - 0.25).abs() < 1e-6));
        for column in y.columns() {
            assert!((column.sum() - 1.).abs() < 1e-6);
        }
    }
}
