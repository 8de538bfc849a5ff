use log::debug;
use ndarray::{Array2, Array4, Axis, concatenate};

use super::{Classifier, Model, Twins};
use crate::{Result, SiameseErr, config::ConcatAxis};

/// Compares pairs of images: each image goes through its own twin, the two feature maps are
/// joined, flattened and classified.
#[derive(Debug, Clone)]
pub struct SiameseNet {
    twins: Twins,
    classifier: Classifier,
    concat_axis: ConcatAxis,
}

impl SiameseNet {
    /// Creates a new `SiameseNet`.
    ///
    /// Nothing checks here that the classifier's width matches the twins' output, see
    /// `ModelBuilder::build` for a checked construction.
    ///
    /// # Arguments
    /// * `twins` - The feature extractors of each branch.
    /// * `classifier` - The head fed with the joined features.
    /// * `concat_axis` - How the two feature maps are joined.
    pub fn new(twins: Twins, classifier: Classifier, concat_axis: ConcatAxis) -> Self {
        Self {
            twins,
            classifier,
            concat_axis,
        }
    }

    pub fn twins(&self) -> &Twins {
        &self.twins
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn concat_axis(&self) -> ConcatAxis {
        self.concat_axis
    }

    /// Runs the first twin only and returns the shape of its feature map.
    ///
    /// # Errors
    /// Returns a shape error if `x` doesn't fit the twin.
    pub fn conv_output_shape(&self, x: &Array4<f32>) -> Result<[usize; 4]> {
        let y = self.twins.first().forward(x.to_owned())?;
        let (batch, channels, height, width) = y.dim();
        Ok([batch, channels, height, width])
    }
}

impl Model for SiameseNet {
    type Input = (Array4<f32>, Array4<f32>);
    type Output = Array2<f32>;

    fn size(&self) -> usize {
        self.twins.size() + self.classifier.size()
    }

    fn forward(&self, (x1, x2): Self::Input) -> Result<Array2<f32>> {
        if let Some(i) = (0..4).find(|&i| x1.shape()[i] != x2.shape()[i]) {
            return Err(SiameseErr::ShapeMismatch {
                what: "second image of the pair",
                got: x2.shape()[i],
                expected: x1.shape()[i],
            });
        }

        let (out1, out2) = rayon::join(
            || self.twins.first().forward(x1),
            || self.twins.second().forward(x2),
        );
        let (out1, out2) = (out1?, out2?);

        let axis = match self.concat_axis {
            ConcatAxis::Batch => Axis(0),
            ConcatAxis::Feature => Axis(1),
        };
        let combined = concatenate(axis, &[out1.view(), out2.view()])?;

        let rows = combined.len_of(Axis(0));
        let features = combined.shape()[1..].iter().product::<usize>();
        debug!(rows = rows, features = features; "classifying joined twin features");

        let flat = combined.into_shape_with_order((rows, features))?;
        self.classifier.forward(flat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ModelBuilder,
        config::{ConvStage, NormMode, ParamInit, SiameseConfig, SoftmaxAxis},
    };
    use ndarray::{Array4, s};

    fn small_config() -> SiameseConfig {
        SiameseConfig {
            image: 8,
            fully: Some(4),
            conv_layers: vec![ConvStage::new(2, 3), ConvStage::new(3, 3)],
            hidden: 5,
            nclasses: 3,
            batch_size: 2,
            seed: Some(11),
            ..Default::default()
        }
    }

    fn build(config: &SiameseConfig) -> SiameseNet {
        ModelBuilder::build(config).unwrap()
    }

    fn ramp(batch: usize, offset: f32) -> Array4<f32> {
        Array4::from_shape_fn((batch, 1, 8, 8), |(b, _, h, w)| {
            offset + (b * 64 + h * 8 + w) as f32 / 64.
        })
    }

    #[test]
    fn batch_concatenation_doubles_the_rows() {
        let config = small_config();
        let y = build(&config).forward((ramp(2, 0.), ramp(2, 1.))).unwrap();

        assert_eq!(y.dim(), (4, 3));
        assert!(y.iter().all(|&p| p >= 0.));
        for column in y.columns() {
            assert!((column.sum() - 1.).abs() < 1e-5);
        }
    }

    #[test]
    fn feature_concatenation_keeps_the_rows() {
        let config = SiameseConfig {
            concat_axis: ConcatAxis::Feature,
            softmax_axis: SoftmaxAxis::Class,
            ..small_config()
        };
        let model = build(&config);
        assert_eq!(model.classifier().input_dim(), 2 * 4 * 4 * 3);

        let y = model.forward((ramp(2, 0.), ramp(2, 1.))).unwrap();

        assert_eq!(y.dim(), (2, 3));
        for row in y.rows() {
            assert!((row.sum() - 1.).abs() < 1e-5);
        }
    }

    #[test]
    fn first_rows_come_from_the_first_image() {
        let config = SiameseConfig {
            softmax_axis: SoftmaxAxis::Class,
            norm_mode: NormMode::Running,
            init: ParamInit::Normal {
                mean: 0.,
                std_dev: 0.5,
            },
            ..small_config()
        };
        let model = build(&config);
        let (x1, x2) = (ramp(2, 0.), ramp(2, 3.));

        let y = model.forward((x1.clone(), x2.clone())).unwrap();

        // with a row-wise softmax every row can be classified on its own.
        let branches = [
            (x1, model.twins().first(), 0..2),
            (x2, model.twins().second(), 2..4),
        ];
        for (x, twin, rows) in branches {
            let features = twin.forward(x).unwrap();
            let flat = features.into_shape_with_order((2, 4 * 4 * 3)).unwrap();
            let expected = model.classifier().forward(flat).unwrap();

            let got = y.slice(s![rows, ..]);
            assert!(got.iter().zip(&expected).all(|(a, b)| (a - b).abs() < 1e-6));
        }
    }

    #[test]
    fn mismatched_pair_fails() {
        let model = build(&small_config());
        let x2 = Array4::zeros((2, 1, 7, 7));

        assert!(matches!(
            model.forward((ramp(2, 0.), x2)),
            Err(SiameseErr::ShapeMismatch { got: 7, expected: 8, .. })
        ));
    }

    #[test]
    fn unexpected_image_size_fails() {
        let model = build(&small_config());
        let x = Array4::zeros((2, 1, 10, 10));

        assert!(matches!(
            model.forward((x.clone(), x)),
            Err(SiameseErr::ShapeMismatch { what: "dense input features", .. })
        ));
    }

    #[test]
    fn repeated_forwards_are_identical() {
        let model = build(&small_config());
        let pair = (ramp(2, 0.), ramp(2, 0.5));

        let a = model.forward(pair.clone()).unwrap();
        let b = model.forward(pair).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn conv_output_shape_agrees_with_the_config() {
        let config = small_config();
        let model = build(&config);

        let measured = model.conv_output_shape(&ramp(2, 0.)).unwrap();
        let derived = model.twins().first().output_shape([2, 1, 8, 8]).unwrap();
        let (channels, side) = config.feature_dims().unwrap();

        assert_eq!(measured, derived);
        assert_eq!(measured, [2, channels, side, side]);
        assert_eq!(
            measured[1..].iter().product::<usize>(),
            config.classifier_input_dim().unwrap()
        );
    }

    #[test]
    fn shared_parameters_are_counted_once() {
        let shared = build(&SiameseConfig {
            share_twins: true,
            ..small_config()
        });
        let independent = build(&small_config());

        let twin = shared.twins().first().size();
        assert_eq!(independent.size() - shared.size(), twin);
    }
}
