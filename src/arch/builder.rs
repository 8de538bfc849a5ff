use std::{cell::RefCell, rc::Rc};

use log::{debug, info};
use rand::{SeedableRng, rngs::StdRng};

use super::{Classifier, FeatureExtractor, Model, Sequential, SiameseNet, Twins, layers::Layer};
use crate::{
    Result, SiameseErr,
    config::{
        ConvSpec, NormMode, ParamInit, SiameseConfig, SoftmaxAxis, chain_is_consistent,
        dense_param_count,
    },
    initialization::{SharedRng, param_gen_for},
};

/// Builds the pieces of a `SiameseNet`, drawing every random parameter from a single generator
/// so a seeded builder always produces the same model.
pub struct ModelBuilder {
    rng: SharedRng,
    init: ParamInit,
    norm_mode: NormMode,
    eps: f32,
}

impl ModelBuilder {
    /// Creates a new `ModelBuilder` with the default initialization and batch statistics.
    ///
    /// # Arguments
    /// * `seed` - Seeds the parameter draws, taken from the OS if `None`.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            rng: Rc::new(RefCell::new(rng)),
            init: ParamInit::default(),
            norm_mode: NormMode::default(),
            eps: 1e-5,
        }
    }

    /// Creates a new `ModelBuilder` following the ambient settings of `config`.
    pub fn from_config(config: &SiameseConfig) -> Self {
        Self::new(config.seed)
            .with_init(config.init)
            .with_norm(config.norm_mode, config.eps)
    }

    pub fn with_init(mut self, init: ParamInit) -> Self {
        self.init = init;
        self
    }

    pub fn with_norm(mut self, norm_mode: NormMode, eps: f32) -> Self {
        self.norm_mode = norm_mode;
        self.eps = eps;
        self
    }

    /// Builds a feature extractor with one `Conv2d -> BatchNorm2d -> Relu` block per spec.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the specs don't form a chain or some block is too large, or an
    /// initialization error.
    pub fn create_feature_extractor(&self, specs: &[ConvSpec]) -> Result<FeatureExtractor> {
        if let Some(first) = specs.first() {
            if !chain_is_consistent(specs, first.in_channels) {
                return Err(SiameseErr::InvalidConfig(
                    "every convolution must read the channels the previous one writes".into(),
                ));
            }
        }

        let mut layers = Vec::with_capacity(3 * specs.len());
        for spec in specs {
            let (Some(fan_in), Some(limit)) = (spec.fan_in(), spec.param_count()) else {
                return Err(SiameseErr::InvalidConfig(format!(
                    "convolution {spec:?} has more parameters than fit in memory"
                )));
            };
            let mut param_gen = param_gen_for(&self.init, &self.rng, fan_in, limit)?;

            layers.push(Layer::conv2d(*spec, param_gen.as_mut())?);
            layers.push(Layer::batch_norm2d(spec.out_channels, self.eps, self.norm_mode));
            layers.push(Layer::relu());
        }

        let extractor = FeatureExtractor::new(specs.to_vec(), Sequential::new(layers));
        debug!(blocks = specs.len(), params = extractor.size(); "built feature extractor");
        Ok(extractor)
    }

    /// Builds the two branches of the network.
    ///
    /// # Arguments
    /// * `specs` - The convolutional chain of each twin.
    /// * `share` - Whether both branches use the very same extractor.
    pub fn create_twins(&self, specs: &[ConvSpec], share: bool) -> Result<Twins> {
        let first = self.create_feature_extractor(specs)?;

        if share {
            return Ok(Twins::shared(first));
        }

        let second = self.create_feature_extractor(specs)?;
        Ok(Twins::independent(first, second))
    }

    /// Builds the `Dense -> Relu -> Dense -> Softmax` head.
    ///
    /// # Arguments
    /// * `input_dim` - The width of the flattened joined features.
    /// * `hidden` - The width of the hidden projection.
    /// * `nclasses` - The amount of classes.
    /// * `softmax_axis` - The axis the output probabilities are normalized along.
    pub fn create_classifier(
        &self,
        input_dim: usize,
        hidden: usize,
        nclasses: usize,
        softmax_axis: SoftmaxAxis,
    ) -> Result<Classifier> {
        if input_dim == 0 || hidden == 0 || nclasses == 0 {
            return Err(SiameseErr::InvalidConfig(format!(
                "classifier widths must be positive, got {input_dim} -> {hidden} -> {nclasses}"
            )));
        }

        let dense_size = |input: usize, output: usize| {
            dense_param_count(input, output).ok_or_else(|| {
                SiameseErr::InvalidConfig(format!(
                    "a {input} -> {output} projection has more parameters than fit in memory"
                ))
            })
        };

        let hidden_size = dense_size(input_dim, hidden)?;
        let mut hidden_gen = param_gen_for(&self.init, &self.rng, input_dim, hidden_size)?;
        let output_size = dense_size(hidden, nclasses)?;
        let mut output_gen = param_gen_for(&self.init, &self.rng, hidden, output_size)?;

        let seq = Sequential::new([
            Layer::dense((input_dim, hidden), hidden_gen.as_mut())?,
            Layer::relu(),
            Layer::dense((hidden, nclasses), output_gen.as_mut())?,
            Layer::softmax(softmax_axis),
        ]);

        Ok(Classifier::new(input_dim, nclasses, seq))
    }

    /// Builds a whole `SiameseNet` as `config` describes it, sizing the classifier from the
    /// twins' derived output. The parameter draws follow `config`'s seed and initialization.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if `config` is inconsistent, before allocating any layer.
    pub fn build(config: &SiameseConfig) -> Result<SiameseNet> {
        config.validate()?;

        let specs = config.conv_specs();
        let input_dim = config.classifier_input_dim()?;

        let builder = Self::from_config(config);
        let twins = builder.create_twins(&specs, config.share_twins)?;
        let classifier = builder.create_classifier(
            input_dim,
            config.hidden,
            config.nclasses,
            config.softmax_axis,
        )?;

        let model = SiameseNet::new(twins, classifier, config.concat_axis);
        info!(
            params = model.size(),
            shared = model.twins().is_shared(),
            classifier_input = input_dim;
            "built siamese network"
        );

        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{ConvStage, derive_conv_specs};

    fn specs() -> Vec<ConvSpec> {
        derive_conv_specs(1, &[ConvStage::new(2, 3), ConvStage::new(3, 3)])
    }

    fn first_conv_weights(extractor: &FeatureExtractor) -> Vec<f32> {
        match &extractor.layers()[0] {
            Layer::Conv2d(conv) => conv.weights().iter().copied().collect(),
            other => panic!("expected a convolution first, got {other:?}"),
        }
    }

    #[test]
    fn extractor_blocks() {
        let extractor = ModelBuilder::new(Some(0))
            .create_feature_extractor(&specs())
            .unwrap();

        let layers = extractor.layers();
        assert_eq!(layers.len(), 6);
        assert!(matches!(layers[0], Layer::Conv2d(_)));
        assert!(matches!(layers[1], Layer::BatchNorm2d(_)));
        assert!(matches!(layers[2], Layer::Relu));
        assert!(matches!(layers[3], Layer::Conv2d(_)));

        // (1*9 + 1) * 2 + 2 * 2 + (2*9 + 1) * 3 + 3 * 2
        assert_eq!(extractor.size(), 20 + 4 + 57 + 6);
        assert_eq!(extractor.output_shape([5, 1, 8, 8]).unwrap(), [5, 3, 4, 4]);
    }

    #[test]
    fn broken_chain() {
        let mut specs = specs();
        specs[1].in_channels = 5;

        assert!(matches!(
            ModelBuilder::new(Some(0)).create_feature_extractor(&specs),
            Err(SiameseErr::InvalidConfig(_))
        ));
    }

    #[test]
    fn shared_twins_alias() {
        let twins = ModelBuilder::new(Some(0))
            .create_twins(&specs(), true)
            .unwrap();

        assert!(twins.is_shared());
        assert!(Arc::ptr_eq(twins.first(), twins.second()));
        assert_eq!(twins.size(), twins.first().size());
    }

    #[test]
    fn independent_twins_have_their_own_parameters() {
        let twins = ModelBuilder::new(Some(0))
            .create_twins(&specs(), false)
            .unwrap();

        assert!(!twins.is_shared());
        assert_ne!(
            first_conv_weights(twins.first()),
            first_conv_weights(twins.second())
        );
        assert_eq!(twins.size(), 2 * twins.first().size());
    }

    #[test]
    fn same_seed_same_model() {
        let a = ModelBuilder::new(Some(7)).create_feature_extractor(&specs()).unwrap();
        let b = ModelBuilder::new(Some(7)).create_feature_extractor(&specs()).unwrap();

        assert_eq!(first_conv_weights(&a), first_conv_weights(&b));
    }

    #[test]
    fn const_init() {
        let extractor = ModelBuilder::new(None)
            .with_init(ParamInit::Const { value: 0.25 })
            .create_feature_extractor(&specs())
            .unwrap();

        assert!(first_conv_weights(&extractor).iter().all(|&w| w == 0.25));
    }

    #[test]
    fn classifier_layout() {
        let classifier = ModelBuilder::new(Some(0))
            .create_classifier(48, 5, 3, SoftmaxAxis::Class)
            .unwrap();

        assert_eq!(classifier.input_dim(), 48);
        assert_eq!(classifier.nclasses(), 3);
        assert_eq!(classifier.size(), 49 * 5 + 6 * 3);
        assert!(matches!(classifier.layers()[3], Layer::Softmax(_)));
    }

    #[test]
    fn classifier_needs_positive_widths() {
        let builder = ModelBuilder::new(Some(0));

        assert!(builder.create_classifier(0, 5, 3, SoftmaxAxis::Batch).is_err());
        assert!(builder.create_classifier(4, 0, 3, SoftmaxAxis::Batch).is_err());
        assert!(builder.create_classifier(4, 5, 0, SoftmaxAxis::Batch).is_err());
    }

    #[test]
    fn oversized_blocks_are_rejected() {
        let builder = ModelBuilder::new(Some(0));
        let mut specs = specs();
        specs[1].kernel_size = 1 << 32;

        assert!(matches!(
            builder.create_feature_extractor(&specs),
            Err(SiameseErr::InvalidConfig(_))
        ));
        assert!(matches!(
            builder.create_classifier(usize::MAX, 2, 2, SoftmaxAxis::Batch),
            Err(SiameseErr::InvalidConfig(_))
        ));
    }

    #[test]
    fn build_follows_the_config_settings() {
        let config = SiameseConfig {
            image: 8,
            fully: Some(4),
            conv_layers: vec![ConvStage::new(2, 3), ConvStage::new(3, 3)],
            init: ParamInit::Const { value: 0.25 },
            norm_mode: NormMode::Running,
            eps: 1e-3,
            ..Default::default()
        };

        let model = ModelBuilder::build(&config).unwrap();

        let twin = model.twins().first();
        assert!(first_conv_weights(twin).iter().all(|&w| w == 0.25));
        match &twin.layers()[1] {
            Layer::BatchNorm2d(bn) => assert_eq!(bn.mode(), NormMode::Running),
            other => panic!("expected a normalization second, got {other:?}"),
        }
    }

    #[test]
    fn build_rejects_inconsistent_configs_up_front() {
        let config = SiameseConfig {
            fully: Some(10),
            ..Default::default()
        };

        assert!(matches!(
            ModelBuilder::build(&config),
            Err(SiameseErr::InvalidConfig(_))
        ));
    }
}
