//! # Activation Layer Wrapper
use burn::nn::{HardSigmoid, HardSigmoidConfig, PRelu, PReluConfig, Relu, Sigmoid};
use burn::prelude::{Backend, Config, Module, Tensor};

/// Upper clip value for [`Activation::Relu6`].
pub const RELU6_CLIP: f64 = 6.0;

/// [`Activation`] Configuration.
#[derive(Config, Debug)]
#[non_exhaustive]
pub enum ActivationConfig {
    /// [`Relu`] activation layer.
    Relu,

    /// Clipped [`Relu`]: ``min(max(x, 0), 6)``.
    Relu6,

    /// [`Sigmoid`] activation layer.
    Sigmoid,

    /// [`HardSigmoid`] activation layer.
    HardSigmoid(HardSigmoidConfig),

    /// [`PRelu`] activation layer.
    PRelu(PReluConfig),
}

impl From<PReluConfig> for ActivationConfig {
    fn from(config: PReluConfig) -> Self {
        Self::PRelu(config)
    }
}

impl From<HardSigmoidConfig> for ActivationConfig {
    fn from(config: HardSigmoidConfig) -> Self {
        Self::HardSigmoid(config)
    }
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self::Relu
    }
}

impl ActivationConfig {
    /// Initialize a wrapped activation layer.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Activation<B> {
        match self {
            ActivationConfig::Relu => Activation::Relu(Relu),
            ActivationConfig::Relu6 => Activation::Relu6(Relu),
            ActivationConfig::Sigmoid => Activation::Sigmoid(Sigmoid),
            ActivationConfig::HardSigmoid(conf) => Activation::HardSigmoid(conf.init()),
            ActivationConfig::PRelu(conf) => Activation::PRelu(conf.init(device)),
        }
    }
}

/// Activation Layer Wrapper.
///
/// Provides support for the in-built `burn::nn` activations
/// used by mobile convolution networks.
#[derive(Module, Debug)]
#[non_exhaustive]
pub enum Activation<B: Backend> {
    /// [`Relu`] activation layer.
    Relu(Relu),

    /// [`Relu`] clipped at [`RELU6_CLIP`].
    Relu6(Relu),

    /// [`Sigmoid`] activation layer.
    Sigmoid(Sigmoid),

    /// [`HardSigmoid`] activation layer.
    HardSigmoid(HardSigmoid),

    /// [`PRelu`] activation layer.
    PRelu(PRelu<B>),
}

impl<B: Backend> Activation<B> {
    /// Forward pass.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn forward<const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        match self {
            Activation::Relu(layer) => layer.forward(input),
            Activation::Relu6(layer) => layer.forward(input).clamp_max(RELU6_CLIP),
            Activation::Sigmoid(layer) => layer.forward(input),
            Activation::HardSigmoid(layer) => layer.forward(input),
            Activation::PRelu(layer) => layer.forward(input),
        }
    }

    /// Build a [`ActivationConfig`] for this module.
    pub fn to_config(&self) -> ActivationConfig {
        match self {
            Activation::Relu(_) => ActivationConfig::Relu,
            Activation::Relu6(_) => ActivationConfig::Relu6,
            Activation::Sigmoid(_) => ActivationConfig::Sigmoid,
            Activation::HardSigmoid(layer) => HardSigmoidConfig::new()
                .with_alpha(layer.alpha)
                .with_beta(layer.beta)
                .into(),
            Activation::PRelu(layer) => PReluConfig::new()
                .with_alpha(layer.alpha_value)
                .with_num_parameters(layer.alpha.shape().dims[0])
                .into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::nn::{Linear, LinearConfig};

    type TestBackend = NdArray<f32>;

    #[derive(Config, Debug)]
    pub struct TestConfig {
        fc: LinearConfig,
        act: ActivationConfig,
    }

    impl TestConfig {
        pub fn init<B: Backend>(
            self,
            device: &B::Device,
        ) -> TestModule<B> {
            let fc = self.fc.init(device);
            let act = self.act.init(device);
            TestModule { fc, act }
        }
    }

    #[derive(Module, Debug)]
    pub struct TestModule<B: Backend> {
        fc: Linear<B>,
        act: Activation<B>,
    }

    impl<B: Backend> TestModule<B> {
        pub fn forward(
            &self,
            input: Tensor<B, 2>,
        ) -> Tensor<B, 2> {
            let output = self.fc.forward(input);
            self.act.forward(output)
        }
    }

    #[test]
    fn test_embedded_roundtrip() {
        let device = Default::default();
        let config = TestConfig {
            fc: LinearConfig::new(2, 2),
            act: ActivationConfig::Relu6,
        };

        let source_module: TestModule<TestBackend> = config.clone().init(&device);

        let input = Tensor::from_data([[1.0, 2.0], [3.0, 4.0]], &device);
        let output1 = source_module.forward(input.clone());

        let record = source_module.into_record();

        let reload_module: TestModule<TestBackend> = config.init(&device).load_record(record);
        let output2 = reload_module.forward(input.clone());

        output1.to_data().assert_eq(&output2.to_data(), true);
    }

    fn make_input<B: Backend>(device: &B::Device) -> Tensor<B, 2> {
        Tensor::from_data([[-1.0, -0.5, 0.0, 3.0], [1.0, 0.5, 6.0, 9.0]], device)
    }

    fn check_stateless_config_output<B: Backend, const D: usize>(
        config: ActivationConfig,
        input: Tensor<B, D>,
        expected: Tensor<B, D>,
        device: &B::Device,
    ) {
        let act1 = config.init(device);
        let record: ActivationRecord<B> = act1.into_record();

        let act = config.init(device).load_record(record);
        assert!(matches!(
            (act.to_config(), &config),
            (ActivationConfig::Relu, ActivationConfig::Relu)
                | (ActivationConfig::Relu6, ActivationConfig::Relu6)
                | (ActivationConfig::Sigmoid, ActivationConfig::Sigmoid)
                | (ActivationConfig::HardSigmoid(_), ActivationConfig::HardSigmoid(_))
                | (ActivationConfig::PRelu(_), ActivationConfig::PRelu(_))
        ));

        let output = act.forward(input);
        output.to_data().assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_default_is_relu() {
        assert!(matches!(ActivationConfig::default(), ActivationConfig::Relu));
    }

    #[test]
    fn test_relu() {
        let device = Default::default();
        let input = make_input::<TestBackend>(&device);

        let expected = Relu.forward(input.clone());

        check_stateless_config_output(ActivationConfig::Relu, input, expected, &device)
    }

    #[test]
    fn test_relu6() {
        let device = Default::default();
        let input = make_input::<TestBackend>(&device);

        let expected: Tensor<TestBackend, 2> =
            Tensor::from_data([[0.0, 0.0, 0.0, 3.0], [1.0, 0.5, 6.0, 6.0]], &device);

        check_stateless_config_output(ActivationConfig::Relu6, input, expected, &device)
    }

    #[test]
    fn test_sigmoid() {
        let device = Default::default();
        let input = make_input::<TestBackend>(&device);

        let expected = Sigmoid.forward(input.clone());

        check_stateless_config_output(ActivationConfig::Sigmoid, input, expected, &device)
    }

    #[test]
    fn test_prelu() {
        let device = Default::default();
        let input = make_input::<TestBackend>(&device);

        let inner_config = PReluConfig::new();
        let expected = inner_config.init(&device).forward(input.clone());

        check_stateless_config_output(
            ActivationConfig::PRelu(inner_config),
            input,
            expected,
            &device,
        )
    }

    #[test]
    fn test_hard_sigmoid() {
        let device = Default::default();
        let input = make_input::<TestBackend>(&device);

        let inner_config = HardSigmoidConfig::new();
        let expected = inner_config.init().forward(input.clone());

        check_stateless_config_output(
            ActivationConfig::HardSigmoid(inner_config),
            input,
            expected,
            &device,
        )
    }
}
