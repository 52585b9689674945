//! # `MnasNet` Core Model
//!
//! [`MnasNet`] is the core `MnasNet` module.
//!
//! [`MnasNetAbstractConfig`] implements [`Config`], and provides
//! a high-level configuration interface: a width multiplier,
//! a class count, and the stage table.
//! It provides [`MnasNetAbstractConfig::to_structure`] to convert
//! to a [`MnasNetConfig`].
//!
//! [`MnasNetConfig`] implements [`Config`], and provides
//! [`MnasNetConfig::init`] to initialize a [`MnasNet`].
//!
//! [`MnasNet`] implements [`Module`], and provides
//! [`MnasNet::forward`].

use crate::layers::activation::ActivationConfig;
use crate::layers::blocks::cna::{CNA2d, CNA2dConfig, CNA2dMeta};
use crate::models::mnasnet::mbconv_block::{MBConvBlockConfig, MBConvBlockMeta};
use crate::models::mnasnet::stage::{MBConvStage, MBConvStageConfig, MBConvStageMeta, StageSpec};
use crate::models::mnasnet::util::{scale_planes, stride_output_resolution};
use crate::utility::params::LearnableParams;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, AvgPool2d, AvgPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::{Backend, Tensor};

/// `MnasNet-A1` stage table.
///
/// ``(t, c, n, s, k, r)``: expansion ratio, output channels, repeats,
/// first stride, kernel size, squeeze-excitation reduction ratio.
pub const MNASNET_A1_STAGES: [StageSpec; 7] = [
    // SepConv_3x3
    StageSpec::new(1.0, 16, 1, 1, 3, 1.0),
    // MBConv6_3x3
    StageSpec::new(6.0, 24, 2, 2, 3, 1.0),
    // MBConv3_5x5, SE
    StageSpec::new(3.0, 40, 3, 2, 5, 4.0),
    // MBConv6_3x3
    StageSpec::new(6.0, 80, 4, 2, 3, 1.0),
    // MBConv6_3x3, SE
    StageSpec::new(6.0, 112, 2, 1, 3, 4.0),
    // MBConv6_5x5, SE
    StageSpec::new(6.0, 160, 3, 2, 5, 4.0),
    // MBConv6_3x3
    StageSpec::new(6.0, 320, 1, 1, 3, 1.0),
];

/// Number of input image channels.
pub const MNASNET_IN_CHANNELS: usize = 3;

/// Canonical input resolution.
pub const MNASNET_RESOLUTION: usize = 224;

/// Final feature map resolution for [`MNASNET_RESOLUTION`] input.
pub const MNASNET_HEAD_RESOLUTION: usize = 7;

/// Head pooling [`Config`].
#[derive(Config, Debug)]
pub enum HeadPoolConfig {
    /// Average pool over a fixed square window, with stride equal to the window.
    ///
    /// Produces a `1x1` map for head features from `window` up to
    /// ``2 * window - 1``; `Fixed(7)` covers inputs from 193 to 416.
    Fixed(usize),

    /// Adaptive average pool to `1x1`; any resolution.
    Global,
}

impl HeadPoolConfig {
    /// Initialize a [`HeadPool`].
    pub fn init(&self) -> HeadPool {
        match self {
            HeadPoolConfig::Fixed(window) => HeadPool::Fixed(
                AvgPool2dConfig::new([*window, *window])
                    .with_strides([*window, *window])
                    .init(),
            ),
            HeadPoolConfig::Global => {
                HeadPool::Global(AdaptiveAvgPool2dConfig::new([1, 1]).init())
            }
        }
    }
}

/// Head pooling layer.
#[derive(Module, Debug, Clone)]
pub enum HeadPool {
    /// Fixed window average pool.
    Fixed(AvgPool2d),

    /// Adaptive average pool.
    Global(AdaptiveAvgPool2d),
}

impl HeadPool {
    /// Forward pass.
    pub fn forward<B: Backend>(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        match self {
            HeadPool::Fixed(pool) => pool.forward(input),
            HeadPool::Global(pool) => pool.forward(input),
        }
    }
}

/// High-level `MnasNet` model configuration.
#[derive(Config, Debug)]
pub struct MnasNetAbstractConfig {
    /// Global channel width multiplier.
    #[config(default = "1.0")]
    pub width_mult: f64,

    /// Number of classification classes.
    #[config(default = 1000)]
    pub num_classes: usize,

    /// Stem output channels, before width scaling.
    #[config(default = 32)]
    pub stem_planes: usize,

    /// Head output channels; not width scaled.
    #[config(default = 1280)]
    pub head_planes: usize,

    /// Classifier dropout probability.
    #[config(default = "0.2")]
    pub dropout: f64,

    /// The stage table.
    #[config(default = "MNASNET_A1_STAGES.to_vec()")]
    pub stages: Vec<StageSpec>,

    /// Head pooling.
    #[config(default = "HeadPoolConfig::Fixed(MNASNET_HEAD_RESOLUTION)")]
    pub pool: HeadPoolConfig,

    /// [`crate::layers::activation::Activation`] config for the conv blocks.
    #[config(default = "ActivationConfig::Relu6")]
    pub activation: ActivationConfig,
}

impl From<MnasNetAbstractConfig> for MnasNetConfig {
    fn from(config: MnasNetAbstractConfig) -> Self {
        let width_mult = config.width_mult;
        let act = &config.activation;

        let stem_planes = scale_planes(config.stem_planes, width_mult);
        let stem = CNA2dConfig::conv_bn_act(MNASNET_IN_CHANNELS, stem_planes, 3, 2, 1)
            .with_act(act.clone());

        let mut in_planes = stem_planes;
        let stages: Vec<MBConvStageConfig> = config
            .stages
            .iter()
            .enumerate()
            .map(|(idx, spec)| {
                let stage = MBConvStageConfig::build(spec, in_planes, width_mult, idx == 0, act);
                in_planes = spec.out_planes(width_mult);
                stage
            })
            .collect();

        let head = CNA2dConfig::pointwise(in_planes, config.head_planes).with_act(act.clone());

        MnasNetConfig::new(stem, stages, head, config.num_classes)
            .with_dropout(config.dropout)
            .with_pool(config.pool)
    }
}

impl MnasNetAbstractConfig {
    /// Create a `MnasNet-A1` config.
    pub fn mnasnet_a1(
        width_mult: f64,
        num_classes: usize,
    ) -> Self {
        Self::new()
            .with_width_mult(width_mult)
            .with_num_classes(num_classes)
    }

    /// Convert to a [`MnasNetConfig`].
    pub fn to_structure(self) -> MnasNetConfig {
        self.into()
    }
}

/// [`MnasNet`] Structure Config.
///
/// This config defines the layer structure of a `MnasNet` model.
/// [`MnasNetConfig::try_validate`] checks channel chaining across
/// every layer; [`MnasNetConfig::init`] panics on an invalid structure.
#[derive(Config, Debug)]
pub struct MnasNetConfig {
    /// The stem Conv/Norm/Act block.
    pub stem: CNA2dConfig,

    /// The stages.
    pub stages: Vec<MBConvStageConfig>,

    /// The head Conv/Norm/Act block.
    pub head: CNA2dConfig,

    /// The number of classes.
    pub num_classes: usize,

    /// Head pooling.
    #[config(default = "HeadPoolConfig::Fixed(MNASNET_HEAD_RESOLUTION)")]
    pub pool: HeadPoolConfig,

    /// Classifier dropout probability.
    #[config(default = "0.2")]
    pub dropout: f64,
}

impl MnasNetConfig {
    /// The total stride of the stem and stages.
    pub fn stride(&self) -> usize {
        self.stages
            .iter()
            .fold(self.stem.stride()[0], |acc, stage| acc * stage.stride())
    }

    /// The block configs, in order, across all stages.
    pub fn blocks(&self) -> impl Iterator<Item = &MBConvBlockConfig> {
        self.stages.iter().flat_map(|stage| stage.blocks.iter())
    }

    /// Check if the config is valid.
    ///
    /// Checks every stage, and that channel counts chain from the stem,
    /// through every block, to the head.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.stem.in_channels() != MNASNET_IN_CHANNELS {
            return Err(format!(
                "stem.in_channels({}) != {}",
                self.stem.in_channels(),
                MNASNET_IN_CHANNELS
            ));
        }
        if self.stages.is_empty() {
            return Err("stages is empty".to_string());
        }
        if self.num_classes == 0 {
            return Err("num_classes must be non-zero".to_string());
        }
        if !(0.0..=1.0).contains(&self.dropout) {
            return Err(format!("dropout must be in [0, 1]: {}", self.dropout));
        }

        let mut planes = self.stem.out_channels();
        let mut source = "stem".to_string();
        for (stage_idx, stage) in self.stages.iter().enumerate() {
            stage
                .try_validate()
                .map_err(|err| format!("stages[{stage_idx}]: {err}"))?;

            for (block_idx, block) in stage.blocks.iter().enumerate() {
                if block.in_planes() != planes {
                    return Err(format!(
                        "{source}.out_planes({planes}) != stages[{stage_idx}].block[{block_idx}].in_planes({})",
                        block.in_planes(),
                    ));
                }
                planes = block.out_planes();
                source = format!("stages[{stage_idx}].block[{block_idx}]");
            }
        }

        if self.head.in_channels() != planes {
            return Err(format!(
                "{source}.out_planes({planes}) != head.in_channels({})",
                self.head.in_channels(),
            ));
        }

        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Initialize a [`MnasNet`] model.
    ///
    /// # Panics
    ///
    /// If the config is invalid; see [`MnasNetConfig::try_validate`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> MnasNet<B> {
        self.expect_valid();

        let head_planes = self.head.out_channels();

        tracing::debug!(
            stem_planes = self.stem.out_channels(),
            stages = self.stages.len(),
            blocks = self.blocks().count(),
            head_planes,
            num_classes = self.num_classes,
            stride = self.stride(),
            "init MnasNet"
        );

        MnasNet {
            stem: self.stem.init(device),
            stages: self
                .stages
                .into_iter()
                .map(|stage| stage.init(device))
                .collect(),
            head: self.head.init(device),
            pool: self.pool.init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            classifier: LinearConfig::new(head_planes, self.num_classes).init(device),
        }
    }
}

/// `MnasNet` model.
#[derive(Module, Debug)]
pub struct MnasNet<B: Backend> {
    /// Input stem.
    pub stem: CNA2d<B>,

    /// Inverted residual stages.
    pub stages: Vec<MBConvStage<B>>,

    /// Feature head.
    pub head: CNA2d<B>,

    /// Head pooling.
    pub pool: HeadPool,

    /// Classifier dropout; only active on autodiff backends.
    pub dropout: Dropout,

    /// Linear classifier.
    pub classifier: Linear<B>,
}

impl<B: Backend> LearnableParams for MnasNet<B> {
    fn num_learnable_params(&self) -> usize {
        self.stem.num_learnable_params()
            + self.stages.num_learnable_params()
            + self.head.num_learnable_params()
            + self.classifier.num_learnable_params()
    }
}

impl<B: Backend> MnasNet<B> {
    /// The number of classification classes.
    pub fn num_classes(&self) -> usize {
        self.classifier.weight.shape().dims[1]
    }

    /// The total stride of the stem and stages.
    pub fn stride(&self) -> usize {
        self.stages
            .iter()
            .fold(self.stem.stride()[0], |acc, stage| acc * stage.stride())
    }

    /// The head feature map resolution for a given input resolution.
    ///
    /// Each axis is ``ceil(in / stride)``; ``224 -> 7``, ``240 -> 8``.
    pub fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        stride_output_resolution(input_resolution, self.stride())
    }

    /// Feature extraction: stem, stages, and head.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, 3, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, head_planes, out_height, out_width]``;
    /// see [`MnasNet::output_resolution`].
    pub fn forward_features(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "channels", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("channels", MNASNET_IN_CHANNELS)],
        );
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);

        let x = self.stem.forward(input);
        let x = self.stages.iter().fold(x, |x, stage| stage.forward(x));
        let x = self.head.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "head_planes", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("head_planes", self.head.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ],
        );

        x
    }

    /// `MnasNet` forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, 3, height, width]``; canonically ``[batch, 3, 224, 224]``.
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes]`` logits.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let x = self.forward_features(input);

        let x = self.pool.forward(x);
        // [B, C, 1, 1] -> [B, C]
        let x = x.flatten(1, 3);

        let x = self.dropout.forward(x);
        self.classifier.forward(x)
    }
}
