//! # Squeeze-Excitation Block
//!
//! A [`SqueezeExcitation`] module rescales each input channel by a learned,
//! input-dependent scalar:
//!
//! ```text,ignore
//! s = gate(expand(act(reduce(avg_pool(x)))))
//! y = x * s
//! ```
//!
//! The `reduce` and `expand` layers are biased 1x1 convolutions through a
//! ``reduced_dim`` bottleneck.

use crate::layers::activation::{Activation, ActivationConfig};
use crate::utility::params::LearnableParams;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::prelude::{Backend, Tensor};

/// [`SqueezeExcitation`] Meta.
pub trait SqueezeExcitationMeta {
    /// Number of input (and output) feature channels.
    fn num_features(&self) -> usize;

    /// Size of the bottleneck.
    fn reduced_dim(&self) -> usize;
}

/// [`SqueezeExcitation`] Config.
#[derive(Config, Debug)]
pub struct SqueezeExcitationConfig {
    /// Number of input (and output) feature channels.
    pub num_features: usize,

    /// Size of the bottleneck.
    pub reduced_dim: usize,

    /// Bottleneck activation.
    #[config(default = "ActivationConfig::Relu")]
    pub act: ActivationConfig,

    /// Gate activation.
    #[config(default = "ActivationConfig::Sigmoid")]
    pub gate: ActivationConfig,
}

impl SqueezeExcitationMeta for SqueezeExcitationConfig {
    fn num_features(&self) -> usize {
        self.num_features
    }

    fn reduced_dim(&self) -> usize {
        self.reduced_dim
    }
}

impl SqueezeExcitationConfig {
    /// Initialize a [`SqueezeExcitation`].
    ///
    /// # Panics
    ///
    /// If `num_features` or `reduced_dim` is zero.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> SqueezeExcitation<B> {
        assert!(
            self.num_features >= 1,
            "SqueezeExcitation num_features must be >= 1: {self:?}"
        );
        assert!(
            self.reduced_dim >= 1,
            "SqueezeExcitation reduced_dim must be >= 1: {self:?}"
        );

        SqueezeExcitation {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            reduce: Conv2dConfig::new([self.num_features, self.reduced_dim], [1, 1])
                .with_bias(true)
                .init(device),
            act: self.act.init(device),
            expand: Conv2dConfig::new([self.reduced_dim, self.num_features], [1, 1])
                .with_bias(true)
                .init(device),
            gate: self.gate.init(device),
        }
    }
}

/// Squeeze-Excitation channel gate.
///
/// Implements [`SqueezeExcitationMeta`].
#[derive(Module, Debug)]
pub struct SqueezeExcitation<B: Backend> {
    /// Global average pool; the squeeze.
    pub pool: AdaptiveAvgPool2d,

    /// Bottleneck projection.
    pub reduce: Conv2d<B>,

    /// Bottleneck activation.
    pub act: Activation<B>,

    /// Feature projection.
    pub expand: Conv2d<B>,

    /// Gate activation.
    pub gate: Activation<B>,
}

impl<B: Backend> SqueezeExcitationMeta for SqueezeExcitation<B> {
    fn num_features(&self) -> usize {
        self.reduce.weight.shape().dims[1]
    }

    fn reduced_dim(&self) -> usize {
        self.reduce.weight.shape().dims[0]
    }
}

impl<B: Backend> LearnableParams for SqueezeExcitation<B> {
    fn num_learnable_params(&self) -> usize {
        self.reduce.num_learnable_params()
            + self.act.num_learnable_params()
            + self.expand.num_learnable_params()
            + self.gate.num_learnable_params()
    }
}

impl<B: Backend> SqueezeExcitation<B> {
    /// Compute the per-channel scale.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, num_features, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, num_features, 1, 1]``
    pub fn scale(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = self.pool.forward(input);
        let x = self.reduce.forward(x);
        let x = self.act.forward(x);
        let x = self.expand.forward(x);
        self.gate.forward(x)
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, num_features, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, num_features, height, width]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, height, width] = unpack_shape_contract!(
            ["batch", "num_features", "height", "width"],
            &input,
            &["batch", "height", "width"],
            &[("num_features", self.num_features())]
        );

        let scale = self.scale(input.clone());

        assert_shape_contract_periodically!(
            ["batch", "num_features", "pool_height", "pool_width"],
            &scale,
            &[
                ("batch", batch),
                ("num_features", self.num_features()),
                ("pool_height", 1),
                ("pool_width", 1)
            ]
        );

        let x = input * scale;

        assert_shape_contract_periodically!(
            ["batch", "num_features", "height", "width"],
            &x,
            &[
                ("batch", batch),
                ("num_features", self.num_features()),
                ("height", height),
                ("width", width)
            ]
        );

        x
    }
}
