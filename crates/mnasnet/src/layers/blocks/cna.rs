//! # `CNA2d` - conv/norm/activation block.
//!
//! A [`CNA2d`] module is:
//! * a bias-free [`Conv2d`] layer,
//! * a [`BatchNorm`] layer,
//! * an [`Activation`] layer.
//!
//! This is the `ConvBNReLU` unit of mobile networks; the stem, head,
//! pointwise expansion and depthwise layers are all [`CNA2d`] blocks.
//!
//! With support for hooking the forward method,
//! to run code between the norm and activation layers.

use crate::layers::activation::{Activation, ActivationConfig};
use crate::utility::params::LearnableParams;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::{Backend, Tensor};

/// Padding which preserves spatial alignment for odd kernel sizes.
///
/// ``(kernel_size - 1) / 2``
pub fn same_padding(kernel_size: usize) -> usize {
    kernel_size.saturating_sub(1) / 2
}

/// Output size of a [`same_padding`] convolution along one axis.
///
/// ``(input + 2 * padding - kernel_size) / stride + 1``
///
/// # Panics
///
/// If the stride is zero, or the padded input is smaller than the kernel.
pub fn same_padding_output_size(
    input: usize,
    kernel_size: usize,
    stride: usize,
) -> usize {
    assert!(stride > 0, "stride must be non-zero");
    let padded = input + 2 * same_padding(kernel_size);
    assert!(
        padded >= kernel_size,
        "padded input ({padded}) is smaller than kernel_size ({kernel_size})"
    );
    (padded - kernel_size) / stride + 1
}

/// [`CNA2d`] Meta.
pub trait CNA2dMeta {
    /// Number of input channels.
    fn in_channels(&self) -> usize;

    /// Number of groups.
    fn groups(&self) -> usize;

    /// Number of output channels.
    fn out_channels(&self) -> usize;

    /// Get the stride.
    fn stride(&self) -> [usize; 2];

    /// Get the kernel size.
    fn kernel_size(&self) -> [usize; 2];

    /// Is this a depthwise block?
    ///
    /// One filter group per input channel.
    fn is_depthwise(&self) -> bool {
        self.groups() > 1 && self.groups() == self.in_channels()
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// Assumes [`same_padding`], as built by [`CNA2dConfig::conv_bn_act`].
    ///
    /// # Arguments
    ///
    /// - `input_resolution`: ``[in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[out_height, out_width]``
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        let [kernel_height, kernel_width] = self.kernel_size();
        let [stride_height, stride_width] = self.stride();
        [
            same_padding_output_size(input_resolution[0], kernel_height, stride_height),
            same_padding_output_size(input_resolution[1], kernel_width, stride_width),
        ]
    }
}

/// [`CNA2d`] Config.
///
/// Implements [`CNA2dMeta`].
#[derive(Config, Debug)]
pub struct CNA2dConfig {
    /// The [`Conv2d`] config.
    pub conv: Conv2dConfig,

    /// The [`Activation`] config.
    #[config(default = "ActivationConfig::Relu6")]
    pub act: ActivationConfig,
}

impl CNA2dMeta for CNA2dConfig {
    fn in_channels(&self) -> usize {
        self.conv.channels[0]
    }

    fn groups(&self) -> usize {
        self.conv.groups
    }

    fn out_channels(&self) -> usize {
        self.conv.channels[1]
    }

    fn stride(&self) -> [usize; 2] {
        self.conv.stride
    }

    fn kernel_size(&self) -> [usize; 2] {
        self.conv.kernel_size
    }
}

impl From<Conv2dConfig> for CNA2dConfig {
    fn from(conv: Conv2dConfig) -> Self {
        Self::new(conv)
    }
}

impl CNA2dConfig {
    /// Build a square `ConvBNReLU` config.
    ///
    /// The convolution has no bias; the norm layer carries the shift.
    /// Padding is derived with [`same_padding`].
    ///
    /// # Arguments
    ///
    /// - `in_channels`: input channels.
    /// - `out_channels`: output channels.
    /// - `kernel_size`: square kernel size.
    /// - `stride`: square stride.
    /// - `groups`: conv groups.
    pub fn conv_bn_act(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        groups: usize,
    ) -> Self {
        let padding = same_padding(kernel_size);
        Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_groups(groups)
            .with_bias(false)
            .into()
    }

    /// Build a 1x1 (pointwise) `ConvBNReLU` config.
    pub fn pointwise(
        in_channels: usize,
        out_channels: usize,
    ) -> Self {
        Self::conv_bn_act(in_channels, out_channels, 1, 1, 1)
    }

    /// Build a depthwise `ConvBNReLU` config.
    ///
    /// Groups equal the channel count.
    pub fn depthwise(
        channels: usize,
        kernel_size: usize,
        stride: usize,
    ) -> Self {
        Self::conv_bn_act(channels, channels, kernel_size, stride, channels)
    }

    /// Initialize a [`CNA2d`].
    ///
    /// The norm layer is sized to the conv layer's output channels.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> CNA2d<B> {
        let out_channels = self.out_channels();
        CNA2d {
            conv: self.conv.init(device),

            norm: BatchNormConfig::new(out_channels).init(device),

            act: self.act.init(device),
        }
    }
}

/// Sequenced conv/norm/activation block.
///
/// Implements [`CNA2dMeta`].
#[derive(Module, Debug)]
pub struct CNA2d<B: Backend> {
    /// Internal Conv2d layer.
    pub conv: Conv2d<B>,

    /// Internal Norm Layer.
    pub norm: BatchNorm<B, 2>,

    /// Activation layer.
    pub act: Activation<B>,
}

impl<B: Backend> CNA2dMeta for CNA2d<B> {
    fn in_channels(&self) -> usize {
        self.conv.weight.shape().dims[1] * self.groups()
    }

    fn groups(&self) -> usize {
        self.conv.groups
    }

    fn out_channels(&self) -> usize {
        self.conv.weight.shape().dims[0]
    }

    fn stride(&self) -> [usize; 2] {
        self.conv.stride
    }

    fn kernel_size(&self) -> [usize; 2] {
        self.conv.kernel_size
    }
}

impl<B: Backend> LearnableParams for CNA2d<B> {
    fn num_learnable_params(&self) -> usize {
        self.conv.num_learnable_params()
            + self.norm.num_learnable_params()
            + self.act.num_learnable_params()
    }
}

impl<B: Backend> CNA2d<B> {
    /// Forward Pass.
    ///
    /// Applies the conv/norm/act layers in sequence:
    ///
    /// ```rust,ignore
    /// let x = self.conv.forward(input);
    /// let x = self.norm.forward(x);
    /// let x = self.act.forward(x);
    /// return x
    /// ```
    ///
    /// # Arguments
    ///
    /// - `input`: \
    ///   ``[batch, in_channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_height, out_width]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        self.hook_forward(input, |x| x)
    }

    /// Hooked Forward Pass.
    ///
    /// Applies the hook after normalization but before activation.
    pub fn hook_forward<F>(
        &self,
        input: Tensor<B, 4>,
        hook: F,
    ) -> Tensor<B, 4>
    where
        F: FnOnce(Tensor<B, 4>) -> Tensor<B, 4>,
    {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "in_channels", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("in_channels", self.in_channels())]
        );
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);

        let x = self.conv.forward(input);

        let x = self.norm.forward(x);

        let x = hook(x);

        let x = self.act.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        x
    }
}
