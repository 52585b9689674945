//! # Mobile Inverted Residual Block
//!
//! [`MBConvBlock`] is the core `MnasNet` convolution unit:
//!
//! ```text,ignore
//! x -> [pw expand CNA] -> dw CNA -> [squeeze-excitation] -> pw linear ConvNorm -> (+ x)
//! ```
//!
//! [`MBConvBlockMeta`] defines a common meta API for [`MBConvBlock`]
//! and [`MBConvBlockConfig`].
//!
//! [`MBConvBlockConfig`] implements [`Config`], and provides
//! [`MBConvBlockConfig::init`] to initialize a [`MBConvBlock`].
//!
//! [`MBConvBlock`] implements [`Module`], and provides
//! [`MBConvBlock::forward`].

use crate::layers::activation::ActivationConfig;
use crate::layers::blocks::cna::{CNA2d, CNA2dConfig, CNA2dMeta};
use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use crate::layers::blocks::squeeze_excitation::{
    SqueezeExcitation, SqueezeExcitationConfig, SqueezeExcitationMeta,
};
use crate::models::mnasnet::util::{reduce_planes, scale_planes, stride_output_resolution};
use crate::utility::params::LearnableParams;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::prelude::{Backend, Config, Module, Tensor};

/// Strides supported by [`MBConvBlock`].
pub const MBCONV_STRIDES: [usize; 2] = [1, 2];

/// Kernel sizes supported by [`MBConvBlock`].
pub const MBCONV_KERNEL_SIZES: [usize; 2] = [3, 5];

/// [`MBConvBlock`] Meta trait.
pub trait MBConvBlockMeta {
    /// The size of the in channels dimension.
    fn in_planes(&self) -> usize;

    /// The size of the expanded (depthwise) channels dimension.
    fn hidden_planes(&self) -> usize;

    /// The size of the out channels dimension.
    fn out_planes(&self) -> usize;

    /// The stride of the depthwise convolution.
    fn stride(&self) -> usize;

    /// The kernel size of the depthwise convolution.
    fn kernel_size(&self) -> usize;

    /// The squeeze-excitation bottleneck size, if any.
    fn se_planes(&self) -> Option<usize>;

    /// Is the residual shortcut forced off?
    fn no_skip(&self) -> bool;

    /// Is the residual shortcut applied?
    ///
    /// ``in_planes == out_planes && stride == 1 && !no_skip``
    fn use_residual(&self) -> bool {
        self.in_planes() == self.out_planes() && self.stride() == 1 && !self.no_skip()
    }

    /// Get the output resolution for a given input resolution.
    ///
    /// # Arguments
    ///
    /// - `input_resolution`: \
    ///   ``[in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[out_height, out_width]``, each ``ceil(in / stride)``.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        stride_output_resolution(input_resolution, self.stride())
    }
}

/// [`MBConvBlock`] Config.
///
/// Implements [`MBConvBlockMeta`].
#[derive(Config, Debug)]
pub struct MBConvBlockConfig {
    /// The size of the in channels dimension.
    pub in_planes: usize,

    /// The size of the out channels dimension.
    pub out_planes: usize,

    /// The stride of the depthwise convolution; one of [`MBCONV_STRIDES`].
    #[config(default = 1)]
    pub stride: usize,

    /// Control factor for `hidden_planes()`.
    ///
    /// ``hidden_planes = trunc(in_planes * expand_ratio)``
    #[config(default = "1.0")]
    pub expand_ratio: f64,

    /// The depthwise kernel size; one of [`MBCONV_KERNEL_SIZES`].
    #[config(default = 3)]
    pub kernel_size: usize,

    /// Control factor for `se_planes()`.
    ///
    /// ``1.0`` disables squeeze-excitation; otherwise
    /// ``se_planes = max(1, trunc(in_planes / reduction_ratio))``.
    #[config(default = "1.0")]
    pub reduction_ratio: f64,

    /// Force the residual shortcut off.
    #[config(default = "false")]
    pub no_skip: bool,

    /// [`crate::layers::activation::Activation`] config for the conv blocks.
    #[config(default = "ActivationConfig::Relu6")]
    pub activation: ActivationConfig,
}

impl MBConvBlockMeta for MBConvBlockConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn hidden_planes(&self) -> usize {
        scale_planes(self.in_planes, self.expand_ratio)
    }

    fn out_planes(&self) -> usize {
        self.out_planes
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    fn se_planes(&self) -> Option<usize> {
        if self.reduction_ratio == 1.0 {
            None
        } else {
            Some(reduce_planes(self.in_planes, self.reduction_ratio))
        }
    }

    fn no_skip(&self) -> bool {
        self.no_skip
    }
}

impl MBConvBlockConfig {
    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if !MBCONV_STRIDES.contains(&self.stride) {
            return Err(format!(
                "MBConvBlock stride must be one of {:?}, got {}",
                MBCONV_STRIDES, self.stride
            ));
        }
        if !MBCONV_KERNEL_SIZES.contains(&self.kernel_size) {
            return Err(format!(
                "MBConvBlock kernel_size must be one of {:?}, got {}",
                MBCONV_KERNEL_SIZES, self.kernel_size
            ));
        }
        if self.in_planes == 0 || self.out_planes == 0 {
            return Err(format!(
                "MBConvBlock planes must be non-zero: in_planes={}, out_planes={}",
                self.in_planes, self.out_planes
            ));
        }
        if self.hidden_planes() == 0 {
            return Err(format!(
                "MBConvBlock expand_ratio {} yields zero hidden planes for in_planes={}",
                self.expand_ratio, self.in_planes
            ));
        }
        if self.reduction_ratio <= 0.0 {
            return Err(format!(
                "MBConvBlock reduction_ratio must be positive, got {}",
                self.reduction_ratio
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

    /// Initialize a [`MBConvBlock`].
    ///
    /// # Panics
    ///
    /// If the config is invalid; see [`MBConvBlockConfig::try_validate`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> MBConvBlock<B> {
        self.expect_valid();

        let in_planes = self.in_planes();
        let hidden_planes = self.hidden_planes();
        let out_planes = self.out_planes();

        tracing::debug!(
            in_planes,
            hidden_planes,
            out_planes,
            stride = self.stride,
            kernel_size = self.kernel_size,
            se_planes = ?self.se_planes(),
            use_residual = self.use_residual(),
            "init MBConvBlock"
        );

        let expand: Option<CNA2dConfig> = if hidden_planes != in_planes {
            CNA2dConfig::pointwise(in_planes, hidden_planes)
                .with_act(self.activation.clone())
                .into()
        } else {
            None
        };

        let depthwise = CNA2dConfig::depthwise(hidden_planes, self.kernel_size, self.stride)
            .with_act(self.activation.clone());

        let se = self
            .se_planes()
            .map(|se_planes| SqueezeExcitationConfig::new(hidden_planes, se_planes));

        let project = ConvNorm2dConfig::pointwise(hidden_planes, out_planes);

        MBConvBlock {
            no_skip: self.no_skip,
            expand: expand.map(|cfg| cfg.init(device)),
            depthwise: depthwise.init(device),
            se: se.map(|cfg| cfg.init(device)),
            project: project.init(device),
        }
    }
}

/// Mobile inverted residual block.
///
/// Implements [`MBConvBlockMeta`].
#[derive(Module, Debug)]
pub struct MBConvBlock<B: Backend> {
    /// Residual shortcut forced off.
    pub no_skip: bool,

    /// Optional pointwise expansion.
    pub expand: Option<CNA2d<B>>,

    /// Depthwise spatial convolution.
    pub depthwise: CNA2d<B>,

    /// Optional squeeze-excitation gate.
    pub se: Option<SqueezeExcitation<B>>,

    /// Pointwise linear projection.
    pub project: ConvNorm2d<B>,
}

impl<B: Backend> MBConvBlockMeta for MBConvBlock<B> {
    fn in_planes(&self) -> usize {
        match &self.expand {
            Some(expand) => expand.in_channels(),
            None => self.depthwise.in_channels(),
        }
    }

    fn hidden_planes(&self) -> usize {
        self.depthwise.out_channels()
    }

    fn out_planes(&self) -> usize {
        self.project.out_channels()
    }

    fn stride(&self) -> usize {
        self.depthwise.stride()[0]
    }

    fn kernel_size(&self) -> usize {
        self.depthwise.kernel_size()[0]
    }

    fn se_planes(&self) -> Option<usize> {
        self.se.as_ref().map(|se| se.reduced_dim())
    }

    fn no_skip(&self) -> bool {
        self.no_skip
    }
}

impl<B: Backend> LearnableParams for MBConvBlock<B> {
    fn num_learnable_params(&self) -> usize {
        self.expand.num_learnable_params()
            + self.depthwise.num_learnable_params()
            + self.se.num_learnable_params()
            + self.project.num_learnable_params()
    }
}

impl<B: Backend> MBConvBlock<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes, out_height, out_width]`` tensor;
    /// ``input + forward_branch(input)`` when [`MBConvBlockMeta::use_residual`].
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        if self.use_residual() {
            input.clone() + self.forward_branch(input)
        } else {
            self.forward_branch(input)
        }
    }

    /// Forward Pass of the transform branch, without the residual shortcut.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes, out_height, out_width]`` tensor.
    pub fn forward_branch(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "in_planes", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("in_planes", self.in_planes())],
        );
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);

        let x = match &self.expand {
            Some(expand) => expand.forward(input),
            None => input,
        };

        let x = self.depthwise.forward(x);

        let x = match &self.se {
            Some(se) => se.forward(x),
            None => x,
        };

        assert_shape_contract_periodically!(
            ["batch", "hidden_planes", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("hidden_planes", self.hidden_planes()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        let x = self.project.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    #[test]
    fn test_mbconv_config() {
        let config = MBConvBlockConfig::new(16, 24);
        assert_eq!(config.in_planes(), 16);
        assert_eq!(config.out_planes(), 24);
        assert_eq!(config.hidden_planes(), 16);
        assert_eq!(config.stride(), 1);
        assert_eq!(config.kernel_size(), 3);
        assert_eq!(config.se_planes(), None);
        assert!(!config.no_skip());
        assert!(!config.use_residual());
        assert!(matches!(config.activation, ActivationConfig::Relu6));

        let config = config
            .with_expand_ratio(6.0)
            .with_reduction_ratio(4.0)
            .with_stride(2)
            .with_kernel_size(5);
        assert_eq!(config.hidden_planes(), 96);
        assert_eq!(config.se_planes(), Some(4));
        assert_eq!(config.stride(), 2);
        assert_eq!(config.kernel_size(), 5);
        assert_eq!(config.output_resolution([16, 16]), [8, 8]);
    }

    #[test]
    fn test_residual_eligibility() {
        let config = MBConvBlockConfig::new(24, 24).with_expand_ratio(6.0);
        assert!(config.use_residual());

        assert!(!config.clone().with_stride(2).use_residual());
        assert!(!config.clone().with_no_skip(true).use_residual());
        assert!(!MBConvBlockConfig::new(24, 40).use_residual());
    }

    #[test]
    fn test_truncating_dims() {
        let config = MBConvBlockConfig::new(33, 33)
            .with_expand_ratio(1.5)
            .with_reduction_ratio(4.0);
        // trunc(49.5), trunc(8.25)
        assert_eq!(config.hidden_planes(), 49);
        assert_eq!(config.se_planes(), Some(8));

        let config = MBConvBlockConfig::new(3, 3).with_reduction_ratio(4.0);
        assert_eq!(config.se_planes(), Some(1));
    }

    #[test]
    #[should_panic(expected = "stride must be one of [1, 2], got 3")]
    fn test_invalid_stride_panics() {
        type B = NdArray<f32>;
        let device = Default::default();

        let _block: MBConvBlock<B> = MBConvBlockConfig::new(16, 16)
            .with_stride(3)
            .init(&device);
    }

    #[test]
    #[should_panic(expected = "kernel_size must be one of [3, 5], got 7")]
    fn test_invalid_kernel_panics() {
        type B = NdArray<f32>;
        let device = Default::default();

        let _block: MBConvBlock<B> = MBConvBlockConfig::new(16, 16)
            .with_kernel_size(7)
            .init(&device);
    }

    #[test]
    fn test_try_validate() {
        assert!(MBConvBlockConfig::new(16, 16).try_validate().is_ok());
        assert!(
            MBConvBlockConfig::new(16, 16)
                .with_stride(0)
                .try_validate()
                .is_err()
        );
        assert!(
            MBConvBlockConfig::new(16, 16)
                .with_kernel_size(1)
                .try_validate()
                .is_err()
        );
        assert!(
            MBConvBlockConfig::new(16, 16)
                .with_expand_ratio(0.01)
                .try_validate()
                .is_err()
        );
    }

    #[test]
    fn test_mbconv_structure() {
        type B = NdArray<f32>;
        let device = Default::default();

        // SepConv: no expansion.
        let block: MBConvBlock<B> = MBConvBlockConfig::new(32, 16).init(&device);
        assert!(block.expand.is_none());
        assert!(block.se.is_none());
        assert_eq!(block.in_planes(), 32);
        assert_eq!(block.hidden_planes(), 32);
        assert_eq!(block.out_planes(), 16);
        assert!(block.depthwise.is_depthwise());
        assert!(!block.use_residual());

        // MBConv3_5x5, SE.
        let block: MBConvBlock<B> = MBConvBlockConfig::new(24, 40)
            .with_stride(2)
            .with_expand_ratio(3.0)
            .with_kernel_size(5)
            .with_reduction_ratio(4.0)
            .init(&device);
        assert!(block.expand.is_some());
        assert_eq!(block.in_planes(), 24);
        assert_eq!(block.hidden_planes(), 72);
        assert_eq!(block.out_planes(), 40);
        assert_eq!(block.stride(), 2);
        assert_eq!(block.kernel_size(), 5);
        assert_eq!(block.se_planes(), Some(6));
        assert_eq!(block.se.as_ref().unwrap().num_features(), 72);

        // expand: 24*72 + 2*72; dw: 72*25 + 2*72;
        // se: (72*6 + 6) + (6*72 + 72); project: 72*40 + 2*40.
        assert_eq!(
            block.num_learnable_params(),
            (1728 + 144) + (1800 + 144) + (438 + 504) + (2880 + 80)
        );
    }

    #[test]
    fn test_mbconv_forward_shape() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let batch_size = 2;
        let block: MBConvBlock<B> = MBConvBlockConfig::new(8, 12)
            .with_stride(2)
            .with_expand_ratio(6.0)
            .with_kernel_size(5)
            .with_reduction_ratio(4.0)
            .init(&device);

        let [out_height, out_width] = block.output_resolution([8, 12]);
        assert_eq!([out_height, out_width], [4, 6]);

        let input = Tensor::ones([batch_size, 8, 8, 12], &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "out_planes", "out_height", "out_width"],
            &output,
            &[
                ("batch", batch_size),
                ("out_planes", 12),
                ("out_height", out_height),
                ("out_width", out_width)
            ],
        );
    }

    #[test]
    fn test_mbconv_odd_resolution() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: MBConvBlock<B> = MBConvBlockConfig::new(8, 16)
            .with_stride(2)
            .with_expand_ratio(3.0)
            .with_kernel_size(5)
            .with_reduction_ratio(4.0)
            .init(&device);
        assert_eq!(block.output_resolution([15, 7]), [8, 4]);

        let input = Tensor::random([1, 8, 15, 7], Distribution::Default, &device);
        let output = block.forward(input);
        assert_eq!(output.dims(), [1, 16, 8, 4]);
    }

    #[test]
    fn test_residual_is_input_plus_branch() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: MBConvBlock<B> = MBConvBlockConfig::new(8, 8)
            .with_expand_ratio(6.0)
            .with_reduction_ratio(4.0)
            .init(&device);
        assert!(block.use_residual());

        let input: Tensor<B, 4> = Tensor::random([2, 8, 6, 6], Distribution::Default, &device);

        let output = block.forward(input.clone());
        let expected = input.clone() + block.forward_branch(input.clone());
        output.to_data().assert_eq(&expected.to_data(), true);

        // Shifting the input shifts the output by the same bias,
        // plus the change in the branch.
        let bias = 0.5;
        let shifted = input.clone() + bias;
        let delta = block.forward(shifted.clone()) - output;
        let branch_delta = block.forward_branch(shifted) - block.forward_branch(input);
        let residual = delta - branch_delta;
        let err: f32 = (residual - bias).abs().max().into_scalar();
        assert!(err < 1e-4, "max error {err}");
    }

    #[test]
    fn test_zeroed_projection_is_identity() {
        type B = NdArray<f32>;
        let device = Default::default();

        let mut block: MBConvBlock<B> = MBConvBlockConfig::new(8, 8)
            .with_expand_ratio(3.0)
            .with_kernel_size(5)
            .init(&device);
        block.project.zero_init_norm();

        let input: Tensor<B, 4> = Tensor::random([1, 8, 4, 4], Distribution::Default, &device);
        let output = block.forward(input.clone());

        output.to_data().assert_eq(&input.to_data(), true);
    }

    #[test]
    fn test_no_skip_is_branch_only() {
        type B = NdArray<f32>;
        let device = Default::default();

        let mut block: MBConvBlock<B> = MBConvBlockConfig::new(8, 8)
            .with_no_skip(true)
            .init(&device);
        assert!(!block.use_residual());
        block.project.zero_init_norm();

        let input: Tensor<B, 4> = Tensor::random([1, 8, 4, 4], Distribution::Default, &device);
        let output = block.forward(input.clone());

        let expected = block.forward_branch(input);
        output.to_data().assert_eq(&expected.to_data(), true);
        assert_eq!(output.abs().max().into_scalar(), 0.0);
    }
}
