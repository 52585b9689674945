//! # `MnasNet` Stages
//!
//! A [`MBConvStage`] is a sequence of [`MBConvBlock`]s built from one
//! row of the stage table, a [`StageSpec`].
//!
//! [`MBConvStageMeta`] defines a common meta API for [`MBConvStage`]
//! and [`MBConvStageConfig`].

use crate::layers::activation::ActivationConfig;
use crate::models::mnasnet::mbconv_block::{MBConvBlock, MBConvBlockConfig, MBConvBlockMeta};
use crate::models::mnasnet::util::{scale_planes, stride_output_resolution};
use crate::utility::params::LearnableParams;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::prelude::{Backend, Module, Tensor};
use serde::{Deserialize, Serialize};

/// One row of the stage table.
///
/// ``(t, c, n, s, k, r)``
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    /// Expansion ratio, `t`.
    pub expand_ratio: f64,

    /// Output channels before width scaling, `c`.
    pub planes: usize,

    /// Number of blocks, `n`.
    pub repeats: usize,

    /// Stride of the first block, `s`.
    pub stride: usize,

    /// Depthwise kernel size, `k`.
    pub kernel_size: usize,

    /// Squeeze-excitation reduction ratio, `r`; ``1`` disables it.
    pub reduction_ratio: f64,
}

impl StageSpec {
    /// Build a [`StageSpec`] from a ``(t, c, n, s, k, r)`` row.
    pub const fn new(
        expand_ratio: f64,
        planes: usize,
        repeats: usize,
        stride: usize,
        kernel_size: usize,
        reduction_ratio: f64,
    ) -> Self {
        Self {
            expand_ratio,
            planes,
            repeats,
            stride,
            kernel_size,
            reduction_ratio,
        }
    }

    /// Width-scaled output channels.
    pub fn out_planes(
        &self,
        width_mult: f64,
    ) -> usize {
        scale_planes(self.planes, width_mult)
    }
}

/// [`MBConvStage`] Meta API.
pub trait MBConvStageMeta {
    /// The number of blocks.
    fn len(&self) -> usize;

    /// Check if the stage is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// The number of output feature planes.
    fn out_planes(&self) -> usize;

    /// Get the effective stride of the stage.
    fn stride(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    ///
    /// Each axis is ``ceil(in / stride)``.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        stride_output_resolution(input_resolution, self.stride())
    }
}

/// [`MBConvStage`] Configuration.
#[derive(Config, Debug)]
pub struct MBConvStageConfig {
    /// The component blocks.
    pub blocks: Vec<MBConvBlockConfig>,
}

impl From<Vec<MBConvBlockConfig>> for MBConvStageConfig {
    fn from(blocks: Vec<MBConvBlockConfig>) -> Self {
        Self { blocks }
    }
}

impl MBConvStageMeta for MBConvStageConfig {
    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn in_planes(&self) -> usize {
        self.blocks[0].in_planes()
    }

    fn out_planes(&self) -> usize {
        self.blocks[self.blocks.len() - 1].out_planes()
    }

    fn stride(&self) -> usize {
        self.blocks
            .iter()
            .fold(1, |acc, block| acc * block.stride())
    }
}

impl MBConvStageConfig {
    /// Build a stage config from a table row.
    ///
    /// The first block takes the stage stride and `in_planes`;
    /// later blocks use stride 1 and chain the previous block's output.
    ///
    /// # Arguments
    ///
    /// - `spec`: the table row.
    /// - `in_planes`: input planes of the first block.
    /// - `width_mult`: the width multiplier applied to ``spec.planes``.
    /// - `no_skip`: force every block's residual shortcut off.
    /// - `activation`: the conv block activation.
    pub fn build(
        spec: &StageSpec,
        in_planes: usize,
        width_mult: f64,
        no_skip: bool,
        activation: &ActivationConfig,
    ) -> Self {
        let out_planes = spec.out_planes(width_mult);
        let blocks = (0..spec.repeats)
            .map(|b| {
                let (block_in, stride) = if b == 0 {
                    (in_planes, spec.stride)
                } else {
                    (out_planes, 1)
                };
                MBConvBlockConfig::new(block_in, out_planes)
                    .with_stride(stride)
                    .with_expand_ratio(spec.expand_ratio)
                    .with_kernel_size(spec.kernel_size)
                    .with_reduction_ratio(spec.reduction_ratio)
                    .with_no_skip(no_skip)
                    .with_activation(activation.clone())
            })
            .collect();

        Self { blocks }
    }

    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("blocks is empty".to_string());
        }

        for (idx, block) in self.blocks.iter().enumerate() {
            block
                .try_validate()
                .map_err(|err| format!("block[{idx}]: {err}"))?;
        }

        for idx in 1..self.blocks.len() {
            let prev = &self.blocks[idx - 1];
            let curr = &self.blocks[idx];
            if prev.out_planes() != curr.in_planes() {
                return Err(format!(
                    "block[{}].out_planes({}) != block[{}].in_planes({})\n{:#?}",
                    idx - 1,
                    prev.out_planes(),
                    idx,
                    curr.in_planes(),
                    self,
                ));
            }
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Initialize a new [`MBConvStage`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> MBConvStage<B> {
        self.expect_valid();

        MBConvStage {
            blocks: self
                .blocks
                .into_iter()
                .map(|block| block.init(device))
                .collect(),
        }
    }
}

/// A stage of [`MBConvBlock`]s.
#[derive(Module, Debug)]
pub struct MBConvStage<B: Backend> {
    /// Internal blocks.
    pub blocks: Vec<MBConvBlock<B>>,
}

impl<B: Backend> MBConvStageMeta for MBConvStage<B> {
    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn in_planes(&self) -> usize {
        self.blocks[0].in_planes()
    }

    fn out_planes(&self) -> usize {
        self.blocks[self.blocks.len() - 1].out_planes()
    }

    fn stride(&self) -> usize {
        self.blocks
            .iter()
            .fold(1, |acc, block| acc * block.stride())
    }
}

impl<B: Backend> LearnableParams for MBConvStage<B> {
    fn num_learnable_params(&self) -> usize {
        self.blocks.num_learnable_params()
    }
}

impl<B: Backend> MBConvStage<B> {
    /// Apply the stage.
    pub fn forward(
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

        let x = self.blocks.iter().fold(input, |x, block| block.forward(x));

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
                ("out_height", out_height),
                ("out_width", out_width)
            ],
        );

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;

    #[test]
    fn test_stage_spec_scaling() {
        let spec = StageSpec::new(6.0, 112, 2, 1, 3, 4.0);
        assert_eq!(spec.out_planes(1.0), 112);
        assert_eq!(spec.out_planes(0.75), 84);
        assert_eq!(spec.out_planes(0.5), 56);
        assert_eq!(spec.out_planes(1.4), 156);
    }

    #[test]
    fn test_stage_config_build() {
        let spec = StageSpec::new(3.0, 40, 3, 2, 5, 4.0);
        let config = MBConvStageConfig::build(&spec, 24, 1.0, false, &ActivationConfig::Relu);
        config.expect_valid();

        assert_eq!(config.len(), 3);
        assert_eq!(config.in_planes(), 24);
        assert_eq!(config.out_planes(), 40);
        assert_eq!(config.stride(), 2);
        assert_eq!(config.output_resolution([56, 56]), [28, 28]);
        assert_eq!(config.output_resolution([15, 30]), [8, 15]);

        let first = &config.blocks[0];
        assert_eq!(first.in_planes(), 24);
        assert_eq!(first.out_planes(), 40);
        assert_eq!(first.stride(), 2);
        assert_eq!(first.hidden_planes(), 72);
        assert_eq!(first.se_planes(), Some(6));
        assert!(!first.use_residual());

        for block in &config.blocks[1..] {
            assert_eq!(block.in_planes(), 40);
            assert_eq!(block.out_planes(), 40);
            assert_eq!(block.stride(), 1);
            assert_eq!(block.hidden_planes(), 120);
            assert_eq!(block.se_planes(), Some(10));
            assert!(block.use_residual());
        }
    }

    #[test]
    fn test_stage_no_skip() {
        let spec = StageSpec::new(1.0, 16, 2, 1, 3, 1.0);
        let config = MBConvStageConfig::build(&spec, 16, 1.0, true, &ActivationConfig::Relu);

        assert!(config.blocks.iter().all(|block| block.no_skip()));
        assert!(config.blocks.iter().all(|block| !block.use_residual()));
    }

    #[test]
    fn test_try_validate_chaining() {
        assert_eq!(
            MBConvStageConfig::new(vec![]).try_validate(),
            Err("blocks is empty".to_string())
        );

        let config = MBConvStageConfig::from(vec![
            MBConvBlockConfig::new(16, 24),
            MBConvBlockConfig::new(32, 32),
        ]);
        let err = config.try_validate().unwrap_err();
        assert!(err.starts_with("block[0].out_planes(24) != block[1].in_planes(32)"));

        let config = MBConvStageConfig::from(vec![
            MBConvBlockConfig::new(16, 24),
            MBConvBlockConfig::new(24, 24).with_kernel_size(4),
        ]);
        let err = config.try_validate().unwrap_err();
        assert!(err.starts_with("block[1]: MBConvBlock kernel_size"));
    }

    #[test]
    fn test_stage_forward() {
        type B = NdArray;
        let device = Default::default();

        let spec = StageSpec::new(6.0, 24, 2, 2, 3, 1.0);
        let stage: MBConvStage<B> =
            MBConvStageConfig::build(&spec, 16, 1.0, false, &ActivationConfig::Relu)
                .init(&device);

        assert_eq!(stage.len(), 2);
        assert_eq!(stage.in_planes(), 16);
        assert_eq!(stage.out_planes(), 24);
        assert_eq!(stage.stride(), 2);

        let batch_size = 2;
        let input = Tensor::ones([batch_size, 16, 12, 8], &device);

        let output = stage.forward(input.clone());
        assert_shape_contract!(
            ["batch", "out_planes", "out_height", "out_width"],
            &output,
            &[
                ("batch", batch_size),
                ("out_planes", 24),
                ("out_height", 6),
                ("out_width", 4)
            ],
        );

        let mut expected = input;
        for block in stage.blocks.iter() {
            expected = block.forward(expected);
        }
        output.to_data().assert_eq(&expected.to_data(), true);
    }
}
