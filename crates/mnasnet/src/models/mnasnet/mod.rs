//! # `MnasNet`
//!
//! The `MnasNet-A1` family of mobile image classifiers.
//!
//! * [`mnasnet_model`] - the [`MnasNet`] model, and its configs.
//! * [`stage`] - stage table rows, and [`MBConvStage`]s built from them.
//! * [`mbconv_block`] - the inverted residual [`MBConvBlock`].
//! * [`prefabs`] - named well-known configs.

pub mod mbconv_block;
pub mod mnasnet_model;
pub mod prefabs;
pub mod stage;
pub mod util;

pub use mbconv_block::*;
pub use mnasnet_model::*;
pub use stage::*;
