#![warn(missing_docs)]
//!# mnasnet - `MnasNet` Image Models for Burn
//!
//! ## Notable Components
//!
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::activation::Activation`] - activation layer abstraction wrapper.
//!   * [`layers::blocks`] - miscellaneous blocks.
//!     * [`layers::blocks::cna`] - ``Conv2d + BatchNorm2d + Activation`` block.
//!     * [`layers::blocks::conv_norm`] - ``Conv2d + BatchNorm2d`` block.
//!     * [`layers::blocks::squeeze_excitation`] - squeeze-excitation channel gate.
//! * [`models`] - complete model families.
//!   * [`models::mnasnet`] - `MnasNet-A1`
//!     * [`models::mnasnet::prefabs`] - named well-known configs.
//! * [`utility`] - parameter counting and prefab support.

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

pub mod layers;
pub mod models;
pub mod utility;
