//! # Layer Blocks
//!
//! * [`cna`] - ``Conv2d + BatchNorm + Activation`` block.
//! * [`conv_norm`] - ``Conv2d + BatchNorm`` block.
//! * [`squeeze_excitation`] - channel attention gate.
pub mod cna;
pub mod conv_norm;
pub mod squeeze_excitation;
