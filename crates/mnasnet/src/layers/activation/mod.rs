//! # Activation Layers
mod activation_wrapper;

pub use activation_wrapper::*;
