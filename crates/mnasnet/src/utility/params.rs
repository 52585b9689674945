//! # Learnable Parameter Counting
//!
//! [`Module::num_params`](burn::module::Module::num_params) counts every
//! tensor a module visits, which includes norm running statistics.
//! Those are buffers, not learnable parameters; [`LearnableParams`] counts
//! only the tensors an optimizer would update.

use crate::layers::activation::Activation;
use burn::nn::conv::Conv2d;
use burn::nn::{BatchNorm, Linear};
use burn::prelude::Backend;

/// Count of learnable parameter elements.
pub trait LearnableParams {
    /// The total number of learnable parameter elements.
    fn num_learnable_params(&self) -> usize;
}

/// Sum the element count of every learnable parameter tensor in a module.
pub fn numel<M: LearnableParams>(module: &M) -> usize {
    module.num_learnable_params()
}

impl<T: LearnableParams> LearnableParams for Option<T> {
    fn num_learnable_params(&self) -> usize {
        self.as_ref().map_or(0, |m| m.num_learnable_params())
    }
}

impl<T: LearnableParams> LearnableParams for Vec<T> {
    fn num_learnable_params(&self) -> usize {
        self.iter().map(|m| m.num_learnable_params()).sum()
    }
}

impl<B: Backend> LearnableParams for Conv2d<B> {
    fn num_learnable_params(&self) -> usize {
        self.weight.shape().num_elements()
            + self
                .bias
                .as_ref()
                .map_or(0, |bias| bias.shape().num_elements())
    }
}

impl<B: Backend, const D: usize> LearnableParams for BatchNorm<B, D> {
    fn num_learnable_params(&self) -> usize {
        self.gamma.shape().num_elements() + self.beta.shape().num_elements()
    }
}

impl<B: Backend> LearnableParams for Linear<B> {
    fn num_learnable_params(&self) -> usize {
        self.weight.shape().num_elements()
            + self
                .bias
                .as_ref()
                .map_or(0, |bias| bias.shape().num_elements())
    }
}

impl<B: Backend> LearnableParams for Activation<B> {
    fn num_learnable_params(&self) -> usize {
        match self {
            Activation::PRelu(layer) => layer.alpha.shape().num_elements(),
            _ => 0,
        }
    }
}
