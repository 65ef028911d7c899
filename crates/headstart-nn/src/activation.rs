// Activation modules
//
// Element-wise activations wrapped as parameter-free modules so they can sit
// between layers in a `Sequential`.

use headstart_core::backend::Backend;
use headstart_core::error::Result;
use headstart_core::tensor::Tensor;

use crate::module::Module;

/// ReLU activation: max(0, x)
pub struct ReLU;

impl<B: Backend> Module<B> for ReLU {
    fn forward(&self, x: &Tensor<B>) -> Result<Tensor<B>> {
        x.relu()
    }
    fn parameters(&self) -> Vec<Tensor<B>> {
        vec![]
    }
}

/// Tanh activation
pub struct Tanh;

impl<B: Backend> Module<B> for Tanh {
    fn forward(&self, x: &Tensor<B>) -> Result<Tensor<B>> {
        x.tanh()
    }
    fn parameters(&self) -> Vec<Tensor<B>> {
        vec![]
    }
}

/// Sigmoid activation: 1 / (1 + e^(-x))
pub struct Sigmoid;

impl<B: Backend> Module<B> for Sigmoid {
    fn forward(&self, x: &Tensor<B>) -> Result<Tensor<B>> {
        x.sigmoid()
    }
    fn parameters(&self) -> Vec<Tensor<B>> {
        vec![]
    }
}
