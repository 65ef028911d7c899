use headstart_core::backend::Backend;
use headstart_core::error::Result;
use headstart_core::tensor::Tensor;

use crate::module::Module;

/// Collapses every dimension after the batch dimension: `[N, d1, d2, ...]`
/// becomes `[N, d1 * d2 * ...]`.
pub struct Flatten;

impl<B: Backend> Module<B> for Flatten {
    fn forward(&self, x: &Tensor<B>) -> Result<Tensor<B>> {
        x.flatten_from(1)
    }
    fn parameters(&self) -> Vec<Tensor<B>> {
        vec![]
    }
}
