// Module — the interface every layer and model implements
//
// A backbone handed to the feature extractor is just a `Module<B>`: it maps
// an input batch to an output batch, lists its parameters, and can be
// switched between training and evaluation mode through `&self` (stateful
// layers keep their mode in a `Cell<bool>`).
//
// The device a module runs on is not stored separately; it is the device of
// its first parameter. A module without parameters has no device of its own
// and `device()` reports `Error::NoParameters`.

use headstart_core::backend::Backend;
use headstart_core::error::{Error, Result};
use headstart_core::tensor::Tensor;

/// The fundamental trait for all neural network layers.
///
/// ```ignore
/// struct Backbone<B: Backend> {
///     fc: Linear<B>,
/// }
///
/// impl<B: Backend> Module<B> for Backbone<B> {
///     fn forward(&self, x: &Tensor<B>) -> Result<Tensor<B>> {
///         self.fc.forward(x)?.relu()
///     }
///     fn parameters(&self) -> Vec<Tensor<B>> {
///         self.fc.parameters()
///     }
/// }
/// ```
pub trait Module<B: Backend> {
    /// Compute the output batch for an input batch.
    fn forward(&self, x: &Tensor<B>) -> Result<Tensor<B>>;

    /// All trainable parameters, in a stable order.
    fn parameters(&self) -> Vec<Tensor<B>>;

    /// Switch training/evaluation behavior. Default: no-op, for layers that
    /// behave the same in both modes.
    fn set_training(&self, _training: bool) {}

    /// Whether the module is in training mode (default: true).
    fn is_training(&self) -> bool {
        true
    }

    fn train(&self) {
        self.set_training(true);
    }

    /// Evaluation mode: dropout off, normalization uses running statistics.
    fn eval(&self) {
        self.set_training(false);
    }

    /// The device holding the first parameter.
    fn device(&self) -> Result<B::Device> {
        self.parameters()
            .first()
            .map(|p| p.device().clone())
            .ok_or(Error::NoParameters)
    }

    /// Total number of scalar parameters.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.elem_count()).sum()
    }

    /// Parameters with readable names; composite modules prefix child names
    /// with `"."`. The default numbers them `param_0`, `param_1`, …
    fn named_parameters(&self) -> Vec<(String, Tensor<B>)> {
        self.parameters()
            .into_iter()
            .enumerate()
            .map(|(i, p)| (format!("param_{i}"), p))
            .collect()
    }
}

impl<B: Backend, M: Module<B> + ?Sized> Module<B> for Box<M> {
    fn forward(&self, x: &Tensor<B>) -> Result<Tensor<B>> {
        (**self).forward(x)
    }

    fn parameters(&self) -> Vec<Tensor<B>> {
        (**self).parameters()
    }

    fn set_training(&self, training: bool) {
        (**self).set_training(training)
    }

    fn is_training(&self) -> bool {
        (**self).is_training()
    }

    fn device(&self) -> Result<B::Device> {
        (**self).device()
    }

    fn named_parameters(&self) -> Vec<(String, Tensor<B>)> {
        (**self).named_parameters()
    }
}
