// Sequential — modules applied one after another
//
//   let backbone = Sequential::new()
//       .add(Linear::new(32, 64, true, DType::F32, &dev)?)
//       .add(ReLU)
//       .add(Dropout::new(0.2)?);
//
// Switching the container's mode switches every child, so `eval()` on a
// Sequential backbone turns off all of its dropout and batch-norm updates.

use std::cell::Cell;

use headstart_core::backend::Backend;
use headstart_core::error::Result;
use headstart_core::tensor::Tensor;

use crate::module::Module;

/// A container that chains modules; itself a `Module`, so it nests.
pub struct Sequential<B: Backend> {
    layers: Vec<Box<dyn Module<B>>>,
    training: Cell<bool>,
}

impl<B: Backend> Sequential<B> {
    pub fn new() -> Self {
        Sequential {
            layers: Vec::new(),
            training: Cell::new(true),
        }
    }

    /// Append a layer. The layer is put in the container's current mode.
    #[allow(clippy::should_implement_trait)]
    pub fn add<M: Module<B> + 'static>(mut self, module: M) -> Self {
        module.set_training(self.training.get());
        self.layers.push(Box::new(module));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl<B: Backend> Default for Sequential<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Module<B> for Sequential<B> {
    fn forward(&self, x: &Tensor<B>) -> Result<Tensor<B>> {
        let mut out = x.clone();
        for layer in &self.layers {
            out = layer.forward(&out)?;
        }
        Ok(out)
    }

    fn parameters(&self) -> Vec<Tensor<B>> {
        self.layers.iter().flat_map(|l| l.parameters()).collect()
    }

    fn named_parameters(&self) -> Vec<(String, Tensor<B>)> {
        let mut named = Vec::new();
        for (i, layer) in self.layers.iter().enumerate() {
            for (k, v) in layer.named_parameters() {
                named.push((format!("layers.{i}.{k}"), v));
            }
        }
        named
    }

    fn set_training(&self, training: bool) {
        self.training.set(training);
        for layer in &self.layers {
            layer.set_training(training);
        }
    }

    fn is_training(&self) -> bool {
        self.training.get()
    }
}
