// Dropout — random zeroing during training
//
// In training mode each element is zeroed with probability p and survivors
// are scaled by 1/(1-p). In eval mode the layer is the identity, which is
// what makes extracted features deterministic.
//
// The mode lives in a Cell<bool> so it can be flipped through `&self`.

use std::cell::Cell;

use headstart_core::backend::Backend;
use headstart_core::error::{Error, Result};
use headstart_core::tensor::Tensor;

use crate::module::Module;

/// Applies dropout with probability `p` in training mode; identity in eval.
pub struct Dropout {
    p: f64,
    training: Cell<bool>,
}

impl Dropout {
    /// `p` must lie in `[0, 1)`.
    pub fn new(p: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&p) {
            return Err(Error::msg(format!(
                "dropout probability must be in [0, 1), got {p}"
            )));
        }
        Ok(Dropout {
            p,
            training: Cell::new(true),
        })
    }

    pub fn p(&self) -> f64 {
        self.p
    }

    /// Mode switch usable without naming a backend.
    pub fn set_training(&self, training: bool) {
        self.training.set(training);
    }

    pub fn is_training(&self) -> bool {
        self.training.get()
    }

    pub fn forward_t<B: Backend>(&self, x: &Tensor<B>) -> Result<Tensor<B>> {
        if !self.training.get() || self.p == 0.0 {
            return Ok(x.clone());
        }

        let scale = 1.0 / (1.0 - self.p);
        let noise = Tensor::<B>::rand(x.shape().clone(), x.dtype(), x.device())?;
        let threshold = Tensor::<B>::full(x.shape().clone(), self.p, x.dtype(), x.device())?;
        // 1 where kept, 0 where dropped
        let keep = noise.ge(&threshold)?;
        let zeros = Tensor::<B>::zeros_like(x)?;
        Tensor::<B>::where_cond(&keep, &x.affine(scale, 0.0)?, &zeros)
    }
}

impl<B: Backend> Module<B> for Dropout {
    fn forward(&self, x: &Tensor<B>) -> Result<Tensor<B>> {
        self.forward_t(x)
    }

    fn parameters(&self) -> Vec<Tensor<B>> {
        vec![]
    }

    fn set_training(&self, training: bool) {
        self.training.set(training);
    }

    fn is_training(&self) -> bool {
        self.training.get()
    }
}
