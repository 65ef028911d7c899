// BatchNorm1d — batch normalization over features
//
//   training: x_hat = (x - mean_batch) / sqrt(var_batch + eps)
//   eval:     x_hat = (x - running_mean) / sqrt(running_var + eps)
//   y = gamma * x_hat + beta
//
// Input and output are [N, C]; gamma and beta are [C]. Statistics are taken
// over the batch dimension.
//
// Running statistics are exponential moving averages updated only by
// training-mode forward passes:
//   running = (1 - momentum) * running + momentum * batch
// An eval-mode forward pass never touches them.

use std::cell::{Cell, RefCell};

use headstart_core::backend::Backend;
use headstart_core::dtype::DType;
use headstart_core::error::{Error, Result};
use headstart_core::tensor::Tensor;

use crate::module::Module;

/// Batch normalization for `[N, C]` inputs.
///
/// ```ignore
/// let bn = BatchNorm1d::<CpuBackend>::new(64, 1e-5, 0.1, DType::F32, &dev)?;
/// bn.eval();
/// let y = bn.forward(&x)?; // uses running statistics
/// ```
pub struct BatchNorm1d<B: Backend> {
    weight: Tensor<B>,
    bias: Tensor<B>,
    running_mean: RefCell<Vec<f64>>,
    running_var: RefCell<Vec<f64>>,
    num_features: usize,
    eps: f64,
    momentum: f64,
    training: Cell<bool>,
}

impl<B: Backend> BatchNorm1d<B> {
    /// gamma starts at 1, beta at 0, running mean at 0 and running var at 1.
    pub fn new(
        num_features: usize,
        eps: f64,
        momentum: f64,
        dtype: DType,
        device: &B::Device,
    ) -> Result<Self> {
        let weight = Tensor::<B>::ones(num_features, dtype, device)?.set_variable();
        let bias = Tensor::<B>::zeros(num_features, dtype, device)?.set_variable();
        Ok(BatchNorm1d {
            weight,
            bias,
            running_mean: RefCell::new(vec![0.0; num_features]),
            running_var: RefCell::new(vec![1.0; num_features]),
            num_features,
            eps,
            momentum,
            training: Cell::new(true),
        })
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn eps(&self) -> f64 {
        self.eps
    }

    pub fn weight(&self) -> &Tensor<B> {
        &self.weight
    }

    pub fn bias(&self) -> &Tensor<B> {
        &self.bias
    }

    /// Snapshot of the running mean.
    pub fn running_mean(&self) -> Vec<f64> {
        self.running_mean.borrow().clone()
    }

    /// Snapshot of the running variance.
    pub fn running_var(&self) -> Vec<f64> {
        self.running_var.borrow().clone()
    }

    /// Load running statistics, e.g. from a trained checkpoint.
    pub fn set_running_stats(&self, mean: Vec<f64>, var: Vec<f64>) -> Result<()> {
        if mean.len() != self.num_features || var.len() != self.num_features {
            return Err(Error::msg(format!(
                "BatchNorm1d expects {} running statistics, got mean={} var={}",
                self.num_features,
                mean.len(),
                var.len()
            )));
        }
        *self.running_mean.borrow_mut() = mean;
        *self.running_var.borrow_mut() = var;
        Ok(())
    }

    fn check_input(&self, x: &Tensor<B>) -> Result<()> {
        if x.rank() != 2 {
            return Err(Error::RankMismatch {
                expected: 2,
                got: x.rank(),
            });
        }
        if x.dims()[1] != self.num_features {
            return Err(Error::msg(format!(
                "BatchNorm1d: expected {} features, got {}",
                self.num_features,
                x.dims()[1]
            )));
        }
        Ok(())
    }

    fn forward_train(&self, x: &Tensor<B>) -> Result<Tensor<B>> {
        let mean = x.mean(0, true)?; // [1, C]
        let centered = x.sub(&mean)?;
        let var = centered.mul(&centered)?.mean(0, true)?; // biased, [1, C]

        let batch_mean = mean.to_f64_vec()?;
        let batch_var = var.to_f64_vec()?;
        {
            let m = self.momentum;
            let mut rm = self.running_mean.borrow_mut();
            let mut rv = self.running_var.borrow_mut();
            for c in 0..self.num_features {
                rm[c] = (1.0 - m) * rm[c] + m * batch_mean[c];
                rv[c] = (1.0 - m) * rv[c] + m * batch_var[c];
            }
        }

        self.normalize(&centered, &var)
    }

    fn forward_eval(&self, x: &Tensor<B>) -> Result<Tensor<B>> {
        let c = self.num_features;
        let mean = Tensor::<B>::from_f64_slice(
            &self.running_mean.borrow(),
            (1, c),
            x.dtype(),
            x.device(),
        )?;
        let var = Tensor::<B>::from_f64_slice(
            &self.running_var.borrow(),
            (1, c),
            x.dtype(),
            x.device(),
        )?;
        self.normalize(&x.sub(&mean)?, &var)
    }

    /// gamma * centered / sqrt(var + eps) + beta, with `var` shaped [1, C].
    fn normalize(&self, centered: &Tensor<B>, var: &Tensor<B>) -> Result<Tensor<B>> {
        let c = self.num_features;
        let std = var.affine(1.0, self.eps)?.sqrt()?;
        let x_hat = centered.div(&std)?;
        let gamma = self.weight.reshape((1, c))?;
        let beta = self.bias.reshape((1, c))?;
        x_hat.mul(&gamma)?.add(&beta)
    }
}

impl<B: Backend> Module<B> for BatchNorm1d<B> {
    fn forward(&self, x: &Tensor<B>) -> Result<Tensor<B>> {
        self.check_input(x)?;
        if self.training.get() {
            self.forward_train(x)
        } else {
            self.forward_eval(x)
        }
    }

    fn parameters(&self) -> Vec<Tensor<B>> {
        vec![self.weight.clone(), self.bias.clone()]
    }

    fn named_parameters(&self) -> Vec<(String, Tensor<B>)> {
        vec![
            ("weight".to_string(), self.weight.clone()),
            ("bias".to_string(), self.bias.clone()),
        ]
    }

    fn set_training(&self, training: bool) {
        self.training.set(training);
    }

    fn is_training(&self) -> bool {
        self.training.get()
    }
}
