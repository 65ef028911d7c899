// Linear — fully-connected layer, y = x W^T + b
//
//   weight: [out_features, in_features]
//   bias:   [1, out_features], broadcast over the batch
//
// Input [batch, in_features] → output [batch, out_features]. This is the
// usual shape of both a backbone's projection layer and the lightweight head
// trained on extracted features.

use headstart_core::backend::Backend;
use headstart_core::dtype::DType;
use headstart_core::error::{Error, Result};
use headstart_core::tensor::Tensor;

use crate::module::Module;

/// A fully-connected (dense) layer.
///
/// ```ignore
/// let fc = Linear::<CpuBackend>::new(512, 10, true, DType::F32, &dev)?;
/// let logits = fc.forward(&features)?; // [batch, 10]
/// ```
pub struct Linear<B: Backend> {
    weight: Tensor<B>,
    bias: Option<Tensor<B>>,
    in_features: usize,
    out_features: usize,
}

impl<B: Backend> Linear<B> {
    /// Create a layer with Kaiming-uniform weights, U(-k, k) with
    /// k = sqrt(1 / in_features). The bias uses the same range.
    /// `dtype` must be a float type.
    pub fn new(
        in_features: usize,
        out_features: usize,
        use_bias: bool,
        dtype: DType,
        device: &B::Device,
    ) -> Result<Self> {
        if !dtype.is_float() {
            return Err(Error::msg(format!(
                "Linear weights must be f32 or f64, got {dtype}"
            )));
        }
        let k = (1.0 / in_features as f64).sqrt();
        let weight = Tensor::<B>::rand((out_features, in_features), dtype, device)?
            .affine(2.0 * k, -k)?
            .set_variable();
        let bias = if use_bias {
            Some(
                Tensor::<B>::rand((1, out_features), dtype, device)?
                    .affine(2.0 * k, -k)?
                    .set_variable(),
            )
        } else {
            None
        };
        Ok(Linear {
            weight,
            bias,
            in_features,
            out_features,
        })
    }

    /// Build from pre-trained tensors. `weight` must be `[out, in]`; `bias`,
    /// if given, must hold `out` elements and is reshaped to `[1, out]`.
    pub fn from_tensors(weight: Tensor<B>, bias: Option<Tensor<B>>) -> Result<Self> {
        if weight.rank() != 2 {
            return Err(Error::RankMismatch {
                expected: 2,
                got: weight.rank(),
            });
        }
        let (out_features, in_features) = (weight.dims()[0], weight.dims()[1]);
        let bias = match bias {
            Some(b) if b.elem_count() != out_features => {
                return Err(Error::msg(format!(
                    "Linear bias must have {out_features} elements, got {}",
                    b.elem_count()
                )))
            }
            Some(b) => Some(b.reshape((1, out_features))?.set_variable()),
            None => None,
        };
        Ok(Linear {
            weight: weight.set_variable(),
            bias,
            in_features,
            out_features,
        })
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    pub fn weight(&self) -> &Tensor<B> {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Tensor<B>> {
        self.bias.as_ref()
    }
}

impl<B: Backend> Module<B> for Linear<B> {
    fn forward(&self, x: &Tensor<B>) -> Result<Tensor<B>> {
        let output = x.matmul(&self.weight.t()?)?;
        match &self.bias {
            Some(bias) => output.add(bias),
            None => Ok(output),
        }
    }

    fn parameters(&self) -> Vec<Tensor<B>> {
        let mut params = vec![self.weight.clone()];
        if let Some(ref b) = self.bias {
            params.push(b.clone());
        }
        params
    }

    fn named_parameters(&self) -> Vec<(String, Tensor<B>)> {
        let mut named = vec![("weight".to_string(), self.weight.clone())];
        if let Some(ref b) = self.bias {
            named.push(("bias".to_string(), b.clone()));
        }
        named
    }
}
