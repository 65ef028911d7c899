// TensorDataset — a dataset held as two tensors
//
// `features` is [N, ...] and `labels` is [N, ...]; row k of each forms
// sample k. The feature extractor returns one of these, and because it is
// also a `Dataset` it can be fed straight back into a `DataLoader` to train a
// head on the cached features.

use headstart_core::backend::Backend;
use headstart_core::error::{Error, Result};
use headstart_core::tensor::Tensor;

use crate::dataset::{Dataset, Sample};

/// Two tensors sharing a leading (sample) dimension.
#[derive(Debug, Clone)]
pub struct TensorDataset<B: Backend> {
    features: Tensor<B>,
    labels: Tensor<B>,
    feature_shape: Vec<usize>,
    label_shape: Vec<usize>,
}

impl<B: Backend> TensorDataset<B> {
    /// Fails with `Error::LengthMismatch` when the leading dimensions differ.
    pub fn new(features: Tensor<B>, labels: Tensor<B>) -> Result<Self> {
        for t in [&features, &labels] {
            if t.rank() == 0 {
                return Err(Error::RankMismatch {
                    expected: 1,
                    got: 0,
                });
            }
        }
        let (n_features, n_labels) = (features.dims()[0], labels.dims()[0]);
        if n_features != n_labels {
            return Err(Error::LengthMismatch {
                features: n_features,
                labels: n_labels,
            });
        }
        let feature_shape = features.dims()[1..].to_vec();
        let label_shape = labels.dims()[1..].to_vec();
        Ok(TensorDataset {
            features,
            labels,
            feature_shape,
            label_shape,
        })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.features.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row `index` of features and labels, leading dimension removed.
    pub fn get(&self, index: usize) -> Result<(Tensor<B>, Tensor<B>)> {
        Ok((self.features.get(index)?, self.labels.get(index)?))
    }

    pub fn features(&self) -> &Tensor<B> {
        &self.features
    }

    pub fn labels(&self) -> &Tensor<B> {
        &self.labels
    }

    /// Rows in order.
    pub fn iter(&self) -> impl Iterator<Item = Result<(Tensor<B>, Tensor<B>)>> + '_ {
        (0..self.len()).map(move |k| self.get(k))
    }

    pub fn into_parts(self) -> (Tensor<B>, Tensor<B>) {
        (self.features, self.labels)
    }
}

impl<B: Backend> Dataset for TensorDataset<B> {
    fn len(&self) -> usize {
        TensorDataset::len(self)
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let (x, y) = TensorDataset::get(self, index)?;
        Ok(Sample {
            features: x.to_f64_vec()?,
            feature_shape: self.feature_shape.clone(),
            target: y.to_f64_vec()?,
            target_shape: self.label_shape.clone(),
        })
    }

    fn feature_shape(&self) -> &[usize] {
        &self.feature_shape
    }

    fn target_shape(&self) -> &[usize] {
        &self.label_shape
    }

    fn name(&self) -> &str {
        "tensor_dataset"
    }
}
