// DataLoader — batching, shuffling, iteration
//
// A DataLoader is restartable: every call to `batches()` builds a fresh index
// order and walks the dataset from the start. With a seed the order is
// reproducible across restarts; without one it is drawn from `thread_rng`.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{thread_rng, SeedableRng};
use rayon::prelude::*;

use headstart_core::backend::Backend;
use headstart_core::error::Result;
use headstart_core::tensor::Tensor;
use headstart_core::DType;

use crate::dataset::{Dataset, Sample};

/// Configuration for the DataLoader.
#[derive(Debug, Clone)]
pub struct DataLoaderConfig {
    pub batch_size: usize,
    /// Shuffle indices on every restart.
    pub shuffle: bool,
    /// Drop the last incomplete batch.
    pub drop_last: bool,
    /// DType of the input batch tensors.
    pub dtype: DType,
    /// DType of the target batch tensors; `None` uses `dtype`.
    pub target_dtype: Option<DType>,
    /// Number of parallel workers for sample fetching (0 = sequential).
    pub num_workers: usize,
    /// Seed for reproducible shuffling.
    pub seed: Option<u64>,
}

impl Default for DataLoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            shuffle: false,
            drop_last: false,
            dtype: DType::F32,
            target_dtype: None,
            num_workers: 0,
            seed: None,
        }
    }
}

impl DataLoaderConfig {
    /// Clamped to at least 1.
    pub fn batch_size(mut self, bs: usize) -> Self {
        self.batch_size = bs.max(1);
        self
    }

    pub fn shuffle(mut self, s: bool) -> Self {
        self.shuffle = s;
        self
    }

    pub fn drop_last(mut self, d: bool) -> Self {
        self.drop_last = d;
        self
    }

    pub fn dtype(mut self, d: DType) -> Self {
        self.dtype = d;
        self
    }

    pub fn target_dtype(mut self, d: DType) -> Self {
        self.target_dtype = Some(d);
        self
    }

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn seed(mut self, s: u64) -> Self {
        self.seed = Some(s);
        self
    }
}

/// Wraps a Dataset and produces `(input, target)` batch tensors on `device`.
pub struct DataLoader<'a, B: Backend> {
    dataset: &'a dyn Dataset,
    config: DataLoaderConfig,
    device: B::Device,
}

impl<'a, B: Backend> DataLoader<'a, B> {
    pub fn new(dataset: &'a dyn Dataset, device: B::Device, config: DataLoaderConfig) -> Self {
        Self {
            dataset,
            config,
            device,
        }
    }

    pub fn config(&self) -> &DataLoaderConfig {
        &self.config
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// The number of batches per pass.
    pub fn num_batches(&self) -> usize {
        let bs = self.config.batch_size.max(1);
        if self.config.drop_last {
            self.dataset.len() / bs
        } else {
            self.dataset.len().div_ceil(bs)
        }
    }

    /// Total number of samples.
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Index order for one pass.
    fn epoch_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.config.shuffle {
            match self.config.seed {
                Some(seed) => indices.shuffle(&mut StdRng::seed_from_u64(seed)),
                None => indices.shuffle(&mut thread_rng()),
            }
        }
        indices
    }

    /// Fetch samples, in parallel via rayon when workers are configured.
    fn fetch_samples(&self, indices: &[usize]) -> Result<Vec<Sample>> {
        if self.config.num_workers > 0 && indices.len() > 1 {
            indices.par_iter().map(|&i| self.dataset.get(i)).collect()
        } else {
            indices.iter().map(|&i| self.dataset.get(i)).collect()
        }
    }

    /// Stack samples into `[n, ...feature_shape]` and `[n, ...target_shape]`.
    fn collate(&self, samples: &[Sample]) -> Result<(Tensor<B>, Tensor<B>)> {
        let n = samples.len();
        let feature_shape = self.dataset.feature_shape();
        let target_shape = self.dataset.target_shape();
        let feat_len: usize = feature_shape.iter().product();
        let tgt_len: usize = target_shape.iter().product();

        let mut feat_data = Vec::with_capacity(n * feat_len);
        let mut tgt_data = Vec::with_capacity(n * tgt_len);
        for s in samples {
            feat_data.extend_from_slice(&s.features);
            tgt_data.extend_from_slice(&s.target);
        }

        let mut batch_feat_shape = vec![n];
        batch_feat_shape.extend_from_slice(feature_shape);
        let mut batch_tgt_shape = vec![n];
        batch_tgt_shape.extend_from_slice(target_shape);

        let input = Tensor::<B>::from_f64_slice(
            &feat_data,
            batch_feat_shape,
            self.config.dtype,
            &self.device,
        )?;
        let target = Tensor::<B>::from_f64_slice(
            &tgt_data,
            batch_tgt_shape,
            self.config.target_dtype.unwrap_or(self.config.dtype),
            &self.device,
        )?;
        Ok((input, target))
    }

    /// Start a pass over the dataset.
    pub fn iter_batches(&self) -> BatchIterator<'_, 'a, B> {
        tracing::debug!(
            dataset = self.dataset.name(),
            samples = self.dataset.len(),
            batches = self.num_batches(),
            shuffle = self.config.shuffle,
            "data loader pass"
        );
        BatchIterator {
            loader: self,
            indices: self.epoch_indices(),
            batch_idx: 0,
        }
    }
}

/// Iterator that yields one `(input, target)` batch at a time.
pub struct BatchIterator<'l, 'a, B: Backend> {
    loader: &'l DataLoader<'a, B>,
    indices: Vec<usize>,
    batch_idx: usize,
}

impl<'l, 'a, B: Backend> Iterator for BatchIterator<'l, 'a, B> {
    type Item = Result<(Tensor<B>, Tensor<B>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.batch_idx >= self.loader.num_batches() {
            return None;
        }
        let bs = self.loader.config.batch_size.max(1);
        let start = self.batch_idx * bs;
        let end = (start + bs).min(self.indices.len());
        self.batch_idx += 1;

        let batch = self
            .loader
            .fetch_samples(&self.indices[start..end])
            .and_then(|samples| self.loader.collate(&samples));
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.loader.num_batches().saturating_sub(self.batch_idx);
        (left, Some(left))
    }
}
