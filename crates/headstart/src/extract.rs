// Feature extraction — run a frozen backbone once over a loader
//
// For every batch the loader yields, in order:
//   1. move the input to the execution device
//   2. forward pass under `no_grad`, then `detach`
//   3. bring the output and the label batch back to the host
// and finally concatenate everything along the sample dimension into a
// `TensorDataset` of (feature, label) rows.
//
// The model is switched to eval mode once before the loop and left there.
// Any error aborts the whole call; no partial dataset is returned.

use tracing::{debug, info, info_span};

use headstart_core::backend::{Backend, BackendDevice};
use headstart_core::error::{Error, Result};
use headstart_core::op::no_grad;
use headstart_core::tensor::Tensor;
use headstart_data::{BatchSource, TensorDataset};
use headstart_nn::Module;

/// Settings for a [`FeatureExtractor`].
#[derive(Debug, Clone)]
pub struct ExtractorConfig<B: Backend> {
    /// Execution device; `None` uses the model's parameter device.
    pub device: Option<B::Device>,
    /// Emit a debug progress event every `log_every` batches (0 = never).
    pub log_every: usize,
}

impl<B: Backend> Default for ExtractorConfig<B> {
    fn default() -> Self {
        Self {
            device: None,
            log_every: 50,
        }
    }
}

impl<B: Backend> ExtractorConfig<B> {
    pub fn device(mut self, device: B::Device) -> Self {
        self.device = Some(device);
        self
    }

    pub fn log_every(mut self, n: usize) -> Self {
        self.log_every = n;
        self
    }
}

/// Turns a model and a batch source into an in-memory dataset of model
/// outputs paired with the original labels.
///
/// ```ignore
/// let extractor = FeatureExtractor::new(ExtractorConfig::default().device(dev));
/// let cached = extractor.extract(&backbone, &loader)?;
/// let head_loader = DataLoader::<CpuBackend>::new(&cached, host, cfg);
/// ```
#[derive(Debug, Clone)]
pub struct FeatureExtractor<B: Backend> {
    config: ExtractorConfig<B>,
}

impl<B: Backend> Default for FeatureExtractor<B> {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

impl<B: Backend> FeatureExtractor<B> {
    pub fn new(config: ExtractorConfig<B>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig<B> {
        &self.config
    }

    /// Run `model` over every batch of `loader` and collect host-resident,
    /// graph-free features with their labels.
    ///
    /// # Errors
    /// - [`Error::NoParameters`] if no device is configured and the model
    ///   has no parameters to take one from
    /// - [`Error::EmptyLoader`] if the loader yields no batches
    /// - loader, placement (`AllocationFailed`) and shape errors as raised
    pub fn extract<M, L>(&self, model: &M, loader: &L) -> Result<TensorDataset<B>>
    where
        M: Module<B> + ?Sized,
        L: BatchSource<B> + ?Sized,
    {
        let device = match &self.config.device {
            Some(d) => d.clone(),
            None => model.device()?,
        };
        let span = info_span!("extract_features", device = %device.name());
        let _guard = span.enter();

        model.eval();

        let capacity = loader.num_batches_hint().unwrap_or(0);
        let mut features: Vec<Tensor<B>> = Vec::with_capacity(capacity);
        let mut labels: Vec<Tensor<B>> = Vec::with_capacity(capacity);
        let mut rows = 0usize;

        for (i, batch) in loader.batches().enumerate() {
            let (input, label) = batch?;
            let input = input.to_device(&device)?;
            let output = no_grad(|| model.forward(&input))?.detach();

            rows += output.dims().first().copied().unwrap_or(1);
            features.push(output.to_host()?);
            labels.push(label.to_host()?);

            let done = i + 1;
            if self.config.log_every > 0 && done % self.config.log_every == 0 {
                debug!(batches = done, rows, "extracted batch");
            }
        }

        if features.is_empty() {
            return Err(Error::EmptyLoader);
        }
        debug!(batches = features.len(), rows, "concatenating");

        let features = Tensor::cat(&features, 0)?;
        let labels = Tensor::cat(&labels, 0)?;
        let dataset = TensorDataset::new(features, labels)?;

        info!(
            samples = dataset.len(),
            feature_shape = ?dataset.features().dims(),
            "feature extraction finished"
        );
        Ok(dataset)
    }
}

/// Precompute `model`'s outputs over `loader` as a dataset of
/// (feature, label) rows, held on the host.
///
/// `device` selects where the forward passes run; `None` uses the device of
/// the model's first parameter. See [`FeatureExtractor::extract`] for errors.
pub fn preprocessed_dataset<B, M, L>(
    model: &M,
    loader: &L,
    device: Option<&B::Device>,
) -> Result<TensorDataset<B>>
where
    B: Backend,
    M: Module<B> + ?Sized,
    L: BatchSource<B> + ?Sized,
{
    let config = ExtractorConfig {
        device: device.cloned(),
        ..ExtractorConfig::default()
    };
    FeatureExtractor::new(config).extract(model, loader)
}
