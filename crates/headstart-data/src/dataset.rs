// Dataset trait — indexed collection of samples

use headstart_core::error::{Error, Result};

/// A single sample: input features and a target, both flattened to `f64`
/// with their shapes alongside so they can be stacked into batch tensors.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub features: Vec<f64>,
    /// Shape of one feature sample, e.g. `[784]` or `[3, 32, 32]`.
    pub feature_shape: Vec<usize>,
    pub target: Vec<f64>,
    /// Shape of one target, e.g. `[]` for a class index or `[10]` for one-hot.
    pub target_shape: Vec<usize>,
}

/// A dataset is an indexed collection of samples.
///
/// Implementations must be `Send + Sync` so a `DataLoader` can read from
/// several threads when `num_workers > 0`.
pub trait Dataset: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sample at `index`; `Error::IndexOutOfBounds` past the end.
    fn get(&self, index: usize) -> Result<Sample>;

    /// Shape of one feature sample (no batch dim).
    fn feature_shape(&self) -> &[usize];

    /// Shape of one target (no batch dim).
    fn target_shape(&self) -> &[usize];

    fn name(&self) -> &str {
        "dataset"
    }
}

/// In-memory dataset backed by a `Vec<Sample>`.
pub struct VecDataset {
    samples: Vec<Sample>,
    feature_shape: Vec<usize>,
    target_shape: Vec<usize>,
    dataset_name: String,
}

impl VecDataset {
    /// All samples must share the first sample's feature and target shapes.
    pub fn new(samples: Vec<Sample>, name: &str) -> Result<Self> {
        let Some(first) = samples.first() else {
            headstart_core::bail!("VecDataset {name}: need at least one sample");
        };
        let feature_shape = first.feature_shape.clone();
        let target_shape = first.target_shape.clone();
        for (i, s) in samples.iter().enumerate() {
            if s.feature_shape != feature_shape || s.target_shape != target_shape {
                headstart_core::bail!(
                    "VecDataset {name}: sample {i} has shapes {:?}/{:?}, expected {:?}/{:?}",
                    s.feature_shape,
                    s.target_shape,
                    feature_shape,
                    target_shape
                );
            }
        }
        Ok(Self {
            samples,
            feature_shape,
            target_shape,
            dataset_name: name.to_string(),
        })
    }

    /// Build from row-major feature and target buffers.
    pub fn from_flat(
        features: &[f64],
        feature_shape: &[usize],
        targets: &[f64],
        target_shape: &[usize],
        name: &str,
    ) -> Result<Self> {
        let feat_per_sample: usize = feature_shape.iter().product();
        let tgt_per_sample: usize = target_shape.iter().product();
        if feat_per_sample == 0 || features.len() % feat_per_sample != 0 {
            headstart_core::bail!(
                "VecDataset {name}: {} feature values do not split into samples of {feat_per_sample}",
                features.len()
            );
        }
        let n = features.len() / feat_per_sample;
        if targets.len() != n * tgt_per_sample {
            return Err(Error::LengthMismatch {
                features: n,
                labels: targets.len() / tgt_per_sample.max(1),
            });
        }

        let samples: Vec<Sample> = (0..n)
            .map(|i| Sample {
                features: features[i * feat_per_sample..(i + 1) * feat_per_sample].to_vec(),
                feature_shape: feature_shape.to_vec(),
                target: targets[i * tgt_per_sample..(i + 1) * tgt_per_sample].to_vec(),
                target_shape: target_shape.to_vec(),
            })
            .collect();

        Ok(Self {
            samples,
            feature_shape: feature_shape.to_vec(),
            target_shape: target_shape.to_vec(),
            dataset_name: name.to_string(),
        })
    }
}

impl Dataset for VecDataset {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        self.samples
            .get(index)
            .cloned()
            .ok_or(Error::IndexOutOfBounds {
                index,
                len: self.samples.len(),
            })
    }

    fn feature_shape(&self) -> &[usize] {
        &self.feature_shape
    }

    fn target_shape(&self) -> &[usize] {
        &self.target_shape
    }

    fn name(&self) -> &str {
        &self.dataset_name
    }
}
