//! # headstart
//!
//! Precompute a frozen backbone's outputs once, then train a small head on
//! the cached features instead of re-running the backbone every epoch.
//!
//! ```ignore
//! use headstart::prelude::*;
//!
//! let loader = DataLoader::<CpuBackend>::new(&images, host.clone(), DataLoaderConfig::default());
//! let cached = preprocessed_dataset(&backbone, &loader, None)?;
//! let head_loader = DataLoader::<CpuBackend>::new(&cached, host, DataLoaderConfig::default().shuffle(true));
//! ```
//!
//! | Crate | Purpose |
//! |-------|---------|
//! | `headstart-core` | Tensor, Shape, DType, Layout, Backend trait, graph tracking |
//! | `headstart-cpu` | CPU backend with rayon matmul and logical devices |
//! | `headstart-nn` | Module trait and layers (Linear, BatchNorm1d, Dropout, ...) |
//! | `headstart-data` | Dataset, DataLoader, BatchSource, TensorDataset |
//!
//! This crate adds [`extract`] (the feature extractor) and [`telemetry`]
//! (tracing setup).

pub use headstart_core::{
    backend::{Backend, BackendDevice, BackendStorage},
    bail, is_grad_enabled, no_grad, DType, Error, Layout, Result, Shape, Tensor, WithDType,
};

pub use headstart_cpu::{CpuBackend, CpuDevice, CpuStorage, CpuTensor};

/// Re-export neural network modules.
pub mod nn {
    pub use headstart_nn::*;
}

/// Re-export datasets and loaders.
pub mod data {
    pub use headstart_data::*;
}

pub mod extract;
pub mod telemetry;

pub use extract::{preprocessed_dataset, ExtractorConfig, FeatureExtractor};

/// Prelude: import this for the most common types.
pub mod prelude {
    pub use crate::data::{
        BatchSource, DataLoader, DataLoaderConfig, Dataset, Sample, TensorDataset, VecDataset,
    };
    pub use crate::extract::{preprocessed_dataset, ExtractorConfig, FeatureExtractor};
    pub use crate::nn::{
        BatchNorm1d, Dropout, Flatten, Linear, Module, ReLU, Sequential, Sigmoid, Tanh,
    };
    pub use crate::{CpuBackend, CpuDevice, CpuTensor, DType, Shape, Tensor};
}
