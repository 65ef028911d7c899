//! # headstart-data
//!
//! Datasets and batching:
//! - [`Dataset`] / [`Sample`] — indexed samples, with [`VecDataset`] in memory
//! - [`DataLoader`] — restartable batching with optional seeded shuffling
//!   and rayon-parallel sample fetching
//! - [`BatchSource`] — what the feature extractor consumes; implemented by
//!   `DataLoader` and by lists of pre-built batches
//! - [`TensorDataset`] — features and labels held as two tensors

pub mod dataset;
pub mod loader;
pub mod source;
pub mod tensor_dataset;

pub use dataset::{Dataset, Sample, VecDataset};
pub use loader::{BatchIterator, DataLoader, DataLoaderConfig};
pub use source::{BatchSource, Batches};
pub use tensor_dataset::TensorDataset;
