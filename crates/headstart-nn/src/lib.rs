//! # headstart-nn
//!
//! Layers for building backbones and heads:
//! - [`Module`] — forward pass, parameters, train/eval mode, device
//! - [`Linear`], [`BatchNorm1d`], [`Dropout`], [`Flatten`]
//! - [`ReLU`], [`Tanh`], [`Sigmoid`]
//! - [`Sequential`] — ordered container

pub mod activation;
pub mod batchnorm;
pub mod dropout;
pub mod flatten;
pub mod linear;
pub mod module;
pub mod sequential;

pub use activation::{ReLU, Sigmoid, Tanh};
pub use batchnorm::BatchNorm1d;
pub use dropout::Dropout;
pub use flatten::Flatten;
pub use linear::Linear;
pub use module::Module;
pub use sequential::Sequential;
