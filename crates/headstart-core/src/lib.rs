//! # headstart-core
//!
//! Tensor primitives shared by every headstart crate:
//! - [`Tensor`] — n-dimensional array on a backend device, with explicit
//!   device movement (`to_device`, `to_host`) and graph tracking
//!   (`requires_grad`, `detach`, [`no_grad`])
//! - [`Shape`] / [`Layout`] — dims, strides and views
//! - [`DType`] — element types (F32, F64, U8, U32, I64)
//! - [`Backend`] / [`BackendDevice`] — abstraction over compute backends
//! - [`Error`] / [`Result`] — the workspace-wide error type

pub mod backend;
pub mod dtype;
pub mod error;
pub mod layout;
pub mod op;
pub mod shape;
pub mod tensor;

pub use backend::{Backend, BackendDevice, BackendStorage};
pub use dtype::{DType, WithDType};
pub use error::{Error, Result};
pub use layout::Layout;
pub use op::{is_grad_enabled, no_grad, Op, TensorId};
pub use shape::Shape;
pub use tensor::Tensor;
