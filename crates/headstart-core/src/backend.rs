use crate::dtype::{DType, WithDType};
use crate::error::Result;
use crate::layout::Layout;
use crate::shape::Shape;
use std::fmt;

// Backend — abstraction over where tensor data lives and how kernels run
//
// Tensor<B: Backend> is generic over the backend, so models, loaders and the
// feature extractor are written once and monomorphized per backend. A backend
// may expose several devices; one of them is the host, which is where
// extracted features end up.

/// Identifies a compute device (e.g. "cpu:0").
pub trait BackendDevice: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Human-readable name, used in logs and error messages.
    fn name(&self) -> String;

    /// Whether tensors on this device are directly readable from host memory
    /// without a transfer.
    fn is_host(&self) -> bool;
}

/// A buffer holding tensor elements on some device.
pub trait BackendStorage: Clone + Send + Sync + 'static {
    fn dtype(&self) -> DType;

    /// Number of elements in the buffer.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Element-wise binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Element-wise unary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Exp,
    Sqrt,
    Relu,
    Sigmoid,
    Tanh,
}

/// Reductions along one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Mean,
}

/// Element-wise comparisons, producing U8 masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

/// The interface every backend implements.
///
/// Operations take storage + layout and return fresh contiguous storage.
/// Nothing mutates its inputs.
pub trait Backend: Clone + Send + Sync + fmt::Debug + 'static {
    type Device: BackendDevice;
    type Storage: BackendStorage;

    /// The device whose memory the host can read directly.
    fn host_device() -> Self::Device;

    //  Creation

    fn zeros(shape: &Shape, dtype: DType, device: &Self::Device) -> Result<Self::Storage> {
        Self::full(shape, 0.0, dtype, device)
    }

    fn full(shape: &Shape, val: f64, dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    /// Create storage from flat f64 values, converting to `dtype`.
    fn from_f64_slice(data: &[f64], dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    /// Create storage of `T::DTYPE` from native values.
    ///
    /// The default widens through f64, which is inexact for i64 beyond 2^53;
    /// backends that store integers natively override it.
    fn from_slice<T: WithDType>(data: &[T], device: &Self::Device) -> Result<Self::Storage> {
        let wide: Vec<f64> = data.iter().map(|v| v.into_f64()).collect();
        Self::from_f64_slice(&wide, T::DTYPE, device)
    }

    /// Uniform values in [0, 1).
    fn rand_uniform(shape: &Shape, dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    /// Standard normal values (mean 0, std 1).
    fn rand_normal(shape: &Shape, dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    //  Element-wise

    /// `result[i] = op(lhs[i], rhs[i])`. Layouts are already broadcast to the
    /// output shape (stride 0 on repeated dims).
    fn binary_op(
        op: BinaryOp,
        lhs: &Self::Storage,
        lhs_layout: &Layout,
        rhs: &Self::Storage,
        rhs_layout: &Layout,
    ) -> Result<Self::Storage>;

    fn unary_op(op: UnaryOp, input: &Self::Storage, layout: &Layout) -> Result<Self::Storage>;

    /// `result[i] = input[i] * mul + add`.
    fn affine(input: &Self::Storage, layout: &Layout, mul: f64, add: f64) -> Result<Self::Storage>;

    /// Comparison producing a U8 storage of 0/1.
    fn cmp_op(
        op: CmpOp,
        lhs: &Self::Storage,
        lhs_layout: &Layout,
        rhs: &Self::Storage,
        rhs_layout: &Layout,
    ) -> Result<Self::Storage>;

    /// `result[i] = if mask[i] != 0 { on_true[i] } else { on_false[i] }`.
    fn where_cond(
        mask: &Self::Storage,
        mask_layout: &Layout,
        on_true: &Self::Storage,
        on_true_layout: &Layout,
        on_false: &Self::Storage,
        on_false_layout: &Layout,
    ) -> Result<Self::Storage>;

    //  Reductions

    /// Reduce along `dim`. The output keeps `dim` with size 1 when
    /// `keep_dim` is set, otherwise drops it.
    fn reduce_op(
        op: ReduceOp,
        input: &Self::Storage,
        layout: &Layout,
        dim: usize,
        keep_dim: bool,
    ) -> Result<Self::Storage>;

    //  Linear algebra

    /// `[m, k] @ [k, n]` → `[m, n]`. Shapes are validated by the caller.
    fn matmul(
        lhs: &Self::Storage,
        lhs_layout: &Layout,
        rhs: &Self::Storage,
        rhs_layout: &Layout,
    ) -> Result<Self::Storage>;

    //  Data movement

    /// Copy the elements visible through `layout` into a new contiguous buffer.
    fn to_contiguous(input: &Self::Storage, layout: &Layout) -> Result<Self::Storage>;

    /// Copy the elements visible through `layout` to a host `Vec<f64>`.
    fn to_f64_vec(input: &Self::Storage, layout: &Layout) -> Result<Vec<f64>>;

    /// Copy the elements visible through `layout` to a host `Vec<T>`.
    /// Same caveat as [`Backend::from_slice`] for the default.
    fn to_vec<T: WithDType>(input: &Self::Storage, layout: &Layout) -> Result<Vec<T>> {
        Ok(Self::to_f64_vec(input, layout)?
            .into_iter()
            .map(T::from_f64)
            .collect())
    }

    /// Concatenate inputs along `dim` into one contiguous buffer.
    /// `out_shape` is already validated.
    fn cat(
        inputs: &[(&Self::Storage, &Layout)],
        out_shape: &Shape,
        dim: usize,
    ) -> Result<Self::Storage>;

    /// Convert to another dtype.
    ///
    /// The default goes through a host `Vec<f64>`; backends with native
    /// conversion kernels override it.
    fn cast(
        input: &Self::Storage,
        layout: &Layout,
        dtype: DType,
        device: &Self::Device,
    ) -> Result<Self::Storage> {
        let data = Self::to_f64_vec(input, layout)?;
        Self::from_f64_slice(&data, dtype, device)
    }

    /// Place a copy of the data on `dst`, keeping its dtype.
    ///
    /// The default goes through a host `Vec<f64>` and re-allocates on `dst`,
    /// so allocation limits of the destination apply. Backends override it
    /// to copy elements in their own dtype.
    fn transfer(
        input: &Self::Storage,
        layout: &Layout,
        dst: &Self::Device,
    ) -> Result<Self::Storage> {
        let dtype = input.dtype();
        let data = Self::to_f64_vec(input, layout)?;
        Self::from_f64_slice(&data, dtype, dst)
    }
}
