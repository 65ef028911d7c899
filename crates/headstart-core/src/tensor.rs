use std::sync::Arc;

use crate::backend::{Backend, BackendDevice, BinaryOp, CmpOp, ReduceOp, UnaryOp};
use crate::dtype::{DType, WithDType};
use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::op::{is_grad_enabled, Op, TensorId};
use crate::shape::Shape;

// Tensor — n-dimensional array on a backend device
//
// A Tensor is a cheap handle (one Arc) to immutable storage plus a layout.
// Views share storage; every op allocates a fresh contiguous result.
//
// Device movement is explicit: `to_device` copies onto another device of the
// same backend and `to_host` copies onto `B::host_device()`. Kernels on the
// CPU backend accept operands from any CPU device, and a result lives on the
// device of its first operand.

struct TensorInner<B: Backend> {
    id: TensorId,
    storage: Arc<B::Storage>,
    layout: Layout,
    dtype: DType,
    device: B::Device,
    /// What produced this tensor; `Op::None` for leaves and detached results.
    op: Op<B>,
    /// Trainable parameter flag.
    is_variable: bool,
}

/// An n-dimensional array of numbers on a specific backend.
///
/// ```ignore
/// let dev = CpuDevice::host();
/// let x = Tensor::<CpuBackend>::from_f64_slice(&[1.0, 2.0, 3.0, 4.0], (2, 2), DType::F32, &dev)?;
/// let y = x.matmul(&x.t()?)?;
/// ```
pub struct Tensor<B: Backend> {
    inner: Arc<TensorInner<B>>,
}

impl<B: Backend> Clone for Tensor<B> {
    fn clone(&self) -> Self {
        Tensor {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> std::fmt::Debug for Tensor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tensor(id={:?}, shape={}, dtype={}, device={}, op={})",
            self.inner.id,
            self.inner.layout.shape(),
            self.inner.dtype,
            self.inner.device.name(),
            self.inner.op.name(),
        )
    }
}

impl<B: Backend> Tensor<B> {
    // Internal constructors

    fn from_storage(
        storage: B::Storage,
        layout: Layout,
        dtype: DType,
        device: B::Device,
        op: Op<B>,
    ) -> Self {
        Tensor {
            inner: Arc::new(TensorInner {
                id: TensorId::new(),
                storage: Arc::new(storage),
                layout,
                dtype,
                device,
                op,
                is_variable: false,
            }),
        }
    }

    /// A fresh contiguous result of an op computed from `self`'s device.
    fn derived(&self, storage: B::Storage, shape: Shape, dtype: DType, op: Op<B>) -> Self {
        Self::from_storage(
            storage,
            Layout::contiguous(shape),
            dtype,
            self.inner.device.clone(),
            Self::record(op),
        )
    }

    /// View sharing this tensor's storage with a new layout.
    fn view_with_layout(&self, layout: Layout) -> Self {
        let op = Self::record(Op::View {
            input: self.clone(),
        });
        self.view_with_layout_and_op(layout, op)
    }

    fn view_with_layout_and_op(&self, layout: Layout, op: Op<B>) -> Self {
        Tensor {
            inner: Arc::new(TensorInner {
                id: TensorId::new(),
                storage: Arc::clone(&self.inner.storage),
                layout,
                dtype: self.inner.dtype,
                device: self.inner.device.clone(),
                op,
                is_variable: false,
            }),
        }
    }

    /// Keep `op` only if grad tracking is on and some input requires grad.
    fn record(op: Op<B>) -> Op<B> {
        if is_grad_enabled() && op.inputs().iter().any(|t| t.requires_grad()) {
            op
        } else {
            Op::None
        }
    }

    // Accessors

    pub fn id(&self) -> TensorId {
        self.inner.id
    }

    pub fn shape(&self) -> &Shape {
        self.inner.layout.shape()
    }

    pub fn dims(&self) -> &[usize] {
        self.inner.layout.dims()
    }

    pub fn rank(&self) -> usize {
        self.inner.layout.rank()
    }

    pub fn elem_count(&self) -> usize {
        self.inner.layout.elem_count()
    }

    pub fn dtype(&self) -> DType {
        self.inner.dtype
    }

    pub fn device(&self) -> &B::Device {
        &self.inner.device
    }

    pub fn layout(&self) -> &Layout {
        &self.inner.layout
    }

    pub fn storage(&self) -> &B::Storage {
        &self.inner.storage
    }

    pub fn is_contiguous(&self) -> bool {
        self.inner.layout.is_contiguous()
    }

    /// Whether this tensor is a trainable parameter.
    pub fn is_variable(&self) -> bool {
        self.inner.is_variable
    }

    /// Whether this tensor is a parameter or was computed from one while
    /// grad tracking was enabled.
    pub fn requires_grad(&self) -> bool {
        self.inner.is_variable || !self.inner.op.is_none()
    }

    pub fn op(&self) -> &Op<B> {
        &self.inner.op
    }

    /// Whether the data is readable from host memory without a transfer.
    pub fn is_host(&self) -> bool {
        self.inner.device.is_host()
    }

    // Creation

    pub fn zeros(shape: impl Into<Shape>, dtype: DType, device: &B::Device) -> Result<Self> {
        let shape = shape.into();
        let storage = B::zeros(&shape, dtype, device)?;
        Ok(Self::leaf(storage, shape, dtype, device))
    }

    pub fn ones(shape: impl Into<Shape>, dtype: DType, device: &B::Device) -> Result<Self> {
        Self::full(shape, 1.0, dtype, device)
    }

    pub fn full(
        shape: impl Into<Shape>,
        val: f64,
        dtype: DType,
        device: &B::Device,
    ) -> Result<Self> {
        let shape = shape.into();
        let storage = B::full(&shape, val, dtype, device)?;
        Ok(Self::leaf(storage, shape, dtype, device))
    }

    /// Create a tensor from flat f64 values, converted to `dtype`.
    pub fn from_f64_slice(
        data: &[f64],
        shape: impl Into<Shape>,
        dtype: DType,
        device: &B::Device,
    ) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                expected: shape.elem_count(),
                got: data.len(),
                shape,
            });
        }
        let storage = B::from_f64_slice(data, dtype, device)?;
        Ok(Self::leaf(storage, shape, dtype, device))
    }

    /// Create a tensor from native scalars; the dtype follows `T` and the
    /// values are stored as given.
    pub fn from_slice<T: WithDType>(
        data: &[T],
        shape: impl Into<Shape>,
        device: &B::Device,
    ) -> Result<Self> {
        let shape = shape.into();
        if shape.elem_count() != data.len() {
            return Err(Error::ElementCountMismatch {
                expected: shape.elem_count(),
                got: data.len(),
                shape,
            });
        }
        let storage = B::from_slice(data, device)?;
        Ok(Self::leaf(storage, shape, T::DTYPE, device))
    }

    /// Uniform values in [0, 1).
    pub fn rand(shape: impl Into<Shape>, dtype: DType, device: &B::Device) -> Result<Self> {
        let shape = shape.into();
        let storage = B::rand_uniform(&shape, dtype, device)?;
        Ok(Self::leaf(storage, shape, dtype, device))
    }

    /// Standard normal values.
    pub fn randn(shape: impl Into<Shape>, dtype: DType, device: &B::Device) -> Result<Self> {
        let shape = shape.into();
        let storage = B::rand_normal(&shape, dtype, device)?;
        Ok(Self::leaf(storage, shape, dtype, device))
    }

    /// `[0, 1, ..., n-1]`.
    pub fn arange(n: usize, dtype: DType, device: &B::Device) -> Result<Self> {
        let data: Vec<f64> = (0..n).map(|i| i as f64).collect();
        Self::from_f64_slice(&data, n, dtype, device)
    }

    pub fn zeros_like(other: &Self) -> Result<Self> {
        Self::zeros(other.shape().clone(), other.dtype(), other.device())
    }

    fn leaf(storage: B::Storage, shape: Shape, dtype: DType, device: &B::Device) -> Self {
        Self::from_storage(
            storage,
            Layout::contiguous(shape),
            dtype,
            device.clone(),
            Op::None,
        )
    }

    /// Mark as a trainable parameter.
    pub fn set_variable(self) -> Self {
        Tensor {
            inner: Arc::new(TensorInner {
                id: self.inner.id,
                storage: Arc::clone(&self.inner.storage),
                layout: self.inner.layout.clone(),
                dtype: self.inner.dtype,
                device: self.inner.device.clone(),
                op: Op::None,
                is_variable: true,
            }),
        }
    }

    // Views

    pub fn transpose(&self, dim0: usize, dim1: usize) -> Result<Self> {
        let layout = self.inner.layout.transpose(dim0, dim1)?;
        Ok(self.view_with_layout(layout))
    }

    /// Transpose of a 2-D tensor.
    pub fn t(&self) -> Result<Self> {
        if self.rank() != 2 {
            return Err(Error::RankMismatch {
                expected: 2,
                got: self.rank(),
            });
        }
        self.transpose(0, 1)
    }

    pub fn narrow(&self, dim: usize, start: usize, len: usize) -> Result<Self> {
        let layout = self.inner.layout.narrow(dim, start, len)?;
        Ok(self.view_with_layout(layout))
    }

    /// Drop dimension `dim`, which must have size 1.
    pub fn squeeze(&self, dim: usize) -> Result<Self> {
        let layout = self.inner.layout.squeeze(dim)?;
        Ok(self.view_with_layout(layout))
    }

    /// Insert a size-1 dimension at `dim`.
    pub fn unsqueeze(&self, dim: usize) -> Result<Self> {
        if dim > self.rank() {
            return Err(Error::DimOutOfRange {
                dim,
                rank: self.rank(),
            });
        }
        let mut dims = self.dims().to_vec();
        let mut strides = self.inner.layout.strides().to_vec();
        let stride = strides.get(dim).map_or(1, |&s| s * dims[dim]);
        dims.insert(dim, 1);
        strides.insert(dim, stride);
        let layout = Layout::new(Shape::new(dims), strides, self.inner.layout.offset());
        Ok(self.view_with_layout(layout))
    }

    /// Row `index` along dim 0, with the leading dimension removed.
    pub fn get(&self, index: usize) -> Result<Self> {
        let len = self.shape().dim(0)?;
        if index >= len {
            return Err(Error::IndexOutOfBounds { index, len });
        }
        self.narrow(0, index, 1)?.squeeze(0)
    }

    /// Reshape to `new_shape` (same element count). Non-contiguous inputs are
    /// copied first.
    pub fn reshape(&self, new_shape: impl Into<Shape>) -> Result<Self> {
        let new_shape = new_shape.into();
        if new_shape.elem_count() != self.elem_count() {
            return Err(Error::ReshapeElementMismatch {
                src: self.elem_count(),
                dst: new_shape.elem_count(),
                dst_shape: new_shape,
            });
        }
        let base = self.contiguous()?;
        Ok(base.view_with_layout(Layout::contiguous(new_shape)))
    }

    /// Collapse dims `start_dim..` into one: `[N, C, H, W].flatten_from(1)` → `[N, C*H*W]`.
    pub fn flatten_from(&self, start_dim: usize) -> Result<Self> {
        if start_dim >= self.rank() {
            return Err(Error::DimOutOfRange {
                dim: start_dim,
                rank: self.rank(),
            });
        }
        let mut dims = self.dims()[..start_dim].to_vec();
        dims.push(self.dims()[start_dim..].iter().product());
        self.reshape(dims)
    }

    /// A contiguous tensor with the same values; `self` if already contiguous.
    pub fn contiguous(&self) -> Result<Self> {
        if self.is_contiguous() {
            return Ok(self.clone());
        }
        let storage = B::to_contiguous(&self.inner.storage, &self.inner.layout)?;
        Ok(self.derived(
            storage,
            self.shape().clone(),
            self.dtype(),
            Op::View {
                input: self.clone(),
            },
        ))
    }

    /// This tensor's layout stretched to `target` (stride 0 on broadcast dims).
    fn broadcast_layout(&self, target: &Shape) -> Layout {
        let own = self.inner.layout.strides();
        let offset = target.rank() - self.rank();
        let mut strides = vec![0usize; target.rank()];
        for (i, &d) in self.dims().iter().enumerate() {
            if d == target.dims()[i + offset] {
                strides[i + offset] = own[i];
            }
        }
        Layout::new(target.clone(), strides, self.inner.layout.offset())
    }

    fn check_same_dtype(&self, rhs: &Self) -> Result<()> {
        if self.dtype() != rhs.dtype() {
            return Err(Error::DTypeMismatch {
                expected: self.dtype(),
                got: rhs.dtype(),
            });
        }
        Ok(())
    }

    // Element-wise binary ops (with broadcasting)

    fn binary(&self, rhs: &Self, op: BinaryOp) -> Result<Self> {
        self.check_same_dtype(rhs)?;
        let out_shape = Shape::broadcast_shape(self.shape(), rhs.shape())?;
        let storage = B::binary_op(
            op,
            &self.inner.storage,
            &self.broadcast_layout(&out_shape),
            &rhs.inner.storage,
            &rhs.broadcast_layout(&out_shape),
        )?;
        Ok(self.derived(
            storage,
            out_shape,
            self.dtype(),
            Op::Binary {
                lhs: self.clone(),
                rhs: rhs.clone(),
                op,
            },
        ))
    }

    pub fn add(&self, rhs: &Self) -> Result<Self> {
        self.binary(rhs, BinaryOp::Add)
    }

    pub fn sub(&self, rhs: &Self) -> Result<Self> {
        self.binary(rhs, BinaryOp::Sub)
    }

    pub fn mul(&self, rhs: &Self) -> Result<Self> {
        self.binary(rhs, BinaryOp::Mul)
    }

    pub fn div(&self, rhs: &Self) -> Result<Self> {
        self.binary(rhs, BinaryOp::Div)
    }

    // Comparisons (U8 masks, never tracked)

    fn compare(&self, rhs: &Self, op: CmpOp) -> Result<Self> {
        self.check_same_dtype(rhs)?;
        let out_shape = Shape::broadcast_shape(self.shape(), rhs.shape())?;
        let storage = B::cmp_op(
            op,
            &self.inner.storage,
            &self.broadcast_layout(&out_shape),
            &rhs.inner.storage,
            &rhs.broadcast_layout(&out_shape),
        )?;
        Ok(self.derived(storage, out_shape, DType::U8, Op::None))
    }

    pub fn eq(&self, rhs: &Self) -> Result<Self> {
        self.compare(rhs, CmpOp::Eq)
    }

    pub fn ne(&self, rhs: &Self) -> Result<Self> {
        self.compare(rhs, CmpOp::Ne)
    }

    pub fn gt(&self, rhs: &Self) -> Result<Self> {
        self.compare(rhs, CmpOp::Gt)
    }

    pub fn ge(&self, rhs: &Self) -> Result<Self> {
        self.compare(rhs, CmpOp::Ge)
    }

    pub fn lt(&self, rhs: &Self) -> Result<Self> {
        self.compare(rhs, CmpOp::Lt)
    }

    pub fn le(&self, rhs: &Self) -> Result<Self> {
        self.compare(rhs, CmpOp::Le)
    }

    // Unary ops

    fn unary(&self, op: UnaryOp) -> Result<Self> {
        let storage = B::unary_op(op, &self.inner.storage, &self.inner.layout)?;
        Ok(self.derived(
            storage,
            self.shape().clone(),
            self.dtype(),
            Op::Unary {
                input: self.clone(),
                op,
            },
        ))
    }

    pub fn neg(&self) -> Result<Self> {
        self.unary(UnaryOp::Neg)
    }

    pub fn exp(&self) -> Result<Self> {
        self.unary(UnaryOp::Exp)
    }

    pub fn sqrt(&self) -> Result<Self> {
        self.unary(UnaryOp::Sqrt)
    }

    pub fn relu(&self) -> Result<Self> {
        self.unary(UnaryOp::Relu)
    }

    pub fn sigmoid(&self) -> Result<Self> {
        self.unary(UnaryOp::Sigmoid)
    }

    pub fn tanh(&self) -> Result<Self> {
        self.unary(UnaryOp::Tanh)
    }

    /// `self * mul + add`, element-wise.
    pub fn affine(&self, mul: f64, add: f64) -> Result<Self> {
        let storage = B::affine(&self.inner.storage, &self.inner.layout, mul, add)?;
        Ok(self.derived(
            storage,
            self.shape().clone(),
            self.dtype(),
            Op::Affine {
                input: self.clone(),
                mul,
                add,
            },
        ))
    }

    /// Pick from `on_true` where `mask != 0`, else from `on_false`.
    /// All three broadcast to a common shape.
    pub fn where_cond(mask: &Self, on_true: &Self, on_false: &Self) -> Result<Self> {
        on_true.check_same_dtype(on_false)?;
        let shape = Shape::broadcast_shape(on_true.shape(), on_false.shape())?;
        let shape = Shape::broadcast_shape(&shape, mask.shape())?;
        let storage = B::where_cond(
            &mask.inner.storage,
            &mask.broadcast_layout(&shape),
            &on_true.inner.storage,
            &on_true.broadcast_layout(&shape),
            &on_false.inner.storage,
            &on_false.broadcast_layout(&shape),
        )?;
        Ok(on_true.derived(
            storage,
            shape,
            on_true.dtype(),
            Op::WhereCond {
                on_true: on_true.clone(),
                on_false: on_false.clone(),
            },
        ))
    }

    // Reductions

    fn reduce(&self, op: ReduceOp, dim: usize, keep_dim: bool) -> Result<Self> {
        if dim >= self.rank() {
            return Err(Error::DimOutOfRange {
                dim,
                rank: self.rank(),
            });
        }
        let storage = B::reduce_op(op, &self.inner.storage, &self.inner.layout, dim, keep_dim)?;
        let mut dims = self.dims().to_vec();
        if keep_dim {
            dims[dim] = 1;
        } else {
            dims.remove(dim);
        }
        Ok(self.derived(
            storage,
            Shape::new(dims),
            self.dtype(),
            Op::Reduce {
                input: self.clone(),
                op,
                dim,
            },
        ))
    }

    pub fn sum(&self, dim: usize, keep_dim: bool) -> Result<Self> {
        self.reduce(ReduceOp::Sum, dim, keep_dim)
    }

    pub fn mean(&self, dim: usize, keep_dim: bool) -> Result<Self> {
        self.reduce(ReduceOp::Mean, dim, keep_dim)
    }

    // Matmul

    /// `[m, k] @ [k, n]` → `[m, n]`.
    pub fn matmul(&self, rhs: &Self) -> Result<Self> {
        for t in [self, rhs] {
            if t.rank() != 2 {
                return Err(Error::RankMismatch {
                    expected: 2,
                    got: t.rank(),
                });
            }
        }
        self.check_same_dtype(rhs)?;
        let (m, k1) = (self.dims()[0], self.dims()[1]);
        let (k2, n) = (rhs.dims()[0], rhs.dims()[1]);
        if k1 != k2 {
            return Err(Error::MatmulShapeMismatch { m, k1, k2, n });
        }
        let storage = B::matmul(
            &self.inner.storage,
            &self.inner.layout,
            &rhs.inner.storage,
            &rhs.inner.layout,
        )?;
        Ok(self.derived(
            storage,
            Shape::from((m, n)),
            self.dtype(),
            Op::Matmul {
                lhs: self.clone(),
                rhs: rhs.clone(),
            },
        ))
    }

    // Concatenation

    /// Concatenate tensors along `dim`.
    ///
    /// All inputs must share rank, dtype and every size except `dim`. The
    /// result is one fresh contiguous buffer on the first input's device.
    /// An empty list is an error, never an empty tensor.
    pub fn cat(tensors: &[Self], dim: usize) -> Result<Self> {
        let first = tensors
            .first()
            .ok_or(Error::EmptyTensorList { op: "cat" })?;
        let rank = first.rank();
        if dim >= rank {
            return Err(Error::DimOutOfRange { dim, rank });
        }

        for (i, t) in tensors.iter().enumerate().skip(1) {
            if t.rank() != rank {
                return Err(Error::RankMismatch {
                    expected: rank,
                    got: t.rank(),
                });
            }
            first.check_same_dtype(t)?;
            let differs = (0..rank).any(|d| d != dim && t.dims()[d] != first.dims()[d]);
            if differs {
                return Err(Error::CatShapeMismatch {
                    index: i,
                    dim,
                    expected: first.shape().clone(),
                    got: t.shape().clone(),
                });
            }
        }

        let mut out_dims = first.dims().to_vec();
        out_dims[dim] = tensors.iter().map(|t| t.dims()[dim]).sum();
        let out_shape = Shape::new(out_dims);

        let pairs: Vec<(&B::Storage, &Layout)> = tensors
            .iter()
            .map(|t| (&*t.inner.storage, &t.inner.layout))
            .collect();
        let storage = B::cat(&pairs, &out_shape, dim)?;
        Ok(first.derived(
            storage,
            out_shape,
            first.dtype(),
            Op::Cat {
                inputs: tensors.to_vec(),
                dim,
            },
        ))
    }

    // Data extraction

    /// All elements as flat f64, in row-major logical order.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        B::to_f64_vec(&self.inner.storage, &self.inner.layout)
    }

    /// All elements converted to `T`, in row-major logical order. Reading
    /// back in the tensor's own dtype is exact.
    pub fn to_vec<T: WithDType>(&self) -> Result<Vec<T>> {
        B::to_vec(&self.inner.storage, &self.inner.layout)
    }

    /// The single element of a one-element tensor.
    pub fn to_scalar_f64(&self) -> Result<f64> {
        if self.elem_count() != 1 {
            return Err(Error::NotAScalar {
                shape: self.shape().clone(),
            });
        }
        Ok(self.to_f64_vec()?[0])
    }

    /// Convert to another dtype (a copy on the same device).
    pub fn to_dtype(&self, dtype: DType) -> Result<Self> {
        if self.dtype() == dtype {
            return Ok(self.clone());
        }
        let storage = B::cast(
            &self.inner.storage,
            &self.inner.layout,
            dtype,
            self.device(),
        )?;
        Ok(self.derived(storage, self.shape().clone(), dtype, Op::None))
    }

    // Graph

    /// Same data and layout, no graph: fresh id, `Op::None`, not a variable.
    pub fn detach(&self) -> Self {
        self.view_with_layout_and_op(self.inner.layout.clone(), Op::None)
    }

    // Device movement

    /// Copy onto `device`. Returns `self` unchanged when already there.
    ///
    /// Fails if the destination cannot hold the data.
    pub fn to_device(&self, device: &B::Device) -> Result<Self> {
        if self.device() == device {
            return Ok(self.clone());
        }
        let storage = B::transfer(&self.inner.storage, &self.inner.layout, device)?;
        let op = Self::record(Op::ToDevice {
            input: self.clone(),
        });
        Ok(Self::from_storage(
            storage,
            Layout::contiguous(self.shape().clone()),
            self.dtype(),
            device.clone(),
            op,
        ))
    }

    /// Copy onto the backend's host device.
    pub fn to_host(&self) -> Result<Self> {
        self.to_device(&B::host_device())
    }
}
