//! # headstart-cpu
//!
//! CPU backend for headstart.
//!
//! `CpuStorage` holds one typed `Vec` per dtype. Kernels read their inputs
//! through `Layout::strided_indices`, so transposed, narrowed and broadcast
//! views are handled without an explicit copy, and always write a fresh
//! contiguous buffer. Arithmetic runs in f64 and is narrowed back to the
//! storage dtype. Copies (`to_contiguous`, `cat`, `transfer`) move elements
//! in their own type, and casts convert element by element without a f64
//! detour when the value fits, so I64 labels stay exact. Matmul splits
//! output rows across the rayon pool.
//!
//! ## Devices
//!
//! A [`CpuDevice`] is a logical placement in host memory, identified by an
//! ordinal; ordinal 0 is the host. All CPU devices are readable by every
//! kernel, so operands on different CPU devices combine freely. A device may
//! carry a per-allocation byte limit; creating or transferring a buffer that
//! exceeds it fails with [`Error::AllocationFailed`], which is how a caller
//! observes a placement failure.

use rand::Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;

use headstart_core::backend::{
    Backend, BackendDevice, BackendStorage, BinaryOp, CmpOp, ReduceOp, UnaryOp,
};
use headstart_core::dtype::{DType, WithDType};
use headstart_core::error::{Error, Result};
use headstart_core::layout::Layout;
use headstart_core::shape::Shape;
use headstart_core::tensor::Tensor;

/// Convenience alias for tensors on the CPU backend.
pub type CpuTensor = Tensor<CpuBackend>;

// CpuDevice

/// A logical CPU placement. `CpuDevice::host()` is ordinal 0 with no limit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CpuDevice {
    ordinal: usize,
    alloc_limit: Option<usize>,
}

impl CpuDevice {
    /// The host device.
    pub fn host() -> Self {
        Self::default()
    }

    /// A CPU device with the given ordinal (0 is the host).
    pub fn new(ordinal: usize) -> Self {
        CpuDevice {
            ordinal,
            alloc_limit: None,
        }
    }

    /// Refuse single allocations larger than `bytes`.
    pub fn with_alloc_limit(mut self, bytes: usize) -> Self {
        self.alloc_limit = Some(bytes);
        self
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn alloc_limit(&self) -> Option<usize> {
        self.alloc_limit
    }

    fn check_alloc(&self, elems: usize, dtype: DType) -> Result<()> {
        let requested = elems * dtype.size_in_bytes();
        match self.alloc_limit {
            Some(limit) if requested > limit => Err(Error::AllocationFailed {
                device: self.name(),
                requested,
                limit,
            }),
            _ => Ok(()),
        }
    }
}

impl BackendDevice for CpuDevice {
    fn name(&self) -> String {
        format!("cpu:{}", self.ordinal)
    }

    fn is_host(&self) -> bool {
        self.ordinal == 0
    }
}

// CpuStorage

/// Host memory for each supported dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum CpuStorage {
    F32(Vec<f32>),
    F64(Vec<f64>),
    U8(Vec<u8>),
    U32(Vec<u32>),
    I64(Vec<i64>),
}

impl CpuStorage {
    /// Build storage of `dtype` from f64 values (saturating for integers).
    pub fn from_f64_vec(data: Vec<f64>, dtype: DType) -> Self {
        match dtype {
            DType::F32 => CpuStorage::F32(data.into_iter().map(|v| v as f32).collect()),
            DType::F64 => CpuStorage::F64(data),
            DType::U8 => CpuStorage::U8(data.into_iter().map(|v| v as u8).collect()),
            DType::U32 => CpuStorage::U32(data.into_iter().map(|v| v as u32).collect()),
            DType::I64 => CpuStorage::I64(data.into_iter().map(|v| v as i64).collect()),
        }
    }

    /// Build storage of `dtype` from native values of any element type.
    pub fn from_values<S: WithDType>(values: impl Iterator<Item = S>, dtype: DType) -> Self {
        match dtype {
            DType::F32 => CpuStorage::F32(values.map(f32::from_native).collect()),
            DType::F64 => CpuStorage::F64(values.map(f64::from_native).collect()),
            DType::U8 => CpuStorage::U8(values.map(u8::from_native).collect()),
            DType::U32 => CpuStorage::U32(values.map(u32::from_native).collect()),
            DType::I64 => CpuStorage::I64(values.map(i64::from_native).collect()),
        }
    }

    fn get_f64(&self, i: usize) -> f64 {
        match self {
            CpuStorage::F32(v) => v[i] as f64,
            CpuStorage::F64(v) => v[i],
            CpuStorage::U8(v) => v[i] as f64,
            CpuStorage::U32(v) => v[i] as f64,
            CpuStorage::I64(v) => v[i] as f64,
        }
    }

    fn check_bounds(&self, layout: &Layout) -> Result<()> {
        match layout.strided_indices().max() {
            Some(max) if max >= self.len() => Err(Error::IndexOutOfBounds {
                index: max,
                len: self.len(),
            }),
            _ => Ok(()),
        }
    }

    /// The elements visible through `layout`, in logical order.
    fn gather_f64(&self, layout: &Layout) -> Result<Vec<f64>> {
        self.check_bounds(layout)?;
        Ok(layout
            .strided_indices()
            .map(|i| self.get_f64(i))
            .collect())
    }

    /// Same as `gather_f64` but keeps the element type.
    fn gather(&self, layout: &Layout) -> Result<CpuStorage> {
        self.check_bounds(layout)?;
        Ok(match self {
            CpuStorage::F32(v) => CpuStorage::F32(pick(v, layout)),
            CpuStorage::F64(v) => CpuStorage::F64(pick(v, layout)),
            CpuStorage::U8(v) => CpuStorage::U8(pick(v, layout)),
            CpuStorage::U32(v) => CpuStorage::U32(pick(v, layout)),
            CpuStorage::I64(v) => CpuStorage::I64(pick(v, layout)),
        })
    }

    /// The elements visible through `layout`, converted to `dtype`.
    fn convert(&self, layout: &Layout, dtype: DType) -> Result<CpuStorage> {
        self.check_bounds(layout)?;
        let idx = layout.strided_indices();
        Ok(match self {
            CpuStorage::F32(v) => Self::from_values(idx.map(|i| v[i]), dtype),
            CpuStorage::F64(v) => Self::from_values(idx.map(|i| v[i]), dtype),
            CpuStorage::U8(v) => Self::from_values(idx.map(|i| v[i]), dtype),
            CpuStorage::U32(v) => Self::from_values(idx.map(|i| v[i]), dtype),
            CpuStorage::I64(v) => Self::from_values(idx.map(|i| v[i]), dtype),
        })
    }
}

fn pick<T: Copy>(data: &[T], layout: &Layout) -> Vec<T> {
    layout.strided_indices().map(|i| data[i]).collect()
}

/// Element types with a `CpuStorage` variant.
trait CpuElem: WithDType {
    fn slice(storage: &CpuStorage) -> Option<&[Self]>;
    fn wrap(data: Vec<Self>) -> CpuStorage;
}

macro_rules! cpu_elem {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl CpuElem for $ty {
                fn slice(storage: &CpuStorage) -> Option<&[Self]> {
                    match storage {
                        CpuStorage::$variant(v) => Some(v.as_slice()),
                        _ => None,
                    }
                }

                fn wrap(data: Vec<Self>) -> CpuStorage {
                    CpuStorage::$variant(data)
                }
            }
        )*
    };
}

cpu_elem!(f32 => F32, f64 => F64, u8 => U8, u32 => U32, i64 => I64);

/// Interleave contiguous parts: for each outer index, `chunk` elements from
/// every part in order.
fn cat_typed<T: CpuElem>(
    parts: &[(CpuStorage, usize)],
    outer: usize,
    total: usize,
) -> Result<CpuStorage> {
    let slices = parts
        .iter()
        .map(|(s, chunk)| {
            T::slice(s).map(|d| (d, *chunk)).ok_or(Error::DTypeMismatch {
                expected: T::DTYPE,
                got: s.dtype(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let mut out = Vec::with_capacity(total);
    for o in 0..outer {
        for (data, chunk) in &slices {
            out.extend_from_slice(&data[o * chunk..(o + 1) * chunk]);
        }
    }
    Ok(T::wrap(out))
}

impl BackendStorage for CpuStorage {
    fn dtype(&self) -> DType {
        match self {
            CpuStorage::F32(_) => DType::F32,
            CpuStorage::F64(_) => DType::F64,
            CpuStorage::U8(_) => DType::U8,
            CpuStorage::U32(_) => DType::U32,
            CpuStorage::I64(_) => DType::I64,
        }
    }

    fn len(&self) -> usize {
        match self {
            CpuStorage::F32(v) => v.len(),
            CpuStorage::F64(v) => v.len(),
            CpuStorage::U8(v) => v.len(),
            CpuStorage::U32(v) => v.len(),
            CpuStorage::I64(v) => v.len(),
        }
    }
}

// Scalar kernels

fn binary_scalar(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
    }
}

fn unary_scalar(op: UnaryOp, x: f64) -> f64 {
    match op {
        UnaryOp::Neg => -x,
        UnaryOp::Exp => x.exp(),
        UnaryOp::Sqrt => x.sqrt(),
        UnaryOp::Relu => x.max(0.0),
        UnaryOp::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        UnaryOp::Tanh => x.tanh(),
    }
}

fn cmp_scalar(op: CmpOp, a: f64, b: f64) -> bool {
    match op {
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
        CmpOp::Gt => a > b,
        CmpOp::Ge => a >= b,
        CmpOp::Lt => a < b,
        CmpOp::Le => a <= b,
    }
}

// CpuBackend

/// The CPU compute backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl Backend for CpuBackend {
    type Device = CpuDevice;
    type Storage = CpuStorage;

    fn host_device() -> CpuDevice {
        CpuDevice::host()
    }

    fn full(shape: &Shape, val: f64, dtype: DType, device: &CpuDevice) -> Result<CpuStorage> {
        let n = shape.elem_count();
        device.check_alloc(n, dtype)?;
        Ok(CpuStorage::from_f64_vec(vec![val; n], dtype))
    }

    fn from_f64_slice(data: &[f64], dtype: DType, device: &CpuDevice) -> Result<CpuStorage> {
        device.check_alloc(data.len(), dtype)?;
        Ok(CpuStorage::from_f64_vec(data.to_vec(), dtype))
    }

    fn from_slice<T: WithDType>(data: &[T], device: &CpuDevice) -> Result<CpuStorage> {
        device.check_alloc(data.len(), T::DTYPE)?;
        Ok(CpuStorage::from_values(data.iter().copied(), T::DTYPE))
    }

    fn rand_uniform(shape: &Shape, dtype: DType, device: &CpuDevice) -> Result<CpuStorage> {
        let n = shape.elem_count();
        device.check_alloc(n, dtype)?;
        let mut rng = rand::thread_rng();
        let data: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
        Ok(CpuStorage::from_f64_vec(data, dtype))
    }

    fn rand_normal(shape: &Shape, dtype: DType, device: &CpuDevice) -> Result<CpuStorage> {
        let n = shape.elem_count();
        device.check_alloc(n, dtype)?;
        let mut rng = rand::thread_rng();
        let data: Vec<f64> = (0..n).map(|_| rng.sample::<f64, _>(StandardNormal)).collect();
        Ok(CpuStorage::from_f64_vec(data, dtype))
    }

    fn binary_op(
        op: BinaryOp,
        lhs: &CpuStorage,
        lhs_layout: &Layout,
        rhs: &CpuStorage,
        rhs_layout: &Layout,
    ) -> Result<CpuStorage> {
        let a = lhs.gather_f64(lhs_layout)?;
        let b = rhs.gather_f64(rhs_layout)?;
        let out = a
            .iter()
            .zip(&b)
            .map(|(&x, &y)| binary_scalar(op, x, y))
            .collect();
        Ok(CpuStorage::from_f64_vec(out, lhs.dtype()))
    }

    fn unary_op(op: UnaryOp, input: &CpuStorage, layout: &Layout) -> Result<CpuStorage> {
        let out = input
            .gather_f64(layout)?
            .into_iter()
            .map(|x| unary_scalar(op, x))
            .collect();
        Ok(CpuStorage::from_f64_vec(out, input.dtype()))
    }

    fn affine(input: &CpuStorage, layout: &Layout, mul: f64, add: f64) -> Result<CpuStorage> {
        let out = input
            .gather_f64(layout)?
            .into_iter()
            .map(|x| x * mul + add)
            .collect();
        Ok(CpuStorage::from_f64_vec(out, input.dtype()))
    }

    fn cmp_op(
        op: CmpOp,
        lhs: &CpuStorage,
        lhs_layout: &Layout,
        rhs: &CpuStorage,
        rhs_layout: &Layout,
    ) -> Result<CpuStorage> {
        let a = lhs.gather_f64(lhs_layout)?;
        let b = rhs.gather_f64(rhs_layout)?;
        Ok(CpuStorage::U8(
            a.iter()
                .zip(&b)
                .map(|(&x, &y)| u8::from(cmp_scalar(op, x, y)))
                .collect(),
        ))
    }

    fn where_cond(
        mask: &CpuStorage,
        mask_layout: &Layout,
        on_true: &CpuStorage,
        on_true_layout: &Layout,
        on_false: &CpuStorage,
        on_false_layout: &Layout,
    ) -> Result<CpuStorage> {
        let m = mask.gather_f64(mask_layout)?;
        let t = on_true.gather_f64(on_true_layout)?;
        let f = on_false.gather_f64(on_false_layout)?;
        let out = m
            .iter()
            .zip(t.iter().zip(&f))
            .map(|(&c, (&x, &y))| if c != 0.0 { x } else { y })
            .collect();
        Ok(CpuStorage::from_f64_vec(out, on_true.dtype()))
    }

    fn reduce_op(
        op: ReduceOp,
        input: &CpuStorage,
        layout: &Layout,
        dim: usize,
        _keep_dim: bool,
    ) -> Result<CpuStorage> {
        let dims = layout.dims();
        let outer: usize = dims[..dim].iter().product();
        let size = dims[dim];
        let inner: usize = dims[dim + 1..].iter().product();
        let data = input.gather_f64(layout)?;

        let mut out = vec![0.0f64; outer * inner];
        for o in 0..outer {
            for k in 0..size {
                let src = &data[(o * size + k) * inner..(o * size + k + 1) * inner];
                let dst = &mut out[o * inner..(o + 1) * inner];
                for (d, s) in dst.iter_mut().zip(src) {
                    *d += s;
                }
            }
        }
        if op == ReduceOp::Mean {
            let n = size as f64;
            out.iter_mut().for_each(|v| *v /= n);
        }
        Ok(CpuStorage::from_f64_vec(out, input.dtype()))
    }

    fn matmul(
        lhs: &CpuStorage,
        lhs_layout: &Layout,
        rhs: &CpuStorage,
        rhs_layout: &Layout,
    ) -> Result<CpuStorage> {
        let (m, k) = (lhs_layout.dims()[0], lhs_layout.dims()[1]);
        let n = rhs_layout.dims()[1];
        let a = lhs.gather_f64(lhs_layout)?;
        let b = rhs.gather_f64(rhs_layout)?;

        let mut c = vec![0.0f64; m * n];
        if n > 0 {
            c.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
                for p in 0..k {
                    let a_ip = a[i * k + p];
                    let b_row = &b[p * n..(p + 1) * n];
                    for (out, &b_pj) in row.iter_mut().zip(b_row) {
                        *out += a_ip * b_pj;
                    }
                }
            });
        }
        Ok(CpuStorage::from_f64_vec(c, lhs.dtype()))
    }

    fn to_contiguous(input: &CpuStorage, layout: &Layout) -> Result<CpuStorage> {
        if layout.is_contiguous() && layout.elem_count() == input.len() {
            return Ok(input.clone());
        }
        input.gather(layout)
    }

    fn to_f64_vec(input: &CpuStorage, layout: &Layout) -> Result<Vec<f64>> {
        input.gather_f64(layout)
    }

    fn to_vec<T: WithDType>(input: &CpuStorage, layout: &Layout) -> Result<Vec<T>> {
        input.check_bounds(layout)?;
        let idx = layout.strided_indices();
        Ok(match input {
            CpuStorage::F32(v) => idx.map(|i| T::from_native(v[i])).collect(),
            CpuStorage::F64(v) => idx.map(|i| T::from_native(v[i])).collect(),
            CpuStorage::U8(v) => idx.map(|i| T::from_native(v[i])).collect(),
            CpuStorage::U32(v) => idx.map(|i| T::from_native(v[i])).collect(),
            CpuStorage::I64(v) => idx.map(|i| T::from_native(v[i])).collect(),
        })
    }

    fn cat(inputs: &[(&CpuStorage, &Layout)], out_shape: &Shape, dim: usize) -> Result<CpuStorage> {
        let dtype = match inputs.first() {
            Some((s, _)) => s.dtype(),
            None => return Err(Error::EmptyTensorList { op: "cat" }),
        };
        let dims = out_shape.dims();
        let outer: usize = dims[..dim].iter().product();
        let inner: usize = dims[dim + 1..].iter().product();

        let parts: Vec<(CpuStorage, usize)> = inputs
            .iter()
            .map(|(s, l)| Ok((s.gather(l)?, l.dims()[dim] * inner)))
            .collect::<Result<_>>()?;

        let total = out_shape.elem_count();
        match dtype {
            DType::F32 => cat_typed::<f32>(&parts, outer, total),
            DType::F64 => cat_typed::<f64>(&parts, outer, total),
            DType::U8 => cat_typed::<u8>(&parts, outer, total),
            DType::U32 => cat_typed::<u32>(&parts, outer, total),
            DType::I64 => cat_typed::<i64>(&parts, outer, total),
        }
    }

    fn cast(
        input: &CpuStorage,
        layout: &Layout,
        dtype: DType,
        device: &CpuDevice,
    ) -> Result<CpuStorage> {
        device.check_alloc(layout.elem_count(), dtype)?;
        input.convert(layout, dtype)
    }

    /// Dtype-preserving copy; re-checks the destination's allocation limit.
    fn transfer(input: &CpuStorage, layout: &Layout, dst: &CpuDevice) -> Result<CpuStorage> {
        dst.check_alloc(layout.elem_count(), input.dtype())?;
        Self::to_contiguous(input, layout)
    }
}
