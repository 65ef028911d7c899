// Tensor tests on the CPU backend: views, arithmetic, concatenation,
// graph tracking and device movement.

use headstart_core::{no_grad, DType, Error, Result, Shape};
use headstart_cpu::{CpuDevice, CpuTensor};

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() < tol
}

fn assert_vec_approx(got: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(got.len(), expected.len(), "length mismatch");
    for (i, (g, e)) in got.iter().zip(expected).enumerate() {
        assert!(approx_eq(*g, *e, tol), "index {i}: got {g} expected {e}");
    }
}

fn matrix(rows: usize, cols: usize, dev: &CpuDevice) -> Result<CpuTensor> {
    let data: Vec<f64> = (0..rows * cols).map(|i| i as f64).collect();
    CpuTensor::from_f64_slice(&data, (rows, cols), DType::F64, dev)
}

// Creation

#[test]
fn test_from_slice_follows_element_type() -> Result<()> {
    let dev = CpuDevice::host();
    let labels = CpuTensor::from_slice(&[3i64, 1, 4], 3, &dev)?;
    assert_eq!(labels.dtype(), DType::I64);
    assert_eq!(labels.to_vec::<i64>()?, vec![3, 1, 4]);
    Ok(())
}

#[test]
fn test_element_count_mismatch() {
    let dev = CpuDevice::host();
    let r = CpuTensor::from_f64_slice(&[1.0, 2.0, 3.0], (2, 2), DType::F32, &dev);
    assert!(matches!(r, Err(Error::ElementCountMismatch { .. })));
}

// Views

#[test]
fn test_transpose_and_contiguous() -> Result<()> {
    let dev = CpuDevice::host();
    let m = matrix(2, 3, &dev)?;
    let t = m.t()?;
    assert_eq!(t.dims(), &[3, 2]);
    assert!(!t.is_contiguous());
    assert_eq!(t.to_f64_vec()?, vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    let c = t.contiguous()?;
    assert!(c.is_contiguous());
    assert_eq!(c.to_f64_vec()?, t.to_f64_vec()?);
    Ok(())
}

#[test]
fn test_get_row() -> Result<()> {
    let dev = CpuDevice::host();
    let m = matrix(4, 3, &dev)?;
    let row = m.get(2)?;
    assert_eq!(row.dims(), &[3]);
    assert_eq!(row.to_f64_vec()?, vec![6.0, 7.0, 8.0]);
    assert!(matches!(
        m.get(4),
        Err(Error::IndexOutOfBounds { index: 4, len: 4 })
    ));
    Ok(())
}

#[test]
fn test_get_on_vector_yields_scalar() -> Result<()> {
    let dev = CpuDevice::host();
    let v = CpuTensor::from_slice(&[5i64, 6, 7], 3, &dev)?;
    let s = v.get(1)?;
    assert_eq!(s.rank(), 0);
    assert_eq!(s.to_scalar_f64()?, 6.0);
    Ok(())
}

#[test]
fn test_reshape_and_flatten() -> Result<()> {
    let dev = CpuDevice::host();
    let x = CpuTensor::arange(24, DType::F32, &dev)?.reshape((2, 3, 4))?;
    let flat = x.flatten_from(1)?;
    assert_eq!(flat.dims(), &[2, 12]);
    assert!(matches!(
        x.reshape((5, 5)),
        Err(Error::ReshapeElementMismatch { .. })
    ));
    // Reshape of a non-contiguous view copies first.
    let m = matrix(2, 3, &dev)?;
    let r = m.t()?.reshape(6)?;
    assert_eq!(r.to_f64_vec()?, vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    Ok(())
}

#[test]
fn test_unsqueeze() -> Result<()> {
    let dev = CpuDevice::host();
    let v = CpuTensor::arange(3, DType::F64, &dev)?;
    assert_eq!(v.unsqueeze(0)?.dims(), &[1, 3]);
    assert_eq!(v.unsqueeze(1)?.dims(), &[3, 1]);
    assert_eq!(v.unsqueeze(1)?.to_f64_vec()?, vec![0.0, 1.0, 2.0]);
    Ok(())
}

// Arithmetic

#[test]
fn test_broadcast_add_bias() -> Result<()> {
    let dev = CpuDevice::host();
    let x = matrix(2, 3, &dev)?;
    let bias = CpuTensor::from_f64_slice(&[10.0, 20.0, 30.0], (1, 3), DType::F64, &dev)?;
    let y = x.add(&bias)?;
    assert_eq!(y.to_f64_vec()?, vec![10.0, 21.0, 32.0, 13.0, 24.0, 35.0]);
    Ok(())
}

#[test]
fn test_dtype_mismatch() -> Result<()> {
    let dev = CpuDevice::host();
    let a = CpuTensor::ones(3, DType::F32, &dev)?;
    let b = CpuTensor::ones(3, DType::F64, &dev)?;
    assert!(matches!(a.add(&b), Err(Error::DTypeMismatch { .. })));
    Ok(())
}

#[test]
fn test_unary_ops() -> Result<()> {
    let dev = CpuDevice::host();
    let x = CpuTensor::from_f64_slice(&[-1.0, 0.0, 2.0], 3, DType::F64, &dev)?;
    assert_eq!(x.relu()?.to_f64_vec()?, vec![0.0, 0.0, 2.0]);
    assert_vec_approx(&x.sigmoid()?.to_f64_vec()?, &[0.268941, 0.5, 0.880797], 1e-5);
    assert_vec_approx(&x.tanh()?.to_f64_vec()?, &[-0.761594, 0.0, 0.964028], 1e-5);
    assert_eq!(x.affine(2.0, 1.0)?.to_f64_vec()?, vec![-1.0, 1.0, 5.0]);
    Ok(())
}

#[test]
fn test_matmul() -> Result<()> {
    let dev = CpuDevice::host();
    let a = matrix(2, 3, &dev)?;
    let b = matrix(3, 2, &dev)?;
    let c = a.matmul(&b)?;
    assert_eq!(c.dims(), &[2, 2]);
    // [[0,1,2],[3,4,5]] @ [[0,1],[2,3],[4,5]]
    assert_eq!(c.to_f64_vec()?, vec![10.0, 13.0, 28.0, 40.0]);
    Ok(())
}

#[test]
fn test_matmul_shape_mismatch() -> Result<()> {
    let dev = CpuDevice::host();
    let a = matrix(2, 3, &dev)?;
    assert!(matches!(
        a.matmul(&a),
        Err(Error::MatmulShapeMismatch {
            m: 2,
            k1: 3,
            k2: 2,
            n: 3
        })
    ));
    Ok(())
}

#[test]
fn test_mean_over_batch() -> Result<()> {
    let dev = CpuDevice::host();
    let x = matrix(2, 3, &dev)?;
    let m = x.mean(0, false)?;
    assert_eq!(m.dims(), &[3]);
    assert_eq!(m.to_f64_vec()?, vec![1.5, 2.5, 3.5]);
    assert_eq!(x.sum(1, true)?.dims(), &[2, 1]);
    Ok(())
}

#[test]
fn test_where_cond_with_mask() -> Result<()> {
    let dev = CpuDevice::host();
    let x = CpuTensor::from_f64_slice(&[0.1, 0.9, 0.5], 3, DType::F64, &dev)?;
    let half = CpuTensor::full(3, 0.5, DType::F64, &dev)?;
    let mask = x.ge(&half)?;
    assert_eq!(mask.dtype(), DType::U8);
    let zeros = CpuTensor::zeros_like(&x)?;
    let y = CpuTensor::where_cond(&mask, &x, &zeros)?;
    assert_eq!(y.to_f64_vec()?, vec![0.0, 0.9, 0.5]);
    Ok(())
}

// Concatenation

#[test]
fn test_cat_along_batch() -> Result<()> {
    let dev = CpuDevice::host();
    let a = matrix(4, 10, &dev)?;
    let b = matrix(3, 10, &dev)?;
    let c = CpuTensor::cat(&[a.clone(), b.clone()], 0)?;
    assert_eq!(c.dims(), &[7, 10]);
    assert_eq!(c.get(4)?.to_f64_vec()?, b.get(0)?.to_f64_vec()?);
    assert_eq!(c.get(3)?.to_f64_vec()?, a.get(3)?.to_f64_vec()?);
    Ok(())
}

#[test]
fn test_cat_inner_dim() -> Result<()> {
    let dev = CpuDevice::host();
    let a = matrix(2, 2, &dev)?;
    let b = matrix(2, 1, &dev)?;
    let c = CpuTensor::cat(&[a, b], 1)?;
    assert_eq!(c.to_f64_vec()?, vec![0.0, 1.0, 0.0, 2.0, 3.0, 1.0]);
    Ok(())
}

#[test]
fn test_large_i64_ids_survive_cat_and_moves() -> Result<()> {
    let host = CpuDevice::host();
    let other = CpuDevice::new(2);
    let base = 1i64 << 53;
    let a = CpuTensor::from_slice(&[base + 1, base + 3], 2, &other)?;
    let b = CpuTensor::from_slice(&[base + 5], 1, &other)?;

    let ids = CpuTensor::cat(&[a.to_host()?, b.to_host()?], 0)?;
    assert_eq!(ids.device(), &host);
    assert_eq!(ids.to_vec::<i64>()?, vec![base + 1, base + 3, base + 5]);
    // A strided view moved to another device keeps every id.
    let pairs = ids.narrow(0, 0, 2)?.reshape((2, 1))?.t()?;
    assert_eq!(
        pairs.to_device(&other)?.to_vec::<i64>()?,
        vec![base + 1, base + 3]
    );
    Ok(())
}

#[test]
fn test_cat_errors() -> Result<()> {
    let dev = CpuDevice::host();
    assert!(matches!(
        CpuTensor::cat(&[], 0),
        Err(Error::EmptyTensorList { op: "cat" })
    ));
    let a = matrix(2, 10, &dev)?;
    let b = matrix(2, 8, &dev)?;
    assert!(matches!(
        CpuTensor::cat(&[a, b], 0),
        Err(Error::CatShapeMismatch { index: 1, .. })
    ));
    Ok(())
}

// Graph tracking

#[test]
fn test_results_of_variables_require_grad() -> Result<()> {
    let dev = CpuDevice::host();
    let w = CpuTensor::ones((3, 2), DType::F64, &dev)?.set_variable();
    let x = matrix(2, 3, &dev)?;
    assert!(w.requires_grad());
    assert!(!x.requires_grad());

    let y = x.matmul(&w)?;
    assert!(y.requires_grad());
    assert_eq!(y.op().inputs().len(), 2);

    let d = y.detach();
    assert!(!d.requires_grad());
    assert_ne!(d.id(), y.id());
    assert_eq!(d.to_f64_vec()?, y.to_f64_vec()?);
    Ok(())
}

#[test]
fn test_no_grad_skips_recording() -> Result<()> {
    let dev = CpuDevice::host();
    let w = CpuTensor::ones((3, 2), DType::F64, &dev)?.set_variable();
    let x = matrix(2, 3, &dev)?;
    let y = no_grad(|| x.matmul(&w)?.relu())?;
    assert!(!y.requires_grad());
    assert!(y.op().is_none());
    Ok(())
}

// Device movement

#[test]
fn test_to_device_and_back() -> Result<()> {
    let host = CpuDevice::host();
    let accel = CpuDevice::new(1);
    let x = matrix(2, 3, &host)?;
    assert!(x.is_host());

    let moved = x.t()?.to_device(&accel)?;
    assert_eq!(moved.device(), &accel);
    assert!(!moved.is_host());
    assert!(moved.is_contiguous());
    assert_eq!(moved.dtype(), DType::F64);

    let back = moved.to_host()?;
    assert!(back.is_host());
    assert_eq!(back.to_f64_vec()?, x.t()?.to_f64_vec()?);
    Ok(())
}

#[test]
fn test_to_same_device_is_noop() -> Result<()> {
    let host = CpuDevice::host();
    let x = matrix(2, 2, &host)?;
    assert_eq!(x.to_host()?.id(), x.id());
    Ok(())
}

#[test]
fn test_placement_failure() -> Result<()> {
    let host = CpuDevice::host();
    let small = CpuDevice::new(1).with_alloc_limit(32);
    let x = CpuTensor::zeros(Shape::from((4, 4)), DType::F32, &host)?;
    let err = x.to_device(&small).unwrap_err();
    assert!(matches!(err, Error::AllocationFailed { requested: 64, .. }));
    assert!(x.narrow(0, 0, 2)?.to_device(&small).is_ok());
    Ok(())
}
