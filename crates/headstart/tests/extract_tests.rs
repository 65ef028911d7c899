// End-to-end tests for feature extraction on the CPU backend.

use std::cell::Cell;

use headstart::data::Batches;
use headstart::prelude::*;
use headstart::telemetry::{init_tracing, InitError};
use headstart::{Error, Result};

fn assert_vec_approx(got: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(got.len(), expected.len(), "length mismatch");
    for (i, (g, e)) in got.iter().zip(expected).enumerate() {
        assert!((g - e).abs() < tol, "index {i}: got {g} expected {e}");
    }
}

/// Batches of `sizes` rows, 8 input features each, labels numbered from 0.
fn batches(sizes: &[usize], dev: &CpuDevice) -> Result<Vec<(CpuTensor, CpuTensor)>> {
    let mut out = Vec::new();
    let mut next_label = 0i64;
    for &n in sizes {
        let x = CpuTensor::rand((n, 8), DType::F32, dev)?;
        let labels: Vec<i64> = (next_label..next_label + n as i64).collect();
        next_label += n as i64;
        out.push((x, CpuTensor::from_slice(&labels, n, dev)?));
    }
    Ok(out)
}

fn backbone(dev: &CpuDevice) -> Result<Sequential<CpuBackend>> {
    Ok(Sequential::new()
        .add(Linear::new(8, 16, true, DType::F32, dev)?)
        .add(BatchNorm1d::new(16, 1e-5, 0.1, DType::F32, dev)?)
        .add(ReLU)
        .add(Dropout::new(0.5)?)
        .add(Linear::new(16, 10, true, DType::F32, dev)?))
}

// Counts forward passes and remembers the mode it ran in.
struct CountingModel {
    inner: Linear<CpuBackend>,
    training: Cell<bool>,
    calls: Cell<usize>,
    calls_in_train_mode: Cell<usize>,
}

impl CountingModel {
    fn new(dev: &CpuDevice) -> Result<Self> {
        Ok(CountingModel {
            inner: Linear::new(8, 10, true, DType::F32, dev)?,
            training: Cell::new(true),
            calls: Cell::new(0),
            calls_in_train_mode: Cell::new(0),
        })
    }
}

impl Module<CpuBackend> for CountingModel {
    fn forward(&self, x: &CpuTensor) -> Result<CpuTensor> {
        self.calls.set(self.calls.get() + 1);
        if self.training.get() {
            self.calls_in_train_mode
                .set(self.calls_in_train_mode.get() + 1);
        }
        self.inner.forward(x)
    }
    fn parameters(&self) -> Vec<CpuTensor> {
        self.inner.parameters()
    }
    fn set_training(&self, training: bool) {
        self.training.set(training);
    }
    fn is_training(&self) -> bool {
        self.training.get()
    }
}

// Yields one good batch, then an error.
struct FailingSource {
    good: (CpuTensor, CpuTensor),
}

impl BatchSource<CpuBackend> for FailingSource {
    fn batches(&self) -> Batches<'_, CpuBackend> {
        Box::new(
            vec![
                Ok(self.good.clone()),
                Err(Error::msg("corrupt record")),
            ]
            .into_iter(),
        )
    }
}

// Row counts and ordering

#[test]
fn test_batches_of_four_and_three() -> Result<()> {
    let dev = CpuDevice::host();
    let model = backbone(&dev)?;
    let loader = batches(&[4, 3], &dev)?;

    let ds = preprocessed_dataset(&model, &loader, None)?;
    assert_eq!(ds.len(), 7);
    assert_eq!(ds.features().dims(), &[7, 10]);
    for k in 0..7 {
        let (feature, _) = ds.get(k)?;
        assert_eq!(feature.dims(), &[10]);
    }
    Ok(())
}

#[test]
fn test_row_count_is_sum_of_batch_sizes() -> Result<()> {
    let dev = CpuDevice::host();
    let model = backbone(&dev)?;
    let loader = batches(&[1, 5, 2, 2], &dev)?;
    let ds = preprocessed_dataset(&model, &loader, None)?;
    assert_eq!(ds.len(), 10);
    assert_eq!(ds.labels().dims(), &[10]);
    Ok(())
}

#[test]
fn test_labels_keep_loader_order() -> Result<()> {
    let dev = CpuDevice::host();
    let model = backbone(&dev)?;
    let loader = batches(&[3, 3, 2], &dev)?;
    let ds = preprocessed_dataset(&model, &loader, None)?;
    assert_eq!(ds.labels().dtype(), DType::I64);
    assert_eq!(ds.labels().to_vec::<i64>()?, (0..8).collect::<Vec<i64>>());
    Ok(())
}

#[test]
fn test_large_i64_labels_are_exact() -> Result<()> {
    let dev = CpuDevice::host();
    let ids = [(1i64 << 53) + 1, (1i64 << 53) + 3];
    let loader = vec![
        (
            CpuTensor::ones((1, 4), DType::F32, &dev)?,
            CpuTensor::from_slice(&ids[..1], 1, &dev)?,
        ),
        (
            CpuTensor::ones((1, 4), DType::F32, &dev)?,
            CpuTensor::from_slice(&ids[1..], 1, &dev)?,
        ),
    ];
    let ds = preprocessed_dataset(&Flatten, &loader, Some(&dev))?;
    assert_eq!(ds.labels().to_vec::<i64>()?, ids.to_vec());
    Ok(())
}

#[test]
fn test_features_equal_model_output() -> Result<()> {
    let dev = CpuDevice::host();
    let model = backbone(&dev)?;
    let loader = batches(&[4, 3], &dev)?;
    let ds = preprocessed_dataset(&model, &loader, None)?;

    // The model is in eval mode now, so a direct forward is deterministic.
    let mut row = 0;
    for (x, _) in &loader {
        let expected = model.forward(x)?;
        for i in 0..x.dims()[0] {
            assert_vec_approx(
                &ds.get(row)?.0.to_f64_vec()?,
                &expected.get(i)?.to_f64_vec()?,
                1e-6,
            );
            row += 1;
        }
    }
    assert_eq!(row, ds.len());
    Ok(())
}

#[test]
fn test_repeat_calls_are_identical() -> Result<()> {
    let dev = CpuDevice::host();
    let model = backbone(&dev)?;
    let loader = batches(&[4, 4, 1], &dev)?;
    let a = preprocessed_dataset(&model, &loader, None)?;
    let b = preprocessed_dataset(&model, &loader, None)?;
    assert_eq!(a.features().to_f64_vec()?, b.features().to_f64_vec()?);
    assert_eq!(a.labels().to_f64_vec()?, b.labels().to_f64_vec()?);
    Ok(())
}

#[test]
fn test_data_loader_source() -> Result<()> {
    let dev = CpuDevice::host();
    let features: Vec<f64> = (0..40).map(|i| i as f64 / 40.0).collect();
    let targets: Vec<f64> = (0..5).map(|i| (i % 2) as f64).collect();
    let images = VecDataset::from_flat(&features, &[8], &targets, &[], "images")?;
    let loader = DataLoader::<CpuBackend>::new(
        &images,
        dev.clone(),
        DataLoaderConfig::default()
            .batch_size(2)
            .target_dtype(DType::I64),
    );

    let model = backbone(&dev)?;
    let ds = FeatureExtractor::new(ExtractorConfig::<CpuBackend>::default().log_every(1))
        .extract(&model, &loader)?;
    assert_eq!(ds.len(), 5);
    assert_eq!(ds.labels().to_vec::<i64>()?, vec![0, 1, 0, 1, 0]);
    Ok(())
}

// Mode and graph

#[test]
fn test_eval_mode_set_once_and_kept() -> Result<()> {
    let dev = CpuDevice::host();
    let model = CountingModel::new(&dev)?;
    let loader = batches(&[2, 2, 2], &dev)?;
    assert!(model.is_training());

    preprocessed_dataset(&model, &loader, None)?;
    assert_eq!(model.calls.get(), 3);
    assert_eq!(model.calls_in_train_mode.get(), 0);
    assert!(!model.is_training());
    Ok(())
}

#[test]
fn test_no_train_side_effects() -> Result<()> {
    let dev = CpuDevice::host();
    let bn = BatchNorm1d::<CpuBackend>::new(8, 1e-5, 0.1, DType::F32, &dev)?;
    let model = Sequential::new().add(bn);
    let loader = batches(&[4, 3], &dev)?;

    let params_before: Vec<Vec<f64>> = model
        .parameters()
        .iter()
        .map(|p| p.to_f64_vec())
        .collect::<Result<_>>()?;
    preprocessed_dataset(&model, &loader, None)?;
    let params_after: Vec<Vec<f64>> = model
        .parameters()
        .iter()
        .map(|p| p.to_f64_vec())
        .collect::<Result<_>>()?;
    assert_eq!(params_before, params_after);

    // Fresh running stats (mean 0, var 1) mean eval is nearly the identity.
    let (x, _) = &loader[0];
    let ds = preprocessed_dataset(&model, &loader, None)?;
    assert_vec_approx(
        &ds.features().narrow(0, 0, 4)?.to_f64_vec()?,
        &x.to_f64_vec()?,
        1e-4,
    );
    Ok(())
}

#[test]
fn test_features_are_detached() -> Result<()> {
    let dev = CpuDevice::host();
    let model = backbone(&dev)?;
    let loader = batches(&[3], &dev)?;

    // Outside the extractor the output carries graph history.
    assert!(model.forward(&loader[0].0)?.requires_grad());

    let ds = preprocessed_dataset(&model, &loader, None)?;
    assert!(!ds.features().requires_grad());
    assert!(ds.features().op().is_none());
    assert!(!ds.features().is_variable());
    Ok(())
}

// Devices

#[test]
fn test_explicit_device_matches_default() -> Result<()> {
    let host = CpuDevice::host();
    let model = backbone(&host)?;
    let loader = batches(&[4, 3], &host)?;

    let on_default = preprocessed_dataset(&model, &loader, None)?;
    let accel = CpuDevice::new(1);
    let on_accel = preprocessed_dataset(&model, &loader, Some(&accel))?;

    assert!(on_accel.features().is_host());
    assert!(on_accel.labels().is_host());
    assert_vec_approx(
        &on_accel.features().to_f64_vec()?,
        &on_default.features().to_f64_vec()?,
        1e-9,
    );
    Ok(())
}

#[test]
fn test_model_on_other_device_returns_host_features() -> Result<()> {
    let host = CpuDevice::host();
    let accel = CpuDevice::new(2);
    let model = backbone(&accel)?;
    let loader = batches(&[2, 2], &host)?;

    let ds = preprocessed_dataset(&model, &loader, None)?;
    assert_eq!(ds.features().device(), &host);
    assert_eq!(ds.len(), 4);
    Ok(())
}

#[test]
fn test_labels_on_other_device_come_back_to_host() -> Result<()> {
    let host = CpuDevice::host();
    let accel = CpuDevice::new(3);
    let features: Vec<f64> = (0..48).map(|i| i as f64 / 48.0).collect();
    let targets: Vec<f64> = vec![4.0, 0.0, 2.0, 1.0, 3.0, 2.0];
    let images = VecDataset::from_flat(&features, &[8], &targets, &[], "images")?;
    let loader = DataLoader::<CpuBackend>::new(
        &images,
        accel.clone(),
        DataLoaderConfig::default()
            .batch_size(4)
            .target_dtype(DType::I64),
    );
    let (_, first_labels) = loader.batches().next().ok_or(Error::EmptyLoader)??;
    assert_eq!(first_labels.device(), &accel);

    let model = backbone(&host)?;
    let ds = preprocessed_dataset(&model, &loader, None)?;
    assert!(ds.labels().is_host());
    assert_eq!(ds.labels().device(), &host);
    assert_eq!(ds.labels().dtype(), DType::I64);
    assert_eq!(ds.labels().to_vec::<i64>()?, vec![4, 0, 2, 1, 3, 2]);

    // Pre-built batches with ids too large for f64 take the same path.
    let big = (1i64 << 53) + 1;
    let loader = vec![(
        CpuTensor::ones((2, 8), DType::F32, &accel)?,
        CpuTensor::from_slice(&[big, big + 2], 2, &accel)?,
    )];
    let ds = preprocessed_dataset(&model, &loader, None)?;
    assert!(ds.labels().is_host());
    assert_eq!(ds.labels().to_vec::<i64>()?, vec![big, big + 2]);
    Ok(())
}

#[test]
fn test_placement_failure_propagates() -> Result<()> {
    let host = CpuDevice::host();
    let model = backbone(&host)?;
    let loader = batches(&[4], &host)?;
    // [4, 8] f32 needs 128 bytes.
    let tiny = CpuDevice::new(1).with_alloc_limit(64);

    let err = preprocessed_dataset(&model, &loader, Some(&tiny)).unwrap_err();
    assert!(matches!(
        err,
        Error::AllocationFailed {
            requested: 128,
            limit: 64,
            ..
        }
    ));
    Ok(())
}

#[test]
fn test_parameter_free_model_needs_a_device() -> Result<()> {
    let host = CpuDevice::host();
    let model = Sequential::<CpuBackend>::new().add(Flatten).add(Tanh);
    let loader = batches(&[2, 1], &host)?;

    assert!(matches!(
        preprocessed_dataset(&model, &loader, None),
        Err(Error::NoParameters)
    ));

    let ds = preprocessed_dataset(&model, &loader, Some(&host))?;
    assert_eq!(ds.features().dims(), &[3, 8]);
    Ok(())
}

// Errors

#[test]
fn test_empty_loader_is_an_error() -> Result<()> {
    let dev = CpuDevice::host();
    let model = backbone(&dev)?;
    let loader: Vec<(CpuTensor, CpuTensor)> = Vec::new();
    assert!(matches!(
        preprocessed_dataset(&model, &loader, None),
        Err(Error::EmptyLoader)
    ));
    Ok(())
}

#[test]
fn test_loader_error_propagates() -> Result<()> {
    let dev = CpuDevice::host();
    let model = backbone(&dev)?;
    let mut good = batches(&[2], &dev)?;
    let source = FailingSource {
        good: good.remove(0),
    };
    match preprocessed_dataset(&model, &source, None) {
        Err(Error::Msg(m)) => assert_eq!(m, "corrupt record"),
        other => panic!("expected loader error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_forward_shape_error_propagates() -> Result<()> {
    let dev = CpuDevice::host();
    let model = backbone(&dev)?;
    let wrong = vec![(
        CpuTensor::zeros((2, 5), DType::F32, &dev)?,
        CpuTensor::zeros(2, DType::F32, &dev)?,
    )];
    assert!(matches!(
        preprocessed_dataset(&model, &wrong, None),
        Err(Error::MatmulShapeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn test_inconsistent_batch_widths_fail_concat() -> Result<()> {
    let dev = CpuDevice::host();
    let model = Flatten;
    let loader = vec![
        (
            CpuTensor::zeros((2, 4), DType::F32, &dev)?,
            CpuTensor::zeros(2, DType::F32, &dev)?,
        ),
        (
            CpuTensor::zeros((2, 3), DType::F32, &dev)?,
            CpuTensor::zeros(2, DType::F32, &dev)?,
        ),
    ];
    assert!(matches!(
        preprocessed_dataset(&model, &loader, Some(&dev)),
        Err(Error::CatShapeMismatch { index: 1, .. })
    ));
    Ok(())
}

#[test]
fn test_label_count_mismatch() -> Result<()> {
    let dev = CpuDevice::host();
    let loader = vec![(
        CpuTensor::zeros((3, 4), DType::F32, &dev)?,
        CpuTensor::zeros(2, DType::F32, &dev)?,
    )];
    assert!(matches!(
        preprocessed_dataset(&Flatten, &loader, Some(&dev)),
        Err(Error::LengthMismatch {
            features: 3,
            labels: 2
        })
    ));
    Ok(())
}

// Cached features feed a head

#[test]
fn test_cached_features_train_a_head_loader() -> Result<()> {
    let dev = CpuDevice::host();
    let model = backbone(&dev)?;
    let loader = batches(&[4, 3], &dev)?;
    let cached = preprocessed_dataset(&model, &loader, None)?;

    let head_loader = DataLoader::<CpuBackend>::new(
        &cached,
        dev.clone(),
        DataLoaderConfig::default()
            .batch_size(3)
            .shuffle(true)
            .seed(1),
    );
    let head = Linear::<CpuBackend>::new(10, 2, true, DType::F32, &dev)?;
    let mut seen = 0;
    for batch in head_loader.batches() {
        let (x, _) = batch?;
        assert_eq!(head.forward(&x)?.dims()[1], 2);
        seen += x.dims()[0];
    }
    assert_eq!(seen, 7);
    Ok(())
}

#[test]
fn test_tracing_initialises_once() {
    assert!(init_tracing().is_ok());
    assert!(matches!(init_tracing(), Err(InitError::AlreadyInitialised)));
}
