//! Construction and call-time validation

mod common;

use blocksparse::prelude::*;
use common::*;

const BLOCK: usize = 16;

fn ones(shape: &[usize]) -> Tensor {
    let n = shape.iter().product();
    Tensor::from_slice(&vec![1.0f32; n], shape, &Device::cpu())
}

fn diag() -> BlockLayout {
    layout_2d(&[&[1, 0], &[0, 1]])
}

#[test]
fn test_dense_inner_mismatch_names_both_sizes() {
    let op = BlockSparseMatmul::new(diag(), BLOCK, SparseMode::SparseLeft, false, false).unwrap();
    let err = op.forward(&ones(&[2, BLOCK, BLOCK]), &ones(&[48, 8])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Shape);
    match &err {
        Error::DimensionMismatch {
            arg, dim, expected, got,
        } => {
            assert_eq!(*arg, "B");
            assert_eq!(*dim, 0);
            assert_eq!(*expected, 32);
            assert_eq!(*got, 48);
        }
        other => panic!("unexpected error {other:?}"),
    }
    let msg = err.to_string();
    assert!(msg.contains("32") && msg.contains("48"), "{msg}");
}

#[test]
fn test_dds_inner_mismatch() {
    let op = BlockSparseMatmul::new(diag(), BLOCK, SparseMode::SparseRight, true, false).unwrap();
    // trans_a: the reduction of A lives in dim -2
    let err = op.forward(&ones(&[1, 40, 8]), &ones(&[2, BLOCK, BLOCK])).unwrap_err();
    assert!(matches!(
        err,
        Error::DimensionMismatch { arg: "A", dim: 1, expected: 32, got: 40 }
    ));
}

#[test]
fn test_sparse_operand_shape() {
    let op = BlockSparseMatmul::new(diag(), BLOCK, SparseMode::SparseLeft, false, false).unwrap();
    let err = op.forward(&ones(&[3, BLOCK, BLOCK]), &ones(&[32, 8])).unwrap_err();
    assert!(matches!(err, Error::InvalidShape { arg: "A", .. }));
    let err = op.forward(&ones(&[BLOCK, BLOCK]), &ones(&[32, 8])).unwrap_err();
    assert!(matches!(err, Error::InvalidShape { arg: "A", .. }));
}

#[test]
fn test_sdd_reduction_checks() {
    let op = BlockSparseMatmul::new(diag(), BLOCK, SparseMode::SparseOutput, false, false).unwrap();
    let err = op.forward(&ones(&[32, 24]), &ones(&[24, 32])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Shape);
    let err = op.forward(&ones(&[32, 32]), &ones(&[16, 32])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Shape);
    // rows must cover the layout
    let err = op.forward(&ones(&[48, 32]), &ones(&[32, 32])).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { arg: "A", .. }));
}

#[test]
fn test_head_and_batch_mismatch() {
    let layout = layout_3d(&[&[&[1, 0], &[0, 1]], &[&[1, 1], &[0, 1]]]);
    let op = BlockSparseMatmul::new(layout.clone(), BLOCK, SparseMode::SparseLeft, false, false).unwrap();

    // three heads against a two-slice layout
    let err = op
        .forward(&ones(&[1, layout.nnz(), BLOCK, BLOCK]), &ones(&[1, 3, 32, 8]))
        .unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { dim: 1, .. }));

    let err = op
        .forward(&ones(&[2, layout.nnz(), BLOCK, BLOCK]), &ones(&[1, 2, 32, 8]))
        .unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { dim: 0, .. }));
}

#[test]
fn test_too_many_dims() {
    let op = BlockSparseMatmul::new(diag(), BLOCK, SparseMode::SparseOutput, false, false).unwrap();
    let err = op
        .forward(&ones(&[1, 1, 1, 32, 32]), &ones(&[32, 32]))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidShape { arg: "A", .. }));
}

#[test]
fn test_dtype_checks() {
    let op = BlockSparseMatmul::new(diag(), BLOCK, SparseMode::SparseOutput, false, false).unwrap();
    let device = Device::cpu();
    let b = Tensor::from_slice(&vec![1.0f64; 32 * 32], &[32, 32], &device);
    let err = op.forward(&ones(&[32, 32]), &b).unwrap_err();
    assert!(matches!(err, Error::DTypeMismatch { .. }));

    let a = Tensor::from_slice(&vec![1i32; 32 * 32], &[32, 32], &device);
    let err = op.forward(&a, &a).unwrap_err();
    assert!(matches!(err, Error::UnsupportedDType { dtype: DType::I32, .. }));
}

#[test]
fn test_autocast_resolves_dtype_mismatch() {
    let options = MatmulOptions {
        autocast: Some(DType::F32),
        ..Default::default()
    };
    let op = BlockSparseMatmul::new(diag(), BLOCK, SparseMode::SparseOutput, false, false)
        .unwrap()
        .with_options(options)
        .unwrap();
    let b = Tensor::from_slice(&vec![1.0f64; 32 * 32], &[32, 32], &Device::cpu());
    let c = op.forward(&ones(&[32, 32]), &b).unwrap();
    assert_eq!(c.dtype(), DType::F32);
    assert!(c.to_vec::<f32>().iter().all(|&x| x == 32.0));
}

#[test]
fn test_device_checks() {
    let op = BlockSparseMatmul::new(diag(), BLOCK, SparseMode::SparseOutput, false, false).unwrap();
    let gpu = Tensor::zeros(&[32, 32], DType::F32, &Device::cuda(0));
    let err = op.forward(&ones(&[32, 32]), &gpu).unwrap_err();
    assert!(matches!(err, Error::DeviceMismatch { .. }));
    let err = op.forward(&gpu, &gpu).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Device);
}

#[test]
fn test_gradient_device_checks() {
    let op = BlockSparseMatmul::new(diag(), BLOCK, SparseMode::SparseLeft, false, false).unwrap();
    let (c, grad_fn) = op
        .forward_with_grad(&ones(&[2, BLOCK, BLOCK]), &ones(&[32, 8]))
        .unwrap();
    assert_eq!(c.shape(), &[32, 8]);

    let dc = Tensor::zeros(&[32, 8], DType::F32, &Device::cuda(0));
    let err = grad_fn.backward(&dc).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Device);
    assert!(matches!(err, Error::DeviceMismatch { .. }));

    assert_eq!(grad_fn.backward(&ones(&[32, 8])).unwrap().len(), 2);
}

#[test]
fn test_configuration_errors() {
    assert_eq!(
        "sdx".parse::<SparseMode>().unwrap_err().kind(),
        ErrorKind::Configuration
    );
    assert_eq!("dds".parse::<SparseMode>().unwrap(), SparseMode::SparseRight);

    let err = BlockLayout::from_slice(&[1u8, 2, 0, 1], &[2, 2]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    let err = BlockLayout::from_slice(&[1u8, 0], &[2]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let op = BlockSparseMatmul::new(diag(), BLOCK, SparseMode::SparseLeft, false, false).unwrap();
    let bad_step = MatmulOptions {
        step: 0,
        ..Default::default()
    };
    assert!(op.clone().with_options(bad_step).is_err());
    let uneven_step = MatmulOptions {
        step: 6,
        ..Default::default()
    };
    assert_eq!(
        op.clone().with_options(uneven_step).unwrap_err().kind(),
        ErrorKind::Configuration
    );
    let no_threads = MatmulOptions {
        parallelism: ParallelismConfig::with_threads(0),
        ..Default::default()
    };
    assert!(op.with_options(no_threads).is_err());
}

#[test]
fn test_layout_from_tensor() {
    let device = Device::cpu();
    let mask = Tensor::from_slice(&[1.0f32, 0.0, 1.0, 1.0], &[2, 2], &device);
    let layout = BlockLayout::from_tensor(&mask).unwrap();
    assert_eq!(layout.nnz(), 3);
    let op = BlockSparseMatmul::new(layout, BLOCK, SparseMode::SparseRight, false, false).unwrap();
    assert_eq!(op.layout().nnz(), 3);
    assert_eq!(op.mode().to_string(), "dds");
}
