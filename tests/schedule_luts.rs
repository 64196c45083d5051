//! Lookup tables built through the public scheduler

mod common;

use blocksparse::prelude::*;
use blocksparse::schedule::{ModeLut, load_balance};
use common::*;
use std::sync::Arc;

const BLOCK: usize = 16;

fn layout() -> BlockLayout {
    layout_3d(&[
        &[&[1, 1, 1, 0], &[1, 0, 1, 1], &[1, 1, 1, 1]],
        &[&[0, 0, 0, 0], &[1, 1, 0, 0], &[0, 1, 1, 1]],
    ])
}

fn scheduler(mode: SparseMode, trans_a: bool, trans_b: bool) -> BlockSparseMatmul {
    BlockSparseMatmul::new(layout(), BLOCK, mode, trans_a, trans_b)
        .unwrap()
        .with_options(MatmulOptions::with_max_segment(2))
        .unwrap()
}

#[test]
fn test_tables_are_deterministic() {
    for mode in [SparseMode::SparseOutput, SparseMode::SparseLeft, SparseMode::SparseRight] {
        for (ta, tb) in [(false, false), (true, false), (false, true), (true, true)] {
            let first = scheduler(mode, ta, tb).schedules(DType::F32, Device::cpu()).unwrap();
            let second = scheduler(mode, ta, tb).schedules(DType::F32, Device::cpu()).unwrap();
            assert!(!Arc::ptr_eq(&first, &second));
            assert_eq!(first.forward.as_bytes(), second.forward.as_bytes());
            assert_eq!(first.grad_a.as_bytes(), second.grad_a.as_bytes());
            assert_eq!(first.grad_b.as_bytes(), second.grad_b.as_bytes());
        }
    }
}

#[test]
fn test_cache_is_keyed_by_dtype() {
    let op = scheduler(SparseMode::SparseLeft, false, false);
    let f32_set = op.schedules(DType::F32, Device::cpu()).unwrap();
    let again = op.schedules(DType::F32, Device::cpu()).unwrap();
    let f64_set = op.schedules(DType::F64, Device::cpu()).unwrap();
    assert!(Arc::ptr_eq(&f32_set, &again));
    assert!(!Arc::ptr_eq(&f32_set, &f64_set));
    assert_eq!(f32_set.forward, f64_set.forward);
}

#[test]
fn test_every_block_is_claimed_once() {
    let set = scheduler(SparseMode::SparseOutput, false, false)
        .schedules(DType::F32, Device::cpu())
        .unwrap();
    let ModeLut::SparseOutput(lut) = &set.forward else {
        panic!("sparse output expects a super-block table");
    };
    let mut slots: Vec<i32> = lut
        .groups
        .iter()
        .flat_map(|g| g.records.iter().map(|r| r.slot))
        .collect();
    slots.sort_unstable();
    assert_eq!(slots, (0..layout().nnz() as i32).collect::<Vec<_>>());

    // the bottom-right 2 × 2 of slice 0 is claimed as one super-block
    assert!(lut.groups.iter().any(|g| g.pack == 2));
}

#[test]
fn test_flat_words_layout() {
    let set = scheduler(SparseMode::SparseLeft, false, false)
        .schedules(DType::F32, Device::cpu())
        .unwrap();
    let ModeLut::DenseOutput(lut) = &set.forward else {
        panic!("dense output expects a segment table");
    };
    let words = lut.to_words();
    let width = lut.width();
    assert_eq!(words.len(), 6 * width + 2 * lut.increments.len());
    // trailing sentinel pair
    assert_eq!(&words[words.len() - 2..], &[0, 0]);
    for task in words[..6 * width].chunks(6) {
        let offset = task[0] as usize;
        assert!(offset >= 6 * width && offset < words.len());
        assert_eq!((offset - 6 * width) % 2, 0);
        assert_eq!(task[1] as usize % BLOCK, 0);
    }
    // the four-block row of slice 0 is split into two locked segments
    assert!(lut.num_locks > 0);
    assert_eq!(set.num_locks(), set.forward.num_locks().max(set.grad_b.num_locks()));
}

#[test]
fn test_balance_example() {
    let segments = load_balance(&[9, 9, 1]);
    assert_eq!(segments.sizes, vec![9, 9, 1]);
    assert_eq!(segments.columns, vec![0, 1, 2]);
    assert!(segments.lock_ids.iter().all(|&l| l == 0));
    assert_eq!(segments.offsets, vec![0, 9, 18]);
}
