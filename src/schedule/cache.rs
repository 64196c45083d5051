//! Per-scheduler cache of built schedules

use super::dxx::build_dense_lut;
use super::lut::ModeLut;
use super::sdd::build_sdd_lut;
use crate::dtype::DType;
use crate::error::Result;
use crate::runtime::Device;
use crate::sparse::{BlockLayout, SparseMode};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Everything that determines the three schedules of a product
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Block size
    pub block: usize,
    /// Forward mode
    pub mode: SparseMode,
    /// Whether the left operand is transposed
    pub trans_a: bool,
    /// Whether the right operand is transposed
    pub trans_b: bool,
    /// Dense-output reduction step
    pub step: usize,
    /// Largest super-block side in elements
    pub superblock_span: usize,
    /// Optional cap on segment length
    pub max_segment: Option<usize>,
}

/// Forward and gradient schedules of one product
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleSet {
    /// Schedule of the forward product
    pub forward: ModeLut,
    /// Schedule of the left-operand gradient
    pub grad_a: ModeLut,
    /// Schedule of the right-operand gradient
    pub grad_b: ModeLut,
}

impl ScheduleSet {
    /// Build all three schedules
    ///
    /// | forward | forward       | grad A        | grad B        |
    /// |---------|---------------|---------------|---------------|
    /// | sdd     | super-block   | rows          | columns       |
    /// | dsd     | `!trans_a`    | super-block   | `trans_a`     |
    /// | dds     | `trans_b`     | `!trans_b`    | super-block   |
    ///
    /// Dense entries name the grouping flag passed to the dense builder
    /// (set = group by layout rows).
    pub fn build(layout: &BlockLayout, config: &ScheduleConfig) -> Result<Self> {
        let sdd = || -> Result<ModeLut> {
            build_sdd_lut(layout, config.block, config.superblock_span).map(ModeLut::SparseOutput)
        };
        let dxx = |trans: bool| -> Result<ModeLut> {
            build_dense_lut(
                layout,
                config.block,
                config.step,
                trans,
                config.max_segment,
                |idx| idx,
            )
            .map(ModeLut::DenseOutput)
        };

        let (forward, grad_a, grad_b) = match config.mode {
            SparseMode::SparseOutput => (sdd()?, dxx(true)?, dxx(false)?),
            SparseMode::SparseLeft => (dxx(!config.trans_a)?, sdd()?, dxx(config.trans_a)?),
            SparseMode::SparseRight => (dxx(config.trans_b)?, dxx(!config.trans_b)?, sdd()?),
        };
        Ok(Self {
            forward,
            grad_a,
            grad_b,
        })
    }

    /// Largest lock id over all three schedules
    ///
    /// Lock buffers are sized from this so that no schedule of the product
    /// can alias another's locks.
    pub fn num_locks(&self) -> u32 {
        self.forward
            .num_locks()
            .max(self.grad_a.num_locks())
            .max(self.grad_b.num_locks())
    }
}

/// Schedules keyed by `(dtype, device)`
///
/// Lookups take a read lock. Concurrent misses on the same key may both
/// build; the tables are deterministic so whichever insert lands is kept.
#[derive(Debug, Default)]
pub struct LutCache {
    entries: RwLock<HashMap<(DType, Device), Arc<ScheduleSet>>>,
}

impl LutCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached schedules for `key`, building them on a miss
    pub fn get_or_build<F>(&self, dtype: DType, device: Device, build: F) -> Result<Arc<ScheduleSet>>
    where
        F: FnOnce() -> Result<ScheduleSet>,
    {
        if let Some(set) = self.entries.read().get(&(dtype, device)) {
            return Ok(set.clone());
        }

        debug!(%dtype, %device, "schedule cache miss");
        let set = Arc::new(build()?);
        self.entries.write().insert((dtype, device), set.clone());
        Ok(set)
    }

    /// Number of cached keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is cached yet
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: SparseMode, trans_a: bool, trans_b: bool) -> ScheduleConfig {
        ScheduleConfig {
            block: 16,
            mode,
            trans_a,
            trans_b,
            step: 16,
            superblock_span: 128,
            max_segment: None,
        }
    }

    #[test]
    fn test_table_shapes() {
        let layout = BlockLayout::from_slice(&[1u8, 0, 1, 1], &[2, 2]).unwrap();

        let set = ScheduleSet::build(&layout, &config(SparseMode::SparseOutput, false, false)).unwrap();
        assert!(matches!(set.forward, ModeLut::SparseOutput(_)));
        match (&set.grad_a, &set.grad_b) {
            (ModeLut::DenseOutput(a), ModeLut::DenseOutput(b)) => {
                assert!(a.trans);
                assert!(!b.trans);
            }
            other => panic!("unexpected gradient tables {other:?}"),
        }

        let set = ScheduleSet::build(&layout, &config(SparseMode::SparseLeft, true, false)).unwrap();
        assert!(matches!(set.grad_a, ModeLut::SparseOutput(_)));
        assert!(matches!(&set.forward, ModeLut::DenseOutput(l) if !l.trans));
        assert!(matches!(&set.grad_b, ModeLut::DenseOutput(l) if l.trans));

        let set = ScheduleSet::build(&layout, &config(SparseMode::SparseRight, false, true)).unwrap();
        assert!(matches!(set.grad_b, ModeLut::SparseOutput(_)));
        assert!(matches!(&set.forward, ModeLut::DenseOutput(l) if l.trans));
        assert!(matches!(&set.grad_a, ModeLut::DenseOutput(l) if !l.trans));
    }

    #[test]
    fn test_cache_builds_once_per_key() {
        let layout = BlockLayout::from_slice(&[1u8, 1, 1, 1], &[2, 2]).unwrap();
        let cfg = config(SparseMode::SparseLeft, false, false);
        let cache = LutCache::new();
        let mut builds = 0;

        let first = cache
            .get_or_build(DType::F32, Device::cpu(), || {
                builds += 1;
                ScheduleSet::build(&layout, &cfg)
            })
            .unwrap();
        let second = cache
            .get_or_build(DType::F32, Device::cpu(), || {
                builds += 1;
                ScheduleSet::build(&layout, &cfg)
            })
            .unwrap();
        assert_eq!(builds, 1);
        assert!(Arc::ptr_eq(&first, &second));

        cache
            .get_or_build(DType::F64, Device::cpu(), || ScheduleSet::build(&layout, &cfg))
            .unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_deterministic_rebuild() {
        let layout = BlockLayout::from_slice(&[1u8, 1, 0, 1, 1, 1, 0, 1, 1], &[3, 3]).unwrap();
        let cfg = config(SparseMode::SparseRight, false, false);
        let a = ScheduleSet::build(&layout, &cfg).unwrap();
        let b = ScheduleSet::build(&layout, &cfg).unwrap();
        assert_eq!(a.forward.as_bytes(), b.forward.as_bytes());
        assert_eq!(a.grad_a.as_bytes(), b.grad_a.as_bytes());
        assert_eq!(a.grad_b.as_bytes(), b.grad_b.as_bytes());
    }
}
