//! Options for block-sparse products

use crate::dtype::{AccumulationPrecision, DType};
use crate::error::{Error, Result};
use crate::runtime::cpu::ParallelismConfig;

/// Knobs of a [`BlockSparseMatmul`](super::BlockSparseMatmul)
#[derive(Debug, Clone, PartialEq)]
pub struct MatmulOptions {
    /// Reduction step of the dense-output kernels in elements (default: 16)
    /// Clamped to the block size; the block size must be a multiple of it
    pub step: usize,

    /// Dense extent of one dense-output tile (default: 128)
    pub dense_tile: usize,

    /// Reduction chunk of the sparse-output kernel (default: 32)
    pub sdd_tile_k: usize,

    /// Largest super-block side in elements (default: 128)
    pub superblock_span: usize,

    /// Cap on blocks per segment (default: None = longest column)
    /// Setting it splits long columns across tasks that share a lock
    pub max_segment: Option<usize>,

    /// Accumulator width (default: F32, always F64 for f64 storage)
    pub accumulation: AccumulationPrecision,

    /// Cast both operands to this dtype before multiplying (default: None)
    /// When unset, operands must already share a dtype
    pub autocast: Option<DType>,

    /// Thread pool configuration for tile tasks
    pub parallelism: ParallelismConfig,
}

impl Default for MatmulOptions {
    fn default() -> Self {
        Self {
            step: 16,
            dense_tile: 128,
            sdd_tile_k: 32,
            superblock_span: 128,
            max_segment: None,
            accumulation: AccumulationPrecision::default(),
            autocast: None,
            parallelism: ParallelismConfig::default(),
        }
    }
}

impl MatmulOptions {
    /// Split every column into segments of at most `blocks` blocks
    pub fn with_max_segment(blocks: usize) -> Self {
        Self {
            max_segment: Some(blocks),
            ..Default::default()
        }
    }

    /// Accumulate in f64 regardless of storage
    pub fn high_precision() -> Self {
        Self {
            accumulation: AccumulationPrecision::F64,
            ..Default::default()
        }
    }

    /// Autocast both operands to half precision, like mixed-precision
    /// training does for dense matmuls
    #[cfg(feature = "f16")]
    pub fn autocast_f16() -> Self {
        Self {
            autocast: Some(DType::F16),
            ..Default::default()
        }
    }

    /// Reject zero-sized knobs and non-float autocast targets
    pub fn validate(&self) -> Result<()> {
        if self.step == 0 {
            return Err(Error::config("step must be positive"));
        }
        if self.dense_tile == 0 || self.sdd_tile_k == 0 {
            return Err(Error::config("tile sizes must be positive"));
        }
        if self.superblock_span == 0 {
            return Err(Error::config("superblock_span must be positive"));
        }
        if self.max_segment == Some(0) {
            return Err(Error::config("max_segment must be positive"));
        }
        match self.autocast {
            Some(dtype) if !dtype.is_float() => Err(Error::config(format!(
                "autocast target must be a float dtype, got {dtype}"
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = MatmulOptions::default();
        assert_eq!(opts.step, 16);
        assert_eq!(opts.dense_tile, 128);
        assert_eq!(opts.sdd_tile_k, 32);
        assert_eq!(opts.max_segment, None);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(MatmulOptions::with_max_segment(0).validate().is_err());
        let opts = MatmulOptions {
            autocast: Some(DType::I32),
            ..Default::default()
        };
        assert!(opts.validate().is_err());
        assert_eq!(
            MatmulOptions::high_precision().accumulation,
            AccumulationPrecision::F64
        );
    }
}
