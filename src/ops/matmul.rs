//! Block-sparse matrix multiplication scheduler

use super::options::MatmulOptions;
use crate::autograd::BlockSparseMatmulBackward;
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::runtime::cpu::CpuClient;
use crate::runtime::cpu::kernels::{self, KernelContext, Transpose};
use crate::runtime::{Device, LockPool};
use crate::schedule::{LutCache, ModeLut, ScheduleConfig, ScheduleSet};
use crate::sparse::{BlockLayout, SparseMode};
use crate::tensor::Tensor;
use std::sync::Arc;
use tracing::debug;

/// Largest operand rank accepted by [`BlockSparseMatmul::forward`]
const MAX_DIMS: usize = 4;

/// Where the dense operand's reduction dimension is, and how long it must be
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct DenseInner {
    /// Negative dimension index (-1 or -2)
    dim: isize,
    size: usize,
}

/// Block-sparse matrix multiplication with a fixed layout
///
/// Computes `C = op(A) · op(B)` where one of `A`, `B`, `C` is a stack of
/// `block × block` tiles described by the layout, and `op` transposes the
/// last two dims when the matching flag is set.
///
/// | mode  | A                            | B                            | C                      |
/// |-------|------------------------------|------------------------------|------------------------|
/// | `sdd` | `(.., Z, M, K)`              | `(.., Z, K, N)`              | `(.., nnz, block, block)` |
/// | `dsd` | `(.., nnz, block, block)`    | `(.., Z, K, N)`              | `(.., Z, M, N)`        |
/// | `dds` | `(.., Z, M, K)`              | `(.., nnz, block, block)`    | `(.., Z, M, N)`        |
///
/// Schedules are built on first use per `(dtype, device)` and cached for the
/// lifetime of the scheduler (and its clones).
///
/// # Example
///
/// ```
/// use blocksparse::prelude::*;
///
/// let layout = BlockLayout::from_slice(&[1u8, 0, 0, 1], &[2, 2]).unwrap();
/// let op = BlockSparseMatmul::new(layout, 16, SparseMode::SparseOutput, false, false).unwrap();
///
/// let device = Device::cpu();
/// let a = Tensor::from_slice(&vec![1.0f32; 32 * 16], &[32, 16], &device);
/// let b = Tensor::from_slice(&vec![1.0f32; 16 * 32], &[16, 32], &device);
/// let c = op.forward(&a, &b).unwrap();
/// assert_eq!(c.shape(), &[2, 16, 16]);
/// ```
#[derive(Clone, Debug)]
pub struct BlockSparseMatmul {
    layout: Arc<BlockLayout>,
    config: ScheduleConfig,
    options: MatmulOptions,
    dense_inner: Option<DenseInner>,
    client: CpuClient,
    cache: Arc<LutCache>,
    locks: Arc<LockPool>,
}

impl BlockSparseMatmul {
    /// Create a scheduler with default options and the global lock pool
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` when `block` is zero or not a multiple of the
    /// default step.
    pub fn new(
        layout: BlockLayout,
        block: usize,
        mode: SparseMode,
        trans_a: bool,
        trans_b: bool,
    ) -> Result<Self> {
        if block == 0 {
            return Err(Error::config("block size must be positive"));
        }
        let options = MatmulOptions::default();
        let config = ScheduleConfig {
            block,
            mode,
            trans_a,
            trans_b,
            step: options.step,
            superblock_span: options.superblock_span,
            max_segment: options.max_segment,
        };
        check_step(block, options.step)?;

        let dense_inner = dense_inner(&layout, block, mode, trans_a, trans_b);
        Ok(Self {
            layout: Arc::new(layout),
            config,
            client: CpuClient::new(options.parallelism.clone())?,
            options,
            dense_inner,
            cache: Arc::new(LutCache::new()),
            locks: LockPool::global(),
        })
    }

    /// Replace the options; cached schedules are dropped
    pub fn with_options(mut self, options: MatmulOptions) -> Result<Self> {
        options.validate()?;
        check_step(self.config.block, options.step)?;
        self.client = CpuClient::new(options.parallelism.clone())?;
        self.config.step = options.step;
        self.config.superblock_span = options.superblock_span;
        self.config.max_segment = options.max_segment;
        self.options = options;
        self.cache = Arc::new(LutCache::new());
        Ok(self)
    }

    /// Use `pool` for lock buffers instead of the global pool
    pub fn with_lock_pool(mut self, pool: Arc<LockPool>) -> Self {
        self.locks = pool;
        self
    }

    /// The block layout
    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    /// Block size
    pub fn block(&self) -> usize {
        self.config.block
    }

    /// Forward mode
    pub fn mode(&self) -> SparseMode {
        self.config.mode
    }

    /// Whether `A` is transposed
    pub fn trans_a(&self) -> bool {
        self.config.trans_a
    }

    /// Whether `B` is transposed
    pub fn trans_b(&self) -> bool {
        self.config.trans_b
    }

    /// Options in effect
    pub fn options(&self) -> &MatmulOptions {
        &self.options
    }

    /// Forward and gradient schedules for `(dtype, device)`, built on first use
    pub fn schedules(&self, dtype: DType, device: Device) -> Result<Arc<ScheduleSet>> {
        self.cache.get_or_build(dtype, device, || {
            debug!(
                mode = %self.config.mode,
                block = self.config.block,
                %dtype,
                %device,
                "building block-sparse schedules"
            );
            ScheduleSet::build(&self.layout, &self.config)
        })
    }

    /// Compute `C = op(A) · op(B)`
    ///
    /// Operands may have 2 to 4 dims; missing leading dims are treated as
    /// singletons, and leading singleton dims of the result beyond the
    /// larger input rank are removed.
    ///
    /// # Errors
    ///
    /// - `DeviceMismatch` / `UnsupportedDevice` for operands on different or
    ///   non-cpu devices
    /// - `DTypeMismatch` when dtypes differ and no autocast is configured;
    ///   `UnsupportedDType` for non-float operands
    /// - `DimensionMismatch` / `InvalidShape` when a dense reduction length,
    ///   a block stack, or a batch/head count does not fit the layout
    pub fn forward(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        let original_ndim = a.ndim().max(b.ndim());
        let (a, b) = self.validate_inputs(a, b)?;
        let set = self.schedules(a.dtype(), *a.device())?;
        let trans = Transpose {
            a: self.config.trans_a,
            b: self.config.trans_b,
            c: false,
        };
        let c = self.launch(self.config.mode, &set.forward, &a, &b, trans, &set)?;
        Ok(c.trim_leading(original_ndim))
    }

    /// Like [`Self::forward`], also returning the gradient function
    pub fn forward_with_grad(
        &self,
        a: &Tensor,
        b: &Tensor,
    ) -> Result<(Tensor, BlockSparseMatmulBackward)> {
        let c = self.forward(a, b)?;
        let grad_fn = BlockSparseMatmulBackward::new(self.clone(), a.clone(), b.clone());
        Ok((c, grad_fn))
    }

    /// Gradients of `A` and `B` given the gradient of `C`
    ///
    /// Each gradient reuses a kernel of the rotated mode: the left gradient
    /// swaps the roles of `C` and `A`, the right gradient those of `C` and
    /// `B`. Gradients are shaped like the operands they belong to.
    ///
    /// # Errors
    ///
    /// Same as [`Self::forward`]; `grad_output` must also live on the
    /// operands' device.
    pub fn backward(
        &self,
        grad_output: &Tensor,
        a: &Tensor,
        b: &Tensor,
        needs_input_grad: [bool; 2],
    ) -> Result<(Option<Tensor>, Option<Tensor>)> {
        let (a4, b4) = self.validate_inputs(a, b)?;
        check_devices(a, grad_output)?;
        let grad_output = match self.options.autocast {
            Some(dtype) => grad_output.to_dtype(dtype)?,
            None => grad_output.clone(),
        };
        let set = self.schedules(grad_output.dtype(), *grad_output.device())?;
        let (trans_a, trans_b) = (self.config.trans_a, self.config.trans_b);

        let da = if needs_input_grad[0] {
            let trans = Transpose {
                a: false,
                b: !trans_b,
                c: trans_a,
            };
            let mode = self.config.mode.grad_a_mode();
            let da = self.launch(mode, &set.grad_a, &grad_output, &b4, trans, &set)?;
            Some(da.trim_leading(a.ndim()))
        } else {
            None
        };

        let db = if needs_input_grad[1] {
            let trans = Transpose {
                a: !trans_a,
                b: false,
                c: trans_b,
            };
            let mode = self.config.mode.grad_b_mode();
            let db = self.launch(mode, &set.grad_b, &a4, &grad_output, trans, &set)?;
            Some(db.trim_leading(b.ndim()))
        } else {
            None
        };

        Ok((da, db))
    }

    fn launch(
        &self,
        mode: SparseMode,
        lut: &ModeLut,
        a: &Tensor,
        b: &Tensor,
        trans: Transpose,
        set: &ScheduleSet,
    ) -> Result<Tensor> {
        let ctx = KernelContext {
            layout: &self.layout,
            block: self.config.block,
            dense_tile: self.options.dense_tile,
            sdd_tile_k: self.options.sdd_tile_k,
            accumulation: self.options.accumulation,
            num_locks: set.num_locks(),
            client: &self.client,
            locks: &self.locks,
        };
        kernels::launch(mode, lut, a, b, trans, &ctx)
    }

    /// Check devices, dtypes and shapes; return operands padded to 4 dims
    fn validate_inputs(&self, a: &Tensor, b: &Tensor) -> Result<(Tensor, Tensor)> {
        check_devices(a, b)?;

        let (a, b) = match self.options.autocast {
            Some(dtype) => (a.to_dtype(dtype)?, b.to_dtype(dtype)?),
            None if a.dtype() != b.dtype() => {
                return Err(Error::DTypeMismatch {
                    lhs: a.dtype(),
                    rhs: b.dtype(),
                });
            }
            None => (a.clone(), b.clone()),
        };
        if !a.dtype().is_float() {
            return Err(Error::unsupported_dtype(a.dtype(), "blocksparse_matmul"));
        }

        if let Some(inner) = self.dense_inner {
            let (dense, dense_name, sparse, sparse_name) = match self.config.mode {
                SparseMode::SparseRight => (&a, "A", &b, "B"),
                _ => (&b, "B", &a, "A"),
            };
            let got = dense.size(inner.dim)?;
            if got != inner.size {
                return Err(Error::DimensionMismatch {
                    arg: dense_name,
                    dim: (dense.ndim() as isize + inner.dim) as usize,
                    expected: inner.size,
                    got,
                });
            }

            let expected = [self.layout.nnz(), self.config.block, self.config.block];
            let shape = sparse.shape();
            if shape.len() < 3 || shape[shape.len() - 3..] != expected {
                return Err(Error::invalid_shape(
                    sparse_name,
                    format!(
                        "expected tensor with trailing dimensions of shape {expected:?}, got {shape:?}"
                    ),
                ));
            }
        }

        for (name, t) in [("A", &a), ("B", &b)] {
            if t.ndim() > MAX_DIMS {
                return Err(Error::invalid_shape(
                    name,
                    format!(
                        "tensors with more than {MAX_DIMS} dimensions are not supported, got {}",
                        t.ndim()
                    ),
                ));
            }
        }
        Ok((a.pad_leading(MAX_DIMS), b.pad_leading(MAX_DIMS)))
    }
}

/// Both tensors must live on the same cpu device
fn check_devices(lhs: &Tensor, rhs: &Tensor) -> Result<()> {
    if lhs.device() != rhs.device() {
        return Err(Error::DeviceMismatch {
            lhs: *lhs.device(),
            rhs: *rhs.device(),
        });
    }
    if !lhs.device().is_cpu() {
        return Err(Error::UnsupportedDevice {
            device: *lhs.device(),
        });
    }
    Ok(())
}

fn check_step(block: usize, step: usize) -> Result<()> {
    let step = step.min(block).max(1);
    if block % step != 0 {
        return Err(Error::config(format!(
            "block size {block} is not a multiple of step {step}"
        )));
    }
    Ok(())
}

/// Reduction dimension of the dense operand of `dsd` / `dds`
fn dense_inner(
    layout: &BlockLayout,
    block: usize,
    mode: SparseMode,
    trans_a: bool,
    trans_b: bool,
) -> Option<DenseInner> {
    if mode.is_sparse_output() {
        return None;
    }
    let (rows, cols) = (layout.rows(), layout.cols());
    Some(if mode == SparseMode::SparseLeft {
        DenseInner {
            dim: if trans_b { -1 } else { -2 },
            size: block * if trans_a { rows } else { cols },
        }
    } else {
        DenseInner {
            dim: if trans_a { -2 } else { -1 },
            size: block * if trans_b { cols } else { rows },
        }
    })
}
