//! Tile multiplication kernels
//!
//! One kernel per [`SparseMode`]. Each kernel runs one task per
//! `(batch entry, tile, schedule entry)`, walks the schedule to generate
//! operand indices, accumulates in the wider type, and writes its tile in
//! the epilogue. Results are gathered from the tasks and written by the
//! calling thread, so every output element has exactly one writer.

mod accumulate;
mod dds;
mod dsd;
mod sdd;
mod view;

pub(crate) use accumulate::Accumulator;

use super::CpuClient;
use crate::dispatch_float_dtype;
use crate::dtype::{AccumulationPrecision, Element};
use crate::error::{Error, Result};
use crate::runtime::locks::lock_buffer;
use crate::runtime::{LockBuffer, LockPool};
use crate::schedule::{DenseLut, ModeLut, TaskHeader};
use crate::sparse::{BlockLayout, SparseMode};
use crate::tensor::Tensor;
use parking_lot::MutexGuard;
use tracing::trace;

/// Transposition flags of one launch
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Transpose {
    pub a: bool,
    pub b: bool,
    pub c: bool,
}

/// Everything a launch needs besides its operands
pub(crate) struct KernelContext<'a> {
    pub layout: &'a BlockLayout,
    pub block: usize,
    pub dense_tile: usize,
    pub sdd_tile_k: usize,
    pub accumulation: AccumulationPrecision,
    /// Lock ids per tile reserved for the whole schedule set
    pub num_locks: u32,
    pub client: &'a CpuClient,
    pub locks: &'a LockPool,
}

/// Run the kernel of `mode` with schedule `lut`
///
/// Operands with fewer than 4 dims are padded with leading singleton dims;
/// the result is always 4-D.
pub(crate) fn launch(
    mode: SparseMode,
    lut: &ModeLut,
    a: &Tensor,
    b: &Tensor,
    trans: Transpose,
    ctx: &KernelContext<'_>,
) -> Result<Tensor> {
    if a.dtype() != b.dtype() {
        return Err(Error::DTypeMismatch {
            lhs: a.dtype(),
            rhs: b.dtype(),
        });
    }
    for (name, t) in [("A", a), ("B", b)] {
        if t.ndim() > 4 {
            return Err(Error::invalid_shape(
                name,
                "tensors with more than 4 dimensions are not supported",
            ));
        }
    }
    let (a, b) = (a.pad_leading(4), b.pad_leading(4));

    trace!(
        %mode,
        tasks = lut.width(),
        trans_a = trans.a,
        trans_b = trans.b,
        trans_c = trans.c,
        "launching tile kernel"
    );
    dispatch_float_dtype!(a.dtype(), T => {
        match ctx.accumulation.resolve(a.dtype()) {
            AccumulationPrecision::F64 => run::<T, f64>(mode, lut, &a, &b, trans, ctx),
            AccumulationPrecision::F32 => run::<T, f32>(mode, lut, &a, &b, trans, ctx),
        }
    }, "blocksparse_matmul")
}

fn run<T: Element, A: Accumulator>(
    mode: SparseMode,
    lut: &ModeLut,
    a: &Tensor,
    b: &Tensor,
    trans: Transpose,
    ctx: &KernelContext<'_>,
) -> Result<Tensor> {
    match (mode, lut) {
        (SparseMode::SparseOutput, ModeLut::SparseOutput(lut)) => {
            sdd::sdd_matmul::<T, A>(lut, a, b, trans, ctx)
        }
        (SparseMode::SparseLeft, ModeLut::DenseOutput(lut)) => {
            dsd::dsd_matmul::<T, A>(lut, a, b, trans, ctx)
        }
        (SparseMode::SparseRight, ModeLut::DenseOutput(lut)) => {
            dds::dds_matmul::<T, A>(lut, a, b, trans, ctx)
        }
        _ => Err(Error::internal(format!(
            "schedule kind does not match mode {mode}"
        ))),
    }
}

/// Check the stacked-block operand of a dense-output product
fn check_block_operand(
    name: &'static str,
    sparse: &Tensor,
    dense_batch: usize,
    ctx: &KernelContext<'_>,
) -> Result<()> {
    let expected = [ctx.layout.nnz(), ctx.block, ctx.block];
    if sparse.shape()[1..] != expected {
        return Err(Error::invalid_shape(
            name,
            format!(
                "expected trailing dimensions of shape {expected:?}, got {:?}",
                sparse.shape()
            ),
        ));
    }
    if sparse.shape()[0] != dense_batch {
        return Err(Error::DimensionMismatch {
            arg: name,
            dim: 0,
            expected: dense_batch,
            got: sparse.shape()[0],
        });
    }
    Ok(())
}

/// Check that a dense operand carries one head per layout slice
fn check_heads(name: &'static str, dense: &Tensor, ctx: &KernelContext<'_>) -> Result<()> {
    let heads = dense.shape()[1];
    if heads != ctx.layout.depth() {
        return Err(Error::DimensionMismatch {
            arg: name,
            dim: 1,
            expected: ctx.layout.depth(),
            got: heads,
        });
    }
    Ok(())
}

/// A finished tile of a dense output, in `(m, n)` orientation
struct DenseTile {
    z: usize,
    head: usize,
    row0: usize,
    col0: usize,
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

/// Lock buffer of the launching device, sized and reset for this launch
///
/// Nothing is taken when the schedule has no locks. The guard is held for
/// the whole launch, so locked launches on one device run one at a time.
fn acquire_locks<'p>(
    ctx: &KernelContext<'_>,
    lut: &DenseLut,
    buffer: &'p parking_lot::Mutex<LockBuffer>,
    tiles: usize,
    batch: usize,
) -> Option<MutexGuard<'p, LockBuffer>> {
    if lut.num_locks == 0 {
        return None;
    }
    let mut guard = lock_buffer(buffer);
    let needed = ctx.num_locks.max(lut.num_locks) as usize * tiles * batch;
    guard.ensure(needed);
    guard.reset(needed);
    Some(guard)
}

/// Locked epilogue: hand the partial tile to its lock slot
///
/// Unlocked tiles pass straight through. Locked tiles come back only from
/// the task whose arrival completes the slot.
fn epilogue(
    locks: Option<&LockBuffer>,
    num_locks: usize,
    header: &TaskHeader,
    rank: u32,
    tile_index: usize,
    tile: DenseTile,
) -> Result<Option<DenseTile>> {
    if header.lock_id == 0 {
        return Ok(Some(tile));
    }
    let locks = locks.ok_or_else(|| Error::internal("locked task without a lock buffer"))?;
    let lock = header.lock_id as usize;
    if lock > num_locks {
        return Err(Error::internal(format!(
            "lock id {lock} exceeds the {num_locks} reserved per tile"
        )));
    }
    let slot = tile_index * num_locks + lock - 1;
    let max_tasks = u32::try_from(header.max_tasks)
        .map_err(|_| Error::internal("negative max task count"))?;
    let DenseTile {
        z,
        head,
        row0,
        col0,
        rows,
        cols,
        values,
    } = tile;
    Ok(locks
        .submit(slot, rank, max_tasks, values)?
        .map(|values| DenseTile {
            z,
            head,
            row0,
            col0,
            rows,
            cols,
            values,
        }))
}

/// Write finished tiles into a zero-filled `(batch, heads, d2, d3)` output
///
/// `trans_c` stores element `(m, n)` at `(n, m)`.
fn write_dense<T: Element>(
    shape: [usize; 4],
    trans_c: bool,
    tiles: Vec<Result<Option<DenseTile>>>,
    device: &crate::runtime::Device,
) -> Result<Tensor> {
    let [_, heads, d2, d3] = shape;
    let mut out = vec![T::zero(); shape.iter().product()];
    for tile in tiles {
        let Some(tile) = tile? else { continue };
        let base = (tile.z * heads + tile.head) * d2 * d3;
        for i in 0..tile.rows {
            for j in 0..tile.cols {
                let (m, n) = (tile.row0 + i, tile.col0 + j);
                let idx = if trans_c { n * d3 + m } else { m * d3 + n };
                out[base + idx] = T::from_f64(tile.values[i * tile.cols + j]);
            }
        }
    }
    Tensor::try_from_slice(&out, &shape, device)
}
