//! Schedule builder shared by the two dense-output modes

use super::balance::load_balance_capped;
use super::lut::{DenseLut, Increment, TaskHeader, signed_to_i32, to_i32};
use crate::error::{Error, Result};
use crate::sparse::BlockLayout;
use tracing::debug;

/// One populated block in reduction order
struct Visit {
    /// Dense offset of the block along the reduction axis (elements)
    dense: i64,
    /// Storage position of the block (blocks)
    slot: i64,
}

/// Populated blocks in the order their tasks reduce them
///
/// `trans` walks each slice row by row (reduction along `w`); otherwise
/// column by column (reduction along `h`).
fn visit_order<F>(layout: &BlockLayout, block: usize, trans: bool, transform: &F) -> Vec<Visit>
where
    F: Fn(usize) -> usize,
{
    let [depth, rows, cols] = layout.shape();
    let mut visits = Vec::with_capacity(layout.nnz());
    for z in 0..depth {
        if trans {
            for h in 0..rows {
                for w in 0..cols {
                    if let Some(slot) = layout.storage_index(z, h, w) {
                        visits.push(Visit {
                            dense: transform(w * block) as i64,
                            slot: slot as i64,
                        });
                    }
                }
            }
        } else {
            for w in 0..cols {
                for h in 0..rows {
                    if let Some(slot) = layout.storage_index(z, h, w) {
                        visits.push(Visit {
                            dense: transform(h * block) as i64,
                            slot: slot as i64,
                        });
                    }
                }
            }
        }
    }
    visits
}

/// Build the segment schedule of a dense-output product
///
/// Tasks are grouped by layout rows when `trans` is set and by layout
/// columns otherwise. `transform` maps a block's reduction offset (in
/// elements) to the dense operand's offset; callers without remapping pass
/// the identity.
///
/// Every block expands to `block / step` reduction steps. The first step of
/// each block carries the jump from the previous block; the others advance
/// by `step` on the dense side and by one step of the stored block on the
/// sparse side. The first pair of every non-empty task holds absolute
/// starting offsets instead.
///
/// # Errors
///
/// `InvalidConfiguration` when `block` or `step` is zero, when `block` is
/// not a multiple of the effective step, or when a table value overflows
/// `i32`.
pub fn build_dense_lut<F>(
    layout: &BlockLayout,
    block: usize,
    step: usize,
    trans: bool,
    max_segment: Option<usize>,
    transform: F,
) -> Result<DenseLut>
where
    F: Fn(usize) -> usize,
{
    if block == 0 || step == 0 {
        return Err(Error::config("block and step must be positive"));
    }
    let step = step.min(block);
    if block % step != 0 {
        return Err(Error::config(format!(
            "block size {block} is not a multiple of step {step}"
        )));
    }
    let div = block / step;

    // Segments of every slice, with lock ids and offsets made global
    let mut headers = Vec::new();
    let mut seg_offsets = Vec::new();
    let mut seg_sizes = Vec::new();
    let mut lock_ranks = Vec::new();
    let mut lock_base = 0u32;
    let mut block_base = 0usize;
    for z in 0..layout.depth() {
        let sizes = if trans {
            layout.row_sums(z)
        } else {
            layout.col_sums(z)
        };
        let seg = load_balance_capped(&sizes, max_segment);
        for k in 0..seg.len() {
            let lock_id = match seg.lock_ids[k] {
                0 => 0,
                id => id + lock_base,
            };
            let rank = if lock_id != 0 && k > 0 && seg.lock_ids[k - 1] == seg.lock_ids[k] {
                lock_ranks.last().map_or(0, |r| r + 1)
            } else {
                0
            };
            lock_ranks.push(rank);
            seg_offsets.push(block_base + seg.offsets[k]);
            seg_sizes.push(seg.sizes[k]);
            headers.push(TaskHeader {
                offset: 0,
                reduction_len: to_i32(seg.sizes[k] * block, "reduction length")?,
                column: to_i32(seg.columns[k], "column")?,
                depth: to_i32(z, "depth")?,
                lock_id: i32::try_from(lock_id)
                    .map_err(|_| Error::config("lock id does not fit in i32"))?,
                max_tasks: i32::try_from(seg.max_tasks[k])
                    .map_err(|_| Error::config("max tasks does not fit in i32"))?,
            });
        }
        lock_base += seg.max_lock_id();
        block_base += layout.slice_nnz(z);
    }

    // Pointer increments
    let visits = visit_order(layout, block, trans, &transform);
    let nnz = visits.len();
    let (step_i, div_i, block_i) = (step as i64, div as i64, block as i64);
    let sparse_step = if trans { step_i } else { step_i * block_i };
    let mut increments = Vec::with_capacity(nnz * div + 1);
    let mut prev = Visit { dense: 0, slot: 0 };
    for v in &visits {
        let dense = v.dense - prev.dense - (div_i - 1) * step_i;
        let sparse = (v.slot - prev.slot) * block_i * block_i - (div_i - 1) * sparse_step;
        increments.push(Increment {
            dense: signed_to_i32(dense, "dense increment")?,
            sparse: signed_to_i32(sparse, "sparse increment")?,
        });
        for _ in 1..div {
            increments.push(Increment {
                dense: signed_to_i32(step_i, "dense step")?,
                sparse: signed_to_i32(sparse_step, "sparse step")?,
            });
        }
        prev = Visit {
            dense: v.dense,
            slot: v.slot,
        };
    }

    // Non-empty tasks start from absolute offsets
    for (&off, &size) in seg_offsets.iter().zip(&seg_sizes) {
        if size == 0 {
            continue;
        }
        let v = visits.get(off).ok_or_else(|| {
            Error::internal(format!("segment offset {off} beyond {nnz} populated blocks"))
        })?;
        increments[off * div] = Increment {
            dense: signed_to_i32(v.dense, "dense start")?,
            sparse: signed_to_i32(v.slot, "sparse start")?,
        };
    }
    increments.push(Increment::default());

    let last = nnz.saturating_sub(1);
    for (header, &off) in headers.iter_mut().zip(&seg_offsets) {
        header.offset = to_i32(off.min(last) * div, "increment offset")?;
    }

    let num_locks = headers.iter().map(|h| h.lock_id as u32).max().unwrap_or(0);
    debug!(
        block,
        step,
        trans,
        tasks = headers.len(),
        num_locks,
        "built dense-output schedule"
    );

    Ok(DenseLut {
        headers,
        increments,
        lock_ranks,
        num_locks,
        block,
        step,
        trans,
    })
}
