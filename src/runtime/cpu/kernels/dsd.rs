//! Dense output from a sparse left operand

use super::accumulate::{Accumulator, widen};
use super::view::{BlockView, DenseView};
use super::{
    DenseTile, KernelContext, Transpose, acquire_locks, check_block_operand, check_heads,
    epilogue, write_dense,
};
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::schedule::DenseLut;
use crate::tensor::Tensor;

/// `C = A · B` with `A` stored as populated blocks
///
/// One task per `(batch entry, N tile, schedule entry)`. Each task owns a
/// `block × dense_tile` strip of block row `header.column`, masked at `N`.
pub(super) fn dsd_matmul<T: Element, A: Accumulator>(
    lut: &DenseLut,
    a: &Tensor,
    b: &Tensor,
    trans: Transpose,
    ctx: &KernelContext<'_>,
) -> Result<Tensor> {
    let block = ctx.block;
    let step = lut.step;
    let [_, rows_l, cols_l] = ctx.layout.shape();

    let dense = DenseView::<T>::new(b, trans.b)?;
    let [batch, heads, k_dim, n_dim] = dense.shape();
    check_heads("B", b, ctx)?;
    let expected_k = block * if trans.a { rows_l } else { cols_l };
    if k_dim != expected_k {
        return Err(Error::DimensionMismatch {
            arg: "B",
            dim: if trans.b { 3 } else { 2 },
            expected: expected_k,
            got: k_dim,
        });
    }

    let a = a.contiguous();
    check_block_operand("A", &a, batch, ctx)?;
    let sparse = BlockView::<T>::new(&a, block, trans.a)?;
    let m_dim = block * if trans.a { cols_l } else { rows_l };

    let tile_n = ctx.dense_tile.max(1);
    let n_tiles = n_dim.div_ceil(tile_n);
    let width = lut.width();
    let out_shape = if trans.c {
        [batch, heads, n_dim, m_dim]
    } else {
        [batch, heads, m_dim, n_dim]
    };

    let buffer = ctx.locks.buffer(b.device());
    let guard = acquire_locks(ctx, lut, &buffer, n_tiles, batch);
    let locks = guard.as_deref();
    let num_locks = ctx.num_locks.max(lut.num_locks) as usize;

    let tiles = ctx.client.map_tasks(batch * n_tiles * width, |task| {
        let t = task % width;
        let tile_index = task / width;
        let (z, tile) = (tile_index / n_tiles, tile_index % n_tiles);
        let header = &lut.headers[t];
        let head = header.depth as usize;
        let n0 = tile * tile_n;
        let tn = tile_n.min(n_dim - n0);

        let mut pinc = header.offset as usize;
        let start = lut.increment(pinc)?;
        let mut pa = i64::from(start.sparse) * (block * block) as i64;
        let mut kb = i64::from(start.dense);

        let mut acc = vec![A::ZERO; block * tn];
        for _ in 0..header.reduction_len as usize / step {
            let ptr = sparse.check_window(pa, block, step)?;
            if kb < 0 || kb as usize + step > k_dim {
                return Err(Error::internal(format!(
                    "dense offset {kb} outside reduction of {k_dim}"
                )));
            }
            let k0 = kb as usize;
            for mi in 0..block {
                let row = &mut acc[mi * tn..(mi + 1) * tn];
                for kk in 0..step {
                    let av = A::load(sparse.get(z, ptr, mi, kk));
                    for (ni, out) in row.iter_mut().enumerate() {
                        let bv = A::load(dense.get(z, head, k0 + kk, n0 + ni));
                        *out = out.acc_add(av.acc_mul(bv));
                    }
                }
            }
            pinc += 1;
            let inc = lut.increment(pinc)?;
            pa += i64::from(inc.sparse);
            kb += i64::from(inc.dense);
        }

        let tile = DenseTile {
            z,
            head,
            row0: header.column as usize * block,
            col0: n0,
            rows: block,
            cols: tn,
            values: widen(acc),
        };
        epilogue(locks, num_locks, header, lut.lock_ranks[t], tile_index, tile)
    });

    write_dense::<T>(out_shape, trans.c, tiles, b.device())
}
