//! Dense output from a sparse right operand

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

/// `C = A · B` with `B` stored as populated blocks
///
/// One task per `(batch entry, M tile, schedule entry)`. Each task owns a
/// `dense_tile × block` strip of block column `header.column`, masked at `M`.
pub(super) fn dds_matmul<T: Element, A: Accumulator>(
    lut: &DenseLut,
    a: &Tensor,
    b: &Tensor,
    trans: Transpose,
    ctx: &KernelContext<'_>,
) -> Result<Tensor> {
    let block = ctx.block;
    let step = lut.step;
    let [_, rows_l, cols_l] = ctx.layout.shape();

    let dense = DenseView::<T>::new(a, trans.a)?;
    let [batch, heads, m_dim, k_dim] = dense.shape();
    check_heads("A", a, ctx)?;
    let expected_k = block * if trans.b { cols_l } else { rows_l };
    if k_dim != expected_k {
        return Err(Error::DimensionMismatch {
            arg: "A",
            dim: if trans.a { 2 } else { 3 },
            expected: expected_k,
            got: k_dim,
        });
    }

    let b = b.contiguous();
    check_block_operand("B", &b, batch, ctx)?;
    let sparse = BlockView::<T>::new(&b, block, trans.b)?;
    let n_dim = block * if trans.b { rows_l } else { cols_l };

    let tile_m = ctx.dense_tile.max(1);
    let m_tiles = m_dim.div_ceil(tile_m);
    let width = lut.width();
    let out_shape = if trans.c {
        [batch, heads, n_dim, m_dim]
    } else {
        [batch, heads, m_dim, n_dim]
    };

    let buffer = ctx.locks.buffer(a.device());
    let guard = acquire_locks(ctx, lut, &buffer, m_tiles, batch);
    let locks = guard.as_deref();
    let num_locks = ctx.num_locks.max(lut.num_locks) as usize;

    let tiles = ctx.client.map_tasks(batch * m_tiles * width, |task| {
        let t = task % width;
        let tile_index = task / width;
        let (z, tile) = (tile_index / m_tiles, tile_index % m_tiles);
        let header = &lut.headers[t];
        let head = header.depth as usize;
        let m0 = tile * tile_m;
        let tm = tile_m.min(m_dim - m0);

        let mut pinc = header.offset as usize;
        let start = lut.increment(pinc)?;
        let mut ka = i64::from(start.dense);
        let mut pb = i64::from(start.sparse) * (block * block) as i64;

        let mut acc = vec![A::ZERO; tm * block];
        for _ in 0..header.reduction_len as usize / step {
            let ptr = sparse.check_window(pb, step, block)?;
            if ka < 0 || ka as usize + step > k_dim {
                return Err(Error::internal(format!(
                    "dense offset {ka} outside reduction of {k_dim}"
                )));
            }
            let k0 = ka as usize;
            for mi in 0..tm {
                let row = &mut acc[mi * block..(mi + 1) * block];
                for kk in 0..step {
                    let av = A::load(dense.get(z, head, m0 + mi, k0 + kk));
                    for (ni, out) in row.iter_mut().enumerate() {
                        let bv = A::load(sparse.get(z, ptr, kk, ni));
                        *out = out.acc_add(av.acc_mul(bv));
                    }
                }
            }
            pinc += 1;
            let inc = lut.increment(pinc)?;
            ka += i64::from(inc.dense);
            pb += i64::from(inc.sparse);
        }

        let tile = DenseTile {
            z,
            head,
            row0: m0,
            col0: header.column as usize * block,
            rows: tm,
            cols: block,
            values: widen(acc),
        };
        epilogue(locks, num_locks, header, lut.lock_ranks[t], tile_index, tile)
    });

    write_dense::<T>(out_shape, trans.c, tiles, a.device())
}
