//! Sparse output from two dense operands

use super::accumulate::{Accumulator, widen};
use super::view::DenseView;
use super::{KernelContext, Transpose, check_heads};
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::schedule::SddLut;
use crate::tensor::Tensor;

/// Reduction sizes must be multiples of this
const K_MULTIPLE: usize = 16;

/// `C = A · B` restricted to the populated blocks of the layout
///
/// Returns `(batch, nnz, block, block)`. `trans.c` computes `(A · B)ᵀ` as
/// `Bᵀ · Aᵀ`.
pub(super) fn sdd_matmul<T: Element, A: Accumulator>(
    lut: &SddLut,
    a: &Tensor,
    b: &Tensor,
    trans: Transpose,
    ctx: &KernelContext<'_>,
) -> Result<Tensor> {
    let (a, b, trans_a, trans_b) = if trans.c {
        (b, a, !trans.b, !trans.a)
    } else {
        (a, b, trans.a, trans.b)
    };
    let block = ctx.block;
    let [_, rows_l, cols_l] = ctx.layout.shape();

    let lhs = DenseView::<T>::new(a, trans_a)?;
    let rhs = DenseView::<T>::new(b, trans_b)?;
    let [batch, _, m_dim, k_dim] = lhs.shape();
    let [batch_b, _, k_rhs, n_dim] = rhs.shape();

    if k_dim != k_rhs {
        return Err(Error::DimensionMismatch {
            arg: "B",
            dim: if trans_b { 3 } else { 2 },
            expected: k_dim,
            got: k_rhs,
        });
    }
    if k_dim % K_MULTIPLE != 0 {
        return Err(Error::invalid_shape(
            "A",
            format!("reduction size for sparse output must be a multiple of {K_MULTIPLE}, got {k_dim}"),
        ));
    }
    if batch_b != batch {
        return Err(Error::DimensionMismatch {
            arg: "B",
            dim: 0,
            expected: batch,
            got: batch_b,
        });
    }
    check_heads("A", a, ctx)?;
    check_heads("B", b, ctx)?;
    if m_dim != rows_l * block {
        return Err(Error::DimensionMismatch {
            arg: "A",
            dim: if trans_a { 3 } else { 2 },
            expected: rows_l * block,
            got: m_dim,
        });
    }
    if n_dim != cols_l * block {
        return Err(Error::DimensionMismatch {
            arg: "B",
            dim: if trans_b { 2 } else { 3 },
            expected: cols_l * block,
            got: n_dim,
        });
    }

    let tile_k = ctx.sdd_tile_k.max(1);
    let n_blocks = lut.n_blocks();
    let tasks: Vec<(usize, usize)> = lut
        .groups
        .iter()
        .enumerate()
        .flat_map(|(g, group)| (0..group.width()).map(move |t| (g, t)))
        .collect();

    let results = ctx.client.map_tasks(batch * tasks.len(), |task| {
        let z = task / tasks.len();
        let (g, t) = tasks[task % tasks.len()];
        let group = &lut.groups[g];
        let records = group.task(t);
        let pack = group.pack;
        let tile = pack * block;
        let head = records[0].depth as usize;

        let rows: Vec<usize> = (0..tile)
            .map(|i| records[(i / block) * pack].block_row as usize * block + i % block)
            .collect();
        let cols: Vec<usize> = (0..tile)
            .map(|j| records[j / block].block_col as usize * block + j % block)
            .collect();

        let mut acc = vec![A::ZERO; tile * tile];
        let mut k0 = 0;
        while k0 < k_dim {
            let k1 = (k0 + tile_k).min(k_dim);
            for (mi, &m) in rows.iter().enumerate() {
                let row = &mut acc[mi * tile..(mi + 1) * tile];
                for k in k0..k1 {
                    let av = A::load(lhs.get(z, head, m, k));
                    for (out, &n) in row.iter_mut().zip(&cols) {
                        *out = out.acc_add(av.acc_mul(A::load(rhs.get(z, head, k, n))));
                    }
                }
            }
            k0 = k1;
        }

        let acc = widen(acc);
        let mut blocks = Vec::with_capacity(pack * pack);
        for bm in 0..pack {
            for bn in 0..pack {
                let slot = records[bm * pack + bn].slot as usize;
                if slot >= n_blocks {
                    return Err(Error::internal(format!(
                        "output slot {slot} beyond {n_blocks} blocks"
                    )));
                }
                let mut values = Vec::with_capacity(block * block);
                for i in 0..block {
                    let start = (bm * block + i) * tile + bn * block;
                    values.extend_from_slice(&acc[start..start + block]);
                }
                blocks.push((z, slot, values));
            }
        }
        Ok(blocks)
    });

    let mut out = vec![T::zero(); batch * n_blocks * block * block];
    for blocks in results {
        for (z, slot, values) in blocks? {
            let base = (z * n_blocks + slot) * block * block;
            for (dst, v) in out[base..base + block * block].iter_mut().zip(values) {
                *dst = T::from_f64(v);
            }
        }
    }
    Tensor::try_from_slice(&out, &[batch, n_blocks, block, block], a.device())
}
