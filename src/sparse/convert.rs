//! Conversion between dense matrices and stacks of populated blocks

use super::BlockLayout;
use crate::dispatch_dtype;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::tensor::Tensor;

/// Gather the populated blocks of a dense tensor
///
/// `dense` has shape `(..., Z, H·block, W·block)` with up to one leading
/// batch dimension; slices may be omitted when `Z == 1`. The result has
/// shape `(nnz, block, block)`, or `(batch, nnz, block, block)` for 4-D
/// input, with blocks in layout storage order.
pub fn dense_to_blocks(dense: &Tensor, layout: &BlockLayout, block: usize) -> Result<Tensor> {
    let [z, h, w] = layout.shape();
    if dense.ndim() < 2 || dense.ndim() > 4 {
        return Err(Error::invalid_shape(
            "dense",
            format!("expected 2 to 4 dims, got {}", dense.ndim()),
        ));
    }
    let padded = dense.pad_leading(4).contiguous();
    let shape = padded.shape();
    let expected = [shape[0], z, h * block, w * block];
    if shape != expected {
        return Err(Error::shape_mismatch(&expected, shape));
    }
    let batch = shape[0];
    let nnz = layout.nnz();

    let out_shape: Vec<usize> = if dense.ndim() == 4 {
        vec![batch, nnz, block, block]
    } else {
        vec![nnz, block, block]
    };

    dispatch_dtype!(dense.dtype(), T => {
        let src = padded.try_to_vec::<T>()?;
        let (rows, cols) = (h * block, w * block);
        let mut out = Vec::with_capacity(batch * nnz * block * block);
        for bz in 0..batch {
            for d in 0..z {
                let base = (bz * z + d) * rows * cols;
                for bh in 0..h {
                    for bw in 0..w {
                        if !layout.is_set(d, bh, bw) {
                            continue;
                        }
                        for i in 0..block {
                            let start = base + (bh * block + i) * cols + bw * block;
                            out.extend_from_slice(&src[start..start + block]);
                        }
                    }
                }
            }
        }
        Tensor::try_from_slice(&out, &out_shape, dense.device())
    }, "dense_to_blocks")
}

/// Scatter a stack of populated blocks into a zero-filled dense tensor
///
/// `blocks` has shape `(nnz, block, block)` or `(batch, nnz, block, block)`.
/// The result has shape `(Z, H·block, W·block)` (leading batch kept for 4-D
/// input); the slice dimension is dropped for 2-D layouts.
pub fn blocks_to_dense(blocks: &Tensor, layout: &BlockLayout, block: usize) -> Result<Tensor> {
    let [z, h, w] = layout.shape();
    let nnz = layout.nnz();
    let padded = blocks.pad_leading(4).contiguous();
    let shape = padded.shape();
    if blocks.ndim() < 3 || blocks.ndim() > 4 || shape[1..] != [nnz, block, block] {
        return Err(Error::shape_mismatch(&[nnz, block, block], blocks.shape()));
    }
    let batch = shape[0];
    let (rows, cols) = (h * block, w * block);

    let mut out_shape = vec![batch, z, rows, cols];
    if blocks.ndim() == 3 {
        out_shape.remove(0);
        if layout.original_ndim() == 2 {
            out_shape.remove(0);
        }
    }

    dispatch_dtype!(blocks.dtype(), T => {
        let src = padded.try_to_vec::<T>()?;
        let mut out = vec![T::zero(); batch * z * rows * cols];
        for bz in 0..batch {
            for d in 0..z {
                let base = (bz * z + d) * rows * cols;
                for bh in 0..h {
                    for bw in 0..w {
                        let Some(slot) = layout.storage_index(d, bh, bw) else {
                            continue;
                        };
                        let tile = (bz * nnz + slot) * block * block;
                        for i in 0..block {
                            let dst = base + (bh * block + i) * cols + bw * block;
                            out[dst..dst + block]
                                .copy_from_slice(&src[tile + i * block..tile + (i + 1) * block]);
                        }
                    }
                }
            }
        }
        Tensor::try_from_slice(&out, &out_shape, blocks.device())
    }, "blocks_to_dense")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Device;

    #[test]
    fn test_gather_then_scatter_masks_dense() {
        let layout = BlockLayout::from_slice(&[1u8, 0, 0, 1], &[2, 2]).unwrap();
        let data: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let dense = Tensor::from_slice(&data, &[4, 4], &Device::cpu());

        let blocks = dense_to_blocks(&dense, &layout, 2).unwrap();
        assert_eq!(blocks.shape(), &[2, 2, 2]);
        assert_eq!(blocks.to_vec::<f32>(), vec![0.0, 1.0, 4.0, 5.0, 10.0, 11.0, 14.0, 15.0]);

        let back = blocks_to_dense(&blocks, &layout, 2).unwrap();
        assert_eq!(back.shape(), &[4, 4]);
        let expected: Vec<f32> = data
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let (r, c) = (i / 4, i % 4);
                if (r < 2) == (c < 2) { v } else { 0.0 }
            })
            .collect();
        assert_eq!(back.to_vec::<f32>(), expected);
    }

    #[test]
    fn test_scatter_integer_batch_zero_fills_absent_blocks() {
        let layout = BlockLayout::from_slice(&[0u8, 1], &[1, 2]).unwrap();
        let blocks = Tensor::from_slice(&[1i32, 2, 3, 4, 5, 6, 7, 8], &[2, 1, 2, 2], &Device::cpu());

        let dense = blocks_to_dense(&blocks, &layout, 2).unwrap();
        assert_eq!(dense.shape(), &[2, 1, 2, 4]);
        assert_eq!(
            dense.to_vec::<i32>(),
            vec![0, 0, 1, 2, 0, 0, 3, 4, 0, 0, 5, 6, 0, 0, 7, 8]
        );
    }

    #[test]
    fn test_rejects_wrong_dense_shape() {
        let layout = BlockLayout::from_slice(&[1u8, 1], &[1, 2]).unwrap();
        let dense = Tensor::zeros(&[2, 3], crate::dtype::DType::F32, &Device::cpu());
        assert!(dense_to_blocks(&dense, &layout, 2).is_err());
    }
}
