//! Common test utilities
#![allow(dead_code)]

use blocksparse::prelude::*;

/// Deterministic pseudo-random values in `[-1, 1)`
pub fn test_data(len: usize, seed: u64) -> Vec<f64> {
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(1);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
        })
        .collect()
}

/// Assert two f64 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f64(a: &[f64], b: &[f64], rtol: f64, atol: f64, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Assert an f32 result matches an f64 reference
pub fn assert_allclose_f32(a: &[f32], b: &[f64], rtol: f64, atol: f64, msg: &str) {
    let a: Vec<f64> = a.iter().map(|&x| x as f64).collect();
    assert_allclose_f64(&a, b, rtol, atol, msg);
}

/// Row-major stack of `batch` matrices of `rows × cols`
#[derive(Clone, Debug)]
pub struct Mat {
    pub data: Vec<f64>,
    pub batch: usize,
    pub rows: usize,
    pub cols: usize,
}

impl Mat {
    pub fn zeros(batch: usize, rows: usize, cols: usize) -> Self {
        Self {
            data: vec![0.0; batch * rows * cols],
            batch,
            rows,
            cols,
        }
    }

    pub fn random(batch: usize, rows: usize, cols: usize, seed: u64) -> Self {
        Self {
            data: test_data(batch * rows * cols, seed),
            batch,
            rows,
            cols,
        }
    }

    #[inline]
    pub fn get(&self, b: usize, r: usize, c: usize) -> f64 {
        self.data[(b * self.rows + r) * self.cols + c]
    }

    #[inline]
    pub fn set(&mut self, b: usize, r: usize, c: usize, v: f64) {
        self.data[(b * self.rows + r) * self.cols + c] = v;
    }

    pub fn transpose(&self) -> Self {
        let mut out = Self::zeros(self.batch, self.cols, self.rows);
        for b in 0..self.batch {
            for r in 0..self.rows {
                for c in 0..self.cols {
                    out.set(b, c, r, self.get(b, r, c));
                }
            }
        }
        out
    }

    /// `self` transposed when `trans`
    pub fn op(&self, trans: bool) -> Self {
        if trans { self.transpose() } else { self.clone() }
    }

    pub fn matmul(&self, rhs: &Self) -> Self {
        assert_eq!(self.batch, rhs.batch);
        assert_eq!(self.cols, rhs.rows);
        let mut out = Self::zeros(self.batch, self.rows, rhs.cols);
        for b in 0..self.batch {
            for i in 0..self.rows {
                for k in 0..self.cols {
                    let a = self.get(b, i, k);
                    for j in 0..rhs.cols {
                        let idx = (b * out.rows + i) * out.cols + j;
                        out.data[idx] += a * rhs.get(b, k, j);
                    }
                }
            }
        }
        out
    }

    /// f32 tensor of shape `(outer, batch / outer, rows, cols)`
    pub fn to_tensor_f32(&self, outer: usize) -> Tensor {
        let data: Vec<f32> = self.data.iter().map(|&x| x as f32).collect();
        Tensor::from_slice(
            &data,
            &[outer, self.batch / outer, self.rows, self.cols],
            &Device::cpu(),
        )
    }

    /// f64 tensor of shape `(outer, batch / outer, rows, cols)`
    pub fn to_tensor_f64(&self, outer: usize) -> Tensor {
        Tensor::from_slice(
            &self.data,
            &[outer, self.batch / outer, self.rows, self.cols],
            &Device::cpu(),
        )
    }

    /// Same values with f32 rounding applied
    pub fn rounded_f32(&self) -> Self {
        let mut out = self.clone();
        for v in &mut out.data {
            *v = *v as f32 as f64;
        }
        out
    }
}

/// Populated blocks of `dense` in layout storage order, per outer batch entry
///
/// `dense.batch` must be `outer · Z`.
pub fn gather_blocks(dense: &Mat, layout: &BlockLayout, block: usize) -> Vec<f64> {
    let [depth, rows, cols] = layout.shape();
    let outer = dense.batch / depth;
    let mut out = Vec::with_capacity(outer * layout.nnz() * block * block);
    for o in 0..outer {
        for z in 0..depth {
            for h in 0..rows {
                for w in 0..cols {
                    if !layout.is_set(z, h, w) {
                        continue;
                    }
                    for i in 0..block {
                        for j in 0..block {
                            out.push(dense.get(o * depth + z, h * block + i, w * block + j));
                        }
                    }
                }
            }
        }
    }
    out
}

/// Dense matrices holding `blocks` at the populated positions, zeros elsewhere
pub fn scatter_blocks(blocks: &[f64], layout: &BlockLayout, block: usize) -> Mat {
    let [depth, rows, cols] = layout.shape();
    let nnz = layout.nnz();
    let outer = if nnz == 0 {
        1
    } else {
        blocks.len() / (nnz * block * block)
    };
    let mut out = Mat::zeros(outer * depth, rows * block, cols * block);
    let mut next = 0;
    for o in 0..outer {
        for z in 0..depth {
            for h in 0..rows {
                for w in 0..cols {
                    if !layout.is_set(z, h, w) {
                        continue;
                    }
                    for i in 0..block {
                        for j in 0..block {
                            out.set(o * depth + z, h * block + i, w * block + j, blocks[next]);
                            next += 1;
                        }
                    }
                }
            }
        }
    }
    out
}

/// f32 tensor `(outer, nnz, block, block)` of block values
pub fn blocks_tensor_f32(blocks: &[f64], outer: usize, nnz: usize, block: usize) -> Tensor {
    let data: Vec<f32> = blocks.iter().map(|&x| x as f32).collect();
    Tensor::from_slice(&data, &[outer, nnz, block, block], &Device::cpu())
}

/// Random block values for `outer` batch entries, rounded to f32
pub fn random_blocks(layout: &BlockLayout, block: usize, outer: usize, seed: u64) -> Vec<f64> {
    test_data(outer * layout.nnz() * block * block, seed)
        .into_iter()
        .map(|x| x as f32 as f64)
        .collect()
}

/// Layout from a `(Z, H, W)` nested pattern
pub fn layout_3d(pattern: &[&[&[u8]]]) -> BlockLayout {
    let depth = pattern.len();
    let rows = pattern[0].len();
    let cols = pattern[0][0].len();
    let flat: Vec<u8> = pattern
        .iter()
        .flat_map(|slice| slice.iter().flat_map(|row| row.iter().copied()))
        .collect();
    BlockLayout::from_slice(&flat, &[depth, rows, cols]).unwrap()
}

/// Layout from an `(H, W)` nested pattern
pub fn layout_2d(pattern: &[&[u8]]) -> BlockLayout {
    let rows = pattern.len();
    let cols = pattern[0].len();
    let flat: Vec<u8> = pattern.iter().flat_map(|row| row.iter().copied()).collect();
    BlockLayout::from_slice(&flat, &[rows, cols]).unwrap()
}
