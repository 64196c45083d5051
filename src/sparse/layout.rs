//! Binary block-occupancy layout

use crate::dispatch_dtype;
use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::tensor::Tensor;

/// Block-occupancy grid of shape `(Z, H, W)`
///
/// Each depth slice `z` is an independent `H × W` grid of blocks. A populated
/// cell corresponds to exactly one stored `block × block` tile of the sparse
/// operand, and stored tiles are ordered by the row-major rank of their
/// `(z, h, w)` coordinate.
///
/// A 2-D input is promoted to a single depth slice.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockLayout {
    mask: Vec<u8>,
    depth: usize,
    rows: usize,
    cols: usize,
    original_ndim: usize,
    /// Row-major rank of every populated cell, `u32::MAX` elsewhere
    ranks: Vec<u32>,
    nnz: usize,
}

impl BlockLayout {
    /// Build a layout from a row-major slice of 0/1 values
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` when `shape` is not 2-D or 3-D, when the
    /// data length disagrees with `shape`, or when a value is neither 0 nor 1.
    pub fn from_slice<T: Element>(data: &[T], shape: &[usize]) -> Result<Self> {
        let (depth, rows, cols) = match *shape {
            [h, w] => (1, h, w),
            [z, h, w] => (z, h, w),
            _ => {
                return Err(Error::config(format!(
                    "layout should be a 2 or 3 dimensional tensor of 0s and 1s, got {} dims",
                    shape.len()
                )));
            }
        };
        if data.len() != depth * rows * cols {
            return Err(Error::config(format!(
                "layout data has {} values but shape {:?} needs {}",
                data.len(),
                shape,
                depth * rows * cols
            )));
        }

        let mut mask = Vec::with_capacity(data.len());
        for (i, &v) in data.iter().enumerate() {
            let v = v.to_f64();
            if v == 0.0 {
                mask.push(0);
            } else if v == 1.0 {
                mask.push(1);
            } else {
                return Err(Error::config(format!(
                    "layout values must be 0 or 1, got {v} at flat index {i}"
                )));
            }
        }

        let mut ranks = vec![u32::MAX; mask.len()];
        let mut nnz = 0usize;
        for (rank, &m) in ranks.iter_mut().zip(mask.iter()) {
            if m != 0 {
                *rank = u32::try_from(nnz)
                    .map_err(|_| Error::config("layout has too many populated blocks"))?;
                nnz += 1;
            }
        }

        Ok(Self {
            mask,
            depth,
            rows,
            cols,
            original_ndim: shape.len(),
            ranks,
            nnz,
        })
    }

    /// Build a layout from a 2-D or 3-D tensor of any dtype
    pub fn from_tensor(tensor: &Tensor) -> Result<Self> {
        dispatch_dtype!(tensor.dtype(), T => {
            let data = tensor.try_to_vec::<T>()?;
            Self::from_slice(&data, tensor.shape())
        }, "BlockLayout::from_tensor")
    }

    /// Number of depth slices (`Z`)
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Block rows per slice (`H`)
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Block columns per slice (`W`)
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `[Z, H, W]`
    pub fn shape(&self) -> [usize; 3] {
        [self.depth, self.rows, self.cols]
    }

    /// Rank of the tensor the layout was built from (2 or 3)
    #[inline]
    pub fn original_ndim(&self) -> usize {
        self.original_ndim
    }

    /// Total number of populated blocks
    #[inline]
    pub fn nnz(&self) -> usize {
        self.nnz
    }

    /// Number of populated blocks in slice `z`
    pub fn slice_nnz(&self, z: usize) -> usize {
        self.slice(z).iter().filter(|&&m| m != 0).count()
    }

    /// Whether cell `(z, h, w)` is populated
    #[inline]
    pub fn is_set(&self, z: usize, h: usize, w: usize) -> bool {
        self.mask[self.flat(z, h, w)] != 0
    }

    /// Storage position of the block at `(z, h, w)`, if populated
    #[inline]
    pub fn storage_index(&self, z: usize, h: usize, w: usize) -> Option<usize> {
        match self.ranks[self.flat(z, h, w)] {
            u32::MAX => None,
            r => Some(r as usize),
        }
    }

    /// Populated blocks per row of slice `z` (reduction along `w`)
    pub fn row_sums(&self, z: usize) -> Vec<usize> {
        (0..self.rows)
            .map(|h| (0..self.cols).filter(|&w| self.is_set(z, h, w)).count())
            .collect()
    }

    /// Populated blocks per column of slice `z` (reduction along `h`)
    pub fn col_sums(&self, z: usize) -> Vec<usize> {
        let mut sums = vec![0usize; self.cols];
        for h in 0..self.rows {
            for (w, sum) in sums.iter_mut().enumerate() {
                *sum += self.is_set(z, h, w) as usize;
            }
        }
        sums
    }

    /// Raw mask values in row-major `(z, h, w)` order
    pub fn as_slice(&self) -> &[u8] {
        &self.mask
    }

    fn slice(&self, z: usize) -> &[u8] {
        let len = self.rows * self.cols;
        &self.mask[z * len..(z + 1) * len]
    }

    #[inline]
    fn flat(&self, z: usize, h: usize, w: usize) -> usize {
        (z * self.rows + h) * self.cols + w
    }
}
