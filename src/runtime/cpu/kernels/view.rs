//! Index-based views over 4-D operands

use crate::dtype::Element;
use crate::error::{Error, Result};
use crate::tensor::Tensor;

/// Strided view of a dense `(batch, heads, rows, cols)` operand
///
/// `rows`/`cols` follow the operand's role in the product, so a transposed
/// operand is read through swapped strides without a copy.
pub struct DenseView<'a, T> {
    data: &'a [T],
    offset: isize,
    strides: [isize; 4],
    shape: [usize; 4],
}

impl<'a, T: Element> DenseView<'a, T> {
    /// View `tensor` (must be 4-D), transposing the last two dims when `trans`
    pub fn new(tensor: &'a Tensor, trans: bool) -> Result<Self> {
        let shape: [usize; 4] = tensor
            .shape()
            .try_into()
            .map_err(|_| Error::internal("tile kernel operand is not 4-D"))?;
        let strides: [isize; 4] = tensor
            .strides()
            .try_into()
            .map_err(|_| Error::internal("tile kernel operand is not 4-D"))?;
        let mut view = Self {
            data: tensor.storage().as_slice::<T>()?,
            offset: tensor.layout().offset() as isize,
            strides,
            shape,
        };
        if trans {
            view.shape.swap(2, 3);
            view.strides.swap(2, 3);
        }
        Ok(view)
    }

    /// `[batch, heads, rows, cols]` in product orientation
    #[inline]
    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    /// Element at `(z, h, r, c)`
    #[inline]
    pub fn get(&self, z: usize, h: usize, r: usize, c: usize) -> T {
        let idx = self.offset
            + z as isize * self.strides[0]
            + h as isize * self.strides[1]
            + r as isize * self.strides[2]
            + c as isize * self.strides[3];
        self.data[idx as usize]
    }
}

/// Contiguous stack of `block × block` tiles, `(batch, nnz, block, block)`
pub struct BlockView<'a, T> {
    data: &'a [T],
    batch_stride: usize,
    /// Strides of (row, col) of the product inside a stored block
    inner: (usize, usize),
}

impl<'a, T: Element> BlockView<'a, T> {
    /// View a contiguous 4-D block stack; `trans` reads each block transposed
    pub fn new(tensor: &'a Tensor, block: usize, trans: bool) -> Result<Self> {
        if !tensor.is_contiguous() || tensor.ndim() != 4 {
            return Err(Error::internal("block operand must be contiguous and 4-D"));
        }
        let shape = tensor.shape();
        Ok(Self {
            data: tensor.storage().as_slice::<T>()?,
            batch_stride: shape[1] * shape[2] * shape[3],
            inner: if trans { (1, block) } else { (block, 1) },
        })
    }

    /// Element `(r, c)` relative to element pointer `ptr` of batch entry `z`
    ///
    /// `ptr` counts elements from the start of the batch entry's blocks.
    #[inline]
    pub fn get(&self, z: usize, ptr: usize, r: usize, c: usize) -> T {
        self.data[z * self.batch_stride + ptr + r * self.inner.0 + c * self.inner.1]
    }

    /// Check that a `rows × cols` window at `ptr` stays inside the blocks
    pub fn check_window(&self, ptr: i64, rows: usize, cols: usize) -> Result<usize> {
        let last = (rows.saturating_sub(1) * self.inner.0 + cols.saturating_sub(1) * self.inner.1) as i64;
        if ptr < 0 || ptr + last >= self.batch_stride as i64 {
            return Err(Error::internal(format!(
                "sparse pointer {ptr} outside {} stored elements",
                self.batch_stride
            )));
        }
        Ok(ptr as usize)
    }
}
