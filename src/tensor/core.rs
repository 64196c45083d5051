//! Core Tensor type

use super::{Layout, Storage};
use crate::dispatch_dtype;
use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::runtime::Device;
use std::fmt;

/// N-dimensional array tagged with a device
///
/// `Tensor` consists of:
/// - **Storage**: Reference-counted memory (dtype and device live here)
/// - **Layout**: Shape, strides, and offset defining the view into storage
///
/// # Zero-Copy Views
///
/// `transpose`, `pad_leading` and `trim_leading` share the underlying storage
/// and only change the layout.
///
/// # Example
///
/// ```
/// use blocksparse::prelude::*;
///
/// let a = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0], &[2, 2], &Device::cpu());
/// let b = a.transpose(-1, -2).unwrap();
/// assert_eq!(b.to_vec::<f32>(), vec![1.0, 3.0, 2.0, 4.0]);
/// ```
#[derive(Clone)]
pub struct Tensor {
    storage: Storage,
    layout: Layout,
}

impl Tensor {
    /// Create a tensor from storage and layout
    pub fn from_parts(storage: Storage, layout: Layout) -> Self {
        Self { storage, layout }
    }

    /// Create a tensor from a slice of data
    ///
    /// # Panics
    ///
    /// Panics if `data.len()` does not equal the product of the `shape` dimensions.
    /// For a fallible alternative, use [`Self::try_from_slice`].
    pub fn from_slice<T: Element>(data: &[T], shape: &[usize], device: &Device) -> Self {
        Self::try_from_slice(data, shape, device).expect("Tensor::from_slice failed")
    }

    /// Create a tensor from a slice of data (fallible version)
    pub fn try_from_slice<T: Element>(data: &[T], shape: &[usize], device: &Device) -> Result<Self> {
        let expected_len: usize = shape.iter().product();
        if data.len() != expected_len {
            return Err(Error::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![data.len()],
            });
        }

        Ok(Self {
            storage: Storage::from_slice(data, device),
            layout: Layout::contiguous(shape),
        })
    }

    /// Create a tensor filled with zeros
    pub fn zeros(shape: &[usize], dtype: DType, device: &Device) -> Self {
        let len: usize = shape.iter().product();
        Self {
            storage: Storage::zeros(len, dtype, device),
            layout: Layout::contiguous(shape),
        }
    }

    /// Get the shape
    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    /// Get the strides (in elements)
    #[inline]
    pub fn strides(&self) -> &[isize] {
        self.layout.strides()
    }

    /// Number of dimensions
    #[inline]
    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    /// Total number of elements
    #[inline]
    pub fn numel(&self) -> usize {
        self.layout.elem_count()
    }

    /// Element type
    #[inline]
    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    /// Device tag
    #[inline]
    pub fn device(&self) -> &Device {
        self.storage.device()
    }

    /// Memory layout
    #[inline]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Underlying storage
    #[inline]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Whether the tensor is row-major contiguous with zero offset
    #[inline]
    pub fn is_contiguous(&self) -> bool {
        self.layout.is_contiguous()
    }

    /// Size along a dimension (negative indices count from the end)
    pub fn size(&self, dim: isize) -> Result<usize> {
        self.layout.dim(dim).ok_or_else(|| {
            Error::invalid_shape(
                "dim",
                format!("dimension {dim} out of range for {} dims", self.ndim()),
            )
        })
    }

    /// Stride along a dimension (negative indices count from the end)
    pub fn stride(&self, dim: isize) -> Result<isize> {
        self.layout.stride(dim).ok_or_else(|| {
            Error::invalid_shape(
                "dim",
                format!("dimension {dim} out of range for {} dims", self.ndim()),
            )
        })
    }

    /// Swap two dimensions (zero-copy)
    pub fn transpose(&self, dim0: isize, dim1: isize) -> Result<Self> {
        let layout = self.layout.transpose(dim0, dim1).ok_or_else(|| {
            Error::invalid_shape(
                "dim",
                format!(
                    "cannot transpose dims {dim0} and {dim1} of a {}-d tensor",
                    self.ndim()
                ),
            )
        })?;
        Ok(Self::from_parts(self.storage.clone(), layout))
    }

    /// Transpose the last two dimensions (zero-copy)
    pub fn t(&self) -> Result<Self> {
        self.transpose(-2, -1)
    }

    /// Prepend singleton dimensions up to `ndim` (zero-copy)
    pub fn pad_leading(&self, ndim: usize) -> Self {
        Self::from_parts(self.storage.clone(), self.layout.pad_leading(ndim))
    }

    /// Drop leading singleton dimensions while rank exceeds `ndim` (zero-copy)
    pub fn trim_leading(&self, ndim: usize) -> Self {
        Self::from_parts(self.storage.clone(), self.layout.trim_leading(ndim))
    }

    /// Return a contiguous tensor, copying only when needed
    pub fn contiguous(&self) -> Self {
        if self.is_contiguous() && self.storage.len() == self.numel() {
            return self.clone();
        }

        let elem = self.dtype().size_in_bytes();
        let src = self.storage.as_bytes();
        let mut bytes = Vec::with_capacity(self.numel() * elem);
        for off in self.layout.offsets() {
            bytes.extend_from_slice(&src[off * elem..(off + 1) * elem]);
        }

        let storage = Storage::from_bytes(&bytes, self.dtype(), self.device());
        Self::from_parts(storage, Layout::contiguous(self.shape()))
    }

    /// Copy elements out in row-major logical order (fallible version)
    pub fn try_to_vec<T: Element>(&self) -> Result<Vec<T>> {
        let data = self.storage.as_slice::<T>()?;
        if self.is_contiguous() {
            return Ok(data[..self.numel()].to_vec());
        }
        Ok(self.layout.offsets().into_iter().map(|o| data[o]).collect())
    }

    /// Copy elements out in row-major logical order
    ///
    /// # Panics
    ///
    /// Panics if `T` does not match the tensor dtype.
    pub fn to_vec<T: Element>(&self) -> Vec<T> {
        self.try_to_vec().expect("Tensor::to_vec dtype mismatch")
    }

    /// Convert to another dtype (copies)
    pub fn to_dtype(&self, dtype: DType) -> Result<Self> {
        if dtype == self.dtype() {
            return Ok(self.clone());
        }

        let values: Vec<f64> = dispatch_dtype!(self.dtype(), S => {
            self.try_to_vec::<S>()?.into_iter().map(Element::to_f64).collect()
        }, "to_dtype");

        dispatch_dtype!(dtype, D => {
            let out: Vec<D> = values.into_iter().map(D::from_f64).collect();
            Tensor::try_from_slice(&out, self.shape(), self.device())
        }, "to_dtype")
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape())
            .field("dtype", &self.dtype())
            .field("device", self.device())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice_shape_check() {
        let device = Device::cpu();
        assert!(Tensor::try_from_slice(&[1.0f32, 2.0, 3.0], &[2, 2], &device).is_err());
        let t = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0], &[2, 2], &device);
        assert_eq!(t.shape(), &[2, 2]);
        assert_eq!(t.dtype(), DType::F32);
    }

    #[test]
    fn test_transpose_then_contiguous() {
        let device = Device::cpu();
        let t = Tensor::from_slice(&[1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3], &device);
        let tt = t.t().unwrap();
        assert_eq!(tt.shape(), &[3, 2]);
        assert!(!tt.is_contiguous());
        let c = tt.contiguous();
        assert!(c.is_contiguous());
        assert_eq!(c.to_vec::<f64>(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_pad_trim_roundtrip() {
        let t = Tensor::from_slice(&[1.0f32; 6], &[2, 3], &Device::cpu());
        let p = t.pad_leading(4);
        assert_eq!(p.shape(), &[1, 1, 2, 3]);
        assert_eq!(p.trim_leading(2).shape(), &[2, 3]);
    }

    #[test]
    fn test_to_dtype() {
        let t = Tensor::from_slice(&[1.5f32, -2.0], &[2], &Device::cpu());
        let d = t.to_dtype(DType::F64).unwrap();
        assert_eq!(d.to_vec::<f64>(), vec![1.5, -2.0]);
        let i = t.to_dtype(DType::I32).unwrap();
        assert_eq!(i.to_vec::<i32>(), vec![1, -2]);
    }
}
