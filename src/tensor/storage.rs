//! Storage: host memory with Arc-based sharing

use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::runtime::Device;
use std::sync::Arc;

/// Storage for tensor data
///
/// Storage wraps a reference-counted buffer, enabling zero-copy views
/// (transpose, leading-dimension padding) that share the underlying memory.
///
/// The buffer is kept as 8-byte words so that any element type up to 8 bytes
/// can be viewed in place through bytemuck without alignment failures.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<StorageInner>,
}

struct StorageInner {
    words: Vec<u64>,
    /// Number of elements (not bytes)
    len: usize,
    dtype: DType,
    device: Device,
}

impl Storage {
    /// Create storage from existing data with inferred dtype
    pub fn from_slice<T: Element>(data: &[T], device: &Device) -> Self {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let mut words = vec![0u64; bytes.len().div_ceil(8)];
        bytemuck::cast_slice_mut::<u64, u8>(&mut words)[..bytes.len()].copy_from_slice(bytes);

        Self {
            inner: Arc::new(StorageInner {
                words,
                len: data.len(),
                dtype: T::DTYPE,
                device: *device,
            }),
        }
    }

    /// Create storage from raw bytes of `dtype` elements
    pub fn from_bytes(bytes: &[u8], dtype: DType, device: &Device) -> Self {
        let mut words = vec![0u64; bytes.len().div_ceil(8)];
        bytemuck::cast_slice_mut::<u64, u8>(&mut words)[..bytes.len()].copy_from_slice(bytes);

        Self {
            inner: Arc::new(StorageInner {
                words,
                len: bytes.len() / dtype.size_in_bytes(),
                dtype,
                device: *device,
            }),
        }
    }

    /// Create zero-filled storage
    pub fn zeros(len: usize, dtype: DType, device: &Device) -> Self {
        let words = vec![0u64; (len * dtype.size_in_bytes()).div_ceil(8)];
        Self {
            inner: Arc::new(StorageInner {
                words,
                len,
                dtype,
                device: *device,
            }),
        }
    }

    /// Number of elements
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len
    }

    /// Whether the storage holds no elements
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// Element type
    #[inline]
    pub fn dtype(&self) -> DType {
        self.inner.dtype
    }

    /// Device tag
    #[inline]
    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    /// Raw bytes of the stored elements
    pub fn as_bytes(&self) -> &[u8] {
        let n = self.inner.len * self.inner.dtype.size_in_bytes();
        &bytemuck::cast_slice::<u64, u8>(&self.inner.words)[..n]
    }

    /// Typed view of the stored elements
    ///
    /// Fails with `DTypeMismatch` when `T` does not match the storage dtype.
    pub fn as_slice<T: Element>(&self) -> Result<&[T]> {
        if T::DTYPE != self.inner.dtype {
            return Err(Error::DTypeMismatch {
                lhs: self.inner.dtype,
                rhs: T::DTYPE,
            });
        }
        Ok(bytemuck::cast_slice(self.as_bytes()))
    }

    /// Check whether two storages share the same buffer
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("len", &self.inner.len)
            .field("dtype", &self.inner.dtype)
            .field("device", &self.inner.device)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_odd_length() {
        let storage = Storage::from_slice(&[1.0f32, 2.0, 3.0], &Device::cpu());
        assert_eq!(storage.len(), 3);
        assert_eq!(storage.as_slice::<f32>().unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(storage.as_bytes().len(), 12);
    }

    #[test]
    fn test_wrong_type_view_fails() {
        let storage = Storage::from_slice(&[1.0f64, 2.0], &Device::cpu());
        assert!(storage.as_slice::<f32>().is_err());
    }

    #[test]
    fn test_zeros() {
        let storage = Storage::zeros(5, DType::F64, &Device::cpu());
        assert_eq!(storage.as_slice::<f64>().unwrap(), &[0.0; 5]);
    }
}
