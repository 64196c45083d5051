//! Element trait for mapping Rust types to DType

use super::DType;
use bytemuck::{Pod, Zeroable};
use std::ops::{Add, Mul, Sub};

/// Trait for types that can be elements of a tensor
///
/// # Bounds
/// - `Copy + Send + Sync + 'static` - tiles are shared across worker threads
/// - `Pod + Zeroable` - storage is viewed through bytemuck
/// - `Add + Sub + Mul` - reference arithmetic in tests and helpers
/// - `PartialOrd` - layout validation compares against 0 and 1
pub trait Element:
    Copy
    + Send
    + Sync
    + Pod
    + Zeroable
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + PartialOrd
    + std::fmt::Debug
{
    /// The corresponding DType for this Rust type
    const DTYPE: DType;

    /// Convert to f64 for generic numeric operations
    fn to_f64(self) -> f64;

    /// Convert from f64 to this type
    fn from_f64(v: f64) -> Self;

    /// Zero value
    fn zero() -> Self;
}

macro_rules! impl_element_primitive {
    ($t:ty, $dtype:expr, $zero:expr) => {
        impl Element for $t {
            const DTYPE: DType = $dtype;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(v: f64) -> Self {
                v as $t
            }

            #[inline]
            fn zero() -> Self {
                $zero
            }
        }
    };
}

impl_element_primitive!(f64, DType::F64, 0.0);
impl_element_primitive!(f32, DType::F32, 0.0);
impl_element_primitive!(i64, DType::I64, 0);
impl_element_primitive!(i32, DType::I32, 0);
impl_element_primitive!(u8, DType::U8, 0);

// ============================================================================
// Half-precision floating point types (requires "f16" feature)
// ============================================================================

#[cfg(feature = "f16")]
impl Element for half::f16 {
    const DTYPE: DType = DType::F16;

    #[inline]
    fn to_f64(self) -> f64 {
        half::f16::to_f64(self)
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        half::f16::from_f64(v)
    }

    #[inline]
    fn zero() -> Self {
        half::f16::ZERO
    }
}

#[cfg(feature = "f16")]
impl Element for half::bf16 {
    const DTYPE: DType = DType::BF16;

    #[inline]
    fn to_f64(self) -> f64 {
        half::bf16::to_f64(self)
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        half::bf16::from_f64(v)
    }

    #[inline]
    fn zero() -> Self {
        half::bf16::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_dtype() {
        assert_eq!(f64::DTYPE, DType::F64);
        assert_eq!(f32::DTYPE, DType::F32);
        assert_eq!(i32::DTYPE, DType::I32);
        assert_eq!(u8::DTYPE, DType::U8);
    }

    #[test]
    fn test_element_conversions() {
        assert_eq!(f32::from_f64(2.5).to_f64(), 2.5f32 as f64);
        assert_eq!(i32::from_f64(42.0), 42);
        assert_eq!(u8::zero(), 0);
    }

    #[cfg(feature = "f16")]
    #[test]
    fn test_half_element_conversions() {
        let h = half::f16::from_f64(1.5);
        assert_eq!(h.to_f64(), 1.5);
        let b = half::bf16::from_f64(-2.0);
        assert_eq!(Element::to_f64(b), -2.0);
        assert_eq!(half::bf16::DTYPE, DType::BF16);
    }
}
