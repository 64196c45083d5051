//! Data type system for blocksparse tensors
//!
//! This module provides the `DType` enum representing the supported element
//! types, the `Element` trait mapping Rust types onto it, and the accumulation
//! precision used by the tile kernels.

mod element;

pub use element::Element;

use std::fmt;

// ============================================================================
// Accumulation Precision
// ============================================================================

/// Accumulation precision for tile matrix multiplications.
///
/// Tile kernels accumulate partial dot products in a type at least as wide as
/// the storage type and cast back to storage in the epilogue.
///
/// | Storage        | `F32` (default) | `F64` |
/// |----------------|-----------------|-------|
/// | F16, BF16, F32 | f32             | f64   |
/// | F64            | f64             | f64   |
///
/// F64 storage always accumulates in f64.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum AccumulationPrecision {
    /// Accumulate in F64
    F64,
    /// Accumulate in F32 (default, good for ML/AI)
    #[default]
    F32,
}

impl AccumulationPrecision {
    /// Resolve the accumulator width for a given storage dtype
    #[inline]
    pub fn resolve(self, storage: DType) -> Self {
        match storage {
            DType::F64 => Self::F64,
            _ => self,
        }
    }
}

// ============================================================================
// DType Enum
// ============================================================================

/// Data types supported by blocksparse tensors
///
/// Floating point types are valid matmul operands. Integer types exist so
/// that block layouts can be passed around as tensors.
///
/// # Discriminant Values (Serialization Stability)
///
/// - Floats: 0-9 (F64=0, F32=1, F16=2, BF16=3)
/// - Signed ints: 10-19 (I64=10, I32=11)
/// - Unsigned ints: 20-29 (U8=23)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u8)]
pub enum DType {
    /// 64-bit floating point
    F64 = 0,
    /// 32-bit floating point (most common)
    F32 = 1,
    /// 16-bit floating point (IEEE 754)
    F16 = 2,
    /// 16-bit brain floating point
    BF16 = 3,
    /// 64-bit signed integer
    I64 = 10,
    /// 32-bit signed integer
    I32 = 11,
    /// 8-bit unsigned integer
    U8 = 23,
}

impl DType {
    /// Size of one element in bytes
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            Self::F64 | Self::I64 => 8,
            Self::F32 | Self::I32 => 4,
            Self::F16 | Self::BF16 => 2,
            Self::U8 => 1,
        }
    }

    /// Returns true if this is a floating point type
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F64 | Self::F32 | Self::F16 | Self::BF16)
    }

    /// Returns true if this is a reduced-precision float (F16, BF16)
    #[inline]
    pub const fn is_half(self) -> bool {
        matches!(self, Self::F16 | Self::BF16)
    }

    /// Short name used in error messages and logs
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::F64 => "f64",
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::BF16 => "bf16",
            Self::I64 => "i64",
            Self::I32 => "i32",
            Self::U8 => "u8",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}
