//! Accumulator types for tile products

use crate::dtype::Element;

/// Trait for accumulation types (f32, f64) used by the tile kernels.
///
/// One generic kernel serves both widths. Inputs enter through `acc_in`,
/// results leave through `Into<f64>`.
pub trait Accumulator: Copy + Send + Sync + PartialEq + Into<f64> + 'static {
    const ZERO: Self;
    /// Convert f64 input to accumulator type
    fn acc_in(v: f64) -> Self;
    fn acc_add(self, other: Self) -> Self;
    fn acc_mul(self, other: Self) -> Self;

    /// Load a storage element
    #[inline]
    fn load<T: Element>(v: T) -> Self {
        Self::acc_in(v.to_f64())
    }
}

impl Accumulator for f32 {
    const ZERO: Self = 0.0;
    #[inline]
    fn acc_in(v: f64) -> Self {
        v as f32
    }
    #[inline]
    fn acc_add(self, other: Self) -> Self {
        self + other
    }
    #[inline]
    fn acc_mul(self, other: Self) -> Self {
        self * other
    }
}

impl Accumulator for f64 {
    const ZERO: Self = 0.0;
    #[inline]
    fn acc_in(v: f64) -> Self {
        v
    }
    #[inline]
    fn acc_add(self, other: Self) -> Self {
        self + other
    }
    #[inline]
    fn acc_mul(self, other: Self) -> Self {
        self * other
    }
}

/// Widen a finished accumulator tile for the epilogue
pub fn widen<A: Accumulator>(tile: Vec<A>) -> Vec<f64> {
    tile.into_iter().map(Into::into).collect()
}
