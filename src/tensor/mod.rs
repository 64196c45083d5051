//! Tensor types
//!
//! This module provides the dense `Tensor` operand type: a reference-counted
//! host buffer plus a strided view, tagged with dtype and device.

mod core;
mod layout;
mod storage;

pub use core::Tensor;
pub use layout::{Layout, Shape, Strides};
pub use storage::Storage;
