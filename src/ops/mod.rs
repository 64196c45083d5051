//! Block-sparse operations
//!
//! [`BlockSparseMatmul`] owns a layout and its configuration, builds the
//! schedules on first use, validates operands and launches the tile
//! kernels. [`MatmulOptions`] carries the tuning knobs.

#[macro_use]
mod dispatch;
mod matmul;
mod options;

pub use matmul::BlockSparseMatmul;
pub use options::MatmulOptions;
