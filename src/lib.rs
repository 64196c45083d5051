//! # blocksparse
//!
//! **Block-sparse matrix multiplication with load-balanced, lookup-table driven scheduling.**
//!
//! Sparsity is expressed at the granularity of square `block × block` tiles.
//! A [`BlockLayout`](sparse::BlockLayout) marks which tiles exist; a
//! [`BlockSparseMatmul`](ops::BlockSparseMatmul) compiles the layout into
//! lookup tables once and reuses them for every product.
//!
//! ## Modes
//!
//! - `sdd`: dense × dense, only the blocks of the layout are computed
//! - `dsd`: block-sparse × dense
//! - `dds`: dense × block-sparse
//!
//! Each mode also provides gradients for both operands, computed by one of
//! the other two modes (see [`autograd`]).
//!
//! ## Quick Start
//!
//! ```
//! use blocksparse::prelude::*;
//!
//! // 2 × 2 grid of 16 × 16 blocks, lower triangle populated
//! let layout = BlockLayout::from_slice(&[1u8, 0, 1, 1], &[2, 2]).unwrap();
//! let op = BlockSparseMatmul::new(layout, 16, SparseMode::SparseLeft, false, false).unwrap();
//!
//! let device = Device::cpu();
//! let a = Tensor::from_slice(&vec![1.0f32; 3 * 16 * 16], &[3, 16, 16], &device);
//! let b = Tensor::from_slice(&vec![1.0f32; 32 * 4], &[32, 4], &device);
//! let c = op.forward(&a, &b).unwrap();
//! assert_eq!(c.shape(), &[1, 32, 4]);
//!
//! let c = c.to_vec::<f32>();
//! assert_eq!(c[0], 16.0); // first block row holds one block
//! assert_eq!(c[16 * 4], 32.0); // second block row holds two
//! ```
//!
//! ## Feature Flags
//!
//! - `rayon` (default): Multi-threaded tile execution
//! - `f16` (default): Half-precision storage (F16, BF16)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod autograd;
pub mod dtype;
pub mod error;
pub mod ops;
pub mod runtime;
pub mod schedule;
pub mod sparse;
pub mod tensor;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::autograd::{BlockSparseMatmulBackward, GradFn};
    pub use crate::dtype::{AccumulationPrecision, DType};
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::ops::{BlockSparseMatmul, MatmulOptions};
    pub use crate::runtime::Device;
    pub use crate::runtime::cpu::ParallelismConfig;
    pub use crate::sparse::{BlockLayout, SparseMode};
    pub use crate::tensor::Tensor;
}
