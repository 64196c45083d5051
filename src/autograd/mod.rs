//! Gradient support
//!
//! A forward product hands back a [`GradFn`] holding its operands. Calling
//! [`GradFn::backward`] with the gradient of the output yields one optional
//! gradient per input, in input order.
//!
//! ```
//! use blocksparse::prelude::*;
//!
//! let layout = BlockLayout::from_slice(&[1u8, 1, 0, 1], &[2, 2]).unwrap();
//! let op = BlockSparseMatmul::new(layout, 16, SparseMode::SparseLeft, false, false).unwrap();
//!
//! let device = Device::cpu();
//! let a = Tensor::from_slice(&vec![0.5f32; 3 * 16 * 16], &[3, 16, 16], &device);
//! let b = Tensor::from_slice(&vec![1.0f32; 32 * 16], &[32, 16], &device);
//! let (c, grad_fn) = op.forward_with_grad(&a, &b).unwrap();
//!
//! let dc = Tensor::from_slice(&vec![1.0f32; 32 * 16], c.shape(), &device);
//! let grads = grad_fn.backward(&dc).unwrap();
//! assert_eq!(grads[0].as_ref().unwrap().shape(), a.shape());
//! assert_eq!(grads[1].as_ref().unwrap().shape(), b.shape());
//! ```

mod grad_fn;
mod matmul;

pub use grad_fn::GradFn;
pub use matmul::BlockSparseMatmulBackward;
