//! Block-sparse layouts and modes
//!
//! A [`BlockLayout`] marks which `block × block` tiles of a matrix are
//! present. [`SparseMode`] says which operand of a product is stored as a
//! stack of those tiles.

pub mod convert;
mod layout;
mod mode;

pub use convert::{blocks_to_dense, dense_to_blocks};
pub use layout::BlockLayout;
pub use mode::{Role, SparseMode};
