//! Layout-to-schedule compiler
//!
//! Turns a [`BlockLayout`](crate::sparse::BlockLayout) into the lookup
//! tables the tile kernels walk:
//!
//! - [`balance`] splits uneven per-column reduction lengths into segments
//!   and assigns locks to columns that were split;
//! - [`sdd`] groups populated blocks into super-blocks for the
//!   sparse-output kernel;
//! - [`dxx`] emits one task per segment, with pointer increments, for the
//!   dense-output kernels;
//! - [`cache`] keeps the three tables of a product per `(dtype, device)`.

pub mod balance;
pub mod cache;
pub mod dxx;
pub mod lut;
pub mod sdd;
mod superblock;

pub use balance::{Segments, load_balance, load_balance_capped};
pub use cache::{LutCache, ScheduleConfig, ScheduleSet};
pub use dxx::build_dense_lut;
pub use lut::{DenseLut, Increment, ModeLut, SddLut, SuperBlockGroup, SuperBlockRecord, TaskHeader};
pub use sdd::build_sdd_lut;
pub use superblock::superblock;
