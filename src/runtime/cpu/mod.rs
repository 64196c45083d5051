//! CPU runtime implementation
//!
//! Tile tasks are executed on rayon worker threads (feature `rayon`) or
//! sequentially on the calling thread.

mod client;
pub(crate) mod kernels;

pub use client::{CpuClient, ParallelismConfig};
