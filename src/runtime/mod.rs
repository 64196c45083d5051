//! Runtime support for block-sparse execution
//!
//! # Architecture
//!
//! ```text
//! runtime
//! ├── Device     (identifies a compute unit; cache key)
//! ├── LockPool   (per-device accumulation lock buffers)
//! └── cpu
//!     ├── CpuClient (rayon thread pool + parallelism knobs)
//!     └── kernels   (sdd / dsd / dds tile kernels)
//! ```

pub mod cpu;
mod device;
pub mod locks;

pub use device::{Device, DeviceKind};
pub use locks::{LockBuffer, LockPool, LockSlot, LockState};
