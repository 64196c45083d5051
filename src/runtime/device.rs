//! Device identification

use std::fmt;

/// Kind of compute device a tensor is tagged with
///
/// Only [`DeviceKind::Cpu`] can execute the tile kernels in this crate. The
/// other kinds exist so that tensors handed over from accelerator-backed
/// code can be rejected with a precise error instead of being misread.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Host CPU
    Cpu,
    /// NVIDIA GPU
    Cuda,
    /// WebGPU adapter
    Wgpu,
}

impl DeviceKind {
    fn name(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
            Self::Wgpu => "wgpu",
        }
    }
}

/// A specific compute device (kind + ordinal)
///
/// Devices are cheap value types and are used as cache keys for lock
/// buffers and lookup tables.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Device {
    kind: DeviceKind,
    index: usize,
}

impl Device {
    /// Create a device of the given kind and ordinal
    pub const fn new(kind: DeviceKind, index: usize) -> Self {
        Self { kind, index }
    }

    /// The host CPU (ordinal 0)
    pub const fn cpu() -> Self {
        Self::new(DeviceKind::Cpu, 0)
    }

    /// A CUDA device tag
    pub const fn cuda(index: usize) -> Self {
        Self::new(DeviceKind::Cuda, index)
    }

    /// Device kind
    #[inline]
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Device ordinal
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether the tile kernels can run on this device
    #[inline]
    pub fn is_cpu(&self) -> bool {
        self.kind == DeviceKind::Cpu
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::cpu()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.name(), self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_display_and_eq() {
        assert_eq!(Device::cpu().to_string(), "cpu:0");
        assert_eq!(Device::cuda(1).to_string(), "cuda:1");
        assert_ne!(Device::cpu(), Device::new(DeviceKind::Cpu, 1));
        assert!(Device::default().is_cpu());
        assert!(!Device::cuda(0).is_cpu());
    }
}
