//! Error types for blocksparse

use crate::dtype::DType;
use crate::runtime::Device;
use thiserror::Error;

/// Result type alias using blocksparse's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`]
///
/// Every error is fatal for the call that produced it; the kind only tells
/// the caller which side of the contract was violated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad mode, layout or options at construction time
    Configuration,
    /// Dimension or reduction-size mismatch at call time
    Shape,
    /// Operands on different or unsupported devices
    Device,
    /// Operand element types differ or are unsupported
    DType,
    /// Broken internal invariant (undersized lock buffer, corrupt LUT)
    Internal,
}

/// Errors that can occur in blocksparse operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid scheduler configuration
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// What is wrong with the configuration
        reason: String,
    },

    /// Shape mismatch in an operation
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape
        expected: Vec<usize>,
        /// Actual shape
        got: Vec<usize>,
    },

    /// A single dimension of an operand has the wrong size
    #[error("Expected tensor {arg} to have size {expected} at dim {dim}, got {got}")]
    DimensionMismatch {
        /// Operand name ("A" or "B")
        arg: &'static str,
        /// Dimension index (non-negative, after padding)
        dim: usize,
        /// Expected size
        expected: usize,
        /// Actual size
        got: usize,
    },

    /// Operand shape is unusable for a reason other than a single size mismatch
    #[error("Invalid shape for '{arg}': {reason}")]
    InvalidShape {
        /// The operand or argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// DType mismatch between operands
    #[error("DType mismatch: {lhs:?} vs {rhs:?}")]
    DTypeMismatch {
        /// Left-hand side dtype
        lhs: DType,
        /// Right-hand side dtype
        rhs: DType,
    },

    /// Unsupported dtype for an operation
    #[error("Unsupported dtype {dtype:?} for operation '{op}'")]
    UnsupportedDType {
        /// The unsupported dtype
        dtype: DType,
        /// The operation name
        op: &'static str,
    },

    /// Device mismatch between operands
    #[error("Device mismatch: inputs must be on the same device, got {lhs} and {rhs}")]
    DeviceMismatch {
        /// Device of the left operand
        lhs: Device,
        /// Device of the right operand
        rhs: Device,
    },

    /// Operand lives on a device the tile kernels cannot execute on
    #[error("Unsupported device {device}: only cpu devices are supported")]
    UnsupportedDevice {
        /// The offending device
        device: Device,
    },

    /// Broken internal invariant
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Create a shape mismatch error
    pub fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Create an invalid shape error
    pub fn invalid_shape(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidShape {
            arg,
            reason: reason.into(),
        }
    }

    /// Create an unsupported dtype error
    pub fn unsupported_dtype(dtype: DType, op: &'static str) -> Self {
        Self::UnsupportedDType { dtype, op }
    }

    /// Create an internal inconsistency error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfiguration { .. } => ErrorKind::Configuration,
            Self::ShapeMismatch { .. }
            | Self::DimensionMismatch { .. }
            | Self::InvalidShape { .. } => ErrorKind::Shape,
            Self::DTypeMismatch { .. } | Self::UnsupportedDType { .. } => ErrorKind::DType,
            Self::DeviceMismatch { .. } | Self::UnsupportedDevice { .. } => ErrorKind::Device,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_names_both_sizes() {
        let err = Error::DimensionMismatch {
            arg: "B",
            dim: 2,
            expected: 32,
            got: 48,
        };
        let msg = err.to_string();
        assert!(msg.contains("32"));
        assert!(msg.contains("48"));
        assert_eq!(err.kind(), ErrorKind::Shape);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(Error::config("bad").kind(), ErrorKind::Configuration);
        assert_eq!(Error::internal("oops").kind(), ErrorKind::Internal);
        assert_eq!(
            Error::unsupported_dtype(DType::I32, "matmul").kind(),
            ErrorKind::DType
        );
        assert_eq!(
            Error::UnsupportedDevice {
                device: Device::cuda(0)
            }
            .kind(),
            ErrorKind::Device
        );
    }
}
