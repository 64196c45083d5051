//! Gradient function trait

use crate::error::Result;
use crate::tensor::Tensor;

/// Trait for computing gradients during a backward pass
///
/// Each operation that participates in autograd has an associated
/// `GradFn` that knows how to compute gradients for its inputs.
pub trait GradFn: Send + Sync {
    /// Compute gradients for input tensors given the gradient of the output
    ///
    /// Returns a vector of optional gradients - one per input.
    /// `None` indicates that input doesn't need a gradient.
    fn backward(&self, grad_output: &Tensor) -> Result<Vec<Option<Tensor>>>;

    /// Tensors saved during the forward pass
    fn saved_tensors(&self) -> &[Tensor] {
        &[]
    }

    /// Human-readable name for debugging
    fn name(&self) -> &'static str;
}
