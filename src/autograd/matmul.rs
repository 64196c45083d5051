//! Backward implementation for block-sparse matrix multiplication

use crate::autograd::GradFn;
use crate::error::Result;
use crate::ops::BlockSparseMatmul;
use crate::tensor::Tensor;

/// Backward for `C = op(A) · op(B)` computed by a [`BlockSparseMatmul`]
///
/// Both gradients come out of the same three schedules built for the
/// forward product:
/// - dL/dA runs the mode with the roles of `C` and `A` swapped
/// - dL/dB runs the mode with the roles of `C` and `B` swapped
///
/// A sparse operand receives a block-stacked gradient holding only the
/// blocks of the layout.
pub struct BlockSparseMatmulBackward {
    op: BlockSparseMatmul,
    saved_tensors: Vec<Tensor>, // [a, b]
    needs_input_grad: [bool; 2],
}

impl BlockSparseMatmulBackward {
    /// Create a backward function that produces both gradients
    pub fn new(op: BlockSparseMatmul, a: Tensor, b: Tensor) -> Self {
        Self {
            op,
            saved_tensors: vec![a, b],
            needs_input_grad: [true, true],
        }
    }

    /// Skip the gradients whose flag is `false`
    pub fn with_needs_input_grad(mut self, needs_input_grad: [bool; 2]) -> Self {
        self.needs_input_grad = needs_input_grad;
        self
    }

    /// The forward operation
    pub fn op(&self) -> &BlockSparseMatmul {
        &self.op
    }
}

impl GradFn for BlockSparseMatmulBackward {
    fn backward(&self, grad_output: &Tensor) -> Result<Vec<Option<Tensor>>> {
        let (grad_a, grad_b) = self.op.backward(
            grad_output,
            &self.saved_tensors[0],
            &self.saved_tensors[1],
            self.needs_input_grad,
        )?;
        Ok(vec![grad_a, grad_b])
    }

    fn saved_tensors(&self) -> &[Tensor] {
        &self.saved_tensors
    }

    fn name(&self) -> &'static str {
        "BlockSparseMatmulBackward"
    }
}

impl std::fmt::Debug for BlockSparseMatmulBackward {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockSparseMatmulBackward")
            .field("mode", &self.op.mode())
            .field("needs_input_grad", &self.needs_input_grad)
            .finish()
    }
}
