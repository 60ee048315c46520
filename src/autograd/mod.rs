//! Tape-based autograd engine
//!
//! Gradients flow through a chain of `BackwardOp` closures attached to the
//! tensors they produced.

mod ops;
mod tensor;

pub use ops::{add, dropout, matvec, relu, scale, sigmoid};
pub use tensor::Tensor;

/// Trait for backward pass operations
pub trait BackwardOp {
    /// Perform backward pass
    fn backward(&self);
}

/// Perform backward pass on a tensor
///
/// Seeds the output gradient with ones when none is given (scalar loss case)
/// and walks the tape.
pub fn backward(tensor: &mut Tensor, grad_output: Option<ndarray::Array1<f32>>) {
    if let Some(grad) = grad_output {
        tensor.set_grad(grad);
    } else {
        let ones = ndarray::Array1::ones(tensor.data().len());
        tensor.set_grad(ones);
    }

    if let Some(op) = tensor.backward_op() {
        op.backward();
    }
}
