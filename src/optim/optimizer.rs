//! Optimizer trait

use crate::Tensor;

/// Trait for optimization algorithms
///
/// Implementations may key per-parameter state (e.g. Adam moments) by
/// position in the slice, so each training phase constructs a fresh
/// optimizer rather than carrying one across a re-partitioning of the
/// frozen/trainable sets.
pub trait Optimizer {
    /// Update every parameter that carries a gradient; frozen parameters
    /// are skipped
    fn step(&mut self, params: &mut [Tensor]);

    /// Clear gradients ahead of the next batch
    fn zero_grad(&mut self, params: &mut [Tensor]) {
        for param in params {
            param.zero_grad();
        }
    }

    /// Learning rate currently in effect
    fn lr(&self) -> f32;

    /// Replace the learning rate, e.g. on a validation-loss plateau
    fn set_lr(&mut self, lr: f32);
}
