//! Loss functions

use crate::autograd::BackwardOp;
use crate::Tensor;
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Trait for loss functions
pub trait LossFn {
    /// Compute loss given predictions and targets
    ///
    /// Returns a scalar loss tensor wired into the backward tape.
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> Tensor;

    /// Name of the loss function
    fn name(&self) -> &str;
}

/// Binary cross-entropy over sigmoid probabilities
///
/// L = -mean(t·ln(p) + (1-t)·ln(1-p)), with p clamped away from 0 and 1.
/// The backward pass honours the gradient seeded on the loss tensor, so the
/// scalar loss can itself be rescaled (e.g. batch averaging) before
/// `backward` runs.
pub struct BinaryCrossEntropy;

const EPS: f32 = 1e-7;

impl LossFn for BinaryCrossEntropy {
    fn forward(&self, predictions: &Tensor, targets: &Tensor) -> Tensor {
        assert_eq!(
            predictions.len(),
            targets.len(),
            "predictions and targets must have same length"
        );

        let n = predictions.len() as f32;
        let mut total = 0.0;
        let mut unit_grad = Array1::zeros(predictions.len());

        for (i, (&p, &t)) in predictions
            .data()
            .iter()
            .zip(targets.data().iter())
            .enumerate()
        {
            let p = p.clamp(EPS, 1.0 - EPS);
            total += -(t * p.ln() + (1.0 - t) * (1.0 - p).ln());
            // dL/dp for the mean loss
            unit_grad[i] = ((p - t) / (p * (1.0 - p))) / n;
        }

        let mut loss = Tensor::from_vec(vec![total / n], predictions.requires_grad());

        if predictions.requires_grad() {
            loss.set_backward_op(Rc::new(BceBackward {
                predictions: predictions.clone(),
                unit_grad,
                result_grad: loss.grad_cell(),
            }));
        }

        loss
    }

    fn name(&self) -> &str {
        "BCE"
    }
}

struct BceBackward {
    predictions: Tensor,
    unit_grad: Array1<f32>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for BceBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let scale = grad[0];
            self.predictions.accumulate_grad(&self.unit_grad * scale);

            if let Some(op) = self.predictions.backward_op() {
                op.backward();
            }
        }
    }
}
