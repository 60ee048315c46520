//! Autograd operations with backward passes

use super::{BackwardOp, Tensor};
use ndarray::Array1;
use rand::Rng;
use std::cell::RefCell;
use std::rc::Rc;

/// Add two tensors element-wise
pub fn add(a: &Tensor, b: &Tensor) -> Tensor {
    let data = a.data() + b.data();
    let requires_grad = a.requires_grad() || b.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(AddBackward {
            a: a.clone(),
            b: b.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct AddBackward {
    a: Tensor,
    b: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for AddBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad.clone());
            }
            if self.b.requires_grad() {
                self.b.accumulate_grad(grad.clone());
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
            if let Some(op) = self.b.backward_op() {
                op.backward();
            }
        }
    }
}

/// Scale tensor by a scalar
pub fn scale(a: &Tensor, factor: f32) -> Tensor {
    let data = a.data() * factor;
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(ScaleBackward {
            a: a.clone(),
            factor,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct ScaleBackward {
    a: Tensor,
    factor: f32,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for ScaleBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad * self.factor);
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
        }
    }
}

/// ReLU activation
pub fn relu(a: &Tensor) -> Tensor {
    let data = a.data().mapv(|x| x.max(0.0));
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(ReluBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct ReluBackward {
    a: Tensor,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for ReluBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂out * (a > 0)
                let grad_a = grad * &self.a.data().mapv(|x| if x > 0.0 { 1.0 } else { 0.0 });
                self.a.accumulate_grad(grad_a);
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
        }
    }
}

/// Sigmoid activation
///
/// σ(x) = 1 / (1 + e⁻ˣ), with ∂σ/∂x = σ(x)(1 - σ(x)).
pub fn sigmoid(a: &Tensor) -> Tensor {
    let data = a.data().mapv(|x| 1.0 / (1.0 + (-x).exp()));
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data.clone(), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(SigmoidBackward {
            a: a.clone(),
            output: data,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct SigmoidBackward {
    a: Tensor,
    output: Array1<f32>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for SigmoidBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                let grad_a = grad * &self.output.mapv(|s| s * (1.0 - s));
                self.a.accumulate_grad(grad_a);
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
        }
    }
}

/// Inverted dropout
///
/// Each element is zeroed with probability `p` and survivors are scaled by
/// `1/(1-p)`, so the expected activation is unchanged and inference needs no
/// rescaling. The mask is drawn fresh per call and is intentionally unseeded.
pub fn dropout(a: &Tensor, p: f32) -> Tensor {
    assert!((0.0..1.0).contains(&p), "dropout probability must be in [0, 1)");

    if p == 0.0 {
        return a.clone();
    }

    let mut rng = rand::thread_rng();
    let keep = 1.0 - p;
    let mask: Array1<f32> = Array1::from(
        (0..a.len())
            .map(|_| if rng.gen::<f32>() < keep { 1.0 / keep } else { 0.0 })
            .collect::<Vec<f32>>(),
    );

    let data = a.data() * &mask;
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(DropoutBackward {
            a: a.clone(),
            mask,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct DropoutBackward {
    a: Tensor,
    mask: Array1<f32>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for DropoutBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad * &self.mask);
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
        }
    }
}

/// Matrix-vector product
///
/// Computes y = W @ x where W is m×k (row-major flattened) and x has length
/// k, producing y of length m.
pub fn matvec(w: &Tensor, x: &Tensor, m: usize, k: usize) -> Tensor {
    assert_eq!(w.len(), m * k, "weight matrix size mismatch");
    assert_eq!(x.len(), k, "input vector size mismatch");

    let mut result_data = vec![0.0; m];
    for i in 0..m {
        let mut sum = 0.0;
        for p in 0..k {
            sum += w.data()[i * k + p] * x.data()[p];
        }
        result_data[i] = sum;
    }

    let requires_grad = w.requires_grad() || x.requires_grad();
    let mut result = Tensor::new(Array1::from(result_data), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(MatvecBackward {
            w: w.clone(),
            x: x.clone(),
            m,
            k,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct MatvecBackward {
    w: Tensor,
    x: Tensor,
    m: usize,
    k: usize,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for MatvecBackward {
    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            // ∂L/∂W[i,p] = ∂L/∂y[i] * x[p]
            if self.w.requires_grad() {
                let mut grad_w = vec![0.0; self.m * self.k];
                for i in 0..self.m {
                    for p in 0..self.k {
                        grad_w[i * self.k + p] = grad_output[i] * self.x.data()[p];
                    }
                }
                self.w.accumulate_grad(Array1::from(grad_w));
            }

            // ∂L/∂x[p] = Σᵢ W[i,p] * ∂L/∂y[i]
            if self.x.requires_grad() {
                let mut grad_x = vec![0.0; self.k];
                for p in 0..self.k {
                    let mut sum = 0.0;
                    for i in 0..self.m {
                        sum += self.w.data()[i * self.k + p] * grad_output[i];
                    }
                    grad_x[p] = sum;
                }
                self.x.accumulate_grad(Array1::from(grad_x));
            }

            if let Some(op) = self.w.backward_op() {
                op.backward();
            }
            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;
    use approx::assert_relative_eq;

    #[test]
    fn test_add_forward_backward() {
        let a = Tensor::from_vec(vec![1.0, 2.0], true);
        let b = Tensor::from_vec(vec![3.0, 4.0], true);
        let mut c = add(&a, &b);

        assert_eq!(c.data(), &Array1::from(vec![4.0, 6.0]));

        backward(&mut c, None);
        assert_eq!(a.grad().unwrap(), Array1::<f32>::ones(2));
        assert_eq!(b.grad().unwrap(), Array1::<f32>::ones(2));
    }

    #[test]
    fn test_scale_backward() {
        let a = Tensor::from_vec(vec![1.0, -2.0], true);
        let mut s = scale(&a, 0.5);

        backward(&mut s, None);
        assert_eq!(a.grad().unwrap(), Array1::from(vec![0.5, 0.5]));
    }

    #[test]
    fn test_relu_gates_gradient() {
        let a = Tensor::from_vec(vec![1.0, -1.0], true);
        let mut r = relu(&a);

        assert_eq!(r.data(), &Array1::from(vec![1.0, 0.0]));

        backward(&mut r, None);
        assert_eq!(a.grad().unwrap(), Array1::from(vec![1.0, 0.0]));
    }

    #[test]
    fn test_sigmoid_values() {
        let a = Tensor::from_vec(vec![0.0, 100.0, -100.0], false);
        let s = sigmoid(&a);

        assert_relative_eq!(s.data()[0], 0.5, epsilon = 1e-6);
        assert!(s.data()[1] > 0.999);
        assert!(s.data()[2] < 0.001);
    }

    #[test]
    fn test_sigmoid_gradient_at_zero() {
        let a = Tensor::from_vec(vec![0.0], true);
        let mut s = sigmoid(&a);

        backward(&mut s, None);
        // σ'(0) = 0.25
        assert_relative_eq!(a.grad().unwrap()[0], 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_dropout_zero_probability_is_identity() {
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0], false);
        let d = dropout(&a, 0.0);
        assert_eq!(d.data(), a.data());
    }

    #[test]
    fn test_dropout_preserves_expectation() {
        let a = Tensor::new(Array1::ones(10_000), false);
        let d = dropout(&a, 0.5);

        let mean = d.data().mean().unwrap();
        assert!((mean - 1.0).abs() < 0.1, "mean {mean} too far from 1.0");
    }

    #[test]
    fn test_matvec_forward() {
        // W = [[1, 2], [3, 4]], x = [1, 1] -> y = [3, 7]
        let w = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], true);
        let x = Tensor::from_vec(vec![1.0, 1.0], false);
        let y = matvec(&w, &x, 2, 2);

        assert_eq!(y.data(), &Array1::from(vec![3.0, 7.0]));
    }

    #[test]
    fn test_matvec_backward() {
        let w = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], true);
        let x = Tensor::from_vec(vec![5.0, 6.0], true);
        let mut y = matvec(&w, &x, 2, 2);

        backward(&mut y, None);

        // grad_W[i,p] = x[p]
        assert_eq!(
            w.grad().unwrap(),
            Array1::from(vec![5.0, 6.0, 5.0, 6.0])
        );
        // grad_x[p] = Σᵢ W[i,p]
        assert_eq!(x.grad().unwrap(), Array1::from(vec![4.0, 6.0]));
    }

    #[test]
    fn test_frozen_tensor_gets_no_gradient() {
        let w = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], false);
        let x = Tensor::from_vec(vec![5.0, 6.0], true);
        let mut y = matvec(&w, &x, 2, 2);

        backward(&mut y, None);
        assert!(w.grad().is_none());
        assert!(x.grad().is_some());
    }

    #[test]
    fn test_chain_through_layers() {
        // y = relu(W @ x + b), scalar sanity check on the full chain
        let w = Tensor::from_vec(vec![1.0, -1.0], true);
        let b = Tensor::from_vec(vec![0.5], true);
        let x = Tensor::from_vec(vec![2.0, 1.0], false);

        let mut y = relu(&add(&matvec(&w, &x, 1, 2), &b));
        assert_relative_eq!(y.data()[0], 1.5, epsilon = 1e-6);

        backward(&mut y, None);
        assert_eq!(w.grad().unwrap(), Array1::from(vec![2.0, 1.0]));
        assert_eq!(b.grad().unwrap(), Array1::from(vec![1.0]));
    }
}
