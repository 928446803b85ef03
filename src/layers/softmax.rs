use rand::rngs::StdRng;

use crate::error::Result;
use crate::layers::layer::{Layer, LayerKind};
use crate::math::tensor::{Shape, Tensor};

/// Normalized exponential over the channel dimension.
///
/// Each (sample, row, column) position gets its own distribution over the
/// channels; for the usual `(C, 1, 1)` classifier output this is one
/// distribution per sample. The backward pass applies the full softmax
/// Jacobian, so the layer can be followed by any loss.
#[derive(Debug, Clone)]
pub struct SoftmaxLayer {
    shape: Shape,
    cached_output: Option<Tensor>,
}

impl SoftmaxLayer {
    pub fn new() -> SoftmaxLayer {
        SoftmaxLayer {
            shape: Shape::new(1, 0, 0, 0),
            cached_output: None,
        }
    }
}

impl Default for SoftmaxLayer {
    fn default() -> Self {
        SoftmaxLayer::new()
    }
}

impl Layer for SoftmaxLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Softmax
    }

    fn initialize(&mut self, input: Shape, _rng: &mut StdRng) -> Result<Shape> {
        self.shape = input.with_batch(1);
        Ok(self.shape)
    }

    fn input_shape(&self) -> Shape {
        self.shape
    }

    fn output_shape(&self) -> Shape {
        self.shape
    }

    fn forward(&mut self, input: &Tensor) -> Tensor {
        let shape = input.shape();
        let plane = shape.h * shape.w;
        let mut output = Tensor::zeros(shape);

        for n in 0..shape.n {
            let x = input.sample(n);
            let y = output.sample_mut(n);
            for pos in 0..plane {
                // Subtract the max before exponentiating for numerical stability.
                let max = (0..shape.c)
                    .map(|c| x[c * plane + pos])
                    .fold(f32::NEG_INFINITY, f32::max);
                let mut sum = 0.0;
                for c in 0..shape.c {
                    let e = (x[c * plane + pos] - max).exp();
                    y[c * plane + pos] = e;
                    sum += e;
                }
                for c in 0..shape.c {
                    y[c * plane + pos] /= sum;
                }
            }
        }

        self.cached_output = Some(output.clone());
        output
    }

    fn backward(&mut self, output_grad: &Tensor) -> Tensor {
        let output = self
            .cached_output
            .as_ref()
            .expect("SoftmaxLayer::backward called without a preceding forward");
        let shape = output.shape();
        let plane = shape.h * shape.w;
        let mut input_grad = Tensor::zeros(shape);

        for n in 0..shape.n {
            let y = output.sample(n);
            let dy = output_grad.sample(n);
            let dx = input_grad.sample_mut(n);
            for pos in 0..plane {
                // J^T·dy where J_ij = y_i (δ_ij − y_j).
                let dot: f32 = (0..shape.c)
                    .map(|c| dy[c * plane + pos] * y[c * plane + pos])
                    .sum();
                for c in 0..shape.c {
                    let i = c * plane + pos;
                    dx[i] = y[i] * (dy[i] - dot);
                }
            }
        }
        input_grad
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;

    #[test]
    fn forward_produces_distributions_and_survives_large_inputs() {
        let mut layer = SoftmaxLayer::new();
        let shape = Shape::new(2, 3, 1, 1);
        layer.initialize(shape, &mut StdRng::seed_from_u64(0)).unwrap();

        let input = Tensor::from_vec(shape, vec![1.0, 2.0, 3.0, 1000.0, 1000.0, 1000.0]);
        let output = layer.forward(&input);

        for n in 0..2 {
            let sum: f32 = output.sample(n).iter().sum();
            assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-6);
        }
        assert!(output.sample(0)[2] > output.sample(0)[1]);
        for &p in output.sample(1) {
            assert_abs_diff_eq!(p, 1.0 / 3.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn uniform_upstream_gradient_vanishes() {
        // Softmax outputs always sum to one, so a constant upstream gradient
        // has no effect on the inputs.
        let mut layer = SoftmaxLayer::new();
        let shape = Shape::new(1, 4, 1, 1);
        layer.initialize(shape, &mut StdRng::seed_from_u64(0)).unwrap();
        layer.forward(&Tensor::from_vec(shape, vec![0.1, -0.4, 2.0, 0.7]));

        let grad = layer.backward(&Tensor::from_vec(shape, vec![0.5; 4]));
        for &g in grad.data() {
            assert_abs_diff_eq!(g, 0.0, epsilon = 1e-6);
        }
    }
}
