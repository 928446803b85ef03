use rand::rngs::StdRng;

use crate::error::Result;
use crate::layers::layer::{Layer, LayerKind};
use crate::math::tensor::{Shape, Tensor};

/// Elementwise max(0, x).
#[derive(Debug, Clone)]
pub struct ReluLayer {
    shape: Shape,
    // Input of the last forward pass; the gradient mask is `input > 0`.
    cached_input: Option<Tensor>,
}

impl ReluLayer {
    pub fn new() -> ReluLayer {
        ReluLayer {
            shape: Shape::new(1, 0, 0, 0),
            cached_input: None,
        }
    }
}

impl Default for ReluLayer {
    fn default() -> Self {
        ReluLayer::new()
    }
}

impl Layer for ReluLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Relu
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
        let mut output = input.clone();
        output.data_mut().iter_mut().for_each(|x| *x = x.max(0.0));
        self.cached_input = Some(input.clone());
        output
    }

    fn backward(&mut self, output_grad: &Tensor) -> Tensor {
        let input = self
            .cached_input
            .as_ref()
            .expect("ReluLayer::backward called without a preceding forward");
        let mut input_grad = output_grad.clone();
        for (g, &x) in input_grad.data_mut().iter_mut().zip(input.data()) {
            if x <= 0.0 {
                *g = 0.0;
            }
        }
        input_grad
    }
}
