use rand::rngs::StdRng;

use crate::error::Result;
use crate::layers::layer::{Layer, LayerKind};
use crate::math::tensor::{Shape, Tensor};

/// Identity layer that pins the first shape of a chain.
#[derive(Debug, Clone)]
pub struct InputLayer {
    shape: Shape,
}

impl InputLayer {
    pub fn new() -> InputLayer {
        InputLayer {
            shape: Shape::new(1, 0, 0, 0),
        }
    }
}

impl Default for InputLayer {
    fn default() -> Self {
        InputLayer::new()
    }
}

impl Layer for InputLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Input
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
        input.clone()
    }

    fn backward(&mut self, output_grad: &Tensor) -> Tensor {
        output_grad.clone()
    }
}
