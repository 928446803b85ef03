use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::error::{NnError, Result};
use crate::layers::convolution::output_extent;
use crate::layers::layer::{Layer, LayerKind};
use crate::math::tensor::{Shape, Tensor};

/// Max pooling over `kernel`-sized windows, channel by channel.
///
/// Forward records, for every output element, the in-sample offset of the
/// input cell that won the window (first maximum in row-major scan order);
/// backward routes each upstream gradient to exactly that cell.
#[derive(Debug, Clone)]
pub struct MaxPoolingLayer {
    kernel: (usize, usize),
    stride: usize,
    input: Shape,
    output: Shape,
    argmax: Vec<usize>,
    cached_batch: usize,
}

impl MaxPoolingLayer {
    pub fn new(kernel: (usize, usize), stride: usize) -> MaxPoolingLayer {
        MaxPoolingLayer {
            kernel,
            stride,
            input: Shape::new(1, 0, 0, 0),
            output: Shape::new(1, 0, 0, 0),
            argmax: Vec::new(),
            cached_batch: 0,
        }
    }

    pub fn kernel(&self) -> (usize, usize) {
        self.kernel
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    fn pool_sample(&self, x: &[f32], y: &mut [f32], winners: &mut [usize]) {
        let (kh, kw) = self.kernel;
        let (in_h, in_w) = (self.input.h, self.input.w);
        let (out_h, out_w) = (self.output.h, self.output.w);

        for c in 0..self.output.c {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut best = f32::NEG_INFINITY;
                    let mut best_at = (c * in_h + oy * self.stride) * in_w + ox * self.stride;
                    for ky in 0..kh {
                        let row = (c * in_h + oy * self.stride + ky) * in_w + ox * self.stride;
                        for kx in 0..kw {
                            // Strict comparison keeps the first maximum.
                            if x[row + kx] > best {
                                best = x[row + kx];
                                best_at = row + kx;
                            }
                        }
                    }
                    let o = (c * out_h + oy) * out_w + ox;
                    y[o] = best;
                    winners[o] = best_at;
                }
            }
        }
    }
}

impl Layer for MaxPoolingLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::MaxPooling
    }

    fn initialize(&mut self, input: Shape, _rng: &mut StdRng) -> Result<Shape> {
        let (kh, kw) = self.kernel;
        let out_h = output_extent(input.h, kh, self.stride, 0);
        let out_w = output_extent(input.w, kw, self.stride, 0);
        let (Some(out_h), Some(out_w)) = (out_h, out_w) else {
            return Err(NnError::ShapeMismatch(format!(
                "{}x{} pooling window with stride {} does not fit input {}",
                kh, kw, self.stride, input
            )));
        };
        self.input = input.with_batch(1);
        self.output = Shape::new(1, input.c, out_h, out_w);
        Ok(self.output)
    }

    fn input_shape(&self) -> Shape {
        self.input
    }

    fn output_shape(&self) -> Shape {
        self.output
    }

    fn forward(&mut self, input: &Tensor) -> Tensor {
        let batch = input.shape().n;
        let in_len = self.input.per_sample();
        let out_len = self.output.per_sample();
        let mut output = Tensor::zeros(self.output.with_batch(batch));
        let mut argmax = vec![0usize; batch * out_len];

        output
            .data_mut()
            .par_chunks_mut(out_len)
            .zip(argmax.par_chunks_mut(out_len))
            .zip(input.data().par_chunks(in_len))
            .for_each(|((y, winners), x)| self.pool_sample(x, y, winners));

        self.argmax = argmax;
        self.cached_batch = batch;
        output
    }

    fn backward(&mut self, output_grad: &Tensor) -> Tensor {
        debug_assert_eq!(output_grad.shape().n, self.cached_batch);
        let in_len = self.input.per_sample();
        let out_len = self.output.per_sample();
        let mut input_grad = Tensor::zeros(self.input.with_batch(self.cached_batch));

        for ((dx, dy), winners) in input_grad
            .data_mut()
            .chunks_mut(in_len)
            .zip(output_grad.data().chunks(out_len))
            .zip(self.argmax.chunks(out_len))
        {
            for (&g, &at) in dy.iter().zip(winners) {
                // Overlapping windows may share a winner.
                dx[at] += g;
            }
        }
        input_grad
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn layer_for(input: Shape, kernel: (usize, usize), stride: usize) -> MaxPoolingLayer {
        let mut layer = MaxPoolingLayer::new(kernel, stride);
        layer.initialize(input, &mut StdRng::seed_from_u64(0)).unwrap();
        layer
    }

    #[test]
    fn halves_spatial_dimensions() {
        let layer = layer_for(Shape::new(1, 6, 24, 24), (2, 2), 2);
        assert_eq!(layer.output_shape(), Shape::new(1, 6, 12, 12));
    }

    #[test]
    fn window_larger_than_input_is_rejected() {
        let mut layer = MaxPoolingLayer::new((3, 3), 1);
        let err = layer.initialize(Shape::new(1, 1, 2, 2), &mut StdRng::seed_from_u64(0));
        assert!(matches!(err, Err(NnError::ShapeMismatch(_))));
    }

    #[test]
    fn ties_go_to_the_first_maximum() {
        let shape = Shape::new(1, 1, 2, 2);
        let mut layer = layer_for(shape, (2, 2), 2);
        layer.forward(&Tensor::from_vec(shape, vec![1.0, 3.0, 3.0, 0.0]));
        let grad = layer.backward(&Tensor::from_vec(Shape::new(1, 1, 1, 1), vec![1.0]));
        assert_eq!(grad.data(), &[0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn each_channel_and_sample_pools_independently() {
        let shape = Shape::new(2, 2, 2, 2);
        let mut layer = layer_for(shape, (2, 2), 2);
        let input = Tensor::from_vec(
            shape,
            vec![
                1.0, 2.0, 3.0, 4.0, // n0 c0
                -1.0, -2.0, -3.0, -4.0, // n0 c1
                9.0, 0.0, 0.0, 0.0, // n1 c0
                0.0, 0.0, 5.0, 0.0, // n1 c1
            ],
        );
        let output = layer.forward(&input);
        assert_eq!(output.data(), &[4.0, -1.0, 9.0, 5.0]);
    }
}
