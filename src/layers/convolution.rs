//! 2D convolution layer
//!
//! Sliding-window correlation of a learnable `(out_channels, in_channels, kh, kw)`
//! kernel over an NCHW input, with configurable stride and implicit zero padding.

use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::error::{NnError, Result};
use crate::layers::layer::{Layer, LayerKind};
use crate::layers::param::{check_record, export_record, import_record, Param};
use crate::math::tensor::{Shape, Tensor};
use crate::network::store::LayerRecord;

/// Output extent along one axis: floor((input + 2·pad − kernel) / stride) + 1.
pub fn output_extent(input: usize, kernel: usize, stride: usize, padding: usize) -> Option<usize> {
    let padded = input + 2 * padding;
    if stride == 0 || kernel == 0 || kernel > padded {
        return None;
    }
    Some((padded - kernel) / stride + 1)
}

/// Per-sample geometry shared by the forward and backward kernels.
#[derive(Debug, Clone, Copy)]
struct Geometry {
    in_c: usize,
    in_h: usize,
    in_w: usize,
    out_c: usize,
    out_h: usize,
    out_w: usize,
    kh: usize,
    kw: usize,
    stride: usize,
    padding: usize,
}

impl Geometry {
    /// Input coordinate hit by kernel tap `k` of output position `o`, or
    /// `None` when it falls into the zero padding.
    #[inline]
    fn source(&self, o: usize, k: usize, extent: usize) -> Option<usize> {
        let pos = (o * self.stride + k) as isize - self.padding as isize;
        if pos >= 0 && (pos as usize) < extent {
            Some(pos as usize)
        } else {
            None
        }
    }

    #[inline]
    fn weight_index(&self, oc: usize, ic: usize, ky: usize, kx: usize) -> usize {
        ((oc * self.in_c + ic) * self.kh + ky) * self.kw + kx
    }

    fn correlate(&self, x: &[f32], weight: &[f32], bias: Option<&[f32]>, y: &mut [f32]) {
        for oc in 0..self.out_c {
            let b = bias.map_or(0.0, |b| b[oc]);
            for oy in 0..self.out_h {
                for ox in 0..self.out_w {
                    let mut sum = b;
                    for ic in 0..self.in_c {
                        for ky in 0..self.kh {
                            let Some(iy) = self.source(oy, ky, self.in_h) else { continue };
                            for kx in 0..self.kw {
                                let Some(ix) = self.source(ox, kx, self.in_w) else { continue };
                                sum += x[(ic * self.in_h + iy) * self.in_w + ix]
                                    * weight[self.weight_index(oc, ic, ky, kx)];
                            }
                        }
                    }
                    y[(oc * self.out_h + oy) * self.out_w + ox] = sum;
                }
            }
        }
    }

    /// Scatters every output gradient back through the kernel taps that
    /// produced it. Summed per input cell this is the full correlation of the
    /// output gradient with the spatially flipped kernel.
    fn input_gradient(&self, dy: &[f32], weight: &[f32], dx: &mut [f32]) {
        for oc in 0..self.out_c {
            for oy in 0..self.out_h {
                for ox in 0..self.out_w {
                    let g = dy[(oc * self.out_h + oy) * self.out_w + ox];
                    if g == 0.0 {
                        continue;
                    }
                    for ic in 0..self.in_c {
                        for ky in 0..self.kh {
                            let Some(iy) = self.source(oy, ky, self.in_h) else { continue };
                            for kx in 0..self.kw {
                                let Some(ix) = self.source(ox, kx, self.in_w) else { continue };
                                dx[(ic * self.in_h + iy) * self.in_w + ix] +=
                                    g * weight[self.weight_index(oc, ic, ky, kx)];
                            }
                        }
                    }
                }
            }
        }
    }

    fn accumulate_parameter_gradients(
        &self,
        x: &[f32],
        dy: &[f32],
        d_weight: &mut [f32],
        mut d_bias: Option<&mut [f32]>,
    ) {
        for oc in 0..self.out_c {
            for oy in 0..self.out_h {
                for ox in 0..self.out_w {
                    let g = dy[(oc * self.out_h + oy) * self.out_w + ox];
                    if let Some(db) = d_bias.as_deref_mut() {
                        db[oc] += g;
                    }
                    if g == 0.0 {
                        continue;
                    }
                    for ic in 0..self.in_c {
                        for ky in 0..self.kh {
                            let Some(iy) = self.source(oy, ky, self.in_h) else { continue };
                            for kx in 0..self.kw {
                                let Some(ix) = self.source(ox, kx, self.in_w) else { continue };
                                d_weight[self.weight_index(oc, ic, ky, kx)] +=
                                    g * x[(ic * self.in_h + iy) * self.in_w + ix];
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Convolution layer with learnable kernels and optional per-channel bias.
///
/// # Example
///
/// ```ignore
/// // 6 filters of 5×5, stride 1, no padding, with bias
/// let layer = ConvolutionLayer::new(6, (5, 5), 1, 0, true);
/// ```
pub struct ConvolutionLayer {
    out_channels: usize,
    kernel: (usize, usize),
    stride: usize,
    padding: usize,
    input: Shape,
    output: Shape,
    weight: Param,
    bias: Option<Param>,
    use_bias: bool,
    cached_input: Option<Tensor>,
    batch: usize,
}

impl ConvolutionLayer {
    pub fn new(
        out_channels: usize,
        kernel: (usize, usize),
        stride: usize,
        padding: usize,
        bias: bool,
    ) -> ConvolutionLayer {
        ConvolutionLayer {
            out_channels,
            kernel,
            stride,
            padding,
            input: Shape::new(1, 0, 0, 0),
            output: Shape::new(1, 0, 0, 0),
            weight: Param::unset(),
            bias: None,
            use_bias: bias,
            cached_input: None,
            batch: 0,
        }
    }

    pub fn kernel(&self) -> (usize, usize) {
        self.kernel
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    /// Kernel tensor, shape `(out_channels, in_channels, kh, kw)`.
    pub fn weight(&self) -> &Tensor {
        &self.weight.value
    }

    pub fn weight_mut(&mut self) -> &mut Tensor {
        &mut self.weight.value
    }

    /// Gradient accumulated since the last update.
    pub fn weight_grad(&self) -> &Tensor {
        &self.weight.grad
    }

    /// Bias tensor, shape `(1, out_channels, 1, 1)`.
    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref().map(|b| &b.value)
    }

    pub fn bias_mut(&mut self) -> Option<&mut Tensor> {
        self.bias.as_mut().map(|b| &mut b.value)
    }

    pub fn bias_grad(&self) -> Option<&Tensor> {
        self.bias.as_ref().map(|b| &b.grad)
    }

    fn geometry(&self) -> Geometry {
        Geometry {
            in_c: self.input.c,
            in_h: self.input.h,
            in_w: self.input.w,
            out_c: self.output.c,
            out_h: self.output.h,
            out_w: self.output.w,
            kh: self.kernel.0,
            kw: self.kernel.1,
            stride: self.stride,
            padding: self.padding,
        }
    }
}

impl Layer for ConvolutionLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Convolution
    }

    fn initialize(&mut self, input: Shape, rng: &mut StdRng) -> Result<Shape> {
        if self.out_channels == 0 || input.c == 0 {
            return Err(NnError::ShapeMismatch(format!(
                "convolution needs at least one input and output channel, got {} → {}",
                input.c, self.out_channels
            )));
        }
        let (kh, kw) = self.kernel;
        let out_h = output_extent(input.h, kh, self.stride, self.padding);
        let out_w = output_extent(input.w, kw, self.stride, self.padding);
        let (Some(out_h), Some(out_w)) = (out_h, out_w) else {
            return Err(NnError::ShapeMismatch(format!(
                "{}x{} kernel with stride {} and padding {} does not fit input {}",
                kh, kw, self.stride, self.padding, input
            )));
        };

        self.input = input.with_batch(1);
        self.output = Shape::new(1, self.out_channels, out_h, out_w);

        let weight_shape = Shape::new(self.out_channels, input.c, kh, kw);
        if self.weight.shape() != weight_shape {
            self.weight = Param::new(Tensor::he(weight_shape, input.c * kh * kw, rng));
            self.bias = self
                .use_bias
                .then(|| Param::zeros(Shape::new(1, self.out_channels, 1, 1)));
        }
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
        let geometry = self.geometry();
        let in_len = self.input.per_sample();
        let mut output = Tensor::zeros(self.output.with_batch(batch));

        let weight = self.weight.value.data();
        let bias = self.bias.as_ref().map(|b| b.value.data());
        output
            .data_mut()
            .par_chunks_mut(self.output.per_sample())
            .zip(input.data().par_chunks(in_len))
            .for_each(|(y, x)| geometry.correlate(x, weight, bias, y));

        self.cached_input = Some(input.clone());
        output
    }

    fn backward(&mut self, output_grad: &Tensor) -> Tensor {
        let input = self
            .cached_input
            .as_ref()
            .expect("ConvolutionLayer::backward called without a preceding forward");
        let geometry = self.geometry();
        let in_len = self.input.per_sample();
        let out_len = self.output.per_sample();
        let mut input_grad = Tensor::zeros(input.shape());

        let weight = self.weight.value.data();
        input_grad
            .data_mut()
            .par_chunks_mut(in_len)
            .zip(output_grad.data().par_chunks(out_len))
            .for_each(|(dx, dy)| geometry.input_gradient(dy, weight, dx));

        // Parameter gradients are summed over the batch in sample order.
        for (x, dy) in input.data().chunks(in_len).zip(output_grad.data().chunks(out_len)) {
            geometry.accumulate_parameter_gradients(
                x,
                dy,
                self.weight.grad.data_mut(),
                self.bias.as_mut().map(|b| b.grad.data_mut()),
            );
        }
        self.batch = output_grad.shape().n;
        input_grad
    }

    fn update_parameters(&mut self, learning_rate: f32) {
        self.weight.apply(learning_rate, self.batch);
        if let Some(bias) = self.bias.as_mut() {
            bias.apply(learning_rate, self.batch);
        }
    }

    fn parameter_count(&self) -> usize {
        self.weight.value.len() + self.bias.as_ref().map_or(0, |b| b.value.len())
    }

    fn export_parameters(&self) -> LayerRecord {
        export_record(self.kind(), &self.weight, self.bias.as_ref())
    }

    fn check_parameters(&self, record: &LayerRecord) -> Result<()> {
        check_record(self.kind(), record, &self.weight, self.bias.as_ref())
    }

    fn import_parameters(&mut self, record: &LayerRecord) -> Result<()> {
        self.check_parameters(record)?;
        import_record(record, &mut self.weight, self.bias.as_mut());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn output_dimensions_follow_the_extent_formula() {
        let mut layer = ConvolutionLayer::new(8, (3, 3), 1, 1, true);
        let out = layer.initialize(Shape::new(1, 1, 28, 28), &mut rng()).unwrap();
        assert_eq!(out, Shape::new(1, 8, 28, 28));

        let mut layer = ConvolutionLayer::new(6, (5, 5), 1, 0, true);
        let out = layer.initialize(Shape::new(1, 1, 28, 28), &mut rng()).unwrap();
        assert_eq!(out, Shape::new(1, 6, 24, 24));

        let mut layer = ConvolutionLayer::new(4, (3, 3), 2, 0, false);
        let out = layer.initialize(Shape::new(1, 2, 7, 8), &mut rng()).unwrap();
        assert_eq!(out, Shape::new(1, 4, 3, 3));
    }

    #[test]
    fn kernel_larger_than_padded_input_is_rejected() {
        let mut layer = ConvolutionLayer::new(1, (5, 5), 1, 0, true);
        let err = layer.initialize(Shape::new(1, 1, 4, 4), &mut rng());
        assert!(matches!(err, Err(NnError::ShapeMismatch(_))));

        let mut layer = ConvolutionLayer::new(1, (5, 5), 1, 1, true);
        assert!(layer.initialize(Shape::new(1, 1, 4, 4), &mut rng()).is_ok());
    }

    #[test]
    fn parameter_count_includes_bias() {
        let mut layer = ConvolutionLayer::new(8, (3, 3), 1, 1, true);
        layer.initialize(Shape::new(1, 1, 28, 28), &mut rng()).unwrap();
        assert_eq!(layer.parameter_count(), 8 * 9 + 8);

        let mut layer = ConvolutionLayer::new(8, (3, 3), 1, 1, false);
        layer.initialize(Shape::new(1, 1, 28, 28), &mut rng()).unwrap();
        assert_eq!(layer.parameter_count(), 8 * 9);
    }

    #[test]
    fn forward_matches_hand_computed_correlation() {
        let mut layer = ConvolutionLayer::new(1, (2, 2), 1, 0, true);
        layer.initialize(Shape::new(1, 1, 3, 3), &mut rng()).unwrap();
        layer
            .weight_mut()
            .data_mut()
            .copy_from_slice(&[1.0, 0.0, 0.0, -1.0]);
        layer.bias_mut().unwrap().data_mut()[0] = 0.5;

        let input = Tensor::from_vec(
            Shape::new(1, 1, 3, 3),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0],
        );
        let output = layer.forward(&input);
        // x[i][j] - x[i+1][j+1] + 0.5 = -4 + 0.5 everywhere.
        assert_eq!(output.shape(), Shape::new(1, 1, 2, 2));
        assert!(output.data().iter().all(|&y| y == -3.5));
    }

    #[test]
    fn zero_padding_contributes_nothing() {
        let mut layer = ConvolutionLayer::new(1, (3, 3), 1, 1, false);
        layer.initialize(Shape::new(1, 1, 2, 2), &mut rng()).unwrap();
        layer.weight_mut().fill(1.0);

        let input = Tensor::from_vec(Shape::new(1, 1, 2, 2), vec![1.0, 2.0, 3.0, 4.0]);
        let output = layer.forward(&input);
        // Every 3×3 window centred on a 2×2 image covers all four pixels.
        assert!(output.data().iter().all(|&y| y == 10.0));
    }

    #[test]
    fn bias_gradient_sums_over_batch_and_positions() {
        let mut layer = ConvolutionLayer::new(2, (2, 2), 1, 0, true);
        layer.initialize(Shape::new(1, 1, 3, 3), &mut rng()).unwrap();
        let input = Tensor::zeros(Shape::new(3, 1, 3, 3));
        let output = layer.forward(&input);

        let mut grad = Tensor::zeros(output.shape());
        grad.fill(1.0);
        layer.backward(&grad);
        // 3 samples × 4 positions per channel.
        assert_eq!(layer.bias_grad().unwrap().data(), &[12.0, 12.0]);

        layer.update_parameters(0.1);
        assert!(layer.bias_grad().unwrap().data().iter().all(|&g| g == 0.0));
        // 0 - 0.1 * 12 / 3
        for &b in layer.bias().unwrap().data() {
            assert!((b + 0.4).abs() < 1e-6);
        }
    }
}
