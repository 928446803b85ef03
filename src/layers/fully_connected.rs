use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::error::{NnError, Result};
use crate::layers::layer::{Layer, LayerKind};
use crate::layers::param::{check_record, export_record, import_record, Param};
use crate::math::tensor::{Shape, Tensor};
use crate::network::store::LayerRecord;

/// Dense layer: `y = W·x + b` per sample, with the whole input sample
/// flattened into a vector.
///
/// Weights are stored as `(outputs, inputs, 1, 1)`, biases as `(1, outputs, 1, 1)`.
/// The output shape is `(outputs, 1, 1)` regardless of the input geometry.
pub struct FullyConnectedLayer {
    outputs: usize,
    use_bias: bool,
    input: Shape,
    weight: Param,
    bias: Option<Param>,
    cached_input: Option<Tensor>,
    batch: usize,
}

impl FullyConnectedLayer {
    pub fn new(outputs: usize, bias: bool) -> FullyConnectedLayer {
        FullyConnectedLayer {
            outputs,
            use_bias: bias,
            input: Shape::new(1, 0, 0, 0),
            weight: Param::unset(),
            bias: None,
            cached_input: None,
            batch: 0,
        }
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight.value
    }

    pub fn weight_mut(&mut self) -> &mut Tensor {
        &mut self.weight.value
    }

    pub fn weight_grad(&self) -> &Tensor {
        &self.weight.grad
    }

    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref().map(|b| &b.value)
    }

    pub fn bias_mut(&mut self) -> Option<&mut Tensor> {
        self.bias.as_mut().map(|b| &mut b.value)
    }

    pub fn bias_grad(&self) -> Option<&Tensor> {
        self.bias.as_ref().map(|b| &b.grad)
    }
}

impl Layer for FullyConnectedLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::FullyConnected
    }

    fn initialize(&mut self, input: Shape, rng: &mut StdRng) -> Result<Shape> {
        let inputs = input.per_sample();
        if inputs == 0 || self.outputs == 0 {
            return Err(NnError::ShapeMismatch(format!(
                "fully connected layer cannot map {} inputs to {} outputs",
                inputs, self.outputs
            )));
        }
        self.input = input.with_batch(1);

        let weight_shape = Shape::new(self.outputs, inputs, 1, 1);
        if self.weight.shape() != weight_shape {
            self.weight = Param::new(Tensor::he(weight_shape, inputs, rng));
            self.bias = self
                .use_bias
                .then(|| Param::zeros(Shape::new(1, self.outputs, 1, 1)));
        }
        Ok(self.output_shape())
    }

    fn input_shape(&self) -> Shape {
        self.input
    }

    fn output_shape(&self) -> Shape {
        Shape::new(1, self.outputs, 1, 1)
    }

    fn forward(&mut self, input: &Tensor) -> Tensor {
        let batch = input.shape().n;
        let inputs = self.input.per_sample();
        let mut output = Tensor::zeros(self.output_shape().with_batch(batch));

        let weight = self.weight.value.data();
        let bias = self.bias.as_ref().map(|b| b.value.data());
        output
            .data_mut()
            .par_chunks_mut(self.outputs)
            .zip(input.data().par_chunks(inputs))
            .for_each(|(y, x)| {
                for (o, out) in y.iter_mut().enumerate() {
                    let row = &weight[o * inputs..(o + 1) * inputs];
                    let dot: f32 = row.iter().zip(x).map(|(w, v)| w * v).sum();
                    *out = dot + bias.map_or(0.0, |b| b[o]);
                }
            });

        self.cached_input = Some(input.clone());
        output
    }

    fn backward(&mut self, output_grad: &Tensor) -> Tensor {
        let input = self
            .cached_input
            .as_ref()
            .expect("FullyConnectedLayer::backward called without a preceding forward");
        let inputs = self.input.per_sample();
        let outputs = self.outputs;
        let mut input_grad = Tensor::zeros(input.shape());

        // ∂L/∂x = Wᵀ · ∂L/∂y
        let weight = self.weight.value.data();
        input_grad
            .data_mut()
            .par_chunks_mut(inputs)
            .zip(output_grad.data().par_chunks(outputs))
            .for_each(|(dx, dy)| {
                for (o, &g) in dy.iter().enumerate() {
                    let row = &weight[o * inputs..(o + 1) * inputs];
                    for (d, w) in dx.iter_mut().zip(row) {
                        *d += w * g;
                    }
                }
            });

        // ∂L/∂W += ∂L/∂y ⊗ x, ∂L/∂b += ∂L/∂y, summed over the batch.
        let d_weight = self.weight.grad.data_mut();
        for (x, dy) in input.data().chunks(inputs).zip(output_grad.data().chunks(outputs)) {
            for (o, &g) in dy.iter().enumerate() {
                let row = &mut d_weight[o * inputs..(o + 1) * inputs];
                for (d, v) in row.iter_mut().zip(x) {
                    *d += g * v;
                }
            }
            if let Some(bias) = self.bias.as_mut() {
                for (d, &g) in bias.grad.data_mut().iter_mut().zip(dy) {
                    *d += g;
                }
            }
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
