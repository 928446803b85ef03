use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{NnError, Result};
use crate::math::tensor::{Shape, Tensor};
use crate::network::store::LayerRecord;

/// Type tag of a layer, written into every persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Input,
    Convolution,
    MaxPooling,
    Relu,
    FullyConnected,
    Softmax,
}

/// Core trait for network layers.
///
/// A layer is first `initialize`d with the per-sample shape it will receive,
/// which fixes its output shape and allocates its parameters. Afterwards every
/// `forward` caches what the matching `backward` needs; `backward` returns the
/// gradient w.r.t. the input and accumulates gradients w.r.t. the layer's own
/// parameters, summed over the batch. `update_parameters` applies and clears
/// those accumulated gradients.
///
/// Shapes passed to and returned from `initialize` carry a batch dimension of 1;
/// `forward` accepts any batch size with the initialized sample geometry.
pub trait Layer: Send {
    fn kind(&self) -> LayerKind;

    /// Fixes the input geometry and returns the derived output geometry.
    ///
    /// Fails with `ShapeMismatch` when the hyperparameters cannot be applied
    /// to `input` (e.g. a kernel larger than the padded input).
    fn initialize(&mut self, input: Shape, rng: &mut StdRng) -> Result<Shape>;

    fn input_shape(&self) -> Shape;

    fn output_shape(&self) -> Shape;

    fn forward(&mut self, input: &Tensor) -> Tensor;

    /// Consumes the state cached by the last `forward` and returns ∂L/∂input.
    fn backward(&mut self, output_grad: &Tensor) -> Tensor;

    /// `param -= learning_rate * accumulated_grad / batch_size`, then clears
    /// the accumulated gradients. No-op for parameterless layers.
    fn update_parameters(&mut self, _learning_rate: f32) {}

    /// Number of learnable scalars (weights and biases).
    fn parameter_count(&self) -> usize {
        0
    }

    fn export_parameters(&self) -> LayerRecord {
        LayerRecord::empty(self.kind())
    }

    /// Verifies that `record` can be imported without modifying anything.
    fn check_parameters(&self, record: &LayerRecord) -> Result<()> {
        check_kind(self.kind(), record)?;
        if record.weight_shape.is_some() || !record.weights.is_empty() || record.bias.is_some() {
            return Err(NnError::ShapeMismatch(format!(
                "{:?} layer has no parameters but the record carries some",
                self.kind()
            )));
        }
        Ok(())
    }

    fn import_parameters(&mut self, record: &LayerRecord) -> Result<()> {
        self.check_parameters(record)
    }
}

pub(crate) fn check_kind(kind: LayerKind, record: &LayerRecord) -> Result<()> {
    if record.kind != kind {
        return Err(NnError::ShapeMismatch(format!(
            "expected a {:?} record, found {:?}",
            kind, record.kind
        )));
    }
    Ok(())
}

