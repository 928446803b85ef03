use crate::error::{NnError, Result};
use crate::layers::layer::{check_kind, LayerKind};
use crate::math::tensor::{Shape, Tensor};
use crate::network::store::LayerRecord;

/// A learnable tensor together with its accumulated gradient.
#[derive(Debug, Clone)]
pub struct Param {
    pub value: Tensor,
    pub grad: Tensor,
}

impl Param {
    pub fn new(value: Tensor) -> Param {
        let grad = Tensor::zeros(value.shape());
        Param { value, grad }
    }

    pub fn zeros(shape: Shape) -> Param {
        Param::new(Tensor::zeros(shape))
    }

    /// Placeholder for layers that have not been initialized yet.
    pub fn unset() -> Param {
        Param::zeros(Shape::new(0, 0, 0, 0))
    }

    pub fn shape(&self) -> Shape {
        self.value.shape()
    }

    /// Plain SGD step averaged over the batch, then clears the gradient.
    pub fn apply(&mut self, learning_rate: f32, batch_size: usize) {
        let scale = learning_rate / batch_size.max(1) as f32;
        for (v, g) in self.value.data_mut().iter_mut().zip(self.grad.data_mut()) {
            *v -= scale * *g;
            *g = 0.0;
        }
    }
}

pub(crate) fn export_record(kind: LayerKind, weight: &Param, bias: Option<&Param>) -> LayerRecord {
    LayerRecord {
        kind,
        weight_shape: Some(weight.shape()),
        weights: weight.value.data().to_vec(),
        bias: bias.map(|b| b.value.data().to_vec()),
    }
}

pub(crate) fn check_record(
    kind: LayerKind,
    record: &LayerRecord,
    weight: &Param,
    bias: Option<&Param>,
) -> Result<()> {
    check_kind(kind, record)?;
    if record.weight_shape != Some(weight.shape()) {
        return Err(NnError::ShapeMismatch(format!(
            "{:?} weight shape {} does not match stored shape {:?}",
            kind,
            weight.shape(),
            record.weight_shape
        )));
    }
    if record.weights.len() != weight.value.len() {
        return Err(NnError::ShapeMismatch(format!(
            "{:?} expects {} weights, record holds {}",
            kind,
            weight.value.len(),
            record.weights.len()
        )));
    }
    match (bias, &record.bias) {
        (None, None) => Ok(()),
        (Some(b), Some(stored)) if stored.len() == b.value.len() => Ok(()),
        (Some(b), Some(stored)) => Err(NnError::ShapeMismatch(format!(
            "{:?} expects {} biases, record holds {}",
            kind,
            b.value.len(),
            stored.len()
        ))),
        (Some(_), None) => Err(NnError::ShapeMismatch(format!(
            "{:?} layer has a bias but the record does not",
            kind
        ))),
        (None, Some(_)) => Err(NnError::ShapeMismatch(format!(
            "{:?} layer has no bias but the record carries one",
            kind
        ))),
    }
}

/// Copies a record that already passed `check_record`.
pub(crate) fn import_record(record: &LayerRecord, weight: &mut Param, bias: Option<&mut Param>) {
    weight.value.data_mut().copy_from_slice(&record.weights);
    weight.grad.fill(0.0);
    if let (Some(b), Some(stored)) = (bias, &record.bias) {
        b.value.data_mut().copy_from_slice(stored);
        b.grad.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_averages_over_batch_and_clears_gradient() {
        let mut p = Param::new(Tensor::from_vec(Shape::new(1, 1, 1, 2), vec![1.0, 2.0]));
        p.grad.data_mut().copy_from_slice(&[4.0, -8.0]);
        p.apply(0.5, 4);
        assert_eq!(p.value.data(), &[0.5, 3.0]);
        assert!(p.grad.data().iter().all(|&g| g == 0.0));
    }
}
