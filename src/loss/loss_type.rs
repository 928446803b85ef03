use serde::{Deserialize, Serialize};

use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::loss::functor::LossFunctor;
use crate::loss::mse::MseLoss;
use crate::math::tensor::Tensor;

/// Selects which loss function a network trains against.
///
/// - `CrossEntropy` - pair with a Softmax output layer and one-hot labels.
/// - `Mse`          - mean squared error against the label tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossType {
    CrossEntropy,
    Mse,
}

impl LossType {
    pub fn functor(&self) -> &'static dyn LossFunctor {
        match self {
            LossType::CrossEntropy => &CrossEntropyLoss,
            LossType::Mse => &MseLoss,
        }
    }
}

impl LossFunctor for LossType {
    fn loss(&self, predicted: &Tensor, expected: &Tensor) -> f32 {
        self.functor().loss(predicted, expected)
    }

    fn derivative(&self, predicted: &Tensor, expected: &Tensor) -> Tensor {
        self.functor().derivative(predicted, expected)
    }
}
