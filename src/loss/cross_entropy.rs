use crate::loss::functor::LossFunctor;
use crate::math::tensor::Tensor;

/// Categorical cross-entropy over softmax probabilities and one-hot labels.
pub struct CrossEntropyLoss;

/// Lower bound on probabilities inside log() and the gradient's division.
pub const EPS: f32 = 1e-10;

impl LossFunctor for CrossEntropyLoss {
    /// L = -Σ(expected · log(max(predicted, ε))) / N
    fn loss(&self, predicted: &Tensor, expected: &Tensor) -> f32 {
        debug_assert_eq!(predicted.shape(), expected.shape());
        let n = predicted.shape().n.max(1) as f32;
        let total: f32 = predicted
            .data()
            .iter()
            .zip(expected.data())
            .map(|(p, e)| -e * p.max(EPS).ln())
            .sum();
        total / n
    }

    /// ∂L/∂p = -(expected / max(predicted, ε)) / N
    ///
    /// This is the gradient w.r.t. the probabilities themselves; the
    /// preceding softmax layer applies its own Jacobian on the way back.
    fn derivative(&self, predicted: &Tensor, expected: &Tensor) -> Tensor {
        let n = predicted.shape().n.max(1) as f32;
        let data = predicted
            .data()
            .iter()
            .zip(expected.data())
            .map(|(p, e)| -(e / p.max(EPS)) / n)
            .collect();
        Tensor::from_vec(predicted.shape(), data)
    }
}
