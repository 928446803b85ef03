use crate::math::tensor::Tensor;

/// Scalar training objective plus its gradient w.r.t. the prediction.
///
/// Both methods average over the batch dimension `N` of `predicted`.
pub trait LossFunctor {
    fn loss(&self, predicted: &Tensor, expected: &Tensor) -> f32;

    /// ∂L/∂predicted, same shape as `predicted`.
    fn derivative(&self, predicted: &Tensor, expected: &Tensor) -> Tensor;
}
