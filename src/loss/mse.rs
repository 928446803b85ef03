use crate::loss::functor::LossFunctor;
use crate::math::tensor::Tensor;

pub struct MseLoss;

impl LossFunctor for MseLoss {
    /// Σ(predicted − expected)² / N
    fn loss(&self, predicted: &Tensor, expected: &Tensor) -> f32 {
        debug_assert_eq!(predicted.shape(), expected.shape());
        let n = predicted.shape().n.max(1) as f32;
        let total: f32 = predicted
            .data()
            .iter()
            .zip(expected.data())
            .map(|(p, e)| (p - e).powi(2))
            .sum();
        total / n
    }

    /// 2·(predicted − expected) / N
    fn derivative(&self, predicted: &Tensor, expected: &Tensor) -> Tensor {
        let n = predicted.shape().n.max(1) as f32;
        let data = predicted
            .data()
            .iter()
            .zip(expected.data())
            .map(|(p, e)| 2.0 * (p - e) / n)
            .collect();
        Tensor::from_vec(predicted.shape(), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tensor::Shape;

    #[test]
    fn loss_and_gradient() {
        let shape = Shape::new(2, 2, 1, 1);
        let predicted = Tensor::from_vec(shape, vec![1.0, 0.0, 0.5, 0.5]);
        let expected = Tensor::from_vec(shape, vec![0.0, 0.0, 0.5, 1.5]);
        assert_eq!(MseLoss.loss(&predicted, &expected), 1.0);
        assert_eq!(
            MseLoss.derivative(&predicted, &expected).data(),
            &[1.0, 0.0, 0.0, -1.0]
        );
    }
}
