use crate::data::batch::images_to_tensor;
use crate::data::dataset::DatasetView;
use crate::error::{NnError, Result};
use crate::network::network::Network;

/// Index of the maximum element.
///
/// Scans low to high and moves to every candidate that is `>=` the current
/// best, so the *last* index attaining the maximum wins. Evaluation results
/// depend on this tie-break. Returns 0 for an empty slice.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v >= values[best] {
            best = i;
        }
    }
    best
}

/// Classification accuracy of `network` on `data`, evaluated in sub-batches
/// of `batch_size` (independent of the training batch size).
pub fn evaluate(network: &mut Network, data: DatasetView<'_>, batch_size: usize) -> Result<f32> {
    if batch_size == 0 {
        return Err(NnError::InvalidSpec("evaluation batch size must be at least 1".into()));
    }
    let mut correct = 0usize;
    for (images, labels) in data
        .images()
        .chunks(batch_size)
        .zip(data.labels().chunks(batch_size))
    {
        let prediction = network.test_batch(&images_to_tensor(images))?;
        correct += labels
            .iter()
            .enumerate()
            .filter(|&(j, &label)| argmax(prediction.sample(j)) == label as usize)
            .count();
    }
    Ok(correct as f32 / data.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_maximal_index_wins() {
        assert_eq!(argmax(&[0.5, 0.9, 0.9]), 2);
        assert_eq!(argmax(&[0.9, 0.1, 0.2]), 0);
        assert_eq!(argmax(&[1.0, 1.0, 1.0, 1.0]), 3);
        assert_eq!(argmax(&[]), 0);
    }
}
