use crate::data::dataset::{DatasetView, Image};
use crate::math::tensor::{Shape, Tensor};

/// Raw intensities are multiplied by 1/256, so 255 maps to 255/256 rather
/// than 1.0. Kept for compatibility with models trained this way.
pub const PIXEL_SCALE: f32 = 1.0 / 256.0;

/// One mini-batch: scaled images and one-hot labels.
#[derive(Debug, Clone)]
pub struct Batch {
    pub input: Tensor,
    pub label: Tensor,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.input.shape().n
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Class index → vector of `classes` zeros with a 1.0 at `label`.
///
/// A label outside `0..classes` yields all zeros.
pub fn one_hot(label: u8, classes: usize) -> Vec<f32> {
    let mut encoded = vec![0.0; classes];
    if let Some(slot) = encoded.get_mut(label as usize) {
        *slot = 1.0;
    }
    encoded
}

/// Stacks images into an NCHW tensor scaled by `PIXEL_SCALE`.
///
/// # Panics
/// Panics if `images` is empty; all images must share one geometry.
pub fn images_to_tensor(images: &[Image]) -> Tensor {
    let sample = images[0].shape();
    let data = images
        .iter()
        .flat_map(|image| image.data.iter().map(|&px| px as f32 * PIXEL_SCALE))
        .collect();
    Tensor::from_vec(sample.with_batch(images.len()), data)
}

impl<'a> DatasetView<'a> {
    /// Assembles the batch starting at `offset`.
    ///
    /// Returns `None` once `offset` is past the end of the view: that is the
    /// normal end-of-data signal. A trailing batch shorter than `batch_size`
    /// is shrunk to the remaining samples, never padded.
    pub fn fetch_batch(&self, offset: usize, batch_size: usize, classes: usize) -> Option<Batch> {
        if offset >= self.len() || batch_size == 0 {
            return None;
        }
        let end = (offset + batch_size).min(self.len());
        let input = images_to_tensor(&self.images()[offset..end]);
        let labels = self.labels()[offset..end]
            .iter()
            .flat_map(|&l| one_hot(l, classes))
            .collect();
        let label = Tensor::from_vec(Shape::new(end - offset, classes, 1, 1), labels);
        Some(Batch { input, label })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::Dataset;

    #[test]
    fn one_hot_marks_only_the_class() {
        assert_eq!(one_hot(3, 5), vec![0.0, 0.0, 0.0, 1.0, 0.0]);
        assert_eq!(one_hot(7, 3), vec![0.0; 3]);
    }

    #[test]
    fn pixels_are_scaled_by_one_over_256() {
        let t = images_to_tensor(&[Image::new(1, 2, 1, vec![0, 255])]);
        assert_eq!(t.data(), &[0.0, 255.0 / 256.0]);
    }

    #[test]
    fn fetch_past_the_end_signals_end_of_data() {
        let ds = Dataset::new(vec![Image::new(1, 1, 1, vec![7])], vec![0]).unwrap();
        let view = ds.view();
        assert!(view.fetch_batch(0, 4, 2).is_some());
        assert!(view.fetch_batch(1, 4, 2).is_none());
    }
}
