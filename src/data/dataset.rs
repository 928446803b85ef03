use crate::error::{NnError, Result};
use crate::math::tensor::Shape;

/// One raw image: `channels · height · width` intensities in 0..=255,
/// stored channel-major then row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub channels: usize,
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl Image {
    pub fn new(channels: usize, width: usize, height: usize, data: Vec<u8>) -> Image {
        Image {
            channels,
            width,
            height,
            data,
        }
    }

    /// Per-sample tensor shape of this image.
    pub fn shape(&self) -> Shape {
        Shape::new(1, self.channels, self.height, self.width)
    }
}

/// An owned, validated collection of labeled images.
#[derive(Debug, Clone)]
pub struct Dataset {
    images: Vec<Image>,
    labels: Vec<u8>,
}

impl Dataset {
    /// Fails with `EmptyDataset` unless there is at least one image and
    /// exactly one label per image, and with `ShapeMismatch` unless all images
    /// share one geometry matching their buffers.
    pub fn new(images: Vec<Image>, labels: Vec<u8>) -> Result<Dataset> {
        check_lengths(images.len(), labels.len())?;
        let shape = images[0].shape();
        for (i, image) in images.iter().enumerate() {
            if image.shape() != shape || image.data.len() != shape.per_sample() {
                return Err(NnError::ShapeMismatch(format!(
                    "image {} is {}x{}x{} with {} bytes, expected {}x{}x{}",
                    i,
                    image.channels,
                    image.height,
                    image.width,
                    image.data.len(),
                    shape.c,
                    shape.h,
                    shape.w
                )));
            }
        }
        Ok(Dataset { images, labels })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Fails with `InvalidData` if any label is not a class index below `classes`.
    pub fn validate_labels(&self, classes: usize) -> Result<()> {
        match self.labels.iter().position(|&l| l as usize >= classes) {
            Some(i) => Err(NnError::InvalidData(format!(
                "label {} at index {} is out of range for {} classes",
                self.labels[i], i, classes
            ))),
            None => Ok(()),
        }
    }

    pub fn view(&self) -> DatasetView<'_> {
        DatasetView {
            images: &self.images,
            labels: &self.labels,
        }
    }

    /// Splits into (train, validation) without reordering. The first
    /// `floor(len · (1 − validation_fraction))` samples train, the rest
    /// validate; both parts must be non-empty.
    pub fn split(&self, validation_fraction: f32) -> Result<(DatasetView<'_>, DatasetView<'_>)> {
        let train_len = (self.len() as f32 * (1.0 - validation_fraction)) as usize;
        let train_len = train_len.min(self.len());
        let train = DatasetView::new(&self.images[..train_len], &self.labels[..train_len])?;
        let validation = DatasetView::new(&self.images[train_len..], &self.labels[train_len..])?;
        Ok((train, validation))
    }
}

/// A borrowed, ordered, indexable slice of a dataset.
#[derive(Debug, Clone, Copy)]
pub struct DatasetView<'a> {
    images: &'a [Image],
    labels: &'a [u8],
}

impl<'a> DatasetView<'a> {
    pub fn new(images: &'a [Image], labels: &'a [u8]) -> Result<DatasetView<'a>> {
        check_lengths(images.len(), labels.len())?;
        Ok(DatasetView { images, labels })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &'a [Image] {
        self.images
    }

    pub fn labels(&self) -> &'a [u8] {
        self.labels
    }

    /// Per-sample shape of the images in this view.
    pub fn sample_shape(&self) -> Shape {
        self.images[0].shape()
    }
}

fn check_lengths(images: usize, labels: usize) -> Result<()> {
    if images == 0 {
        return Err(NnError::EmptyDataset("no images".into()));
    }
    if images != labels {
        return Err(NnError::EmptyDataset(format!(
            "{} images but {} labels",
            images, labels
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images(n: usize) -> Vec<Image> {
        (0..n).map(|i| Image::new(1, 2, 2, vec![i as u8; 4])).collect()
    }

    #[test]
    fn empty_or_mismatched_collections_are_rejected() {
        assert!(matches!(
            Dataset::new(vec![], vec![]),
            Err(NnError::EmptyDataset(_))
        ));
        assert!(matches!(
            Dataset::new(images(3), vec![0, 1]),
            Err(NnError::EmptyDataset(_))
        ));
    }

    #[test]
    fn inconsistent_geometry_is_rejected() {
        let mut imgs = images(2);
        imgs[1] = Image::new(1, 3, 3, vec![0; 9]);
        assert!(matches!(
            Dataset::new(imgs, vec![0, 1]),
            Err(NnError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn split_keeps_order_eighty_twenty() {
        let ds = Dataset::new(images(10), (0..10).collect()).unwrap();
        let (train, validation) = ds.split(0.2).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(validation.len(), 2);
        assert_eq!(validation.labels(), &[8, 9]);
        assert!(matches!(ds.split(0.0), Err(NnError::EmptyDataset(_))));
    }

    #[test]
    fn labels_must_name_a_class() {
        let ds = Dataset::new(images(2), vec![3, 10]).unwrap();
        assert!(ds.validate_labels(11).is_ok());
        assert!(matches!(ds.validate_labels(10), Err(NnError::InvalidData(_))));
    }
}
