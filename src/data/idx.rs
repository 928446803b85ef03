//! IDX dataset files as used by MNIST and its derivatives.
//!
//! # IDX3 image file layout
//! ```text
//! bytes  0-1:   0x00 0x00   (reserved, must be zero)
//! byte   2:     0x08        (dtype = uint8)
//! byte   3:     0x03        (number of dimensions = 3)
//! bytes  4-7:   N           (number of images, big-endian u32)
//! bytes  8-11:  rows        (image height in pixels, big-endian u32)
//! bytes 12-15:  cols        (image width in pixels, big-endian u32)
//! bytes 16..:   N * rows * cols bytes, row-major, uint8
//! ```
//!
//! # IDX1 label file layout
//! ```text
//! bytes  0-1:   0x00 0x00   (reserved, must be zero)
//! byte   2:     0x08        (dtype = uint8)
//! byte   3:     0x01        (number of dimensions = 1)
//! bytes  4-7:   N           (number of labels, big-endian u32)
//! bytes  8..:   N bytes, each a class index
//! ```

use std::path::Path;

use crate::data::dataset::{Dataset, Image};
use crate::error::{NnError, Result};

/// Reads an image file and a label file into a `Dataset`.
pub fn load_idx(images_path: &Path, labels_path: &Path) -> Result<Dataset> {
    let image_bytes = std::fs::read(images_path)?;
    let label_bytes = std::fs::read(labels_path)?;
    let dataset = parse_idx_pair(&image_bytes, &label_bytes)?;
    log::debug!(
        "read {} samples from {} and {}",
        dataset.len(),
        images_path.display(),
        labels_path.display()
    );
    Ok(dataset)
}

/// Parses in-memory IDX3 image and IDX1 label files.
pub fn parse_idx_pair(image_bytes: &[u8], label_bytes: &[u8]) -> Result<Dataset> {
    let images = parse_images(image_bytes)?;
    let labels = parse_labels(label_bytes)?;
    if images.len() != labels.len() {
        return Err(NnError::InvalidData(format!(
            "image file declares {} items but label file declares {}",
            images.len(),
            labels.len()
        )));
    }
    Dataset::new(images, labels)
}

fn check_header(bytes: &[u8], what: &str, dims: u8, header_len: usize) -> Result<()> {
    if bytes.len() < header_len {
        return Err(NnError::InvalidData(format!(
            "{} file too short: expected at least {} header bytes, got {}",
            what,
            header_len,
            bytes.len()
        )));
    }
    if bytes[0] != 0x00 || bytes[1] != 0x00 {
        return Err(NnError::InvalidData(format!(
            "{} file: reserved bytes must be zero, got 0x{:02X} 0x{:02X}",
            what, bytes[0], bytes[1]
        )));
    }
    if bytes[2] != 0x08 {
        return Err(NnError::InvalidData(format!(
            "{} file: dtype must be 0x08 (uint8), got 0x{:02X}",
            what, bytes[2]
        )));
    }
    if bytes[3] != dims {
        return Err(NnError::InvalidData(format!(
            "{} file: expected {} dimensions, got {}",
            what, dims, bytes[3]
        )));
    }
    Ok(())
}

fn read_u32(bytes: &[u8], at: usize) -> usize {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]) as usize
}

fn parse_images(bytes: &[u8]) -> Result<Vec<Image>> {
    check_header(bytes, "IDX image", 0x03, 16)?;
    let n_items = read_u32(bytes, 4);
    let rows = read_u32(bytes, 8);
    let cols = read_u32(bytes, 12);

    let n_pixels = rows
        .checked_mul(cols)
        .ok_or_else(|| NnError::InvalidData(format!("{}x{} images overflow", rows, cols)))?;
    let required = n_items
        .checked_mul(n_pixels)
        .and_then(|n| n.checked_add(16))
        .ok_or_else(|| NnError::InvalidData("IDX image data length overflows".into()))?;
    if bytes.len() < required {
        return Err(NnError::InvalidData(format!(
            "IDX image file declares {} images of {}x{} but holds only {} bytes",
            n_items,
            rows,
            cols,
            bytes.len()
        )));
    }
    if n_pixels == 0 {
        return Err(NnError::InvalidData("IDX image file declares empty images".into()));
    }

    Ok(bytes[16..required]
        .chunks_exact(n_pixels)
        .map(|chunk| Image::new(1, cols, rows, chunk.to_vec()))
        .collect())
}

fn parse_labels(bytes: &[u8]) -> Result<Vec<u8>> {
    check_header(bytes, "IDX label", 0x01, 8)?;
    let n_items = read_u32(bytes, 4);
    let required = 8 + n_items;
    if bytes.len() < required {
        return Err(NnError::InvalidData(format!(
            "IDX label file declares {} labels but holds only {} bytes",
            n_items,
            bytes.len()
        )));
    }
    Ok(bytes[8..required].to_vec())
}
