pub mod batch;
pub mod dataset;
pub mod idx;

pub use batch::{images_to_tensor, one_hot, Batch, PIXEL_SCALE};
pub use dataset::{Dataset, DatasetView, Image};
pub use idx::load_idx;
