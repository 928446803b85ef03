pub mod tensor;

pub use tensor::{Shape, Tensor};
