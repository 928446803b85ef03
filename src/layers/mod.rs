pub mod convolution;
pub mod fully_connected;
pub mod input;
pub mod layer;
pub mod param;
pub mod pooling;
pub mod relu;
pub mod softmax;

pub use convolution::ConvolutionLayer;
pub use fully_connected::FullyConnectedLayer;
pub use input::InputLayer;
pub use layer::{Layer, LayerKind};
pub use pooling::MaxPoolingLayer;
pub use relu::ReluLayer;
pub use softmax::SoftmaxLayer;
