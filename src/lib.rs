pub mod app;
pub mod data;
pub mod error;
pub mod layers;
pub mod loss;
pub mod math;
pub mod network;
pub mod train;

// Convenience re-exports
pub use data::{Dataset, DatasetView, Image};
pub use error::{NnError, Result};
pub use layers::layer::{Layer, LayerKind};
pub use loss::loss_type::LossType;
pub use math::tensor::{Shape, Tensor};
pub use network::network::{Network, Phase};
pub use network::spec::{InputSpec, LayerSpec, NetworkSpec};
pub use train::train_config::{EvalConfig, TrainConfig};
pub use train::trainer::{TrainReport, Trainer};
