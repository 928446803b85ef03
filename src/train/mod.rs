pub mod eval;
pub mod events;
pub mod train_config;
pub mod trainer;

pub use eval::{argmax, evaluate};
pub use events::{LogSink, ProgressSink, TrainEvent};
pub use train_config::{EvalConfig, TrainConfig};
pub use trainer::{decay_learning_rate, TrainReport, Trainer};
