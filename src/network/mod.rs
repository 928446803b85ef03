pub mod network;
pub mod spec;
pub mod store;

pub use network::{Network, Phase};
pub use spec::{InputSpec, LayerSpec, NetworkSpec};
pub use store::{LayerRecord, ModelFile};
