use thiserror::Error;

use crate::network::Phase;

/// Every way an engine operation can fail.
///
/// Shape and dataset errors are fatal to the build, load, or training run in
/// progress; the caller is expected to abort rather than continue with a
/// partially built network or a partially loaded model.
#[derive(Debug, Error)]
pub enum NnError {
    /// Adjacent layers do not compose, an input tensor does not match the
    /// network, or a stored parameter disagrees with the built architecture.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Image/label collections are empty or have different lengths.
    #[error("empty dataset: {0}")]
    EmptyDataset(String),

    /// An operation was attempted in the wrong network phase.
    #[error("operation requires {expected:?} phase, network is in {actual:?} phase")]
    WrongPhase { expected: Phase, actual: Phase },

    /// A layer or network description has unusable hyperparameters.
    #[error("invalid specification: {0}")]
    InvalidSpec(String),

    /// A dataset file is malformed.
    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("model format error: {0}")]
    Format(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NnError>;
