use serde::{Deserialize, Serialize};

use crate::error::{NnError, Result};

/// Hyperparameters of a training run.
///
/// # Fields
/// - `learning_rate`       - initial SGD step size
/// - `decay_rate`          - multiplier applied to the rate after each completed epoch
/// - `min_learning_rate`   - floor for the decayed rate
/// - `batch_size`          - samples per mini-batch; use `1` for online SGD
/// - `eval_interval`       - validate every this many batches within an epoch
/// - `max_batches`         - stop after this many batches in one epoch
/// - `max_epochs`          - stop after this many full passes
/// - `eval_batch_size`     - sub-batch size used when evaluating
/// - `validation_fraction` - tail share of the training file held out for validation
/// - `classes`             - length of the one-hot label vectors
/// - `seed`                - parameter initialization seed; entropy when absent
///
/// The defaults reproduce the reference digit-recognition run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub learning_rate: f32,
    pub decay_rate: f32,
    pub min_learning_rate: f32,
    pub batch_size: usize,
    pub eval_interval: usize,
    pub max_batches: usize,
    pub max_epochs: usize,
    pub eval_batch_size: usize,
    pub validation_fraction: f32,
    pub classes: usize,
    pub seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            learning_rate: 0.01,
            decay_rate: 0.1,
            min_learning_rate: 0.000001,
            batch_size: 1,
            eval_interval: 1000,
            max_batches: 5000,
            max_epochs: 1,
            eval_batch_size: 128,
            validation_fraction: 0.2,
            classes: 10,
            seed: None,
        }
    }
}

impl TrainConfig {
    /// Rejects settings the training loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        let counts = [
            ("batch_size", self.batch_size),
            ("eval_interval", self.eval_interval),
            ("max_batches", self.max_batches),
            ("max_epochs", self.max_epochs),
            ("eval_batch_size", self.eval_batch_size),
            ("classes", self.classes),
        ];
        if let Some((name, _)) = counts.iter().find(|(_, v)| *v == 0) {
            return Err(NnError::InvalidSpec(format!("{} must be at least 1", name)));
        }
        if !(self.learning_rate > 0.0) || !(self.decay_rate > 0.0) {
            return Err(NnError::InvalidSpec(format!(
                "learning_rate ({}) and decay_rate ({}) must be positive",
                self.learning_rate, self.decay_rate
            )));
        }
        if !(self.min_learning_rate >= 0.0) {
            return Err(NnError::InvalidSpec(format!(
                "min_learning_rate ({}) must not be negative",
                self.min_learning_rate
            )));
        }
        if !(self.validation_fraction > 0.0 && self.validation_fraction < 1.0) {
            return Err(NnError::InvalidSpec(format!(
                "validation_fraction ({}) must lie strictly between 0 and 1",
                self.validation_fraction
            )));
        }
        Ok(())
    }

    /// Serializes the config to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Reads a config from JSON; absent fields keep their defaults.
    pub fn load_json(path: &str) -> Result<TrainConfig> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let config: TrainConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }
}

/// Settings for evaluating a saved model on a test set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub batch_size: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig { batch_size: 64 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(TrainConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: TrainConfig = serde_json::from_str(r#"{ "batch_size": 32, "max_epochs": 3 }"#).unwrap();
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.max_epochs, 3);
        assert_eq!(config.learning_rate, 0.01);
        assert_eq!(config.eval_batch_size, 128);
    }

    #[test]
    fn unusable_settings_are_rejected() {
        let zero_batch = TrainConfig { batch_size: 0, ..TrainConfig::default() };
        assert!(zero_batch.validate().is_err());
        let no_validation = TrainConfig { validation_fraction: 0.0, ..TrainConfig::default() };
        assert!(no_validation.validate().is_err());
        let negative_rate = TrainConfig { learning_rate: -0.1, ..TrainConfig::default() };
        assert!(negative_rate.validate().is_err());
    }
}
