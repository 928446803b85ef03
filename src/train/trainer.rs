use std::path::Path;

use crate::data::dataset::DatasetView;
use crate::error::{NnError, Result};
use crate::network::network::{Network, Phase};
use crate::train::eval::evaluate;
use crate::train::events::{ProgressSink, TrainEvent};
use crate::train::train_config::TrainConfig;

/// `max(rate · decay_rate, min_rate)`, applied once per completed epoch.
pub fn decay_learning_rate(rate: f32, decay_rate: f32, min_rate: f32) -> f32 {
    (rate * decay_rate).max(min_rate)
}

/// Outcome of a `Trainer::run`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    pub epochs_completed: usize,
    pub batches_trained: usize,
    pub final_accuracy: f32,
    /// Rate the next batch would have used.
    pub learning_rate: f32,
    pub last_loss: Option<f32>,
}

/// Mini-batch SGD driver.
///
/// Borrows the network and both dataset views for its lifetime; the data is
/// consumed in stored order every epoch (no shuffling).
pub struct Trainer<'a, S: ProgressSink> {
    network: &'a mut Network,
    train: DatasetView<'a>,
    validation: DatasetView<'a>,
    config: TrainConfig,
    sink: S,
    learning_rate: f32,
}

impl<'a, S: ProgressSink> Trainer<'a, S> {
    /// Puts `network` into the training phase.
    ///
    /// Fails if the config is unusable or the data does not fit the network.
    pub fn new(
        network: &'a mut Network,
        train: DatasetView<'a>,
        validation: DatasetView<'a>,
        config: TrainConfig,
        sink: S,
    ) -> Result<Trainer<'a, S>> {
        config.validate()?;
        let expected = network.input_shape();
        for view in [&train, &validation] {
            if view.is_empty() {
                return Err(NnError::EmptyDataset("training needs samples".into()));
            }
            if !view.sample_shape().same_sample(&expected) {
                return Err(NnError::ShapeMismatch(format!(
                    "dataset samples are {}, network expects {}",
                    view.sample_shape(),
                    expected.with_batch(1)
                )));
            }
        }
        let classes = network.output_shape().per_sample();
        if classes != config.classes {
            return Err(NnError::ShapeMismatch(format!(
                "network produces {} outputs per sample, config expects {} classes",
                classes, config.classes
            )));
        }
        network.set_phase(Phase::Train);
        let learning_rate = config.learning_rate;
        Ok(Trainer {
            network,
            train,
            validation,
            config,
            sink,
            learning_rate,
        })
    }

    fn validation_accuracy(&mut self) -> Result<f32> {
        evaluate(&mut *self.network, self.validation, self.config.eval_batch_size)
    }

    /// Trains until the data, epoch, or batch budget runs out, then evaluates
    /// once more and, if `model_out` is given, saves the model there.
    ///
    /// Within an epoch, a validation pass is reported after every
    /// `eval_interval`-th batch (batch indices count from 0 and index 0 is
    /// never reported). Training ends right after the batch with index
    /// `max_batches` (so `max_batches + 1` batches in that epoch, including
    /// its periodic evaluation); that epoch is neither reported nor followed
    /// by a decay.
    pub fn run(&mut self, model_out: Option<&Path>) -> Result<TrainReport> {
        let batch_size = self.config.batch_size;
        let total_samples = self.train.len();
        self.sink.emit(TrainEvent::DataLoaded {
            train: total_samples,
            validation: self.validation.len(),
        });

        let mut report = TrainReport {
            epochs_completed: 0,
            batches_trained: 0,
            final_accuracy: 0.0,
            learning_rate: self.learning_rate,
            last_loss: None,
        };

        'epochs: for epoch in 0..self.config.max_epochs {
            let mut batch = 0;
            while let Some(data) = self
                .train
                .fetch_batch(batch * batch_size, batch_size, self.config.classes)
            {
                let loss = self
                    .network
                    .train_batch(&data.input, &data.label, self.learning_rate)?;
                report.batches_trained += 1;
                report.last_loss = Some(loss);

                if batch > 0 && batch % self.config.eval_interval == 0 {
                    let accuracy = self.validation_accuracy()?;
                    self.sink.emit(TrainEvent::BatchEvaluated {
                        epoch,
                        batch,
                        samples_seen: batch * batch_size,
                        total_samples,
                        loss,
                        accuracy,
                    });
                }

                if batch >= self.config.max_batches {
                    log::debug!("batch budget of {} reached in epoch {}", batch, epoch);
                    break 'epochs;
                }
                batch += 1;
            }

            let accuracy = self.validation_accuracy()?;
            self.sink.emit(TrainEvent::EpochComplete {
                epoch,
                accuracy,
                learning_rate: self.learning_rate,
            });
            self.learning_rate = decay_learning_rate(
                self.learning_rate,
                self.config.decay_rate,
                self.config.min_learning_rate,
            );
            report.epochs_completed += 1;
        }

        report.final_accuracy = self.validation_accuracy()?;
        report.learning_rate = self.learning_rate;
        self.sink.emit(TrainEvent::FinalAccuracy {
            accuracy: report.final_accuracy,
        });

        if let Some(path) = model_out {
            self.network.save_model(path)?;
            self.sink.emit(TrainEvent::ModelSaved {
                path: path.display().to_string(),
            });
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn decay_is_floored_at_the_minimum() {
        assert_relative_eq!(decay_learning_rate(0.01, 0.1, 1e-6), 0.001, max_relative = 1e-6);
        assert_eq!(decay_learning_rate(1e-6, 0.1, 1e-6), 1e-6);
    }

    #[test]
    fn three_decays_from_one_hundredth() {
        let mut rate = 0.01f32;
        for _ in 0..3 {
            rate = decay_learning_rate(rate, 0.1, 1e-6);
        }
        assert_relative_eq!(rate, 0.01 * 0.1f32.powi(3), max_relative = 1e-5);

        let mut floored = 0.01f32;
        for _ in 0..3 {
            floored = decay_learning_rate(floored, 0.1, 1e-4);
        }
        assert_eq!(floored, 1e-4);
    }
}
