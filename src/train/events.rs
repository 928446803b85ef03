use std::sync::mpsc;

use serde::{Deserialize, Serialize};

/// Milestones emitted by the `Trainer`, in the order they happen.
///
/// Accuracies are fractions in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrainEvent {
    DataLoaded {
        train: usize,
        validation: usize,
    },
    /// Periodic validation inside an epoch. `samples_seen` counts the
    /// samples of the epoch that precede batch `batch`.
    BatchEvaluated {
        epoch: usize,
        batch: usize,
        samples_seen: usize,
        total_samples: usize,
        loss: f32,
        accuracy: f32,
    },
    EpochComplete {
        epoch: usize,
        accuracy: f32,
        learning_rate: f32,
    },
    FinalAccuracy {
        accuracy: f32,
    },
    ModelSaved {
        path: String,
    },
}

impl TrainEvent {
    pub fn message(&self) -> String {
        match self {
            TrainEvent::DataLoaded { train, validation } => format!(
                "data loaded: train set {} samples, validation set {} samples",
                train, validation
            ),
            TrainEvent::BatchEvaluated {
                samples_seen,
                total_samples,
                loss,
                accuracy,
                ..
            } => format!(
                "sample {}/{}, loss {:.6}, accuracy {:.4}%",
                samples_seen,
                total_samples,
                loss,
                accuracy * 100.0
            ),
            TrainEvent::EpochComplete {
                epoch,
                accuracy,
                learning_rate,
            } => format!(
                "epoch[{}] accuracy {:.4}%, learning rate {}",
                epoch,
                accuracy * 100.0,
                learning_rate
            ),
            TrainEvent::FinalAccuracy { accuracy } => {
                format!("final accuracy {:.4}%", accuracy * 100.0)
            }
            TrainEvent::ModelSaved { path } => format!("model saved to {}", path),
        }
    }
}

/// Receives training milestones. Rendering is up to the implementation.
pub trait ProgressSink {
    fn emit(&mut self, event: TrainEvent);
}

/// Renders every event through the `log` facade at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&mut self, event: TrainEvent) {
        log::info!("{}", event.message());
    }
}

/// Streams events to another thread; a dropped receiver is ignored.
impl ProgressSink for mpsc::Sender<TrainEvent> {
    fn emit(&mut self, event: TrainEvent) {
        let _ = self.send(event);
    }
}

/// Collects events in memory.
impl ProgressSink for Vec<TrainEvent> {
    fn emit(&mut self, event: TrainEvent) {
        self.push(event);
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for &mut S {
    fn emit(&mut self, event: TrainEvent) {
        (**self).emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_forwards_events() {
        let (mut tx, rx) = mpsc::channel::<TrainEvent>();
        tx.emit(TrainEvent::FinalAccuracy { accuracy: 0.5 });
        assert_eq!(rx.recv().unwrap(), TrainEvent::FinalAccuracy { accuracy: 0.5 });
    }

    #[test]
    fn messages_render_percentages() {
        let msg = TrainEvent::FinalAccuracy { accuracy: 0.25 }.message();
        assert_eq!(msg, "final accuracy 25.0000%");
    }
}
