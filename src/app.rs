//! End-to-end drivers for the digit classifier: train from IDX files and
//! save a model, or load a model and measure it on a test set.

use std::path::Path;

use crate::data::idx::load_idx;
use crate::error::{NnError, Result};
use crate::network::network::{Network, Phase};
use crate::network::spec::{InputSpec, NetworkSpec};
use crate::train::eval::evaluate as evaluate_view;
use crate::train::events::{ProgressSink, TrainEvent};
use crate::train::train_config::{EvalConfig, TrainConfig};
use crate::train::trainer::{TrainReport, Trainer};

/// Trains the convolutional digit classifier on an IDX image/label pair and
/// writes the resulting model to `model_out`.
///
/// The tail `validation_fraction` of the file is held out for validation.
pub fn train<S: ProgressSink>(
    train_images: &Path,
    train_labels: &Path,
    model_out: &Path,
    config: &TrainConfig,
    sink: S,
) -> Result<TrainReport> {
    config.validate()?;
    let dataset = load_idx(train_images, train_labels)?;
    dataset.validate_labels(config.classes)?;
    let (train, validation) = dataset.split(config.validation_fraction)?;

    let sample = train.sample_shape();
    let input = InputSpec {
        channels: sample.c,
        height: sample.h,
        width: sample.w,
    };
    let mut spec = NetworkSpec::conv_net(input, config.classes);
    if let Some(seed) = config.seed {
        spec = spec.with_seed(seed);
    }
    let mut network = spec.build(config.batch_size)?;

    let mut trainer = Trainer::new(&mut network, train, validation, config.clone(), sink)?;
    trainer.run(Some(model_out))
}

/// Loads the model at `model_in` and returns its accuracy on an IDX test set.
pub fn evaluate<S: ProgressSink>(
    test_images: &Path,
    test_labels: &Path,
    model_in: &Path,
    config: &EvalConfig,
    mut sink: S,
) -> Result<f32> {
    if config.batch_size == 0 {
        return Err(NnError::InvalidSpec("evaluation batch size must be at least 1".into()));
    }
    let dataset = load_idx(test_images, test_labels)?;
    let mut network = Network::from_model_file(model_in, config.batch_size)?;
    network.set_phase(Phase::Test);
    let classes = network.output_shape().per_sample();
    dataset.validate_labels(classes)?;

    sink.emit(TrainEvent::DataLoaded {
        train: 0,
        validation: dataset.len(),
    });
    let accuracy = evaluate_view(&mut network, dataset.view(), config.batch_size)?;
    sink.emit(TrainEvent::FinalAccuracy { accuracy });
    Ok(accuracy)
}
