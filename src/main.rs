use std::path::Path;
use std::process::ExitCode;

use easycnn::app;
use easycnn::train::events::LogSink;
use easycnn::{EvalConfig, Result, TrainConfig};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage:
  easycnn train <images.idx3> <labels.idx1> <model.json> [config.json]
  easycnn evaluate <images.idx3> <labels.idx1> <model.json>

Log verbosity follows RUST_LOG (default: info).";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let outcome = match args.as_slice() {
        ["train", images, labels, model] => run_train(images, labels, model, None),
        ["train", images, labels, model, config] => {
            run_train(images, labels, model, Some(*config))
        }
        ["evaluate", images, labels, model] => {
            app::evaluate(
                Path::new(images),
                Path::new(labels),
                Path::new(model),
                &EvalConfig::default(),
                LogSink,
            )
            .map(|_| ())
        }
        _ => {
            eprintln!("{}", USAGE);
            return ExitCode::from(2);
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_train(images: &str, labels: &str, model: &str, config: Option<&str>) -> Result<()> {
    let config = match config {
        Some(path) => TrainConfig::load_json(path)?,
        None => TrainConfig::default(),
    };
    let report = app::train(
        Path::new(images),
        Path::new(labels),
        Path::new(model),
        &config,
        LogSink,
    )?;
    log::info!(
        "{} epochs, {} batches, last loss {:?}",
        report.epochs_completed,
        report.batches_trained,
        report.last_loss
    );
    Ok(())
}
