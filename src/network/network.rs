use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{NnError, Result};
use crate::layers::layer::{Layer, LayerKind};
use crate::loss::functor::LossFunctor;
use crate::loss::loss_type::LossType;
use crate::math::tensor::{Shape, Tensor};
use crate::network::spec::NetworkSpec;
use crate::network::store::ModelFile;

/// Whether the network is being trained or only queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Train,
    Test,
}

/// An ordered chain of layers plus the loss they are trained against.
///
/// Every layer is shape-checked against its predecessor when it is added, so
/// a built network always satisfies `layer[i].output == layer[i + 1].input`.
/// Only the per-sample geometry of the declared input shape is enforced: a
/// batch of any size (e.g. a trailing partial batch) may be fed through.
pub struct Network {
    input_shape: Shape,
    layers: Vec<Box<dyn Layer>>,
    loss: LossType,
    phase: Phase,
    rng: StdRng,
    spec: Option<NetworkSpec>,
}

impl Network {
    /// Creates an empty network whose parameters are initialized from entropy.
    pub fn new(input_shape: Shape, loss: LossType) -> Network {
        Network::with_rng(input_shape, loss, StdRng::from_entropy())
    }

    /// Creates an empty network with reproducible parameter initialization.
    pub fn with_seed(input_shape: Shape, loss: LossType, seed: u64) -> Network {
        Network::with_rng(input_shape, loss, StdRng::seed_from_u64(seed))
    }

    fn with_rng(input_shape: Shape, loss: LossType, rng: StdRng) -> Network {
        Network {
            input_shape,
            layers: Vec::new(),
            loss,
            phase: Phase::Train,
            rng,
            spec: None,
        }
    }

    /// Rebuilds the architecture recorded in a model file and loads its
    /// parameters.
    pub fn from_model_file(path: &Path, batch: usize) -> Result<Network> {
        let model = ModelFile::load(path)?;
        let spec = model.spec.as_ref().ok_or_else(|| {
            NnError::InvalidSpec(format!(
                "{} does not describe its architecture",
                path.display()
            ))
        })?;
        let mut network = spec.build(batch)?;
        network.import_parameters(&model)?;
        Ok(network)
    }

    /// Appends a layer, initializing it against the current output shape.
    pub fn add_layer(&mut self, mut layer: Box<dyn Layer>) -> Result<()> {
        let input = self.output_shape();
        let output = layer.initialize(input, &mut self.rng).map_err(|e| match e {
            NnError::ShapeMismatch(msg) => {
                NnError::ShapeMismatch(format!("layer {}: {}", self.layers.len(), msg))
            }
            other => other,
        })?;
        log::debug!(
            "layer {} {:?}: {} -> {} ({} parameters)",
            self.layers.len(),
            layer.kind(),
            input,
            output,
            layer.parameter_count()
        );
        self.layers.push(layer);
        Ok(())
    }

    /// Declared input shape, including the nominal batch size.
    pub fn input_shape(&self) -> Shape {
        self.input_shape
    }

    /// Per-sample output shape of the last layer.
    pub fn output_shape(&self) -> Shape {
        self.layers
            .last()
            .map_or(self.input_shape.with_batch(1), |l| l.output_shape())
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn loss_type(&self) -> LossType {
        self.loss
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn layer_kinds(&self) -> Vec<LayerKind> {
        self.layers.iter().map(|l| l.kind()).collect()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|l| l.parameter_count()).sum()
    }

    pub fn spec(&self) -> Option<&NetworkSpec> {
        self.spec.as_ref()
    }

    pub(crate) fn set_spec(&mut self, spec: NetworkSpec) {
        self.spec = Some(spec);
    }

    fn check_input(&self, input: &Tensor) -> Result<()> {
        if self.layers.is_empty() {
            return Err(NnError::InvalidSpec("network has no layers".into()));
        }
        let shape = input.shape();
        if shape.n == 0 || !shape.same_sample(&self.input_shape) {
            return Err(NnError::ShapeMismatch(format!(
                "network expects samples of {}, got a batch of {}",
                self.input_shape.with_batch(1),
                shape
            )));
        }
        Ok(())
    }

    /// Runs the layer chain front to back.
    pub fn forward(&mut self, input: &Tensor) -> Result<Tensor> {
        self.check_input(input)?;
        let mut output = input.clone();
        for layer in self.layers.iter_mut() {
            output = layer.forward(&output);
        }
        Ok(output)
    }

    /// One SGD step on a mini-batch; returns the batch loss.
    ///
    /// Forward pass, loss and its gradient, backward pass in reverse layer
    /// order accumulating parameter gradients, then one parameter update per
    /// layer.
    pub fn train_batch(&mut self, input: &Tensor, label: &Tensor, learning_rate: f32) -> Result<f32> {
        if self.phase != Phase::Train {
            return Err(NnError::WrongPhase {
                expected: Phase::Train,
                actual: self.phase,
            });
        }
        self.check_input(input)?;
        let expected = self.output_shape().with_batch(input.shape().n);
        if label.shape() != expected {
            return Err(NnError::ShapeMismatch(format!(
                "labels of {} do not match network output {}",
                label.shape(),
                expected
            )));
        }

        let prediction = self.forward(input)?;
        let loss = self.loss.loss(&prediction, label);

        let mut grad = self.loss.derivative(&prediction, label);
        for layer in self.layers.iter_mut().rev() {
            grad = layer.backward(&grad);
        }
        for layer in self.layers.iter_mut() {
            layer.update_parameters(learning_rate);
        }
        Ok(loss)
    }

    /// Forward pass only; valid in either phase and never touches parameters.
    pub fn test_batch(&mut self, input: &Tensor) -> Result<Tensor> {
        self.forward(input)
    }

    /// Snapshot of every layer's parameters in architecture order.
    pub fn export_parameters(&self) -> ModelFile {
        ModelFile {
            spec: self.spec.clone(),
            layers: self.layers.iter().map(|l| l.export_parameters()).collect(),
        }
    }

    /// Restores parameters from `model`.
    ///
    /// Every record is validated before any layer is modified, so on error
    /// the network keeps its previous parameters.
    pub fn import_parameters(&mut self, model: &ModelFile) -> Result<()> {
        model.check_layout(&self.layer_kinds())?;
        for (i, (layer, record)) in self.layers.iter().zip(&model.layers).enumerate() {
            layer.check_parameters(record).map_err(|e| match e {
                NnError::ShapeMismatch(msg) => NnError::ShapeMismatch(format!("layer {}: {}", i, msg)),
                other => other,
            })?;
        }
        for (layer, record) in self.layers.iter_mut().zip(&model.layers) {
            layer.import_parameters(record)?;
        }
        Ok(())
    }

    pub fn save_model(&self, path: &Path) -> Result<()> {
        self.export_parameters().save(path)
    }

    /// Loads parameters saved from an identically built network.
    pub fn load_model(&mut self, path: &Path) -> Result<()> {
        let model = ModelFile::load(path)?;
        self.import_parameters(&model)?;
        log::info!("loaded {} parameters from {}", self.parameter_count(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{FullyConnectedLayer, InputLayer, ReluLayer, SoftmaxLayer};

    fn classifier() -> Network {
        let mut net = Network::with_seed(Shape::new(4, 1, 2, 2), LossType::CrossEntropy, 1);
        net.add_layer(Box::new(InputLayer::new())).unwrap();
        net.add_layer(Box::new(FullyConnectedLayer::new(3, true))).unwrap();
        net.add_layer(Box::new(ReluLayer::new())).unwrap();
        net.add_layer(Box::new(SoftmaxLayer::new())).unwrap();
        net
    }

    #[test]
    fn train_batch_is_rejected_in_test_phase() {
        let mut net = classifier();
        net.set_phase(Phase::Test);
        let input = Tensor::zeros(Shape::new(1, 1, 2, 2));
        let label = Tensor::zeros(Shape::new(1, 3, 1, 1));
        let err = net.train_batch(&input, &label, 0.1);
        assert!(matches!(
            err,
            Err(NnError::WrongPhase { expected: Phase::Train, actual: Phase::Test })
        ));
        // Querying still works.
        assert_eq!(net.test_batch(&input).unwrap().shape(), Shape::new(1, 3, 1, 1));
    }

    #[test]
    fn inputs_with_other_sample_geometry_are_rejected() {
        let mut net = classifier();
        let err = net.test_batch(&Tensor::zeros(Shape::new(1, 1, 3, 3)));
        assert!(matches!(err, Err(NnError::ShapeMismatch(_))));
        // Batch size may differ from the declared one.
        assert!(net.test_batch(&Tensor::zeros(Shape::new(7, 1, 2, 2))).is_ok());
    }

    #[test]
    fn mismatched_labels_are_rejected() {
        let mut net = classifier();
        let input = Tensor::zeros(Shape::new(2, 1, 2, 2));
        let label = Tensor::zeros(Shape::new(2, 10, 1, 1));
        assert!(matches!(
            net.train_batch(&input, &label, 0.1),
            Err(NnError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn empty_network_cannot_run() {
        let mut net = Network::new(Shape::new(1, 1, 2, 2), LossType::Mse);
        assert!(net.test_batch(&Tensor::zeros(Shape::new(1, 1, 2, 2))).is_err());
    }
}
