use serde::{Deserialize, Serialize};

use crate::error::{NnError, Result};
use crate::layers::{
    ConvolutionLayer, FullyConnectedLayer, InputLayer, Layer, MaxPoolingLayer, ReluLayer,
    SoftmaxLayer,
};
use crate::loss::loss_type::LossType;
use crate::math::tensor::Shape;
use crate::network::network::Network;

fn one() -> usize {
    1
}

fn enabled() -> bool {
    true
}

/// Describes one layer in a network specification.
///
/// Kernel sizes are `(height, width)`. Input geometry is never stated here:
/// each layer derives it from its predecessor when the network is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    Input,
    Convolution {
        out_channels: usize,
        kernel: (usize, usize),
        #[serde(default = "one")]
        stride: usize,
        #[serde(default)]
        padding: usize,
        #[serde(default = "enabled")]
        bias: bool,
    },
    MaxPooling {
        kernel: (usize, usize),
        stride: usize,
    },
    Relu,
    FullyConnected {
        outputs: usize,
        #[serde(default = "enabled")]
        bias: bool,
    },
    Softmax,
}

impl LayerSpec {
    /// Creates the (not yet initialized) layer this entry describes.
    pub fn instantiate(&self) -> Box<dyn Layer> {
        match *self {
            LayerSpec::Input => Box::new(InputLayer::new()),
            LayerSpec::Convolution {
                out_channels,
                kernel,
                stride,
                padding,
                bias,
            } => Box::new(ConvolutionLayer::new(out_channels, kernel, stride, padding, bias)),
            LayerSpec::MaxPooling { kernel, stride } => Box::new(MaxPoolingLayer::new(kernel, stride)),
            LayerSpec::Relu => Box::new(ReluLayer::new()),
            LayerSpec::FullyConnected { outputs, bias } => {
                Box::new(FullyConnectedLayer::new(outputs, bias))
            }
            LayerSpec::Softmax => Box::new(SoftmaxLayer::new()),
        }
    }
}

/// Per-sample geometry of the network input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl InputSpec {
    pub fn shape(&self, batch: usize) -> Shape {
        Shape::new(batch, self.channels, self.height, self.width)
    }
}

/// A fully serializable description of a network architecture plus its
/// training loss.
///
/// `NetworkSpec` is data, not code: it can be stored as JSON, embedded in a
/// model file, and turned into a shape-validated `Network` with `build`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Human-readable name, logged when the network is built.
    pub name: String,
    pub input: InputSpec,
    /// Ordered list of layer descriptions (input → output).
    pub layers: Vec<LayerSpec>,
    pub loss: LossType,
    /// Seed for parameter initialization; entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl NetworkSpec {
    /// LeNet-style digit classifier:
    /// conv 6@5×5 → pool 2×2 → conv 16@5×5 → pool 2×2 → fc 512 → fc `classes` → softmax,
    /// with ReLU after every convolution, pooling and dense layer.
    pub fn conv_net(input: InputSpec, classes: usize) -> NetworkSpec {
        let conv = |out_channels| LayerSpec::Convolution {
            out_channels,
            kernel: (5, 5),
            stride: 1,
            padding: 0,
            bias: true,
        };
        let pool = LayerSpec::MaxPooling {
            kernel: (2, 2),
            stride: 2,
        };
        NetworkSpec {
            name: "conv_net".into(),
            input,
            layers: vec![
                LayerSpec::Input,
                conv(6),
                LayerSpec::Relu,
                pool.clone(),
                LayerSpec::Relu,
                conv(16),
                LayerSpec::Relu,
                pool,
                LayerSpec::Relu,
                LayerSpec::FullyConnected { outputs: 512, bias: true },
                LayerSpec::Relu,
                LayerSpec::FullyConnected { outputs: classes, bias: true },
                LayerSpec::Relu,
                LayerSpec::Softmax,
            ],
            loss: LossType::CrossEntropy,
            seed: None,
        }
    }

    /// Three dense layers (512 → 256 → `classes`) trained with MSE.
    pub fn mlp(input: InputSpec, classes: usize) -> NetworkSpec {
        NetworkSpec {
            name: "mlp".into(),
            input,
            layers: vec![
                LayerSpec::Input,
                LayerSpec::FullyConnected { outputs: 512, bias: true },
                LayerSpec::Relu,
                LayerSpec::FullyConnected { outputs: 256, bias: true },
                LayerSpec::Relu,
                LayerSpec::FullyConnected { outputs: classes, bias: true },
                LayerSpec::Relu,
                LayerSpec::Softmax,
            ],
            loss: LossType::Mse,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> NetworkSpec {
        self.seed = Some(seed);
        self
    }

    /// Instantiates every layer in order, validating that each one accepts
    /// its predecessor's output. `batch` is the nominal batch size.
    pub fn build(&self, batch: usize) -> Result<Network> {
        if batch == 0 {
            return Err(NnError::InvalidSpec("batch size must be at least 1".into()));
        }
        if self.layers.is_empty() {
            return Err(NnError::InvalidSpec(format!("network `{}` has no layers", self.name)));
        }
        let shape = self.input.shape(batch);
        let mut network = match self.seed {
            Some(seed) => Network::with_seed(shape, self.loss, seed),
            None => Network::new(shape, self.loss),
        };
        for layer in &self.layers {
            network.add_layer(layer.instantiate())?;
        }
        log::info!(
            "built network `{}`: {} layers, {} parameters, {} -> {}",
            self.name,
            network.len(),
            network.parameter_count(),
            shape,
            network.output_shape()
        );
        network.set_spec(self.clone());
        Ok(network)
    }

    /// Serializes the spec to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a `NetworkSpec` from a JSON file.
    pub fn load_json(path: &str) -> Result<NetworkSpec> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MNIST: InputSpec = InputSpec {
        channels: 1,
        height: 28,
        width: 28,
    };

    #[test]
    fn conv_net_chains_to_ten_probabilities() {
        let net = NetworkSpec::conv_net(MNIST, 10).with_seed(1).build(1).unwrap();
        assert_eq!(net.output_shape(), Shape::new(1, 10, 1, 1));
        // 6·25+6 + 16·6·25+16 + 512·256+512 + 10·512+10
        assert_eq!(net.parameter_count(), 156 + 2416 + 131_584 + 5130);
    }

    #[test]
    fn incompatible_geometry_fails_at_build_time() {
        let tiny = InputSpec {
            channels: 1,
            height: 8,
            width: 8,
        };
        let err = NetworkSpec::conv_net(tiny, 10).build(1);
        assert!(matches!(err, Err(NnError::ShapeMismatch(_))));
    }

    #[test]
    fn spec_is_readable_json() {
        let json = r#"{
            "name": "tiny",
            "input": { "channels": 1, "height": 4, "width": 4 },
            "layers": [
                { "type": "input" },
                { "type": "convolution", "out_channels": 2, "kernel": [3, 3] },
                { "type": "max_pooling", "kernel": [2, 2], "stride": 2 },
                { "type": "fully_connected", "outputs": 3 },
                { "type": "softmax" }
            ],
            "loss": "cross_entropy"
        }"#;
        let spec: NetworkSpec = serde_json::from_str(json).unwrap();
        assert_eq!(
            spec.layers[1],
            LayerSpec::Convolution {
                out_channels: 2,
                kernel: (3, 3),
                stride: 1,
                padding: 0,
                bias: true
            }
        );
        let net = spec.build(2).unwrap();
        assert_eq!(net.output_shape(), Shape::new(1, 3, 1, 1));
    }

    #[test]
    fn empty_or_zero_batch_specs_are_invalid() {
        let mut spec = NetworkSpec::mlp(MNIST, 10);
        assert!(matches!(spec.build(0), Err(NnError::InvalidSpec(_))));
        spec.layers.clear();
        assert!(matches!(spec.build(1), Err(NnError::InvalidSpec(_))));
    }
}
