//! Model persistence.
//!
//! A model file is one JSON document holding the architecture description
//! (when known) and one parameter record per layer, in construction order.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NnError, Result};
use crate::layers::layer::LayerKind;
use crate::math::tensor::Shape;
use crate::network::spec::NetworkSpec;

/// Parameters of one layer as stored on disk.
///
/// Parameterless layers carry only their `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRecord {
    pub kind: LayerKind,
    #[serde(default)]
    pub weight_shape: Option<Shape>,
    #[serde(default)]
    pub weights: Vec<f32>,
    #[serde(default)]
    pub bias: Option<Vec<f32>>,
}

impl LayerRecord {
    pub fn empty(kind: LayerKind) -> LayerRecord {
        LayerRecord {
            kind,
            weight_shape: None,
            weights: Vec::new(),
            bias: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFile {
    #[serde(default)]
    pub spec: Option<NetworkSpec>,
    pub layers: Vec<LayerRecord>,
}

impl ModelFile {
    /// Writes the model to `path`.
    ///
    /// The document is written to a sibling temporary file and renamed over
    /// `path` once complete, so a failed save never leaves a truncated model.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = temporary_path(path);
        let written = (|| -> Result<()> {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
            drop(writer);
            fs::rename(&tmp, path)?;
            Ok(())
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        log::info!("saved model with {} layers to {}", self.layers.len(), path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<ModelFile> {
        let reader = BufReader::new(File::open(path)?);
        let model: ModelFile = serde_json::from_reader(reader)?;
        log::debug!("read model with {} layers from {}", model.layers.len(), path.display());
        Ok(model)
    }

    /// Fails unless the record count and kinds line up with `kinds`.
    pub fn check_layout(&self, kinds: &[LayerKind]) -> Result<()> {
        if self.layers.len() != kinds.len() {
            return Err(NnError::ShapeMismatch(format!(
                "model holds {} layers, network has {}",
                self.layers.len(),
                kinds.len()
            )));
        }
        for (i, (record, kind)) in self.layers.iter().zip(kinds).enumerate() {
            if record.kind != *kind {
                return Err(NnError::ShapeMismatch(format!(
                    "layer {}: model holds a {:?} layer, network has {:?}",
                    i, record.kind, kind
                )));
            }
        }
        Ok(())
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
