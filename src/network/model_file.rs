use serde::{Deserialize, Serialize};

use crate::activation::ActivationFunction;
use crate::network::batch_norm::BatchNorm;
use crate::network::metadata::ModelMetadata;

pub const FORMAT_VERSION: u32 = 1;

/// Persisted parameters of one non-input unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitRecord {
    pub bias: f64,
    /// Incoming weights in predecessor order.
    pub weights: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_norm: Option<BatchNorm>,
}

/// On-disk layout of a trained network.
///
/// `units[l]` holds the records of layer `l + 1`; the input layer has no
/// parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFile {
    pub format_version: u32,
    pub layer_sizes: Vec<usize>,
    pub activation: ActivationFunction,
    pub learning_rate: f64,
    pub batch_size: usize,
    #[serde(default)]
    pub batch_norm: bool,
    pub output_labels: Vec<char>,
    pub units: Vec<Vec<UnitRecord>>,
    #[serde(default)]
    pub metadata: Option<ModelMetadata>,
}
