use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::activation::ActivationFunction;
use crate::error::Result;
use crate::network::metadata::ModelMetadata;

fn default_learning_rate() -> f64 {
    0.01
}

fn default_batch_size() -> usize {
    32
}

/// A serializable description of a network: layer sizes, the hidden
/// nonlinearity and the training hyperparameters the network owns.
///
/// Can be saved to / loaded from JSON independently of any trained weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub input_size: usize,
    #[serde(default)]
    pub hidden_sizes: Vec<usize>,
    /// Number of output units; labels are the first `output_size` characters
    /// of the fixed alphabet.
    pub output_size: usize,
    /// Nonlinearity of every hidden unit.
    #[serde(default)]
    pub activation: ActivationFunction,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Seed for the Gaussian weight initialization; entropy when `None`.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub batch_norm: bool,
    #[serde(default)]
    pub metadata: Option<ModelMetadata>,
}

impl NetworkSpec {
    /// Spec with default activation and hyperparameters.
    pub fn new(input_size: usize, hidden_sizes: Vec<usize>, output_size: usize) -> Self {
        NetworkSpec {
            input_size,
            hidden_sizes,
            output_size,
            activation: ActivationFunction::default(),
            learning_rate: default_learning_rate(),
            batch_size: default_batch_size(),
            seed: None,
            batch_norm: false,
            metadata: None,
        }
    }

    pub fn with_activation(mut self, activation: ActivationFunction) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_batch_norm(mut self, enabled: bool) -> Self {
        self.batch_norm = enabled;
        self
    }

    /// All layer sizes, input first.
    pub fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.hidden_sizes.len() + 2);
        sizes.push(self.input_size);
        sizes.extend_from_slice(&self.hidden_sizes);
        sizes.push(self.output_size);
        sizes
    }

    /// Serializes the spec to a pretty-printed JSON file.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a `NetworkSpec` from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<NetworkSpec> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}
