use std::path::Path;

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::activation::{softmax, ActivationFunction};
use crate::error::{NetError, Result};
use crate::loss::CrossEntropyLoss;
use crate::network::batch_norm::BatchNorm;
use crate::network::init::gaussian_weight;
use crate::network::labels::{label_index, ALPHABET};
use crate::network::metadata::ModelMetadata;
use crate::network::model_file::{ModelFile, UnitRecord, FORMAT_VERSION};
use crate::network::spec::NetworkSpec;
use crate::network::unit::{Pass, Unit, UnitId, UnitKind};

/// Result of evaluating one input: the winning output label and its
/// softmax probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: char,
    pub probability: f64,
}

/// A fully connected feedforward network stored as an arena of layers.
///
/// `layers[0]` is the input layer, the last layer is the softmax output layer
/// labelled with the first `output_size` characters of [`ALPHABET`].
#[derive(Debug, Clone)]
pub struct Network {
    layers: Vec<Vec<Unit>>,
    activation: ActivationFunction,
    learning_rate: f64,
    batch_size: usize,
    batch_norm: bool,
    /// Examples accumulated since the last batch update.
    pending: usize,
    metadata: Option<ModelMetadata>,
}

impl Network {
    /// Builds and wires a network from `spec`, seeding the weight
    /// initialization from `spec.seed` when set.
    pub fn new(spec: &NetworkSpec) -> Result<Network> {
        let mut rng = match spec.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Network::with_rng(spec, &mut rng)
    }

    /// Like [`Network::new`] but draws the initial weights from `rng`.
    pub fn with_rng<R: Rng + ?Sized>(spec: &NetworkSpec, rng: &mut R) -> Result<Network> {
        let mut network = Network::build(spec)?;
        for l in 1..network.layers.len() {
            let fan_in = network.layers[l - 1].len();
            for unit in network.layers[l].iter_mut() {
                for slot in 0..fan_in {
                    unit.set_weight(slot, gaussian_weight(rng, fan_in))?;
                }
            }
        }
        info!(
            "Network created with layers {:?} ({} hidden activation{})",
            network.layer_sizes(),
            network.activation.kind().name(),
            if network.batch_norm { ", batch normalization" } else { "" },
        );
        Ok(network)
    }

    /// Validates `spec`, creates every layer and connects consecutive layers
    /// fully with zero weights.
    fn build(spec: &NetworkSpec) -> Result<Network> {
        if !(spec.learning_rate.is_finite() && spec.learning_rate > 0.0) {
            return Err(NetError::InvalidParameter {
                function: "network",
                reason: format!("learning rate must be positive, got {}", spec.learning_rate),
            });
        }
        if spec.batch_size == 0 {
            return Err(NetError::InvalidParameter {
                function: "network",
                reason: "batch size must be at least 1".to_string(),
            });
        }
        if spec.output_size > ALPHABET.len() {
            return Err(NetError::DimensionMismatch {
                expected: ALPHABET.len(),
                actual: spec.output_size,
            });
        }
        let sizes = spec.layer_sizes();
        // An empty layer would leave the next layer's units without inputs.
        if let Some(&empty) = sizes.iter().find(|&&s| s == 0) {
            return Err(NetError::DimensionMismatch { expected: 1, actual: empty });
        }

        let depth = sizes.len();
        let mut layers: Vec<Vec<Unit>> = Vec::with_capacity(depth);
        for (l, &size) in sizes.iter().enumerate() {
            let kind = if l == 0 {
                UnitKind::Input
            } else if l == depth - 1 {
                UnitKind::Output
            } else {
                UnitKind::Hidden
            };
            let layer = (0..size)
                .map(|i| {
                    let label = (kind == UnitKind::Output).then(|| ALPHABET[i]);
                    let mut unit = Unit::new(UnitId::new(l, i), kind, label, spec.activation.clone());
                    if spec.batch_norm {
                        unit.enable_batch_norm(BatchNorm::default());
                    }
                    unit
                })
                .collect();
            info!("{:?} layer {} created with {} units", kind, l, size);
            layers.push(layer);
        }

        for l in 1..depth {
            let (before, rest) = layers.split_at_mut(l);
            let previous = &mut before[l - 1];
            for unit in rest[0].iter_mut() {
                for pred in previous.iter_mut() {
                    unit.connect(pred.id(), 0.0);
                    pred.add_consumer(unit.id());
                }
            }
            info!("Layer {} connected to layer {} ({} edges)", l - 1, l, sizes[l - 1] * sizes[l]);
        }

        Ok(Network {
            layers,
            activation: spec.activation.clone(),
            learning_rate: spec.learning_rate,
            batch_size: spec.batch_size,
            batch_norm: spec.batch_norm,
            pending: 0,
            metadata: spec.metadata.clone(),
        })
    }

    pub fn layers(&self) -> &[Vec<Unit>] {
        &self.layers
    }

    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.layers.get(id.layer).and_then(|layer| layer.get(id.index))
    }

    pub fn layer_sizes(&self) -> Vec<usize> {
        self.layers.iter().map(Vec::len).collect()
    }

    pub fn input_size(&self) -> usize {
        self.layers[0].len()
    }

    fn output_layer(&self) -> &[Unit] {
        &self.layers[self.layers.len() - 1]
    }

    pub fn output_labels(&self) -> Vec<char> {
        self.output_layer().iter().filter_map(|u| u.label().ok()).collect()
    }

    pub fn activation_function(&self) -> &ActivationFunction {
        &self.activation
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn batch_norm_enabled(&self) -> bool {
        self.batch_norm
    }

    /// Examples whose gradients are buffered and not yet applied.
    pub fn pending_examples(&self) -> usize {
        self.pending
    }

    pub fn metadata(&self) -> Option<&ModelMetadata> {
        self.metadata.as_ref()
    }

    pub fn set_metadata(&mut self, metadata: ModelMetadata) {
        self.metadata = Some(metadata);
    }

    /// Training forward pass.  Returns the output probabilities.
    pub fn forward(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        self.propagate(input, Pass::Training)?;
        Ok(self.output_probabilities())
    }

    fn propagate(&mut self, input: &[f64], pass: Pass) -> Result<()> {
        if input.len() != self.input_size() {
            return Err(NetError::DimensionMismatch { expected: self.input_size(), actual: input.len() });
        }
        for (unit, &x) in self.layers[0].iter_mut().zip(input) {
            unit.set_activation(x);
        }

        for l in 1..self.layers.len() {
            let (before, rest) = self.layers.split_at_mut(l);
            let previous = &before[l - 1];
            for unit in rest[0].iter_mut() {
                unit.compute(previous, pass)?;
            }
        }

        let last = self.layers.len() - 1;
        let output = &mut self.layers[last];
        let raw: Vec<f64> = output.iter().map(Unit::activation).collect();
        for (unit, p) in output.iter_mut().zip(softmax(&raw)) {
            unit.set_activation(p);
        }
        Ok(())
    }

    pub fn output_probabilities(&self) -> Vec<f64> {
        self.output_layer().iter().map(Unit::activation).collect()
    }

    /// Arg-max of the current output layer.
    pub fn prediction(&self) -> Result<Prediction> {
        let mut best: Option<&Unit> = None;
        for unit in self.output_layer() {
            let a = unit.activation();
            if !a.is_finite() {
                let id = unit.id();
                return Err(NetError::DegenerateActivation { layer: id.layer, index: id.index, value: a });
            }
            if best.map_or(true, |b| a > b.activation()) {
                best = Some(unit);
            }
        }
        match best {
            Some(unit) => Ok(Prediction { label: unit.label()?, probability: unit.activation() }),
            None => Err(NetError::DimensionMismatch { expected: 1, actual: 0 }),
        }
    }

    /// Cross-entropy of the current output layer against `label`.
    pub fn cost(&self, label: char) -> Result<f64> {
        let target = self.output_index(label)?;
        Ok(CrossEntropyLoss::layer_cost(&self.output_probabilities(), target))
    }

    /// Output units carry the alphabet prefix in order, so a label's unit sits
    /// at its alphabet position.
    fn output_index(&self, label: char) -> Result<usize> {
        label_index(label)
            .filter(|&i| i < self.output_layer().len())
            .ok_or(NetError::UnknownLabel(label))
    }

    /// Buffers this example's gradients in every unit, output layer first,
    /// then the hidden layers from last to first so each unit can read its
    /// consumers' gradient factors.
    pub fn backward(&mut self, label: char) -> Result<()> {
        if self.pending >= self.batch_size {
            return Err(NetError::BatchFull { batch_size: self.batch_size });
        }
        self.output_index(label)?;
        // Checked up front so a failure leaves no partially buffered example.
        self.prediction()?;

        let last = self.layers.len() - 1;
        {
            let (before, rest) = self.layers.split_at_mut(last);
            let previous = &before[last - 1];
            for unit in rest[0].iter_mut() {
                let expected = if unit.label()? == label { 1.0 } else { 0.0 };
                unit.accumulate_output_gradient(expected, previous)?;
            }
        }

        for l in (1..last).rev() {
            let (before, rest) = self.layers.split_at_mut(l);
            let (current, after) = rest.split_at_mut(1);
            let previous = &before[l - 1];
            let consumers = &after[0];
            for unit in current[0].iter_mut() {
                unit.accumulate_hidden_gradient(previous, consumers)?;
            }
        }

        self.pending += 1;
        Ok(())
    }

    /// Applies the averaged buffered gradients to every weight and bias, then
    /// clears the buffers.  Returns the number of examples averaged.
    pub fn apply_batch_update(&mut self) -> usize {
        let lr = self.learning_rate;
        for unit in self.layers.iter_mut().flatten() {
            unit.apply_weight_update(lr);
            unit.apply_bias_update(lr);
            unit.apply_batch_norm_update(lr);
            unit.clear_gradients();
        }
        std::mem::take(&mut self.pending)
    }

    /// Runs an inference pass and returns the most probable label.  Gradient
    /// buffers and batch statistics are left untouched.
    pub fn evaluate(&mut self, input: &[f64]) -> Result<Prediction> {
        self.propagate(input, Pass::Inference)?;
        self.prediction()
    }

    /// Snapshot of the full structure and parameters.
    pub fn to_model_file(&self) -> ModelFile {
        let units = self.layers[1..]
            .iter()
            .map(|layer| {
                layer
                    .iter()
                    .map(|unit| UnitRecord {
                        bias: unit.bias(),
                        weights: unit.inputs().iter().map(|e| e.weight).collect(),
                        batch_norm: unit.batch_norm().cloned(),
                    })
                    .collect()
            })
            .collect();
        ModelFile {
            format_version: FORMAT_VERSION,
            layer_sizes: self.layer_sizes(),
            activation: self.activation.clone(),
            learning_rate: self.learning_rate,
            batch_size: self.batch_size,
            batch_norm: self.batch_norm,
            output_labels: self.output_labels(),
            units,
            metadata: self.metadata.clone(),
        }
    }

    /// Rebuilds a network from a snapshot, checking that every record matches
    /// the declared layer sizes.
    pub fn from_model_file(file: ModelFile) -> Result<Network> {
        if file.format_version != FORMAT_VERSION {
            return Err(NetError::CorruptModel(format!(
                "unsupported format version {}",
                file.format_version
            )));
        }
        let (input_size, hidden, output_size) = match file.layer_sizes.as_slice() {
            [input, hidden @ .., output] => (*input, hidden.to_vec(), *output),
            _ => return Err(NetError::CorruptModel("a model needs at least two layers".to_string())),
        };

        let mut spec = NetworkSpec::new(input_size, hidden, output_size)
            .with_activation(file.activation)
            .with_learning_rate(file.learning_rate)
            .with_batch_size(file.batch_size)
            .with_batch_norm(file.batch_norm);
        spec.metadata = file.metadata;

        let mut network = Network::build(&spec)?;

        if file.output_labels != network.output_labels() {
            return Err(NetError::CorruptModel("output labels are not in alphabet order".to_string()));
        }
        if file.units.len() != network.layers.len() - 1 {
            return Err(NetError::CorruptModel(format!(
                "{} unit layers recorded for {} layer sizes",
                file.units.len(),
                file.layer_sizes.len()
            )));
        }

        for (l, records) in file.units.into_iter().enumerate() {
            let layer = &mut network.layers[l + 1];
            if records.len() != layer.len() {
                return Err(NetError::CorruptModel(format!(
                    "layer {} has {} records for {} units",
                    l + 1,
                    records.len(),
                    layer.len()
                )));
            }
            for (unit, record) in layer.iter_mut().zip(records) {
                if record.weights.len() != unit.inputs().len() {
                    return Err(NetError::CorruptModel(format!(
                        "unit {} has {} weights for {} inputs",
                        unit.id(),
                        record.weights.len(),
                        unit.inputs().len()
                    )));
                }
                unit.set_bias(record.bias);
                for (slot, w) in record.weights.into_iter().enumerate() {
                    unit.set_weight(slot, w)?;
                }
                match record.batch_norm {
                    Some(_) if !network.batch_norm || unit.kind() != UnitKind::Hidden => {
                        return Err(NetError::CorruptModel(format!(
                            "unit {} carries batch normalization the model does not enable",
                            unit.id()
                        )));
                    }
                    // Zero variance is fine: normalization adds an epsilon.
                    Some(bn) if !(bn.running_var >= 0.0 && bn.is_finite()) => {
                        return Err(NetError::CorruptModel(format!(
                            "unit {} has invalid normalization statistics (variance {})",
                            unit.id(),
                            bn.running_var
                        )));
                    }
                    Some(bn) => unit.enable_batch_norm(bn),
                    None => {}
                }
            }
        }
        Ok(network)
    }

    /// Serializes the network into a single opaque blob.
    pub fn to_blob(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.to_model_file())?)
    }

    pub fn from_blob(blob: &[u8]) -> Result<Network> {
        let file: ModelFile = serde_json::from_slice(blob)?;
        Network::from_model_file(file)
    }

    /// Serializes the network to a pretty-printed JSON file.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &self.to_model_file())?;
        info!("Model saved to {}", path.display());
        Ok(())
    }

    /// Deserializes a network from a JSON file previously written by `save_json`.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Network> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let model: ModelFile = serde_json::from_reader(reader)?;
        let network = Network::from_model_file(model)?;
        info!("Model loaded from {} with layers {:?}", path.display(), network.layer_sizes());
        Ok(network)
    }
}
