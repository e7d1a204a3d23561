use std::fmt;

use serde::{Deserialize, Serialize};

use crate::activation::ActivationFunction;
use crate::error::{NetError, Result};
use crate::loss::CrossEntropyLoss;
use crate::network::batch_norm::BatchNorm;

/// Position of a unit in the network arena: `(layer, index within layer)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitId {
    pub layer: usize,
    pub index: usize,
}

impl UnitId {
    pub fn new(layer: usize, index: usize) -> Self {
        UnitId { layer, index }
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.layer, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitKind {
    Input,
    Hidden,
    Output,
}

/// Incoming edge: the predecessor's handle and the weight on the edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub from: UnitId,
    pub weight: f64,
}

/// Which forward pass is running.  Only training passes feed batch statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Training,
    Inference,
}

/// One neuron.
///
/// A unit never owns its neighbours: `inputs` and `outputs` hold [`UnitId`]
/// handles into the network's layer arena, and every method that needs a
/// neighbour takes the relevant layer as a slice.
#[derive(Debug, Clone)]
pub struct Unit {
    id: UnitId,
    kind: UnitKind,
    label: Option<char>,
    inputs: Vec<Edge>,
    outputs: Vec<UnitId>,
    bias: f64,
    activation_fn: ActivationFunction,
    batch_norm: Option<BatchNorm>,

    activation: f64,
    pre_activation: f64,
    gradient_factor: f64,
    weight_gradients: Vec<Vec<f64>>,
    bias_gradients: Vec<f64>,
}

impl Unit {
    pub fn new(id: UnitId, kind: UnitKind, label: Option<char>, activation_fn: ActivationFunction) -> Unit {
        Unit {
            id,
            kind,
            label,
            inputs: Vec::new(),
            outputs: Vec::new(),
            bias: 0.0,
            activation_fn,
            batch_norm: None,
            activation: 0.0,
            pre_activation: 0.0,
            gradient_factor: 0.0,
            weight_gradients: Vec::new(),
            bias_gradients: Vec::new(),
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn label(&self) -> Result<char> {
        self.label.ok_or(NetError::MissingLabel { layer: self.id.layer, index: self.id.index })
    }

    pub fn inputs(&self) -> &[Edge] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[UnitId] {
        &self.outputs
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn set_bias(&mut self, bias: f64) {
        self.bias = bias;
    }

    pub fn activation(&self) -> f64 {
        self.activation
    }

    pub fn pre_activation(&self) -> f64 {
        self.pre_activation
    }

    pub fn gradient_factor(&self) -> f64 {
        self.gradient_factor
    }

    pub fn batch_norm(&self) -> Option<&BatchNorm> {
        self.batch_norm.as_ref()
    }

    pub(crate) fn enable_batch_norm(&mut self, batch_norm: BatchNorm) {
        if self.kind == UnitKind::Hidden {
            self.batch_norm = Some(batch_norm);
        }
    }

    /// Examples buffered since the last update.
    pub fn pending_gradients(&self) -> usize {
        debug_assert_eq!(self.weight_gradients.len(), self.bias_gradients.len());
        self.bias_gradients.len()
    }

    /// Sets the activation directly.  Used for input units and for the softmax
    /// overwrite of output units.
    pub fn set_activation(&mut self, activation: f64) {
        self.activation = activation;
    }

    /// Activation as seen by consumers: the batch-normalized value when
    /// normalization is enabled, the plain activation otherwise.
    pub fn effective_activation(&self) -> f64 {
        match &self.batch_norm {
            Some(bn) => bn.apply(self.activation),
            None => self.activation,
        }
    }

    /// Adds an incoming edge from `from`.  The network mirrors it with
    /// [`Unit::add_consumer`] on the predecessor.
    pub fn connect(&mut self, from: UnitId, weight: f64) {
        self.inputs.push(Edge { from, weight });
    }

    pub fn add_consumer(&mut self, consumer: UnitId) {
        self.outputs.push(consumer);
    }

    pub fn weight_of(&self, from: UnitId) -> Option<f64> {
        // Fully connected layers keep edges in predecessor order.
        match self.inputs.get(from.index) {
            Some(edge) if edge.from == from => Some(edge.weight),
            _ => self.inputs.iter().find(|e| e.from == from).map(|e| e.weight),
        }
    }

    pub fn set_weight(&mut self, slot: usize, weight: f64) -> Result<()> {
        let len = self.inputs.len();
        let edge = self.inputs.get_mut(slot)
            .ok_or(NetError::DimensionMismatch { expected: len, actual: slot + 1 })?;
        edge.weight = weight;
        Ok(())
    }

    /// Weighted sum of the predecessors' effective activations plus bias,
    /// then the nonlinearity for hidden units or identity for output units.
    /// Softmax is applied afterwards by the network.
    pub fn compute(&mut self, predecessors: &[Unit], pass: Pass) -> Result<()> {
        if self.kind == UnitKind::Input {
            return Err(NetError::IllegalComputeOnInput { layer: self.id.layer, index: self.id.index });
        }
        if self.inputs.is_empty() {
            return Err(NetError::DimensionMismatch { expected: predecessors.len(), actual: 0 });
        }

        let mut sum = self.bias;
        for edge in &self.inputs {
            let pred = predecessors.get(edge.from.index)
                .ok_or(NetError::MissingEdge { from: edge.from, to: self.id })?;
            sum += pred.effective_activation() * edge.weight;
        }
        self.pre_activation = sum;

        self.activation = match self.kind {
            UnitKind::Output => sum,
            _ => self.activation_fn.value(sum),
        };

        if pass == Pass::Training {
            if let Some(bn) = self.batch_norm.as_mut() {
                bn.record_activation(self.activation);
            }
        }
        Ok(())
    }

    fn check_finite(&self) -> Result<()> {
        if self.activation.is_finite() {
            Ok(())
        } else {
            Err(NetError::DegenerateActivation {
                layer: self.id.layer,
                index: self.id.index,
                value: self.activation,
            })
        }
    }

    /// `gradient_factor = ∂cost/∂a(expected) · f'(z)` for a unit with a known
    /// target probability.  The forward pass is identity on output units, but
    /// the gradient still goes through the configured function's derivative.
    pub fn set_output_gradient_factor(&mut self, expected: f64) -> Result<()> {
        self.check_finite()?;
        self.gradient_factor = CrossEntropyLoss::derivative(expected, self.activation)
            * self.activation_fn.derivative(self.pre_activation);
        Ok(())
    }

    /// Chain rule over every consumer: `Σ c.gradient_factor · w(self → c)`,
    /// through the normalization if enabled, times `f'(z)`.
    ///
    /// Consumers must already hold this example's gradient factors.  Returns
    /// the upstream sum `∂loss/∂effective_activation`.
    pub fn set_hidden_gradient_factor(&mut self, consumers: &[Unit]) -> Result<f64> {
        self.check_finite()?;
        let mut upstream = 0.0;
        for &to in &self.outputs {
            let consumer = consumers.get(to.index)
                .ok_or(NetError::MissingEdge { from: self.id, to })?;
            let weight = consumer.weight_of(self.id)
                .ok_or(NetError::MissingEdge { from: self.id, to })?;
            upstream += consumer.gradient_factor * weight;
        }
        let through_norm = match &self.batch_norm {
            Some(bn) => upstream * bn.scale(),
            None => upstream,
        };
        self.gradient_factor = through_norm * self.activation_fn.derivative(self.pre_activation);
        Ok(upstream)
    }

    /// Pushes one weight-gradient vector and one bias gradient for the
    /// current gradient factor.
    fn push_gradients(&mut self, predecessors: &[Unit]) -> Result<()> {
        let mut row = Vec::with_capacity(self.inputs.len());
        for edge in &self.inputs {
            let pred = predecessors.get(edge.from.index)
                .ok_or(NetError::MissingEdge { from: edge.from, to: self.id })?;
            row.push(self.gradient_factor * pred.effective_activation());
        }
        self.weight_gradients.push(row);
        self.bias_gradients.push(self.gradient_factor);
        Ok(())
    }

    /// Buffers this example's gradients for a unit with a target probability.
    pub fn accumulate_output_gradient(&mut self, expected: f64, predecessors: &[Unit]) -> Result<()> {
        self.set_output_gradient_factor(expected)?;
        self.push_gradients(predecessors)
    }

    /// Buffers this example's gradients for a hidden unit, deriving its
    /// gradient factor from its consumers.
    pub fn accumulate_hidden_gradient(&mut self, predecessors: &[Unit], consumers: &[Unit]) -> Result<()> {
        let upstream = self.set_hidden_gradient_factor(consumers)?;
        if let Some(bn) = self.batch_norm.as_mut() {
            bn.accumulate(upstream, self.activation);
        }
        self.push_gradients(predecessors)
    }

    /// Subtracts `learning_rate × mean gradient` from every incoming weight.
    pub fn apply_weight_update(&mut self, learning_rate: f64) {
        if self.weight_gradients.is_empty() {
            return;
        }
        let n = self.weight_gradients.len() as f64;
        for (slot, edge) in self.inputs.iter_mut().enumerate() {
            let total: f64 = self.weight_gradients.iter().map(|row| row[slot]).sum();
            edge.weight -= learning_rate * total / n;
        }
    }

    pub fn apply_bias_update(&mut self, learning_rate: f64) {
        if self.bias_gradients.is_empty() {
            return;
        }
        let mean = self.bias_gradients.iter().sum::<f64>() / self.bias_gradients.len() as f64;
        self.bias -= learning_rate * mean;
    }

    pub(crate) fn apply_batch_norm_update(&mut self, learning_rate: f64) {
        if let Some(bn) = self.batch_norm.as_mut() {
            bn.apply_update(learning_rate);
        }
    }

    /// Empties the gradient buffers (and any batch statistics).  Runs after
    /// every update, never before.
    pub fn clear_gradients(&mut self) {
        self.weight_gradients.clear();
        self.bias_gradients.clear();
        if let Some(bn) = self.batch_norm.as_mut() {
            bn.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ActivationKind;
    use approx::assert_abs_diff_eq;

    fn input(index: usize, activation: f64) -> Unit {
        let mut u = Unit::new(UnitId::new(0, index), UnitKind::Input, None, ActivationFunction::relu());
        u.set_activation(activation);
        u
    }

    fn hidden(index: usize) -> Unit {
        Unit::new(UnitId::new(1, index), UnitKind::Hidden, None, ActivationFunction::relu())
    }

    #[test]
    fn input_units_refuse_to_compute() {
        let mut u = input(0, 1.0);
        assert!(matches!(
            u.compute(&[], Pass::Training),
            Err(NetError::IllegalComputeOnInput { layer: 0, index: 0 })
        ));
    }

    #[test]
    fn unconnected_unit_is_a_dimension_mismatch() {
        let preds = vec![input(0, 1.0)];
        let mut u = hidden(0);
        assert!(matches!(
            u.compute(&preds, Pass::Training),
            Err(NetError::DimensionMismatch { actual: 0, .. })
        ));
    }

    #[test]
    fn label_only_on_output_units() {
        assert!(matches!(hidden(3).label(), Err(NetError::MissingLabel { layer: 1, index: 3 })));
        let out = Unit::new(UnitId::new(2, 0), UnitKind::Output, Some('q'), ActivationFunction::relu());
        assert_eq!(out.label().unwrap(), 'q');
    }

    #[test]
    fn hidden_compute_applies_nonlinearity() {
        let preds = vec![input(0, 2.0), input(1, 1.0)];
        let mut u = hidden(0);
        u.connect(preds[0].id(), 0.5);
        u.connect(preds[1].id(), -3.0);
        u.set_bias(0.25);
        u.compute(&preds, Pass::Training).unwrap();
        assert_abs_diff_eq!(u.pre_activation(), 2.0 * 0.5 - 3.0 + 0.25, epsilon = 1e-15);
        assert_eq!(u.activation(), 0.0);
    }

    #[test]
    fn output_compute_is_identity() {
        let preds = vec![input(0, 2.0)];
        let mut u = Unit::new(UnitId::new(1, 0), UnitKind::Output, Some('0'), ActivationFunction::relu());
        u.connect(preds[0].id(), -1.0);
        u.compute(&preds, Pass::Inference).unwrap();
        assert_eq!(u.activation(), -2.0);
    }

    #[test]
    fn update_uses_mean_of_buffered_gradients() {
        let preds = vec![input(0, 1.0)];
        let mut u = Unit::new(UnitId::new(1, 0), UnitKind::Output, Some('0'), ActivationFunction::relu());
        u.connect(preds[0].id(), 0.0);
        u.set_bias(0.5);
        u.compute(&preds, Pass::Training).unwrap();

        for a in [0.5, 0.25] {
            u.set_activation(a);
            u.accumulate_output_gradient(1.0, &preds).unwrap();
        }
        assert_eq!(u.pending_gradients(), 2);

        // ∂cost/∂a for e = 1 is -1/a: -2 and -4, mean -3; relu'(0.5) = 1.
        u.apply_weight_update(0.1);
        u.apply_bias_update(0.1);
        u.clear_gradients();
        assert_abs_diff_eq!(u.weight_of(preds[0].id()).unwrap(), 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(u.bias(), 0.8, epsilon = 1e-12);
        assert_eq!(u.pending_gradients(), 0);
    }

    #[test]
    fn output_factor_includes_activation_derivative() {
        let preds = vec![input(0, 1.0)];
        let mut out = Unit::new(UnitId::new(1, 0), UnitKind::Output, Some('0'), ActivationFunction::relu());
        out.connect(preds[0].id(), -2.0);
        out.compute(&preds, Pass::Training).unwrap();
        assert_eq!(out.pre_activation(), -2.0);

        // Softmax probability 0.25 with target 1: ∂cost/∂a = -4, relu'(-2) = 0.
        out.set_activation(0.25);
        out.set_output_gradient_factor(1.0).unwrap();
        assert_eq!(out.gradient_factor(), 0.0);

        let sigmoid = ActivationFunction::new(ActivationKind::Sigmoid, &[1.0]).unwrap();
        let mut out = Unit::new(UnitId::new(1, 0), UnitKind::Output, Some('0'), sigmoid.clone());
        out.connect(preds[0].id(), -2.0);
        out.compute(&preds, Pass::Training).unwrap();
        out.set_activation(0.25);
        out.set_output_gradient_factor(1.0).unwrap();
        assert_abs_diff_eq!(out.gradient_factor(), -4.0 * sigmoid.derivative(-2.0), epsilon = 1e-15);
    }

    #[test]
    fn hidden_factor_sums_over_consumers() {
        let preds = vec![input(0, 1.0)];
        let mut h = hidden(0);
        h.connect(preds[0].id(), 1.0);
        h.compute(&preds, Pass::Training).unwrap();

        let mut consumers = Vec::new();
        for (i, (w, gf)) in [(2.0, 0.5), (-1.0, 3.0)].into_iter().enumerate() {
            let mut c = Unit::new(UnitId::new(2, i), UnitKind::Output, Some('0'), ActivationFunction::relu());
            c.connect(h.id(), w);
            c.gradient_factor = gf;
            h.add_consumer(c.id());
            consumers.push(c);
        }

        h.accumulate_hidden_gradient(&preds, &consumers).unwrap();
        // (2·0.5 - 1·3) · relu'(1) = -2
        assert_abs_diff_eq!(h.gradient_factor(), -2.0, epsilon = 1e-15);
        assert_eq!(h.pending_gradients(), 1);
    }

    #[test]
    fn dangling_back_reference_is_reported() {
        let preds = vec![input(0, 1.0)];
        let mut h = hidden(0);
        h.connect(preds[0].id(), 1.0);
        h.compute(&preds, Pass::Training).unwrap();
        let stranger = Unit::new(UnitId::new(2, 0), UnitKind::Output, Some('0'), ActivationFunction::relu());
        h.add_consumer(stranger.id());
        assert!(matches!(
            h.accumulate_hidden_gradient(&preds, &[stranger]),
            Err(NetError::MissingEdge { .. })
        ));
    }

    #[test]
    fn non_finite_activation_is_degenerate() {
        let preds = vec![input(0, 1.0)];
        let mut out = Unit::new(UnitId::new(1, 0), UnitKind::Output, Some('0'), ActivationFunction::relu());
        out.connect(preds[0].id(), 1.0);
        out.set_activation(f64::NAN);
        assert!(matches!(
            out.accumulate_output_gradient(1.0, &preds),
            Err(NetError::DegenerateActivation { .. })
        ));
        assert_eq!(out.pending_gradients(), 0);
    }
}
