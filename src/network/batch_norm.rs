use serde::{Deserialize, Serialize};

const EPS: f64 = 1e-5;

/// Optional per-unit normalization of a hidden activation.
///
/// The statistics used on the forward pass are the running ones, so they are
/// constant for the whole batch and `∂effective/∂activation` is exactly
/// `gamma / sqrt(running_var + EPS)`.  Raw activations seen during training are
/// buffered and folded into the running statistics at the batch update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchNorm {
    pub gamma: f64,
    pub beta: f64,
    pub running_mean: f64,
    pub running_var: f64,
    pub momentum: f64,
    #[serde(skip)]
    batch_activations: Vec<f64>,
    #[serde(skip)]
    gamma_gradients: Vec<f64>,
    #[serde(skip)]
    beta_gradients: Vec<f64>,
}

impl Default for BatchNorm {
    fn default() -> Self {
        BatchNorm {
            gamma: 1.0,
            beta: 0.0,
            running_mean: 0.0,
            running_var: 1.0,
            momentum: 0.9,
            batch_activations: Vec::new(),
            gamma_gradients: Vec::new(),
            beta_gradients: Vec::new(),
        }
    }
}

impl BatchNorm {
    fn std_dev(&self) -> f64 {
        (self.running_var + EPS).sqrt()
    }

    pub fn normalize(&self, activation: f64) -> f64 {
        (activation - self.running_mean) / self.std_dev()
    }

    /// Scaled and shifted normalized activation, as seen by consumers.
    pub fn apply(&self, activation: f64) -> f64 {
        self.gamma * self.normalize(activation) + self.beta
    }

    /// `∂apply/∂activation`
    pub fn scale(&self) -> f64 {
        self.gamma / self.std_dev()
    }

    pub fn record_activation(&mut self, activation: f64) {
        self.batch_activations.push(activation);
    }

    /// Buffers the gradients of gamma and beta for one example, given
    /// `upstream = ∂loss/∂effective`.
    pub fn accumulate(&mut self, upstream: f64, activation: f64) {
        self.gamma_gradients.push(upstream * self.normalize(activation));
        self.beta_gradients.push(upstream);
    }

    pub fn apply_update(&mut self, learning_rate: f64) {
        if let Some(g) = mean(&self.gamma_gradients) {
            self.gamma -= learning_rate * g;
        }
        if let Some(b) = mean(&self.beta_gradients) {
            self.beta -= learning_rate * b;
        }
        if let Some(batch_mean) = mean(&self.batch_activations) {
            let n = self.batch_activations.len() as f64;
            let batch_var = self.batch_activations.iter()
                .map(|a| (a - batch_mean).powi(2))
                .sum::<f64>() / n;
            self.running_mean = self.momentum * self.running_mean + (1.0 - self.momentum) * batch_mean;
            self.running_var = self.momentum * self.running_var + (1.0 - self.momentum) * batch_var;
        }
    }

    pub fn clear(&mut self) {
        self.batch_activations.clear();
        self.gamma_gradients.clear();
        self.beta_gradients.clear();
    }

    /// Every persisted parameter is a finite number.
    pub fn is_finite(&self) -> bool {
        [self.gamma, self.beta, self.running_mean, self.running_var, self.momentum]
            .iter()
            .all(|v| v.is_finite())
    }

    pub fn pending(&self) -> usize {
        self.beta_gradients.len()
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn identity_at_defaults() {
        let bn = BatchNorm::default();
        assert_abs_diff_eq!(bn.apply(0.7), 0.7, epsilon = 1e-5);
        assert_abs_diff_eq!(bn.scale(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn update_folds_batch_statistics() {
        let mut bn = BatchNorm { momentum: 0.0, ..BatchNorm::default() };
        for a in [1.0, 3.0] {
            bn.record_activation(a);
        }
        bn.apply_update(0.1);
        assert_abs_diff_eq!(bn.running_mean, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(bn.running_var, 1.0, epsilon = 1e-12);
        bn.clear();
        assert_eq!(bn.pending(), 0);
    }

    #[test]
    fn beta_moves_against_gradient() {
        let mut bn = BatchNorm::default();
        bn.accumulate(2.0, 0.0);
        bn.accumulate(4.0, 0.0);
        bn.apply_update(0.5);
        assert_abs_diff_eq!(bn.beta, -1.5, epsilon = 1e-12);
    }
}
