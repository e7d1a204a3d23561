/// Per-unit cross-entropy between an expected probability `e` and the unit's
/// actual (softmax) activation `a`.
pub struct CrossEntropyLoss;

/// Activations are clamped into `[EPS, 1 - EPS]` before the logs and the
/// division, so a saturated softmax cannot produce `ln(0)` or `0/0`.
pub const EPS: f64 = 1e-9;

fn clamp(a: f64) -> f64 {
    a.clamp(EPS, 1.0 - EPS)
}

impl CrossEntropyLoss {
    /// `-(e·ln(a) + (1-e)·ln(1-a))`
    pub fn cost(expected: f64, actual: f64) -> f64 {
        let a = clamp(actual);
        -(expected * a.ln() + (1.0 - expected) * (1.0 - a).ln())
    }

    /// `∂cost/∂a = (e - a) / (a·(a - 1))`
    pub fn derivative(expected: f64, actual: f64) -> f64 {
        let a = clamp(actual);
        (expected - a) / (a * (a - 1.0))
    }

    /// Summed cost over an output layer given a one-hot target index.
    pub fn layer_cost(probabilities: &[f64], target: usize) -> f64 {
        probabilities.iter().enumerate()
            .map(|(i, &a)| Self::cost(if i == target { 1.0 } else { 0.0 }, a))
            .sum()
    }
}
