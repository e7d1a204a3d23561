/// Softmax over a whole layer of raw sums.
///
/// The maximum is subtracted before exponentiating, so large logits cannot
/// overflow to `inf / inf`.
pub fn softmax(values: &[f64]) -> Vec<f64> {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.iter().map(|&z| (z - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
