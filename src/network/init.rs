use rand::Rng;
use std::f64::consts::PI;

/// Samples a single value from N(0, 1) using the Box-Muller transform.
pub fn sample_standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // Both uniforms in (0, 1] so the log never sees 0.
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = 1.0 - rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Initial weight for an edge into a unit with `fan_in` predecessors:
/// N(0, 1/sqrt(fan_in)).
pub fn gaussian_weight<R: Rng + ?Sized>(rng: &mut R, fan_in: usize) -> f64 {
    sample_standard_normal(rng) * (1.0 / fan_in as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn spread_follows_fan_in() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let samples: Vec<f64> = (0..n).map(|_| gaussian_weight(&mut rng, 16)).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.01, "mean {}", mean);
        // sigma = 0.25 -> variance 0.0625
        assert!((var - 0.0625).abs() < 0.005, "variance {}", var);
    }
}
