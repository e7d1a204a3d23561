use serde::{Deserialize, Serialize};

use crate::error::{NetError, Result};

/// Tag of an activation function.  The numeric parameters live alongside it
/// in [`ActivationFunction`] so arity can be checked once, at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivationKind {
    Sigmoid,
    ReLU,
    LeakyReLU,
    SiLU,
    Elu,
    ShiftedReLU,
    ScaledReLU,
    SoftPlus,
    Mish,
    MetallicMean,
    ShiftedLeakyReLU,
}

/// Allowed range for one parameter.
#[derive(Clone, Copy)]
enum Bound {
    /// `p >= 0`
    NonNegative,
    /// `p > 0`
    Positive,
    /// `p >= 1`
    AtLeastOne,
    /// `0 <= p <= 1`
    UnitInterval,
}

impl Bound {
    fn admits(self, p: f64) -> bool {
        match self {
            Bound::NonNegative => p >= 0.0,
            Bound::Positive => p > 0.0,
            Bound::AtLeastOne => p >= 1.0,
            Bound::UnitInterval => (0.0..=1.0).contains(&p),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Bound::NonNegative => "at least 0",
            Bound::Positive => "greater than 0",
            Bound::AtLeastOne => "at least 1",
            Bound::UnitInterval => "between 0 and 1",
        }
    }
}

impl ActivationKind {
    pub fn name(self) -> &'static str {
        match self {
            ActivationKind::Sigmoid => "sigmoid",
            ActivationKind::ReLU => "ReLU",
            ActivationKind::LeakyReLU => "leaky ReLU",
            ActivationKind::SiLU => "SiLU",
            ActivationKind::Elu => "ELU",
            ActivationKind::ShiftedReLU => "shifted ReLU",
            ActivationKind::ScaledReLU => "scaled ReLU",
            ActivationKind::SoftPlus => "softplus",
            ActivationKind::Mish => "Mish",
            ActivationKind::MetallicMean => "metallic mean",
            ActivationKind::ShiftedLeakyReLU => "shifted leaky ReLU",
        }
    }

    /// One bound per expected parameter, in order.
    fn bounds(self) -> &'static [Bound] {
        match self {
            ActivationKind::Sigmoid => &[Bound::NonNegative],
            ActivationKind::ReLU => &[],
            ActivationKind::LeakyReLU => &[Bound::UnitInterval],
            ActivationKind::SiLU => &[Bound::AtLeastOne],
            ActivationKind::Elu => &[Bound::UnitInterval],
            ActivationKind::ShiftedReLU => &[Bound::NonNegative],
            ActivationKind::ScaledReLU => &[Bound::NonNegative],
            ActivationKind::SoftPlus => &[Bound::AtLeastOne],
            // Both divide by (or take the root of) the parameter.
            ActivationKind::Mish => &[Bound::Positive],
            ActivationKind::MetallicMean => &[Bound::Positive],
            ActivationKind::ShiftedLeakyReLU => &[Bound::NonNegative, Bound::UnitInterval],
        }
    }
}

/// A scalar nonlinearity with its validated parameters.  Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawActivation")]
pub struct ActivationFunction {
    kind: ActivationKind,
    parameters: Vec<f64>,
}

/// Unvalidated wire form; deserialization goes through `ActivationFunction::new`.
#[derive(Deserialize)]
struct RawActivation {
    kind: ActivationKind,
    #[serde(default)]
    parameters: Vec<f64>,
}

impl TryFrom<RawActivation> for ActivationFunction {
    type Error = NetError;

    fn try_from(raw: RawActivation) -> Result<Self> {
        ActivationFunction::new(raw.kind, &raw.parameters)
    }
}

impl Default for ActivationFunction {
    fn default() -> Self {
        ActivationFunction::relu()
    }
}

impl ActivationFunction {
    /// Builds an activation function, checking the parameter count and range
    /// for `kind`.
    pub fn new(kind: ActivationKind, parameters: &[f64]) -> Result<Self> {
        let bounds = kind.bounds();
        if parameters.len() != bounds.len() {
            return Err(NetError::InvalidParameter {
                function: kind.name(),
                reason: format!(
                    "expected {} parameter(s), got {}",
                    bounds.len(),
                    parameters.len()
                ),
            });
        }
        for (i, (&p, bound)) in parameters.iter().zip(bounds).enumerate() {
            if !p.is_finite() || !bound.admits(p) {
                return Err(NetError::InvalidParameter {
                    function: kind.name(),
                    reason: format!("parameter {} must be {}, got {}", i + 1, bound.describe(), p),
                });
            }
        }
        Ok(ActivationFunction { kind, parameters: parameters.to_vec() })
    }

    pub fn relu() -> Self {
        ActivationFunction { kind: ActivationKind::ReLU, parameters: Vec::new() }
    }

    pub fn kind(&self) -> ActivationKind {
        self.kind
    }

    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    // Indexing is safe: `new` guarantees the arity of every variant.
    fn a(&self) -> f64 {
        self.parameters[0]
    }

    fn b(&self) -> f64 {
        self.parameters[1]
    }

    /// Element-wise activation of the pre-activation sum `x`.
    pub fn value(&self, x: f64) -> f64 {
        match self.kind {
            ActivationKind::Sigmoid => logistic(self.a() * x),
            ActivationKind::ReLU => if x > 0.0 { x } else { 0.0 },
            ActivationKind::LeakyReLU => if x > 0.0 { x } else { self.a() * x },
            ActivationKind::SiLU => x * logistic(self.a() * x),
            ActivationKind::Elu => {
                if x > 0.0 { x } else { self.a() * x.exp_m1() }
            }
            ActivationKind::ShiftedReLU => if x > 0.0 { x } else { -self.a() },
            ActivationKind::ScaledReLU => if x > 0.0 { self.a() * x } else { 0.0 },
            ActivationKind::SoftPlus => softplus(self.a(), x),
            ActivationKind::Mish => x * softplus(self.a(), x).tanh(),
            ActivationKind::MetallicMean => (x + (x * x + self.a()).sqrt()) / 2.0,
            ActivationKind::ShiftedLeakyReLU => {
                if x > 0.0 { x } else { self.b() * x - self.a() }
            }
        }
    }

    /// Derivative with respect to the pre-activation sum `x`.
    ///
    /// Sigmoid returns `s(x)(1 - s(x))` without the inner factor `a`, and Mish
    /// returns `tanh(softplus(x))` only; both are the forms the recognizer was
    /// trained with and are kept as-is.
    pub fn derivative(&self, x: f64) -> f64 {
        match self.kind {
            ActivationKind::Sigmoid => {
                let s = self.value(x);
                s * (1.0 - s)
            }
            ActivationKind::ReLU | ActivationKind::ShiftedReLU => {
                if x > 0.0 { 1.0 } else { 0.0 }
            }
            ActivationKind::LeakyReLU => if x > 0.0 { 1.0 } else { self.a() },
            ActivationKind::SiLU => {
                // e^{ax}(ax + e^{ax} + 1) / (e^{ax} + 1)^2, rearranged to avoid overflow.
                let ax = self.a() * x;
                let s = logistic(ax);
                s * (1.0 + ax * (1.0 - s))
            }
            ActivationKind::Elu => if x > 0.0 { 1.0 } else { self.a() * x.exp() },
            ActivationKind::ScaledReLU => if x > 0.0 { self.a() } else { 0.0 },
            ActivationKind::SoftPlus => logistic(self.a() * x),
            ActivationKind::Mish => softplus(self.a(), x).tanh(),
            ActivationKind::MetallicMean => (x / (x * x + self.a()).sqrt() + 1.0) / 2.0,
            ActivationKind::ShiftedLeakyReLU => if x > 0.0 { 1.0 } else { self.b() },
        }
    }
}

/// `1 / (1 + e^{-t})` without overflowing for large `|t|`.
fn logistic(t: f64) -> f64 {
    if t >= 0.0 {
        1.0 / (1.0 + (-t).exp())
    } else {
        let e = t.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^{ax}) / a`, evaluated as `max(ax, 0) + ln(1 + e^{-|ax|})`.
fn softplus(a: f64, x: f64) -> f64 {
    let t = a * x;
    (t.max(0.0) + (-t.abs()).exp().ln_1p()) / a
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn f(kind: ActivationKind, params: &[f64]) -> ActivationFunction {
        ActivationFunction::new(kind, params).unwrap()
    }

    /// Every variant whose implemented derivative is the analytic one.
    fn analytic_cases() -> Vec<ActivationFunction> {
        vec![
            f(ActivationKind::Sigmoid, &[1.0]),
            f(ActivationKind::ReLU, &[]),
            f(ActivationKind::LeakyReLU, &[0.1]),
            f(ActivationKind::SiLU, &[1.0]),
            f(ActivationKind::SiLU, &[2.5]),
            f(ActivationKind::Elu, &[0.7]),
            f(ActivationKind::ShiftedReLU, &[0.5]),
            f(ActivationKind::ScaledReLU, &[1.5]),
            f(ActivationKind::SoftPlus, &[1.0]),
            f(ActivationKind::SoftPlus, &[3.0]),
            f(ActivationKind::MetallicMean, &[1.0]),
            f(ActivationKind::MetallicMean, &[4.0]),
            f(ActivationKind::ShiftedLeakyReLU, &[0.3, 0.2]),
        ]
    }

    fn sample_points() -> impl Iterator<Item = f64> {
        // Steps of 0.37 from -3.95 never land on the kink at 0.
        (0..22).map(|i| -3.95 + 0.37 * i as f64)
    }

    #[test]
    fn derivative_matches_central_difference() {
        let h = 1e-6;
        for func in analytic_cases() {
            for x in sample_points() {
                let numeric = (func.value(x + h) - func.value(x - h)) / (2.0 * h);
                assert_abs_diff_eq!(func.derivative(x), numeric, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn mish_keeps_simplified_derivative() {
        let mish = f(ActivationKind::Mish, &[1.0]);
        for x in sample_points() {
            let expected = (1.0 + x.exp()).ln().tanh();
            assert_abs_diff_eq!(mish.derivative(x), expected, epsilon = 1e-12);
            assert_abs_diff_eq!(mish.value(x), x * expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn sigmoid_derivative_ignores_steepness() {
        let sig = f(ActivationKind::Sigmoid, &[3.0]);
        let s = 1.0 / (1.0 + (-3.0f64 * 0.4).exp());
        assert_abs_diff_eq!(sig.value(0.4), s, epsilon = 1e-15);
        assert_abs_diff_eq!(sig.derivative(0.4), s * (1.0 - s), epsilon = 1e-15);
    }

    #[test]
    fn literal_formulas() {
        let elu = f(ActivationKind::Elu, &[0.5]);
        assert_abs_diff_eq!(elu.value(-1.0), 0.5 * ((-1.0f64).exp() - 1.0), epsilon = 1e-15);
        assert_eq!(elu.value(2.0), 2.0);

        let shifted = f(ActivationKind::ShiftedReLU, &[0.25]);
        assert_eq!(shifted.value(-4.0), -0.25);
        assert_eq!(shifted.derivative(-4.0), 0.0);

        let sl = f(ActivationKind::ShiftedLeakyReLU, &[1.0, 0.5]);
        assert_eq!(sl.value(-2.0), -2.0);
        assert_eq!(sl.derivative(-2.0), 0.5);

        let mm = f(ActivationKind::MetallicMean, &[4.0]);
        assert_eq!(mm.value(0.0), 1.0);
    }

    #[test]
    fn extreme_inputs_stay_finite() {
        for func in analytic_cases() {
            for x in [-800.0, 800.0] {
                assert!(func.value(x).is_finite(), "{:?} value({})", func.kind(), x);
                assert!(func.derivative(x).is_finite(), "{:?} derivative({})", func.kind(), x);
            }
        }
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!(matches!(
            ActivationFunction::new(ActivationKind::ReLU, &[1.0]),
            Err(NetError::InvalidParameter { .. })
        ));
        assert!(matches!(
            ActivationFunction::new(ActivationKind::ShiftedLeakyReLU, &[1.0]),
            Err(NetError::InvalidParameter { .. })
        ));
        assert!(matches!(
            ActivationFunction::new(ActivationKind::Sigmoid, &[]),
            Err(NetError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range() {
        let bad: &[(ActivationKind, &[f64])] = &[
            (ActivationKind::LeakyReLU, &[1.5]),
            (ActivationKind::LeakyReLU, &[-0.1]),
            (ActivationKind::SiLU, &[0.5]),
            (ActivationKind::Elu, &[2.0]),
            (ActivationKind::SoftPlus, &[0.9]),
            (ActivationKind::Mish, &[0.0]),
            (ActivationKind::MetallicMean, &[0.0]),
            (ActivationKind::ShiftedLeakyReLU, &[-1.0, 0.5]),
            (ActivationKind::ShiftedLeakyReLU, &[1.0, 1.5]),
            (ActivationKind::Sigmoid, &[f64::NAN]),
        ];
        for (kind, params) in bad {
            assert!(
                ActivationFunction::new(*kind, params).is_err(),
                "{:?} {:?} accepted",
                kind,
                params
            );
        }
    }

    #[test]
    fn deserialization_validates() {
        let ok: ActivationFunction =
            serde_json::from_str(r#"{"kind":"LeakyReLU","parameters":[0.01]}"#).unwrap();
        assert_eq!(ok.kind(), ActivationKind::LeakyReLU);

        let relu: ActivationFunction = serde_json::from_str(r#"{"kind":"ReLU"}"#).unwrap();
        assert_eq!(relu, ActivationFunction::relu());

        assert!(serde_json::from_str::<ActivationFunction>(
            r#"{"kind":"LeakyReLU","parameters":[3.0]}"#
        )
        .is_err());
    }
}
