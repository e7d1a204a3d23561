use serde::{Deserialize, Serialize};

/// How the input vector of a saved network was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InputType {
    /// Raw f64 values in [0, 1].
    Numeric,
    /// Grayscale bitmap down-sampled to width×height, ink = 1.0.
    ImageGrayscale { width: u32, height: u32 },
}

impl InputType {
    /// Input vector length implied by the type, if it fixes one.
    pub fn input_len(&self) -> Option<usize> {
        match *self {
            InputType::Numeric => None,
            InputType::ImageGrayscale { width, height } => Some(width as usize * height as usize),
        }
    }
}

/// Annotations written alongside the weights.  Every field is optional so
/// bare models load too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelMetadata {
    pub description: Option<String>,
    pub input_type: Option<InputType>,
    /// Epochs completed when the model was saved.
    pub trained_epochs: Option<usize>,
    /// Training success rate of the last completed epoch, in [0, 1].
    pub success_rate: Option<f64>,
}
