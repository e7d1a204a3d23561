/// One labelled training example: an input vector in [0, 1] and the
/// character it shows.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub input: Vec<f64>,
    pub label: char,
}

impl Sample {
    pub fn new(input: Vec<f64>, label: char) -> Self {
        Sample { input, label }
    }
}
