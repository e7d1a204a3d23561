use thiserror::Error;

use crate::network::unit::UnitId;

/// Errors raised while building, training, evaluating or persisting a network.
#[derive(Error, Debug)]
pub enum NetError {
    /// Activation function built with the wrong number of parameters or an
    /// out-of-range value.
    #[error("invalid parameter for {function}: {reason}")]
    InvalidParameter { function: &'static str, reason: String },

    /// Input vector (or layer) size does not match what the network expects.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("compute() called on input unit {index} of layer {layer}")]
    IllegalComputeOnInput { layer: usize, index: usize },

    #[error("unit {index} of layer {layer} is not an output unit and has no label")]
    MissingLabel { layer: usize, index: usize },

    /// A non-finite activation reached the cross-entropy terms.
    #[error("degenerate activation {value} at unit {index} of layer {layer}")]
    DegenerateActivation { layer: usize, index: usize, value: f64 },

    /// A back-reference points at a consumer that has no edge from the unit.
    #[error("missing edge from {from} to {to}")]
    MissingEdge { from: UnitId, to: UnitId },

    #[error("gradient buffers already hold a full batch of {batch_size} examples")]
    BatchFull { batch_size: usize },

    #[error("label {0:?} is not part of the output alphabet")]
    UnknownLabel(char),

    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("corrupt model: {0}")]
    CorruptModel(String),

    #[error("image error: {0}")]
    Image(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NetError>;
