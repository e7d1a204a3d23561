pub mod activation;
pub mod data;
pub mod error;
pub mod loss;
pub mod network;
pub mod train;

// Convenience re-exports
pub use activation::{ActivationFunction, ActivationKind};
pub use data::Sample;
pub use error::{NetError, Result};
pub use loss::CrossEntropyLoss;
pub use network::{Network, NetworkSpec, Prediction};
pub use train::{evaluate_accuracy, train_loop, TrainConfig, TrainReport, TrainState};
