pub mod activation;
pub mod softmax;

pub use activation::{ActivationFunction, ActivationKind};
pub use softmax::softmax;
