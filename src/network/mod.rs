pub mod batch_norm;
pub mod init;
pub mod labels;
pub mod metadata;
pub mod model_file;
pub mod network;
pub mod spec;
pub mod unit;

pub use network::{Network, Prediction};
pub use spec::NetworkSpec;
pub use unit::{Unit, UnitId, UnitKind};
