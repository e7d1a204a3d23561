pub mod dataset;
pub mod image;
pub mod sample;

pub use dataset::load_dataset;
pub use sample::Sample;
