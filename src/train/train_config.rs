use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{atomic::AtomicBool, Arc};

use crate::train::epoch_stats::EpochStats;

/// Configuration for a `train_loop` run.  Batch size and learning rate are
/// owned by the network itself.
///
/// # Fields
/// - `epochs`           : maximum number of full passes over the training data
/// - `success_threshold`: stop once an epoch's success rate reaches this value
/// - `checkpoint_path`  : where to save the network when the threshold is reached
/// - `shuffle_seed`     : seed for the per-epoch shuffle; entropy when `None`
/// - `progress_tx`      : optional channel sender; one `EpochStats` is sent per
///                         completed epoch.  If the receiver is dropped the loop
///                         terminates early.
/// - `stop_flag`        : optional atomic flag; when set to `true` from another
///                         thread the loop terminates before the next epoch.
pub struct TrainConfig {
    pub epochs: usize,
    pub success_threshold: Option<f64>,
    pub checkpoint_path: Option<PathBuf>,
    pub shuffle_seed: Option<u64>,
    pub progress_tx: Option<mpsc::Sender<EpochStats>>,
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl TrainConfig {
    /// Creates a minimal `TrainConfig`: no threshold, no checkpoint, no
    /// progress channel and no stop flag.
    pub fn new(epochs: usize) -> Self {
        TrainConfig {
            epochs,
            success_threshold: None,
            checkpoint_path: None,
            shuffle_seed: None,
            progress_tx: None,
            stop_flag: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.success_threshold = Some(threshold);
        self
    }

    pub fn with_checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = Some(path.into());
        self
    }

    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig::new(10)
    }
}
