use serde::{Deserialize, Serialize};

/// Per-epoch training statistics emitted by `train_loop`.
///
/// When a `progress_tx` channel is configured in `TrainConfig`, the training
/// loop sends one `EpochStats` value at the end of every completed epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Total epochs requested for this run.
    pub total_epochs: usize,
    /// Fraction of this epoch's examples whose arg-max label matched the
    /// true label, measured on the forward pass before each update.
    pub success_rate: f64,
    /// Mean cross-entropy over the examples of this epoch.
    pub mean_loss: f64,
    /// Batch updates applied during this epoch, including a trailing partial one.
    pub batches: usize,
    /// Examples skipped because of a dimension mismatch or unknown label.
    pub skipped: usize,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}
