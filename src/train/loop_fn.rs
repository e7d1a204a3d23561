use std::sync::atomic::Ordering;
use std::time::Instant;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::data::Sample;
use crate::error::{NetError, Result};
use crate::network::Network;
use crate::train::epoch_stats::EpochStats;
use crate::train::train_config::TrainConfig;

/// Where a training run is, or where it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainState {
    Built,
    Training { epoch: usize, batch_index: usize },
    /// Threshold reached and the network written to the checkpoint path.
    Saved { epoch: usize },
    /// Threshold reached with no checkpoint path configured.
    ThresholdReached { epoch: usize },
    /// Every requested epoch ran without reaching the threshold.
    Exhausted,
    /// Stop flag set or progress receiver dropped.
    Stopped,
}

#[derive(Debug, Clone)]
pub struct TrainReport {
    pub state: TrainState,
    pub history: Vec<EpochStats>,
}

impl TrainReport {
    pub fn last(&self) -> Option<&EpochStats> {
        self.history.last()
    }
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Trains `network` on `samples` with minibatch updates of
/// `network.batch_size()` examples.
///
/// Each epoch shuffles the samples, then for every sample runs the forward
/// pass, records whether the arg-max label was right, and buffers gradients
/// with the backward pass.  Samples with the wrong length or a label outside
/// the output alphabet are skipped with a warning.
///
/// # Early termination
/// The loop ends before `config.epochs` when
/// - an epoch's success rate reaches `config.success_threshold`,
/// - the `progress_tx` receiver has been dropped, **or**
/// - `config.stop_flag` is set to `true`.
pub fn train_loop(network: &mut Network, samples: &[Sample], config: &TrainConfig) -> Result<TrainReport> {
    if samples.is_empty() {
        return Err(NetError::EmptyTrainingSet);
    }

    let mut rng = match config.shuffle_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut order: Vec<usize> = (0..samples.len()).collect();
    let mut state = TrainState::Built;
    let mut history = Vec::with_capacity(config.epochs);

    info!(
        "Training on {} samples for up to {} epochs (batch size {}, learning rate {})",
        samples.len(),
        config.epochs,
        network.batch_size(),
        network.learning_rate()
    );

    for epoch in 1..=config.epochs {
        if stop_requested(config) {
            state = TrainState::Stopped;
            break;
        }

        state = TrainState::Training { epoch, batch_index: 0 };
        order.shuffle(&mut rng);
        let stats = run_one_epoch(network, samples, &order, epoch, config.epochs, &mut state)?;

        info!(
            "Epoch {}/{}: success rate {:.2}%, mean loss {:.6}, {} batches, {} skipped, {} ms",
            stats.epoch,
            stats.total_epochs,
            stats.success_rate * 100.0,
            stats.mean_loss,
            stats.batches,
            stats.skipped,
            stats.elapsed_ms
        );
        history.push(stats.clone());

        if let Some(ref tx) = config.progress_tx {
            // If the receiver has been dropped, stop training.
            if tx.send(stats.clone()).is_err() {
                state = TrainState::Stopped;
                break;
            }
        }

        if let Some(threshold) = config.success_threshold {
            if stats.success_rate >= threshold {
                state = match config.checkpoint_path {
                    Some(ref path) => {
                        let mut metadata = network.metadata().cloned().unwrap_or_default();
                        metadata.trained_epochs = Some(epoch);
                        metadata.success_rate = Some(stats.success_rate);
                        network.set_metadata(metadata);
                        network.save_json(path)?;
                        TrainState::Saved { epoch }
                    }
                    None => TrainState::ThresholdReached { epoch },
                };
                info!("Success threshold {:.2}% reached in epoch {}", threshold * 100.0, epoch);
                break;
            }
        }
    }

    if matches!(state, TrainState::Built | TrainState::Training { .. }) {
        state = TrainState::Exhausted;
    }
    Ok(TrainReport { state, history })
}

/// Fraction of `samples` whose evaluated label matches the true label.
/// Leaves gradient buffers untouched.
pub fn evaluate_accuracy(network: &mut Network, samples: &[Sample]) -> Result<f64> {
    if samples.is_empty() {
        return Ok(0.0);
    }
    let mut correct = 0usize;
    for sample in samples {
        if network.evaluate(&sample.input)?.label == sample.label {
            correct += 1;
        }
    }
    Ok(correct as f64 / samples.len() as f64)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn stop_requested(config: &TrainConfig) -> bool {
    config.stop_flag.as_ref().map_or(false, |flag| flag.load(Ordering::Relaxed))
}

/// One pass over `samples` in `order`, applying an update every time a full
/// batch is buffered and once more for a trailing partial batch.
fn run_one_epoch(
    network: &mut Network,
    samples: &[Sample],
    order: &[usize],
    epoch: usize,
    total_epochs: usize,
    state: &mut TrainState,
) -> Result<EpochStats> {
    let t_start = Instant::now();
    let mut seen = 0usize;
    let mut hits = 0usize;
    let mut skipped = 0usize;
    let mut batches = 0usize;
    let mut total_loss = 0.0;

    for &idx in order {
        let sample = &samples[idx];
        match train_step(network, sample) {
            Ok((hit, loss)) => {
                seen += 1;
                total_loss += loss;
                if hit {
                    hits += 1;
                }
            }
            Err(e @ (NetError::DimensionMismatch { .. } | NetError::UnknownLabel(_))) => {
                warn!("Skipping sample {} ({:?}): {}", idx, sample.label, e);
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e),
        }

        if network.pending_examples() >= network.batch_size() {
            network.apply_batch_update();
            batches += 1;
            *state = TrainState::Training { epoch, batch_index: batches };
            debug!(
                "Batch {} of epoch {}: success rate {:.2}%",
                batches,
                epoch,
                hits as f64 / seen as f64 * 100.0
            );
        }
    }

    if network.pending_examples() > 0 {
        network.apply_batch_update();
        batches += 1;
        *state = TrainState::Training { epoch, batch_index: batches };
    }

    let (success_rate, mean_loss) = if seen > 0 {
        (hits as f64 / seen as f64, total_loss / seen as f64)
    } else {
        (0.0, 0.0)
    };

    Ok(EpochStats {
        epoch,
        total_epochs,
        success_rate,
        mean_loss,
        batches,
        skipped,
        elapsed_ms: t_start.elapsed().as_millis() as u64,
    })
}

/// Forward, score, backward for one sample.  Returns whether the arg-max
/// label was right and the sample's cross-entropy.
fn train_step(network: &mut Network, sample: &Sample) -> Result<(bool, f64)> {
    network.forward(&sample.input)?;
    let loss = network.cost(sample.label)?;
    let hit = network.prediction()?.label == sample.label;
    network.backward(sample.label)?;
    Ok((hit, loss))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkSpec;
    use std::sync::atomic::AtomicBool;
    use std::sync::{mpsc, Arc};

    fn two_class_samples(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Sample::new(vec![1.0, 0.0, 0.0, 0.0], '0')
                } else {
                    Sample::new(vec![0.0, 1.0, 0.0, 0.0], '1')
                }
            })
            .collect()
    }

    fn net(batch_size: usize) -> Network {
        Network::new(&NetworkSpec::new(4, vec![3], 2).with_seed(3).with_batch_size(batch_size)).unwrap()
    }

    #[test]
    fn empty_training_set_is_an_error() {
        let mut network = net(2);
        assert!(matches!(
            train_loop(&mut network, &[], &TrainConfig::new(1)),
            Err(NetError::EmptyTrainingSet)
        ));
    }

    #[test]
    fn counts_batches_including_partial_tail() {
        let mut network = net(4);
        let report = train_loop(&mut network, &two_class_samples(10), &TrainConfig::new(2).with_shuffle_seed(1)).unwrap();
        assert_eq!(report.state, TrainState::Exhausted);
        assert_eq!(report.history.len(), 2);
        assert!(report.history.iter().all(|s| s.batches == 3 && s.skipped == 0));
        assert_eq!(network.pending_examples(), 0);
    }

    #[test]
    fn malformed_samples_are_skipped() {
        let mut network = net(2);
        let mut samples = two_class_samples(4);
        samples.push(Sample::new(vec![1.0, 0.0], '0'));
        samples.push(Sample::new(vec![0.0; 4], 'Q'));
        let report = train_loop(&mut network, &samples, &TrainConfig::new(1)).unwrap();
        assert_eq!(report.history[0].skipped, 2);
        assert_eq!(report.history[0].batches, 2);
    }

    #[test]
    fn stop_flag_prevents_epochs() {
        let mut network = net(2);
        let mut config = TrainConfig::new(5);
        config.stop_flag = Some(Arc::new(AtomicBool::new(true)));
        let report = train_loop(&mut network, &two_class_samples(4), &config).unwrap();
        assert_eq!(report.state, TrainState::Stopped);
        assert!(report.history.is_empty());
    }

    #[test]
    fn dropped_receiver_stops_training() {
        let mut network = net(2);
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let mut config = TrainConfig::new(5);
        config.progress_tx = Some(tx);
        let report = train_loop(&mut network, &two_class_samples(4), &config).unwrap();
        assert_eq!(report.state, TrainState::Stopped);
        assert_eq!(report.history.len(), 1);
    }

    #[test]
    fn progress_is_sent_per_epoch() {
        let mut network = net(2);
        let (tx, rx) = mpsc::channel();
        let mut config = TrainConfig::new(3);
        config.progress_tx = Some(tx);
        train_loop(&mut network, &two_class_samples(4), &config).unwrap();
        drop(config);
        let epochs: Vec<usize> = rx.iter().map(|s| s.epoch).collect();
        assert_eq!(epochs, vec![1, 2, 3]);
    }
}
