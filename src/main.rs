//! Command-line front end: train a recognizer on an image folder, or
//! classify images with a saved model.
//!
//!   glyph-nn train --data ./by_class --hidden 128 --epochs 10 --model model.json
//!   glyph-nn predict --model model.json a.png b.png
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use glyph_nn::data::image::{load_image_input, INPUT_RESOLUTION, INPUT_SIZE};
use glyph_nn::data::load_dataset;
use glyph_nn::network::labels::ALPHABET;
use glyph_nn::network::metadata::{InputType, ModelMetadata};
use glyph_nn::{evaluate_accuracy, train_loop, ActivationFunction, ActivationKind, Network, NetworkSpec, TrainConfig};

#[derive(Parser)]
#[command(name = "glyph-nn", version, about = "Handwritten character recognizer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a network on a folder of labelled images.
    Train(TrainArgs),
    /// Classify image files with a saved network.
    Predict(PredictArgs),
}

#[derive(Args)]
struct TrainArgs {
    /// Dataset root with one folder per character, named by hex code point.
    #[arg(long)]
    data: PathBuf,
    /// JSON network spec; overrides --hidden, --lr, --batch-size and --seed.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Hidden layer sizes, comma separated.
    #[arg(long, value_delimiter = ',', default_value = "128")]
    hidden: Vec<usize>,
    #[arg(long, default_value_t = 10)]
    epochs: usize,
    #[arg(long, default_value_t = 32)]
    batch_size: usize,
    #[arg(long, default_value_t = 0.01)]
    lr: f64,
    /// Leaky ReLU slope for hidden units; plain ReLU when omitted.
    #[arg(long)]
    leaky: Option<f64>,
    #[arg(long)]
    batch_norm: bool,
    /// Stop and save once an epoch's success rate reaches this fraction.
    #[arg(long)]
    threshold: Option<f64>,
    #[arg(long)]
    seed: Option<u64>,
    /// Where to write the trained model.
    #[arg(long, default_value = "model.json")]
    model: PathBuf,
}

#[derive(Args)]
struct PredictArgs {
    #[arg(long)]
    model: PathBuf,
    /// Images to classify.
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match Cli::parse().command {
        Command::Train(args) => train(args),
        Command::Predict(args) => predict(args),
    }
}

fn network_spec(args: &TrainArgs) -> Result<NetworkSpec> {
    if let Some(ref path) = args.config {
        return NetworkSpec::load_json(path).with_context(|| format!("reading spec {}", path.display()));
    }
    let activation = match args.leaky {
        Some(slope) => ActivationFunction::new(ActivationKind::LeakyReLU, &[slope])?,
        None => ActivationFunction::relu(),
    };
    let mut spec = NetworkSpec::new(INPUT_SIZE, args.hidden.clone(), ALPHABET.len())
        .with_activation(activation)
        .with_learning_rate(args.lr)
        .with_batch_size(args.batch_size)
        .with_batch_norm(args.batch_norm);
    spec.seed = args.seed;
    spec.metadata = Some(ModelMetadata {
        description: Some("Handwritten characters 0-9, A-Z, a-z".to_string()),
        input_type: Some(InputType::ImageGrayscale { width: INPUT_RESOLUTION, height: INPUT_RESOLUTION }),
        ..ModelMetadata::default()
    });
    Ok(spec)
}

fn train(args: TrainArgs) -> Result<()> {
    let samples = load_dataset(&args.data).with_context(|| format!("loading {}", args.data.display()))?;
    let mut network = Network::new(&network_spec(&args)?)?;

    let mut config = TrainConfig::new(args.epochs).with_checkpoint(&args.model);
    config.success_threshold = args.threshold;
    config.shuffle_seed = args.seed;

    let report = train_loop(&mut network, &samples, &config)?;
    info!("Training finished: {:?}", report.state);

    if !matches!(report.state, glyph_nn::TrainState::Saved { .. }) {
        let mut metadata = network.metadata().cloned().unwrap_or_default();
        metadata.trained_epochs = report.last().map(|s| s.epoch);
        metadata.success_rate = report.last().map(|s| s.success_rate);
        network.set_metadata(metadata);
        network.save_json(&args.model).with_context(|| format!("saving {}", args.model.display()))?;
    }

    let accuracy = evaluate_accuracy(&mut network, &samples)?;
    info!("Accuracy on the training set: {:.2}%", accuracy * 100.0);
    Ok(())
}

fn predict(args: PredictArgs) -> Result<()> {
    let mut network = Network::load_json(&args.model).with_context(|| format!("loading {}", args.model.display()))?;
    let declared = network.metadata().and_then(|m| m.input_type.as_ref()).and_then(InputType::input_len);
    if network.input_size() != INPUT_SIZE || declared.map_or(false, |len| len != INPUT_SIZE) {
        bail!(
            "{} expects {} inputs, images are down-sampled to {}",
            args.model.display(),
            network.input_size(),
            INPUT_SIZE
        );
    }
    for path in &args.images {
        let input = load_image_input(path)?;
        let prediction = network.evaluate(&input)?;
        println!("{}\t{}\t{:.4}", path.display(), prediction.label, prediction.probability);
    }
    Ok(())
}
