/// Two-glyph demo for glyph-nn.
///
/// Architecture: 16 → 8 (Sigmoid) → 2 (Softmax)
/// Each class lights up a different half of the input, with noise.
///
/// Run with:
///   cargo run --example separable
use glyph_nn::{
    evaluate_accuracy, train_loop, ActivationFunction, ActivationKind, Network, NetworkSpec, Sample,
    TrainConfig,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn noisy_samples(n: usize, rng: &mut StdRng) -> Vec<Sample> {
    (0..n)
        .map(|i| {
            let label = if i % 2 == 0 { '0' } else { '1' };
            let input = (0..16)
                .map(|j| {
                    let lit = (j < 8) == (label == '0');
                    let base = if lit { 0.8 } else { 0.1 };
                    (base + rng.gen_range(-0.1..0.1f64)).clamp(0.0, 1.0)
                })
                .collect();
            Sample::new(input, label)
        })
        .collect()
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut rng = StdRng::seed_from_u64(2024);
    let train = noisy_samples(200, &mut rng);
    let test = noisy_samples(50, &mut rng);

    let spec = NetworkSpec::new(16, vec![8], 2)
        .with_activation(ActivationFunction::new(ActivationKind::Sigmoid, &[1.0]).expect("valid sigmoid"))
        .with_learning_rate(0.1)
        .with_batch_size(8)
        .with_seed(7);
    let mut network = Network::new(&spec).expect("valid spec");

    let config = TrainConfig::new(30).with_threshold(0.99).with_shuffle_seed(1);
    let report = train_loop(&mut network, &train, &config).expect("training failed");
    println!("Stopped in state {:?} after {} epochs", report.state, report.history.len());

    let accuracy = evaluate_accuracy(&mut network, &test).expect("evaluation failed");
    println!("Test accuracy: {:.2}%", accuracy * 100.0);

    for sample in test.iter().take(4) {
        let p = network.evaluate(&sample.input).expect("evaluation failed");
        println!("true {}  predicted {}  p = {:.4}", sample.label, p.label, p.probability);
    }
}
