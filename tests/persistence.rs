use glyph_nn::network::metadata::{InputType, ModelMetadata};
use glyph_nn::{train_loop, Network, NetworkSpec, Sample, TrainConfig, TrainState};

fn samples() -> Vec<Sample> {
    vec![
        Sample::new(vec![0.9, 0.1, 0.0], 'A'),
        Sample::new(vec![0.1, 0.9, 0.2], 'B'),
        Sample::new(vec![0.0, 0.2, 0.8], 'C'),
        Sample::new(vec![0.5, 0.5, 0.5], '7'),
    ]
}

#[test]
fn saved_model_evaluates_bit_identically() {
    let mut network = Network::new(&NetworkSpec::new(3, vec![5, 4], 40).with_batch_size(2).with_seed(17)).unwrap();
    train_loop(&mut network, &samples(), &TrainConfig::new(3).with_shuffle_seed(5)).unwrap();
    network.set_metadata(ModelMetadata {
        description: Some("query".to_string()),
        input_type: Some(InputType::Numeric),
        ..ModelMetadata::default()
    });

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    network.save_json(&path).unwrap();
    let mut loaded = Network::load_json(&path).unwrap();

    assert_eq!(loaded.layer_sizes(), network.layer_sizes());
    assert_eq!(loaded.output_labels(), network.output_labels());
    assert_eq!(loaded.metadata(), network.metadata());

    for query in [[0.3, 0.6, 0.1], [1.0, 0.0, 1.0], [0.0, 0.0, 0.0]] {
        let live = network.evaluate(&query).unwrap();
        let reloaded = loaded.evaluate(&query).unwrap();
        assert_eq!(live.label, reloaded.label);
        assert_eq!(live.probability.to_bits(), reloaded.probability.to_bits());
    }
}

#[test]
fn threshold_checkpoint_writes_model() {
    let mut network = Network::new(&NetworkSpec::new(3, vec![4], 40).with_seed(3)).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoint.json");

    // A threshold of zero is met by the first epoch.
    let config = TrainConfig::new(5).with_threshold(0.0).with_checkpoint(&path);
    let report = train_loop(&mut network, &samples(), &config).unwrap();

    assert_eq!(report.state, TrainState::Saved { epoch: 1 });
    let loaded = Network::load_json(&path).unwrap();
    let metadata = loaded.metadata().unwrap();
    assert_eq!(metadata.trained_epochs, Some(1));
    assert_eq!(metadata.success_rate, report.last().map(|s| s.success_rate));
}

#[test]
fn blob_with_tampered_labels_is_rejected() {
    let network = Network::new(&NetworkSpec::new(2, vec![], 3).with_seed(1)).unwrap();
    let mut file = network.to_model_file();
    file.output_labels.swap(0, 1);
    let blob = serde_json::to_vec(&file).unwrap();
    assert!(Network::from_blob(&blob).is_err());
}
