// Saving and restoring trained parameters.

use approx::assert_relative_eq;
use easycnn::data::one_hot;
use easycnn::network::ModelFile;
use easycnn::{InputSpec, LayerSpec, LossType, Network, NetworkSpec, NnError, Phase, Shape, Tensor};

fn spec(hidden: usize, seed: u64) -> NetworkSpec {
    NetworkSpec {
        name: "persist".into(),
        input: InputSpec {
            channels: 1,
            height: 6,
            width: 6,
        },
        layers: vec![
            LayerSpec::Input,
            LayerSpec::Convolution {
                out_channels: 3,
                kernel: (3, 3),
                stride: 1,
                padding: 1,
                bias: true,
            },
            LayerSpec::Relu,
            LayerSpec::MaxPooling {
                kernel: (2, 2),
                stride: 2,
            },
            LayerSpec::FullyConnected {
                outputs: hidden,
                bias: true,
            },
            LayerSpec::Relu,
            LayerSpec::FullyConnected {
                outputs: 4,
                bias: false,
            },
            LayerSpec::Softmax,
        ],
        loss: LossType::CrossEntropy,
        seed: Some(seed),
    }
}

fn fixed_input(n: usize) -> Tensor {
    Tensor::from_vec(
        Shape::new(n, 1, 6, 6),
        (0..n * 36).map(|i| ((i * 13) % 29) as f32 / 29.0).collect(),
    )
}

fn trained(seed: u64) -> Network {
    let mut net = spec(8, seed).build(2).unwrap();
    let labels: Vec<f32> = [1u8, 3].iter().flat_map(|&l| one_hot(l, 4)).collect();
    net.train_batch(&fixed_input(2), &Tensor::from_vec(Shape::new(2, 4, 1, 1), labels), 0.1)
        .unwrap();
    net
}

#[test]
fn save_then_load_reproduces_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");

    let mut original = trained(1);
    original.set_phase(Phase::Test);
    let expected = original.test_batch(&fixed_input(2)).unwrap();
    original.save_model(&path).unwrap();

    let mut restored = spec(8, 2).build(2).unwrap();
    assert_ne!(restored.test_batch(&fixed_input(2)).unwrap(), expected);
    restored.load_model(&path).unwrap();
    let actual = restored.test_batch(&fixed_input(2)).unwrap();
    for (a, e) in actual.data().iter().zip(expected.data()) {
        assert_relative_eq!(*a, *e, epsilon = 1e-6);
    }
}

#[test]
fn model_file_rebuilds_its_own_architecture() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    let mut original = trained(3);
    let expected = original.test_batch(&fixed_input(1)).unwrap();
    original.save_model(&path).unwrap();

    let mut rebuilt = Network::from_model_file(&path, 1).unwrap();
    assert_eq!(rebuilt.layer_kinds(), original.layer_kinds());
    let actual = rebuilt.test_batch(&fixed_input(1)).unwrap();
    for (a, e) in actual.data().iter().zip(expected.data()) {
        assert_relative_eq!(*a, *e, epsilon = 1e-6);
    }
}

#[test]
fn mismatched_architecture_fails_and_leaves_parameters_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    trained(1).save_model(&path).unwrap();

    let mut other = spec(5, 4).build(2).unwrap();
    let before = other.test_batch(&fixed_input(2)).unwrap();
    let result = other.load_model(&path);
    assert!(matches!(result, Err(NnError::ShapeMismatch(_))));
    assert_eq!(other.test_batch(&fixed_input(2)).unwrap(), before);
}

#[test]
fn layer_count_mismatch_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    trained(1).save_model(&path).unwrap();

    let mut shorter = spec(8, 1);
    shorter.layers.pop();
    let mut net = shorter.build(2).unwrap();
    assert!(net.load_model(&path).is_err());
}

#[test]
fn save_replaces_the_target_in_one_step() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    let net = trained(1);
    net.save_model(&path).unwrap();
    net.save_model(&path).unwrap();

    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names, vec![std::ffi::OsString::from("model.json")]);

    let model = ModelFile::load(&path).unwrap();
    assert_eq!(model.layers.len(), net.len());
    assert_eq!(model.spec.as_ref(), net.spec());
}

#[test]
fn unreadable_files_are_errors_not_panics() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.json");
    std::fs::write(&path, b"{ not json").unwrap();
    let mut net = spec(8, 1).build(1).unwrap();
    assert!(matches!(net.load_model(&path), Err(NnError::Format(_))));
    assert!(matches!(
        net.load_model(&dir.path().join("missing.json")),
        Err(NnError::Io(_))
    ));
}
