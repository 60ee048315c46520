//! End-to-end pipeline tests over synthetic leaf datasets

use autorogue::augment::AugmentationPolicy;
use autorogue::data::{DatasetLoader, GeneratorParams, LoaderOptions, Split, GENERATOR_PARAMS_FILE};
use autorogue::eval::evaluate_directory;
use autorogue::model::{Architecture, Backbone};
use autorogue::train::{PhaseConfig, Phase, TrainOptions, TrainingOrchestrator};
use autorogue::Error;
use image::{ImageBuffer, Rgb};
use std::path::Path;
use tempfile::TempDir;

/// Two class directories with a visible brightness difference, so even a
/// tiny model can separate them.
fn synthetic_dataset(healthy: usize, infected: usize, size: u32) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (class, base, count) in [("healthy", 200u8, healthy), ("infected", 40u8, infected)] {
        let class_dir = dir.path().join(class);
        std::fs::create_dir(&class_dir).unwrap();
        for i in 0..count {
            let jitter = (i % 16) as u8;
            let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_fn(size, size, |x, y| {
                Rgb([
                    base.wrapping_add(jitter),
                    base.wrapping_add((x % 8) as u8),
                    base.wrapping_add((y % 8) as u8),
                ])
            });
            img.save(class_dir.join(format!("leaf_{i:04}.png"))).unwrap();
        }
    }
    dir
}

#[test]
fn split_scenario_100_plus_100_gives_160_train_and_5_full_batches() {
    let data = synthetic_dataset(100, 100, 8);
    let loader = DatasetLoader::open(
        data.path(),
        LoaderOptions {
            image_size: 8,
            batch_size: 32,
            split_fraction: 0.8,
            seed: 13,
        },
    )
    .unwrap();

    assert_eq!(loader.sample_count(Split::Train), 160);
    assert_eq!(loader.sample_count(Split::Validation), 40);

    let policy = AugmentationPolicy::identity();
    let batch_sizes: Vec<usize> = loader.stream(Split::Train, &policy).map(|b| b.len()).collect();
    assert_eq!(batch_sizes, vec![32, 32, 32, 32, 32]);

    let val_total: usize = loader
        .stream(Split::Validation, &policy)
        .map(|b| b.len())
        .sum();
    assert_eq!(val_total, 40);
}

#[test]
fn train_and_validation_splits_are_disjoint_and_exhaustive() {
    let data = synthetic_dataset(17, 23, 8);
    let loader = DatasetLoader::open(
        data.path(),
        LoaderOptions {
            image_size: 8,
            batch_size: 8,
            split_fraction: 0.8,
            seed: 13,
        },
    )
    .unwrap();

    let train = loader.sample_paths(Split::Train);
    let val = loader.sample_paths(Split::Validation);
    assert_eq!(train.len() + val.len(), 40);
    for path in &val {
        assert!(!train.contains(path));
    }
}

#[test]
fn fixed_seed_reproduces_training_order_across_runs() {
    let data = synthetic_dataset(20, 20, 8);
    let options = LoaderOptions {
        image_size: 8,
        batch_size: 8,
        split_fraction: 0.8,
        seed: 21,
    };
    let policy = AugmentationPolicy::identity();

    let order = |loader: &DatasetLoader| -> Vec<f32> {
        loader
            .stream(Split::Train, &policy)
            .flat_map(|b| b.labels.to_vec())
            .collect()
    };

    let loader_a = DatasetLoader::open(data.path(), options.clone()).unwrap();
    let loader_b = DatasetLoader::open(data.path(), options).unwrap();
    assert_eq!(order(&loader_a), order(&loader_b));
}

#[test]
fn missing_class_directory_aborts_before_any_epoch() {
    let dir = TempDir::new().unwrap();
    let healthy = dir.path().join("healthy");
    std::fs::create_dir(&healthy).unwrap();
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(8, 8, Rgb([1, 2, 3]));
    img.save(healthy.join("leaf.png")).unwrap();

    let result = DatasetLoader::open(dir.path(), LoaderOptions::default());
    assert!(matches!(result, Err(Error::DataSource(_))));
}

fn small_train_options(out: &Path) -> TrainOptions {
    TrainOptions {
        warmup: PhaseConfig {
            lr: 0.01,
            epochs: 3,
            patience: 10,
        },
        finetune: PhaseConfig {
            lr: 0.001,
            epochs: 2,
            patience: 10,
        },
        finetune_fraction: 0.3,
        warmup_checkpoint: out.join("warmup_best.json"),
        finetune_checkpoint: out.join("finetune_best.safetensors"),
        final_model: out.join("final_model.json"),
        history_path: Some(out.join("history.json")),
        ..Default::default()
    }
}

#[test]
fn full_run_produces_artifacts_history_and_a_loadable_model() {
    let data = synthetic_dataset(12, 12, 16);
    let out = TempDir::new().unwrap();

    let loader = DatasetLoader::open(
        data.path(),
        LoaderOptions {
            image_size: 16,
            batch_size: 8,
            split_fraction: 0.75,
            seed: 13,
        },
    )
    .unwrap();
    let model = Backbone::init(
        Architecture {
            image_size: 16,
            grid: 4,
            hidden_dim: 8,
            n_blocks: 3,
            dropout: 0.1,
        },
        42,
    );

    let mut orchestrator = TrainingOrchestrator::new(
        model,
        loader,
        AugmentationPolicy::identity(),
        small_train_options(out.path()),
    );
    orchestrator.run().unwrap();

    assert_eq!(orchestrator.phase(), Phase::Done);
    assert!(out.path().join("warmup_best.json").exists());
    assert!(out.path().join("finetune_best.safetensors").exists());
    assert!(out.path().join("final_model.json").exists());

    // 3 warm-up epochs + 2 fine-tune epochs, in order
    let history = orchestrator.history();
    assert_eq!(history.len(), 5);
    let phases: Vec<&str> = history.snapshots().iter().map(|s| s.phase.as_str()).collect();
    assert_eq!(phases, vec!["warmup", "warmup", "warmup", "finetune", "finetune"]);
    for (i, snapshot) in history.snapshots().iter().enumerate() {
        assert!(snapshot.train_loss.is_finite(), "epoch {i} loss not finite");
        assert!((0.0..=1.0).contains(&snapshot.val_accuracy));
    }

    // Training parked its loading parameters next to the artifact, and a
    // later evaluation stage reads them back unchanged
    let record = GeneratorParams::load(&out.path().join(GENERATOR_PARAMS_FILE)).unwrap();
    assert_eq!(record.get("image_size").and_then(|v| v.as_u64()), Some(16));
    let recorded_batch = record
        .get("batch_size")
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .unwrap();
    assert_eq!(recorded_batch, 8);

    // The final artifact evaluates over the same tree without retraining,
    // streaming with the recorded batch size
    let evaluation = evaluate_directory(
        &out.path().join("final_model.json"),
        data.path(),
        recorded_batch,
    )
    .unwrap();
    assert_eq!(evaluation.samples, 24);
    assert!(evaluation.loss.is_finite());
}

#[test]
fn separable_classes_reach_good_training_accuracy() {
    let data = synthetic_dataset(16, 16, 16);
    let out = TempDir::new().unwrap();

    let loader = DatasetLoader::open(
        data.path(),
        LoaderOptions {
            image_size: 16,
            batch_size: 8,
            split_fraction: 0.75,
            seed: 13,
        },
    )
    .unwrap();
    let model = Backbone::init(
        Architecture {
            image_size: 16,
            grid: 4,
            hidden_dim: 8,
            n_blocks: 2,
            dropout: 0.0,
        },
        42,
    );

    let mut options = small_train_options(out.path());
    options.warmup.epochs = 15;
    options.finetune.epochs = 5;
    options.warmup.lr = 0.05;

    let mut orchestrator =
        TrainingOrchestrator::new(model, loader, AugmentationPolicy::identity(), options);
    orchestrator.run().unwrap();

    // Brightness-separable classes: the best epoch should classify well
    let best_accuracy = orchestrator
        .history()
        .snapshots()
        .iter()
        .map(|s| s.val_accuracy)
        .fold(0.0f32, f32::max);
    assert!(
        best_accuracy >= 0.75,
        "expected separable classes to reach 0.75 accuracy, got {best_accuracy}"
    );
}

#[test]
fn augmented_training_stream_still_yields_normalized_tensors() {
    let data = synthetic_dataset(6, 6, 16);
    let loader = DatasetLoader::open(
        data.path(),
        LoaderOptions {
            image_size: 16,
            batch_size: 4,
            split_fraction: 0.5,
            seed: 1,
        },
    )
    .unwrap();

    let policy = AugmentationPolicy::new(autorogue::augment::AugmentConfig::default());
    for batch in loader.stream(Split::Train, &policy) {
        for img in &batch.images {
            assert_eq!(img.len(), 16 * 16 * 3);
            assert!(img.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }
}
