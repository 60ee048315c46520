//! Autorogue CLI
//!
//! Entry point for training, evaluation, and the offline dataset-prep
//! commands.

use autorogue::augment::{expand_dataset, AugmentationPolicy};
use autorogue::config::{
    load_spec, validate_spec, AugmentArgs, Cli, Command, EvaluateArgs, SplitArgs, TrainArgs,
    ValidateArgs,
};
use autorogue::data::{
    split_pool, DatasetLoader, GeneratorParams, Split, SplitProportions, GENERATOR_PARAMS_FILE,
};
use autorogue::eval::evaluate_directory;
use autorogue::model::Backbone;
use autorogue::train::TrainingOrchestrator;
use autorogue::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing::info;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let result = match cli.command {
        Command::Train(args) => run_train(args),
        Command::Evaluate(args) => run_evaluate(args),
        Command::Split(args) => run_split(args),
        Command::Augment(args) => run_augment(args),
        Command::Validate(args) => run_validate(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    let mut spec = load_spec(&args.spec)?;
    args.apply_overrides(&mut spec);
    validate_spec(&spec)?;

    let loader = DatasetLoader::open(&spec.data.root, spec.loader_options())?;
    info!(
        classes = ?loader.class_names(),
        train = loader.sample_count(Split::Train),
        validation = loader.sample_count(Split::Validation),
        "dataset ready"
    );

    if args.dry_run {
        info!("dry run requested, skipping training");
        return Ok(());
    }

    let model = match &spec.model.pretrained {
        Some(path) => Backbone::from_pretrained(path)?,
        None => Backbone::init(spec.architecture(), spec.model.init_seed),
    };

    let policy = AugmentationPolicy::new(spec.augment.clone());
    let options = spec.train_options();
    let final_model = options.final_model.clone();

    let mut orchestrator = TrainingOrchestrator::new(model, loader, policy, options);
    orchestrator.run()?;

    if let Some(snapshot) = orchestrator.history().latest() {
        info!(
            val_accuracy = snapshot.val_accuracy,
            val_pr_auc = snapshot.val_pr_auc,
            epochs = orchestrator.history().len(),
            model = %final_model.display(),
            "training run finished"
        );
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    // Training parks its loading parameters next to the artifact; reuse them
    // so evaluation streams the data the way the model was trained on
    let record = args
        .model
        .parent()
        .map(|dir| dir.join(GENERATOR_PARAMS_FILE))
        .filter(|path| path.is_file())
        .map(|path| GeneratorParams::load(&path))
        .transpose()?;

    let batch_size = args
        .batch_size
        .or_else(|| {
            let recorded = record
                .as_ref()?
                .get("batch_size")?
                .as_u64()
                .map(|v| v as usize);
            if let Some(batch_size) = recorded {
                info!(batch_size, "using recorded generator parameters");
            }
            recorded
        })
        .unwrap_or(32);

    let evaluation = evaluate_directory(&args.model, &args.data, batch_size)?;
    println!(
        "loss: {:.4}  accuracy: {:.4}  samples: {}",
        evaluation.loss, evaluation.accuracy, evaluation.samples
    );
    Ok(())
}

fn run_split(args: SplitArgs) -> Result<()> {
    let (train, val, test) = split_pool(&args.src, &args.dst, SplitProportions::default(), args.seed)?;
    println!("train: {train}  val: {val}  test: {test}");

    // Record the prep-time parameters next to the split for later stages
    let mut params = GeneratorParams::new();
    params.set("source", args.src.display().to_string());
    params.set("seed", args.seed);
    params.set("proportions", serde_json::json!([0.70, 0.15, 0.15]));
    params.save(&args.dst.join("split_params.json"))?;
    Ok(())
}

fn run_augment(args: AugmentArgs) -> Result<()> {
    let config = autorogue::augment::AugmentConfig::default();
    let written = expand_dataset(&args.src, &args.dst, args.per_image, &config)?;
    println!("wrote {written} augmented images to {}", args.dst.display());
    Ok(())
}

fn run_validate(args: ValidateArgs) -> Result<()> {
    let spec = load_spec(&args.spec)?;
    validate_spec(&spec)?;
    println!("{} is valid", args.spec.display());
    Ok(())
}
