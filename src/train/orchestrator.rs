//! Two-phase training orchestrator

use super::{
    Accuracy, BinaryCrossEntropy, CheckpointSelector, EarlyStopping, EpochObserver, EpochSignal,
    EpochSnapshot, LossFn, Metric, MetricHistory, MetricMode, MonitoredMetric, PrAuc, Precision,
    ProgressObserver, Recall, ReduceLrOnPlateau, RocAuc,
};
use crate::augment::AugmentationPolicy;
use crate::autograd::{backward, scale};
use crate::data::{DatasetLoader, GeneratorParams, Split, GENERATOR_PARAMS_FILE};
use crate::error::Result;
use crate::io::{ModelFormat, SaveConfig};
use crate::model::Backbone;
use crate::optim::{Adam, Optimizer};
use crate::{Error, Tensor};
use std::path::{Path, PathBuf};
use tracing::info;

/// Training state machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Backbone frozen, head only
    WarmUp,
    /// Trailing blocks unfrozen at a lower learning rate
    FineTune,
    /// Terminal
    Done,
}

impl Phase {
    fn label(&self) -> &'static str {
        match self {
            Phase::WarmUp => "warmup",
            Phase::FineTune => "finetune",
            Phase::Done => "done",
        }
    }
}

/// Per-phase training knobs
#[derive(Debug, Clone)]
pub struct PhaseConfig {
    pub lr: f32,
    /// Epoch budget; the phase never runs longer than this
    pub epochs: usize,
    /// Early-stopping patience in epochs
    pub patience: usize,
}

/// Full orchestrator configuration
///
/// Passed in explicitly at construction; the orchestrator reads no ambient
/// environment state.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub warmup: PhaseConfig,
    pub finetune: PhaseConfig,
    /// Trailing fraction of backbone blocks unfrozen during fine-tuning
    pub finetune_fraction: f32,
    /// Metric watched by checkpointing and early stopping
    pub monitor: MonitoredMetric,
    pub monitor_mode: MetricMode,
    pub reduce_lr_patience: usize,
    pub reduce_lr_factor: f32,
    /// Best-of-phase artifact destinations, one per phase
    pub warmup_checkpoint: PathBuf,
    pub finetune_checkpoint: PathBuf,
    /// Written unconditionally when training completes
    pub final_model: PathBuf,
    /// Metric history export destination, if any
    pub history_path: Option<PathBuf>,
    pub artifact_name: String,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            warmup: PhaseConfig {
                lr: 1e-3,
                epochs: 10,
                patience: 5,
            },
            finetune: PhaseConfig {
                lr: 1e-5,
                epochs: 10,
                patience: 5,
            },
            finetune_fraction: 0.3,
            monitor: MonitoredMetric::ValPrAuc,
            monitor_mode: MetricMode::Max,
            reduce_lr_patience: 3,
            reduce_lr_factor: 0.5,
            warmup_checkpoint: PathBuf::from("warmup_best.json"),
            finetune_checkpoint: PathBuf::from("finetune_best.json"),
            final_model: PathBuf::from("final_model.json"),
            history_path: None,
            artifact_name: "leaf-classifier".to_string(),
        }
    }
}

fn save_config_for(path: &Path) -> SaveConfig {
    let format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(ModelFormat::from_extension)
        .unwrap_or(ModelFormat::Json);
    SaveConfig::new(format)
}

/// Drives the WarmUp → FineTune → Done state machine
pub struct TrainingOrchestrator {
    model: Backbone,
    loader: DatasetLoader,
    policy: AugmentationPolicy,
    options: TrainOptions,
    phase: Phase,
    history: MetricHistory,
}

impl TrainingOrchestrator {
    pub fn new(
        model: Backbone,
        loader: DatasetLoader,
        policy: AugmentationPolicy,
        options: TrainOptions,
    ) -> Self {
        Self {
            model,
            loader,
            policy,
            options,
            phase: Phase::WarmUp,
            history: MetricHistory::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn history(&self) -> &MetricHistory {
        &self.history
    }

    pub fn model(&self) -> &Backbone {
        &self.model
    }

    pub fn into_model(self) -> Backbone {
        self.model
    }

    /// Run both phases to completion
    ///
    /// On WarmUp exit the best WarmUp weights are restored before the
    /// trailing blocks unfreeze; on FineTune exit the best FineTune weights
    /// are restored and the final artifact is written unconditionally.
    pub fn run(&mut self) -> Result<()> {
        info!(
            train_samples = self.loader.sample_count(Split::Train),
            val_samples = self.loader.sample_count(Split::Validation),
            "training run starting"
        );

        self.model.set_trainable(|_| false);
        self.run_phase(Phase::WarmUp)?;

        let n_blocks = self.model.n_blocks();
        let unfrozen = ((n_blocks as f32 * self.options.finetune_fraction).ceil() as usize).min(n_blocks);
        let first_trainable = n_blocks - unfrozen;
        self.model.set_trainable(move |block| block >= first_trainable);
        self.phase = Phase::FineTune;
        info!(
            unfrozen_blocks = unfrozen,
            total_blocks = n_blocks,
            "entering fine-tune phase"
        );

        self.run_phase(Phase::FineTune)?;
        self.phase = Phase::Done;

        let artifact = self.model.to_artifact(&self.options.artifact_name)?;
        crate::io::save_model(
            &artifact,
            &self.options.final_model,
            &save_config_for(&self.options.final_model),
        )
        .map_err(|e| {
            Error::Checkpoint(format!(
                "failed to write final model to {}: {e}",
                self.options.final_model.display()
            ))
        })?;
        info!(path = %self.options.final_model.display(), "final model written");

        // Park the loading parameters next to the artifact, so evaluation
        // can rebuild the same stream without re-reading the run spec
        let loader_options = self.loader.options();
        let mut record = GeneratorParams::new();
        record.set("directory", self.loader.root().display().to_string());
        record.set("image_size", loader_options.image_size);
        record.set("batch_size", loader_options.batch_size as u64);
        record.set("seed", loader_options.seed);
        if let Some(dir) = self.options.final_model.parent() {
            record.save(&dir.join(GENERATOR_PARAMS_FILE))?;
        }

        if let Some(history_path) = &self.options.history_path {
            self.history.export(history_path)?;
        }

        Ok(())
    }

    fn run_phase(&mut self, phase: Phase) -> Result<()> {
        let (config, checkpoint_path) = match phase {
            Phase::WarmUp => (
                self.options.warmup.clone(),
                self.options.warmup_checkpoint.clone(),
            ),
            Phase::FineTune => (
                self.options.finetune.clone(),
                self.options.finetune_checkpoint.clone(),
            ),
            Phase::Done => return Ok(()),
        };

        let mut optimizer = Adam::default_params(config.lr);
        let save_config = save_config_for(&checkpoint_path);
        let mut selector = CheckpointSelector::new(
            checkpoint_path,
            self.options.monitor,
            self.options.monitor_mode,
            save_config,
            self.options.artifact_name.clone(),
        );
        let mut observers: Vec<Box<dyn EpochObserver>> = vec![
            Box::new(EarlyStopping::new(
                self.options.monitor,
                self.options.monitor_mode,
                config.patience,
            )),
            Box::new(ReduceLrOnPlateau::new(
                self.options.reduce_lr_patience,
                self.options.reduce_lr_factor,
            )),
            Box::new(ProgressObserver),
        ];

        for epoch in 1..=config.epochs {
            let train_loss =
                train_epoch(&mut self.model, &self.loader, &self.policy, &mut optimizer, epoch)?;
            let snapshot = validate_epoch(
                &self.model,
                &self.loader,
                phase.label(),
                epoch,
                train_loss,
                optimizer.lr(),
            )?;

            selector.observe(self.options.monitor.value(&snapshot), epoch, &self.model)?;

            let mut stop = false;
            let mut lr_factor = 1.0;
            for observer in &mut observers {
                match observer.on_epoch_end(&snapshot) {
                    EpochSignal::Continue => {}
                    EpochSignal::Stop => stop = true,
                    EpochSignal::ScaleLr(factor) => lr_factor *= factor,
                }
            }
            self.history.push(snapshot);

            if lr_factor != 1.0 {
                let new_lr = optimizer.lr() * lr_factor;
                optimizer.set_lr(new_lr);
            }
            if stop {
                break;
            }
        }

        selector.restore_best(&mut self.model)?;
        Ok(())
    }
}

/// One full pass over the training stream, one optimizer step per batch
///
/// Per-sample losses are scaled by the batch length before backward, so the
/// accumulated gradient is the batch mean. A non-finite loss aborts the run.
fn train_epoch(
    model: &mut Backbone,
    loader: &DatasetLoader,
    policy: &AugmentationPolicy,
    optimizer: &mut Adam,
    epoch: usize,
) -> Result<f32> {
    let loss_fn = BinaryCrossEntropy;
    let mut total_loss = 0.0;
    let mut sample_count = 0usize;

    for batch in loader.stream_epoch(Split::Train, policy, epoch) {
        optimizer.zero_grad(model.params_mut());
        let batch_len = batch.len() as f32;

        for (image, &label) in batch.images.iter().zip(batch.labels.iter()) {
            let prediction = model.forward(image, true)?;
            let target = Tensor::from_vec(vec![label], false);
            let loss = loss_fn.forward(&prediction, &target);

            let value = loss.data()[0];
            if !value.is_finite() {
                return Err(Error::Training(format!(
                    "non-finite training loss at sample {sample_count}"
                )));
            }
            total_loss += value;
            sample_count += 1;

            let mut scaled = scale(&loss, 1.0 / batch_len);
            backward(&mut scaled, None);
        }

        optimizer.step(model.params_mut());
    }

    if sample_count == 0 {
        return Err(Error::Training(
            "training stream produced no usable samples".to_string(),
        ));
    }
    Ok(total_loss / sample_count as f32)
}

/// One forward-only pass over the validation stream
fn validate_epoch(
    model: &Backbone,
    loader: &DatasetLoader,
    phase: &str,
    epoch: usize,
    train_loss: f32,
    lr: f32,
) -> Result<EpochSnapshot> {
    let identity = AugmentationPolicy::identity();
    let mut predictions = Vec::new();
    let mut targets = Vec::new();

    for batch in loader.stream(Split::Validation, &identity) {
        for (image, &label) in batch.images.iter().zip(batch.labels.iter()) {
            let output = model.forward(image, false)?;
            predictions.push(output.data()[0]);
            targets.push(label);
        }
    }

    if predictions.is_empty() {
        return Err(Error::Training(
            "validation stream produced no usable samples".to_string(),
        ));
    }

    let predictions = Tensor::from_vec(predictions, false);
    let targets = Tensor::from_vec(targets, false);
    let val_loss = BinaryCrossEntropy.forward(&predictions, &targets).data()[0];

    Ok(EpochSnapshot {
        phase: phase.to_string(),
        epoch,
        train_loss,
        val_loss,
        val_accuracy: Accuracy::default().compute(&predictions, &targets),
        val_precision: Precision::default().compute(&predictions, &targets),
        val_recall: Recall::default().compute(&predictions, &targets),
        val_roc_auc: RocAuc.compute(&predictions, &targets),
        val_pr_auc: PrAuc.compute(&predictions, &targets),
        lr,
    })
}
