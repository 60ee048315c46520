//! YAML schema for training runs

use crate::augment::AugmentConfig;
use crate::data::LoaderOptions;
use crate::error::Result;
use crate::model::Architecture;
use crate::train::{MetricMode, MonitoredMetric, PhaseConfig, TrainOptions};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete training specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainSpec {
    pub data: DataConfig,

    #[serde(default)]
    pub model: ModelConfig,

    /// Training-time augmentation bounds
    #[serde(default)]
    pub augment: AugmentConfig,

    #[serde(default = "StageConfig::warmup_default")]
    pub warmup: StageConfig,

    #[serde(default)]
    pub finetune: FineTuneConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub reduce_lr: ReduceLrConfig,

    pub outputs: OutputConfig,
}

/// Dataset location and loading parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Root directory holding the two class sub-directories
    pub root: PathBuf,

    #[serde(default = "default_image_size")]
    pub image_size: u32,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Fraction of each class assigned to training
    #[serde(default = "default_split_fraction")]
    pub split_fraction: f32,

    /// Shuffle seed; fixed for reproducible sample ordering
    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// Network shape and weight source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Artifact to start from; seeded init when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pretrained: Option<PathBuf>,

    #[serde(default = "default_init_seed")]
    pub init_seed: u64,

    #[serde(default = "default_grid")]
    pub grid: usize,

    #[serde(default = "default_hidden_dim")]
    pub hidden_dim: usize,

    #[serde(default = "default_n_blocks")]
    pub n_blocks: usize,

    #[serde(default = "default_dropout")]
    pub dropout: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            pretrained: None,
            init_seed: default_init_seed(),
            grid: default_grid(),
            hidden_dim: default_hidden_dim(),
            n_blocks: default_n_blocks(),
            dropout: default_dropout(),
        }
    }
}

/// One training phase's knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub lr: f32,
    pub epochs: usize,
    #[serde(default = "default_patience")]
    pub patience: usize,
}

impl StageConfig {
    fn warmup_default() -> Self {
        Self {
            lr: 1e-3,
            epochs: 10,
            patience: 5,
        }
    }
}

/// Fine-tune phase knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FineTuneConfig {
    pub lr: f32,
    pub epochs: usize,
    #[serde(default = "default_patience")]
    pub patience: usize,
    /// Trailing fraction of blocks unfrozen
    #[serde(default = "default_trainable_fraction")]
    pub trainable_fraction: f32,
}

impl Default for FineTuneConfig {
    fn default() -> Self {
        Self {
            lr: 1e-5,
            epochs: 10,
            patience: 5,
            trainable_fraction: 0.3,
        }
    }
}

/// Which validation metric drives checkpointing and early stopping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_metric")]
    pub metric: MonitoredMetric,

    /// Improvement direction; derived from the metric when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<MetricMode>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            metric: default_monitor_metric(),
            mode: None,
        }
    }
}

/// Learning-rate plateau reduction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceLrConfig {
    #[serde(default = "default_reduce_patience")]
    pub patience: usize,

    #[serde(default = "default_reduce_factor")]
    pub factor: f32,
}

impl Default for ReduceLrConfig {
    fn default() -> Self {
        Self {
            patience: 3,
            factor: 0.5,
        }
    }
}

/// Artifact destinations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_warmup_checkpoint")]
    pub warmup_checkpoint: PathBuf,

    #[serde(default = "default_finetune_checkpoint")]
    pub finetune_checkpoint: PathBuf,

    pub final_model: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<PathBuf>,

    #[serde(default = "default_artifact_name")]
    pub name: String,
}

fn default_image_size() -> u32 {
    128
}
fn default_batch_size() -> usize {
    32
}
fn default_split_fraction() -> f32 {
    0.8
}
fn default_seed() -> u64 {
    13
}
fn default_init_seed() -> u64 {
    42
}
fn default_grid() -> usize {
    8
}
fn default_hidden_dim() -> usize {
    64
}
fn default_n_blocks() -> usize {
    4
}
fn default_dropout() -> f32 {
    0.2
}
fn default_patience() -> usize {
    5
}
fn default_trainable_fraction() -> f32 {
    0.3
}
fn default_monitor_metric() -> MonitoredMetric {
    MonitoredMetric::ValPrAuc
}
fn default_reduce_patience() -> usize {
    3
}
fn default_reduce_factor() -> f32 {
    0.5
}
fn default_warmup_checkpoint() -> PathBuf {
    PathBuf::from("warmup_best.json")
}
fn default_finetune_checkpoint() -> PathBuf {
    PathBuf::from("finetune_best.json")
}
fn default_artifact_name() -> String {
    "leaf-classifier".to_string()
}

impl TrainSpec {
    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            image_size: self.data.image_size,
            batch_size: self.data.batch_size,
            split_fraction: self.data.split_fraction,
            seed: self.data.seed,
        }
    }

    pub fn architecture(&self) -> Architecture {
        Architecture {
            image_size: self.data.image_size,
            grid: self.model.grid,
            hidden_dim: self.model.hidden_dim,
            n_blocks: self.model.n_blocks,
            dropout: self.model.dropout,
        }
    }

    pub fn train_options(&self) -> TrainOptions {
        TrainOptions {
            warmup: PhaseConfig {
                lr: self.warmup.lr,
                epochs: self.warmup.epochs,
                patience: self.warmup.patience,
            },
            finetune: PhaseConfig {
                lr: self.finetune.lr,
                epochs: self.finetune.epochs,
                patience: self.finetune.patience,
            },
            finetune_fraction: self.finetune.trainable_fraction,
            monitor: self.monitor.metric,
            monitor_mode: self
                .monitor
                .mode
                .unwrap_or_else(|| self.monitor.metric.default_mode()),
            reduce_lr_patience: self.reduce_lr.patience,
            reduce_lr_factor: self.reduce_lr.factor,
            warmup_checkpoint: self.outputs.warmup_checkpoint.clone(),
            finetune_checkpoint: self.outputs.finetune_checkpoint.clone(),
            final_model: self.outputs.final_model.clone(),
            history_path: self.outputs.history.clone(),
            artifact_name: self.outputs.name.clone(),
        }
    }
}

/// Read and parse a YAML spec file
pub fn load_spec(path: &Path) -> Result<TrainSpec> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Check a spec's values without touching the dataset
pub fn validate_spec(spec: &TrainSpec) -> Result<()> {
    if spec.data.batch_size == 0 {
        return Err(Error::Config("batch_size must be positive".to_string()));
    }
    if !(0.0..1.0).contains(&spec.data.split_fraction) || spec.data.split_fraction == 0.0 {
        return Err(Error::Config(format!(
            "split_fraction must be in (0, 1), got {}",
            spec.data.split_fraction
        )));
    }
    if spec.data.image_size == 0 {
        return Err(Error::Config("image_size must be positive".to_string()));
    }
    if spec.model.grid == 0 || spec.model.hidden_dim == 0 || spec.model.n_blocks == 0 {
        return Err(Error::Config(
            "grid, hidden_dim, and n_blocks must all be positive".to_string(),
        ));
    }
    if spec.model.grid as u32 > spec.data.image_size {
        return Err(Error::Config(format!(
            "grid {} exceeds image size {}",
            spec.model.grid, spec.data.image_size
        )));
    }
    if !(0.0..1.0).contains(&spec.model.dropout) {
        return Err(Error::Config(format!(
            "dropout must be in [0, 1), got {}",
            spec.model.dropout
        )));
    }
    for (label, stage_lr, epochs) in [
        ("warmup", spec.warmup.lr, spec.warmup.epochs),
        ("finetune", spec.finetune.lr, spec.finetune.epochs),
    ] {
        if stage_lr <= 0.0 {
            return Err(Error::Config(format!("{label} learning rate must be positive")));
        }
        if epochs == 0 {
            return Err(Error::Config(format!("{label} epoch budget must be positive")));
        }
    }
    if !(0.0..=1.0).contains(&spec.finetune.trainable_fraction) {
        return Err(Error::Config(format!(
            "trainable_fraction must be in [0, 1], got {}",
            spec.finetune.trainable_fraction
        )));
    }
    if spec.reduce_lr.factor <= 0.0 || spec.reduce_lr.factor >= 1.0 {
        return Err(Error::Config(format!(
            "reduce_lr factor must be in (0, 1), got {}",
            spec.reduce_lr.factor
        )));
    }
    Ok(())
}
