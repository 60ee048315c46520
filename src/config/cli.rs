//! Command-line interface
//!
//! ```bash
//! autorogue train run.yaml
//! autorogue train run.yaml --warmup-epochs 5 --batch-size 16
//! autorogue evaluate out/final_model.json data/test
//! autorogue split raw_pool/ data/ --seed 13
//! autorogue augment data/train data/train_aug --per-image 5
//! autorogue validate run.yaml
//! ```

use super::TrainSpec;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Autorogue: plant-leaf disease classifier training pipeline
#[derive(Parser, Debug, Clone)]
#[command(name = "autorogue")]
#[command(version)]
#[command(about = "Two-phase transfer-learning trainer for binary leaf-disease classification")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the two-phase training pipeline from a YAML spec
    Train(TrainArgs),

    /// Score a saved model over a held-out directory
    Evaluate(EvaluateArgs),

    /// Partition a two-class image pool into train/val/test trees
    Split(SplitArgs),

    /// Write augmented copies of a dataset to disk
    Augment(AugmentArgs),

    /// Validate a spec file without training
    Validate(ValidateArgs),
}

/// Arguments for the train command
#[derive(Parser, Debug, Clone)]
pub struct TrainArgs {
    /// Path to YAML spec file
    #[arg(value_name = "SPEC")]
    pub spec: PathBuf,

    /// Override dataset root directory
    #[arg(long)]
    pub data_root: Option<PathBuf>,

    /// Override batch size
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Override warm-up epoch budget
    #[arg(long)]
    pub warmup_epochs: Option<usize>,

    /// Override fine-tune epoch budget
    #[arg(long)]
    pub finetune_epochs: Option<usize>,

    /// Override shuffle seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Validate the spec and build the loader, but do not train
    #[arg(long)]
    pub dry_run: bool,
}

impl TrainArgs {
    /// Fold CLI overrides into a parsed spec
    pub fn apply_overrides(&self, spec: &mut TrainSpec) {
        if let Some(root) = &self.data_root {
            spec.data.root = root.clone();
        }
        if let Some(batch_size) = self.batch_size {
            spec.data.batch_size = batch_size;
        }
        if let Some(epochs) = self.warmup_epochs {
            spec.warmup.epochs = epochs;
        }
        if let Some(epochs) = self.finetune_epochs {
            spec.finetune.epochs = epochs;
        }
        if let Some(seed) = self.seed {
            spec.data.seed = seed;
        }
    }
}

/// Arguments for the evaluate command
#[derive(Parser, Debug, Clone)]
pub struct EvaluateArgs {
    /// Path to a saved model artifact
    #[arg(value_name = "MODEL")]
    pub model: PathBuf,

    /// Held-out two-class directory tree
    #[arg(value_name = "DATA")]
    pub data: PathBuf,

    /// Batch size; falls back to the generator record saved next to the
    /// model, then to 32
    #[arg(short, long)]
    pub batch_size: Option<usize>,
}

/// Arguments for the split command
#[derive(Parser, Debug, Clone)]
pub struct SplitArgs {
    /// Flat two-class image pool
    #[arg(value_name = "SRC")]
    pub src: PathBuf,

    /// Destination for the train/val/test trees
    #[arg(value_name = "DST")]
    pub dst: PathBuf,

    #[arg(long, default_value_t = 13)]
    pub seed: u64,
}

/// Arguments for the augment command
#[derive(Parser, Debug, Clone)]
pub struct AugmentArgs {
    /// Source two-class directory tree
    #[arg(value_name = "SRC")]
    pub src: PathBuf,

    /// Destination directory
    #[arg(value_name = "DST")]
    pub dst: PathBuf,

    /// Augmented copies written per source image
    #[arg(long, default_value_t = 5)]
    pub per_image: usize,
}

/// Arguments for the validate command
#[derive(Parser, Debug, Clone)]
pub struct ValidateArgs {
    /// Path to YAML spec file
    #[arg(value_name = "SPEC")]
    pub spec: PathBuf,
}
