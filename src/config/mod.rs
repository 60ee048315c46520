//! Declarative run configuration
//!
//! A training run is described by a YAML file:
//!
//! ```yaml
//! data:
//!   root: data/train
//!   image_size: 128
//!   batch_size: 32
//!
//! model:
//!   n_blocks: 4
//!   hidden_dim: 64
//!
//! warmup:
//!   lr: 1e-3
//!   epochs: 10
//!
//! finetune:
//!   lr: 1e-5
//!   epochs: 10
//!   trainable_fraction: 0.3
//!
//! outputs:
//!   final_model: out/final_model.json
//! ```

mod cli;
mod schema;

pub use cli::{AugmentArgs, Cli, Command, EvaluateArgs, SplitArgs, TrainArgs, ValidateArgs};
pub use schema::{
    load_spec, validate_spec, DataConfig, FineTuneConfig, ModelConfig, MonitorConfig,
    OutputConfig, ReduceLrConfig, StageConfig, TrainSpec,
};
