//! # Autorogue: Plant-Leaf Disease Classifier Training Pipeline
//!
//! Autorogue trains a binary image classifier (healthy vs. disease-affected
//! leaves) by transfer learning from a pretrained backbone, then persists the
//! best-performing model for downstream evaluation.
//!
//! ## Architecture
//!
//! - **autograd**: Tape-based automatic differentiation over `f32` vectors
//! - **optim**: Adam optimizer, re-initialized per training phase
//! - **augment**: Randomized geometric/photometric augmentation policy
//! - **data**: Directory-tree dataset loading, splitting, and batch streams
//! - **model**: Pretrained backbone with a frozen/trainable layer partition
//! - **train**: Two-phase (warm-up → fine-tune) training orchestrator with
//!   epoch-end observers, checkpoint selection, and metric history
//! - **io**: Model artifact saving and loading (JSON, SafeTensors)
//! - **eval**: Held-out evaluation of a persisted artifact
//! - **config**: Declarative YAML run configuration and CLI

pub mod augment;
pub mod autograd;
pub mod config;
pub mod data;
pub mod eval;
pub mod io;
pub mod model;
pub mod optim;
pub mod train;

pub mod error;

// Re-export commonly used types
pub use autograd::Tensor;
pub use error::{Error, Result};
