//! Two-phase training
//!
//! The orchestrator drives a warm-up phase with the backbone frozen, then a
//! fine-tune phase with the trailing blocks unfrozen at a lower learning
//! rate. Epoch-end observers decide stopping and learning-rate adjustments;
//! the checkpoint selector persists weights on strict metric improvement.

mod checkpoint;
mod history;
mod loss;
mod metrics;
mod observer;
mod orchestrator;

pub use checkpoint::CheckpointSelector;
pub use history::{EpochSnapshot, MetricHistory};
pub use loss::{BinaryCrossEntropy, LossFn};
pub use metrics::{Accuracy, Metric, MetricMode, MonitoredMetric, PrAuc, Precision, Recall, RocAuc};
pub use observer::{EarlyStopping, EpochObserver, EpochSignal, ProgressObserver, ReduceLrOnPlateau};
pub use orchestrator::{Phase, PhaseConfig, TrainOptions, TrainingOrchestrator};
